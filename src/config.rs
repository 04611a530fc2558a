use anyhow::Context;
use bigdecimal::BigDecimal;
use chrono::Duration;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

pub const DEFAULT_PAYSTACK_BASE_URL: &str = "https://api.paystack.co";
pub const DEFAULT_PAYMENT_WINDOW_MS: u64 = 2 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got '{}'", other),
        }
    }
}

/// Payment gateway settings injected into the verification service, the
/// webhook receiver and the Paystack client.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub secret_key: String,
    pub base_url: String,
    pub payment_window_ms: u64,
}

impl GatewayConfig {
    pub fn payment_window(&self) -> Duration {
        Duration::milliseconds(self.payment_window_ms as i64)
    }

    /// Secret used to sign webhooks; `None` when unset.
    pub fn webhook_secret(&self) -> Option<&str> {
        Some(self.secret_key.as_str()).filter(|s| !s.trim().is_empty())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            base_url: DEFAULT_PAYSTACK_BASE_URL.to_string(),
            payment_window_ms: DEFAULT_PAYMENT_WINDOW_MS,
        }
    }
}

/// Fees and currency applied when an order is priced at checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutConfig {
    pub currency: String,
    pub shipping_fee: BigDecimal,
    /// Fraction of the subtotal, e.g. `0.075`.
    pub tax_rate: BigDecimal,
    /// Charged per protected unit.
    pub protection_fee: BigDecimal,
    pub callback_url: Option<String>,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            currency: "NGN".to_string(),
            shipping_fee: BigDecimal::from(0),
            tax_rate: BigDecimal::from(0),
            protection_fee: BigDecimal::from(0),
            callback_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub gateway: GatewayConfig,
    pub checkout: CheckoutConfig,
    pub auth_jwt_secret: String,
    pub log_format: LogFormat,
    pub log_request_body: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("SERVER_PORT must be a port number")?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?,
            gateway: GatewayConfig {
                secret_key: env::var("PAYSTACK_SECRET_KEY")
                    .context("PAYSTACK_SECRET_KEY must be set")?,
                base_url: env::var("PAYSTACK_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_PAYSTACK_BASE_URL.to_string()),
                payment_window_ms: env::var("PAYMENT_WINDOW_MS")
                    .unwrap_or_else(|_| DEFAULT_PAYMENT_WINDOW_MS.to_string())
                    .parse()
                    .context("PAYMENT_WINDOW_MS must be an integer number of milliseconds")?,
            },
            checkout: CheckoutConfig {
                currency: env::var("CHECKOUT_CURRENCY")
                    .unwrap_or_else(|_| "NGN".to_string())
                    .trim()
                    .to_uppercase(),
                shipping_fee: decimal_var("CHECKOUT_SHIPPING_FEE", "0")?,
                tax_rate: decimal_var("CHECKOUT_TAX_RATE", "0")?,
                protection_fee: decimal_var("CHECKOUT_PROTECTION_FEE", "0")?,
                callback_url: env::var("CHECKOUT_CALLBACK_URL").ok(),
            },
            auth_jwt_secret: env::var("AUTH_JWT_SECRET").context("AUTH_JWT_SECRET must be set")?,
            log_format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .parse()?,
            log_request_body: env::var("LOG_REQUEST_BODY")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server_port == 0 {
            anyhow::bail!("SERVER_PORT must be greater than 0");
        }
        if self.database_url.is_empty() {
            anyhow::bail!("DATABASE_URL is empty");
        }
        if self.gateway.webhook_secret().is_none() {
            anyhow::bail!("PAYSTACK_SECRET_KEY is empty");
        }
        if self.auth_jwt_secret.trim().is_empty() {
            anyhow::bail!("AUTH_JWT_SECRET is empty");
        }
        if self.gateway.payment_window_ms == 0 {
            anyhow::bail!("PAYMENT_WINDOW_MS must be greater than 0");
        }

        url::Url::parse(&self.gateway.base_url).context("PAYSTACK_BASE_URL is not a valid URL")?;
        if let Some(callback) = &self.checkout.callback_url {
            url::Url::parse(callback).context("CHECKOUT_CALLBACK_URL is not a valid URL")?;
        }
        if self.checkout.currency.len() != 3 {
            anyhow::bail!("CHECKOUT_CURRENCY must be a 3-letter ISO code");
        }

        Ok(())
    }
}

fn decimal_var(name: &str, default: &str) -> anyhow::Result<BigDecimal> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    BigDecimal::from_str(raw.trim()).with_context(|| format!("{} must be a decimal number", name))
}
