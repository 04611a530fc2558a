use clap::{Parser, Subcommand};

use crate::adapters::PostgresOrderRepository;
use crate::config::Config;
use crate::ports::OrderRepository;

#[derive(Parser)]
#[command(name = "marketplace-core")]
#[command(about = "Marketplace Core - cart concurrency and checkout payment reconciliation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Checkout order inspection
    #[command(subcommand)]
    Orders(OrderCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum OrderCommands {
    /// Show an order and its payment state by gateway reference
    Show {
        #[arg(value_name = "REFERENCE")]
        reference: String,
    },
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;
    println!("✓ Database migrations completed");

    Ok(())
}

pub async fn handle_orders_show(config: &Config, reference: &str) -> anyhow::Result<()> {
    crate::validation::validate_reference(reference)?;

    let pool = crate::db::create_pool(config).await?;
    let orders = PostgresOrderRepository::new(pool);

    let Some(order) = orders.find_by_reference(reference).await? else {
        anyhow::bail!("Order {} not found", reference);
    };
    let items = orders.items(order.id).await?;

    println!("Order {} ({})", order.order_number, order.id);
    println!("  Reference:      {}", order.paystack_reference);
    println!("  Owner:          {}", order.owner_id);
    println!("  Payment status: {}", order.payment_status);
    println!("  Total:          {} {}", order.total, order.currency);
    println!("  Created at:     {}", order.created_at);
    if let Some(paid_at) = order.paid_at {
        println!("  Paid at:        {}", paid_at);
    }
    println!(
        "  Expires at:     {}",
        order.expires_at(config.gateway.payment_window())
    );
    println!("  Items:");
    for item in items {
        println!(
            "    {} x {} ({}/{}/{}) @ {} = {}",
            item.quantity,
            item.name,
            item.variation_id,
            item.color,
            item.size,
            item.unit_price,
            item.line_total
        );
    }

    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Paystack Base URL: {}", config.gateway.base_url);
    println!("  Payment Window: {} ms", config.gateway.payment_window_ms);
    println!("  Checkout Currency: {}", config.checkout.currency);
    println!("  Log Format: {:?}", config.log_format);

    config.validate()?;

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
