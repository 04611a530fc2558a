use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marketplace_core::adapters::{PostgresCartRepository, PostgresOrderRepository};
use marketplace_core::cli::{Cli, Commands, DbCommands, OrderCommands};
use marketplace_core::config::{Config, LogFormat};
use marketplace_core::health::{PaystackChecker, PostgresChecker};
use marketplace_core::identity::JwtIdentityProvider;
use marketplace_core::paystack::PaystackClient;
use marketplace_core::{cli, create_app, db, startup, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    init_tracing(config.log_format);

    match cli.command {
        None | Some(Commands::Serve) => serve(config).await,
        Some(Commands::Db(DbCommands::Migrate)) => cli::handle_db_migrate(&config).await,
        Some(Commands::Orders(OrderCommands::Show { reference })) => {
            cli::handle_orders_show(&config, &reference).await
        }
        Some(Commands::Config) => cli::handle_config_validate(&config),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let report = startup::validate_environment(&config, &pool).await;
    report.log();
    if !report.is_valid() {
        anyhow::bail!("Startup validation failed: {}", report.errors.join("; "));
    }

    let paystack = PaystackClient::new(&config.gateway);
    tracing::info!("Paystack client initialized with URL: {}", config.gateway.base_url);

    let state = AppState::new(
        &config,
        Arc::new(PostgresCartRepository::new(pool.clone())),
        Arc::new(PostgresOrderRepository::new(pool.clone())),
        Arc::new(paystack.clone()),
        Arc::new(JwtIdentityProvider::new(&config.auth_jwt_secret)),
    )
    .with_dependency(Arc::new(PostgresChecker::new(pool)))
    .with_dependency(Arc::new(PaystackChecker::new(paystack)));

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
