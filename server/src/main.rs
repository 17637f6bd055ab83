//! Stowage file ingestion and tree server (stowd)

use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stowage::config::Config;
use stowage::service::FileManagerService;
use stowage::{api, db};

#[derive(Parser)]
#[command(name = "stowd")]
#[command(about = "Chunked upload and file tree server daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server in the foreground
    Serve,
    /// Run database migrations
    Migrate,
    /// Remove abandoned upload staging areas
    Sweep {
        /// Remove sessions untouched for at least this many hours
        #[arg(long, default_value_t = 24)]
        older_than_hours: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stowd=info,stowage=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve => run_server(config).await?,
        Commands::Migrate => run_migrations(&config).await?,
        Commands::Sweep { older_than_hours } => sweep_staging(&config, older_than_hours).await?,
    }

    Ok(())
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let db_pool = db::create_pool(&config.database_url).await?;

    // Idempotent; applies only what is missing
    tracing::info!("checking database migrations...");
    db::run_migrations(&db_pool).await?;

    let stats = db::get_stats(&db_pool).await?;
    tracing::info!(
        "{}: {} folders, {} files, {} bytes stored under {}",
        config.server_name,
        stats.total_folders,
        stats.total_files,
        stats.total_file_bytes,
        config.storage_root.display()
    );

    let service = FileManagerService::new(db_pool, &config)?;
    let app_state = api::AppState::new(service, config.clone());

    let rest_addr = format!("0.0.0.0:{}", config.rest_port).parse()?;
    api::rest::serve(rest_addr, app_state).await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn run_migrations(config: &Config) -> anyhow::Result<()> {
    println!("running migrations...");
    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    println!("migrations complete");
    Ok(())
}

async fn sweep_staging(config: &Config, older_than_hours: u64) -> anyhow::Result<()> {
    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let service = FileManagerService::new(pool, config)?;
    let max_age = Duration::from_secs(older_than_hours.saturating_mul(3600));
    let report = service.sweep_staging(max_age).await?;

    println!(
        "removed {} stale upload(s), kept {}",
        report.removed.len(),
        report.kept
    );
    for hash in &report.removed {
        println!("  {}", hash);
    }
    Ok(())
}
