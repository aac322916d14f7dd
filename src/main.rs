use anyhow::Result;
use clap::Parser;
use designdaily::{config, db, handlers};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/designdaily.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let state = handlers::AppState::new(pool, &cfg);
    let router = handlers::router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.app.bind_addr).await?;
    info!(addr = %cfg.app.bind_addr, "starting curation service");
    axum::serve(listener, router).await?;

    Ok(())
}
