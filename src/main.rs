use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use meowmery::config::{Cli, Config};
use meowmery::db;
use meowmery::geocode::ReverseGeocoder;
use meowmery::routes;
use meowmery::state::AppState;
use meowmery::storage::LocalObjectStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Ensure the bucket directory exists
    let uploads = config.uploads_path();
    std::fs::create_dir_all(uploads.join(&config.storage.bucket))?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    let storage = LocalObjectStore::new(
        &uploads,
        &config.storage.bucket,
        &config.storage.public_base_url,
    );
    let geocoder = ReverseGeocoder::new(&config.geocoding)?;

    let state = AppState {
        db: pool,
        config: config.clone(),
        storage: Arc::new(storage),
        geocoder: Arc::new(geocoder),
    };

    let app = routes::build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
