use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod sightings;
mod store;

use config::{BusKind, Config};
use dbus_interface::CrowdfaceService;
use engine::{Engine, EngineSettings};
use store::SqliteStore;

const BUS_NAME: &str = "org.crowdface.Crowdface1";
const OBJECT_PATH: &str = "/org/crowdface/Crowdface1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("crowdfaced starting");

    let config = Config::load().context("failed to load configuration")?;
    tracing::info!(
        db = %config.db_path.display(),
        strict = config.strict_threshold,
        loose = config.loose_threshold,
        policy = ?config.enroll_policy,
        "configuration loaded"
    );

    let store = Arc::new(SqliteStore::open(&config.db_path).context("failed to open identity store")?);
    let engine = Engine::new(store, EngineSettings::from_config(&config))
        .context("failed to read identity store")?;
    let handle = engine::spawn_engine(engine)?;

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _connection = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, CrowdfaceService { engine: handle })?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!(bus = ?config.bus, name = BUS_NAME, "crowdfaced ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("crowdfaced shutting down");

    Ok(())
}
