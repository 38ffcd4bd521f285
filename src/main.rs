use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod constants;
mod dataset;
mod figure;
mod filter;
mod interaction;
mod page;
mod server;
mod settings;

use constants::EVENT_CHANNEL_CAPACITY;
use dataset::DatasetStore;
use interaction::{EventSubscriptions, LoggingHandler};
use server::{start_server, AppState};
use settings::Settings;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("uranium_map=info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    info!("Uranium Map v{} starting", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load().context("Failed to load settings")?;
    info!(
        config = %Settings::config_path().display(),
        data_file = %settings.data_file.display(),
        sheet = %settings.sheet,
        cache = settings.cache_dataset,
        "Settings loaded"
    );

    let store = DatasetStore::new(
        settings.data_file.clone(),
        settings.sheet.clone(),
        settings.cache_dataset,
    );

    // Warm the cache and surface schema problems early; the page reports them too.
    let warm = store.clone();
    match tokio::task::spawn_blocking(move || warm.load()).await? {
        Ok(table) => {
            if table.is_empty() {
                warn!("Dataset has no placeable rows; the map will be empty");
            } else {
                info!(rows = table.len(), "Dataset ready");
            }
            for warning in &table.warnings {
                warn!("{}", warning);
            }
        }
        Err(e) => error!("Dataset unavailable: {}", e),
    }

    let (event_sender, _event_receiver) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let app_state = AppState {
        store,
        subscriptions: EventSubscriptions::default(),
        selection_handler: Arc::new(LoggingHandler),
        event_sender,
    };

    start_server(app_state, settings.bind_addr()).await?;

    Ok(())
}
