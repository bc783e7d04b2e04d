use std::error::Error;
use std::sync::Arc;

use adbot::{Adbot, AdbotConfig};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = AdbotConfig::load()?;

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .json()
        .init();

    let bot = Adbot::open(&config)?;
    let rooms = bot.rooms()?;
    tracing::info!(
        store = %config.store.path.display(),
        rooms = rooms.len(),
        stimulus_pool = %bot.stimulus_pool()?,
        "store opened"
    );

    adbot::server::start_server(config.server, Arc::new(bot), None).await
}
