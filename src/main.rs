mod bot;
mod dedup;
mod modes;
mod pipeline;
mod spawn;
mod store;
mod telegram;

use anyhow::Result;
use dotenvy::dotenv;
use tracing::Level;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let level = if modes::debug_logging() {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .init();

    modes::run_from_env().await
}
