mod live;
mod replay;
pub(crate) mod shared;

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Live,
    Replay,
}

impl RunMode {
    fn from_env() -> Self {
        let raw = std::env::var("RUN_MODE").unwrap_or_else(|_| "live".into());
        match raw.trim().to_lowercase().as_str() {
            "replay" => Self::Replay,
            _ => Self::Live,
        }
    }
}

/// `DEBUG_LOGGING=1` turns on debug-level output (rejections, duplicates).
pub fn debug_logging() -> bool {
    shared::parse_bool_env("DEBUG_LOGGING", false)
}

pub async fn run_from_env() -> Result<()> {
    match RunMode::from_env() {
        RunMode::Live => live::run().await,
        RunMode::Replay => replay::run().await,
    }
}
