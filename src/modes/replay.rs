use crate::bot::{self, BotFanOut};
use crate::dedup::DedupLog;
use crate::pipeline::{Delivery, FanOut, Pipeline};
use crate::spawn::SpawnRecord;
use crate::store::SqliteStore;
use anyhow::{Result, anyhow};
use reqwest::Client as HttpClient;
use std::time::Duration;
use tracing::{info, warn};

use super::shared::{
    load_bot_cfg, load_relay_cfg, load_replay_cfg, load_replay_events, parse_list, replay_delay_ms,
};

/// Replays either go out to the real subscribers or to stdout.
enum ReplayFanOut {
    Bot(BotFanOut),
    Stdout,
}

impl FanOut for ReplayFanOut {
    async fn publish(&self, record: &SpawnRecord) -> Result<()> {
        match self {
            Self::Bot(bot) => bot.publish(record).await,
            Self::Stdout => {
                println!("[REPLAY SPAWN] {record}");
                Ok(())
            }
        }
    }

    async fn subscribe(&self, viewer: i64) -> Result<()> {
        match self {
            Self::Bot(bot) => bot.subscribe(viewer).await,
            Self::Stdout => Ok(()),
        }
    }

    async fn snapshot(&self, viewer: i64, records: &[SpawnRecord]) -> Result<()> {
        match self {
            Self::Bot(bot) => bot.snapshot(viewer, records).await,
            Self::Stdout => Ok(()),
        }
    }
}

pub(super) async fn run() -> Result<()> {
    let replay = load_replay_cfg()?;
    let relay = load_relay_cfg()?;
    let events = load_replay_events(&replay.input_path)?;
    if events.is_empty() {
        return Err(anyhow!("Replay input is empty: {}", replay.input_path));
    }

    let fan_out = if replay.broadcast {
        let bot_cfg = load_bot_cfg()?;
        let db = bot::open_db(&bot_cfg.db_path)?;
        info!("Replay broadcast enabled; spawns will be sent to bot subscribers");
        ReplayFanOut::Bot(BotFanOut::new(HttpClient::new(), bot_cfg.token, db))
    } else {
        ReplayFanOut::Stdout
    };

    // TG_CHANNELS is optional here; without it every channel is replayed.
    let channels = parse_list(&std::env::var("TG_CHANNELS").unwrap_or_default())
        .into_iter()
        .map(|c| c.trim_start_matches('@').to_string())
        .collect::<Vec<_>>();
    let mut pipeline = Pipeline::new(
        relay.rules(&channels),
        DedupLog::new(relay.max_history),
        fan_out,
        SqliteStore::open(&relay.spawn_db_path)?,
    );
    info!(
        "Replay started: {} events from {}",
        events.len(),
        replay.input_path
    );
    info!("Relay config: {pipeline}");

    let mut relayed = 0usize;
    let mut dropped = 0usize;

    for (idx, event) in events.iter().enumerate() {
        if idx > 0 {
            let delay_ms = replay_delay_ms(&replay, &events[idx - 1], event);
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }

        match pipeline.handle(&event.message).await {
            Delivery::Relayed(persist) => {
                relayed += 1;
                // Keep the database in replay order.
                if let Err(e) = persist.await {
                    warn!("Persistence task failed: {e}");
                }
            }
            _ => dropped += 1,
        }
    }

    info!(
        "Replay complete: total={}, relayed={}, dropped={}, in_history={}",
        events.len(),
        relayed,
        dropped,
        pipeline.log().len()
    );

    Ok(())
}
