use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};

use crate::pipeline::{InboundMessage, RelayRules};
use crate::spawn::lexicon::title_case;

#[derive(Clone)]
pub(super) struct BotCfg {
    pub token: String,
    pub db_path: String,
}

/// Relay settings shared by every mode.
///
/// | Env var          | Default             | Purpose                              |
/// |------------------|---------------------|--------------------------------------|
/// | `MAX_HISTORY`    | `200`               | Dedup log capacity                   |
/// | `FILTERED_NAMES` | —                   | Comma-separated names never relayed  |
/// | `SPAWN_DB_PATH`  | `./spawns.sqlite`   | Where relayed spawns are stored      |
#[derive(Clone, Debug)]
pub(super) struct RelayCfg {
    pub max_history: usize,
    pub filtered_names: HashSet<String>,
    pub spawn_db_path: String,
}

impl RelayCfg {
    /// Rules for a run that reads from `channels` (empty: any channel).
    pub fn rules(&self, channels: &[String]) -> RelayRules {
        RelayRules {
            allowed_channels: channels.iter().map(|c| c.to_lowercase()).collect(),
            filtered_names: self.filtered_names.clone(),
        }
    }
}

#[derive(Clone)]
pub(super) struct ReplayCfg {
    pub input_path: String,
    pub speed: f64,
    pub fixed_step_ms: Option<u64>,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub broadcast: bool,
}

/// One line of a replay file: an inbound message plus an optional unix
/// timestamp used for pacing.
#[derive(Debug, Clone, Deserialize)]
pub(super) struct ReplayEvent {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(flatten)]
    pub message: InboundMessage,
}

pub(crate) fn must_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("Missing env var {key}"))
}

pub(super) fn parse_bool_env(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
        .unwrap_or(default)
}

/// Comma-separated list; blank entries dropped.
pub(super) fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

pub(super) fn load_bot_cfg() -> Result<BotCfg> {
    Ok(BotCfg {
        token: must_env("BOT_TOKEN")?,
        db_path: std::env::var("BOT_DB_PATH").unwrap_or_else(|_| "./bot_subscribers.sqlite".into()),
    })
}

pub(super) fn load_relay_cfg() -> Result<RelayCfg> {
    relay_cfg_from(|key| std::env::var(key).ok())
}

/// [`load_relay_cfg`] over any key → value lookup.
pub(super) fn relay_cfg_from(get: impl Fn(&str) -> Option<String>) -> Result<RelayCfg> {
    let max_history = match get("MAX_HISTORY") {
        Some(v) => v
            .trim()
            .parse::<usize>()
            .with_context(|| format!("MAX_HISTORY must be a non-negative integer, got {v:?}"))?,
        None => 200,
    };
    let filtered_names = parse_list(&get("FILTERED_NAMES").unwrap_or_default())
        .iter()
        .map(|n| title_case(n))
        .collect();

    Ok(RelayCfg {
        max_history,
        filtered_names,
        spawn_db_path: get("SPAWN_DB_PATH").unwrap_or_else(|| "./spawns.sqlite".into()),
    })
}

pub(super) fn load_replay_cfg() -> Result<ReplayCfg> {
    let input_path = must_env("REPLAY_INPUT_PATH")?;
    let speed = std::env::var("REPLAY_SPEED")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| *v > 0.0)
        .unwrap_or(1.0);
    let fixed_step_ms = std::env::var("REPLAY_STEP_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0);
    let min_delay_ms = std::env::var("REPLAY_MIN_DELAY_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    let max_delay_ms = std::env::var("REPLAY_MAX_DELAY_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(10_000);

    Ok(ReplayCfg {
        input_path,
        speed,
        fixed_step_ms,
        min_delay_ms,
        max_delay_ms,
        broadcast: parse_bool_env("REPLAY_BROADCAST", false),
    })
}

/// Read a JSON-lines replay file.  Events are ordered by timestamp; lines
/// with equal (or missing) timestamps keep their file order.
pub(super) fn load_replay_events(path: &str) -> Result<Vec<ReplayEvent>> {
    let file = File::open(path).with_context(|| format!("failed to open replay file {path}"))?;
    parse_replay_events(BufReader::new(file))
}

pub(super) fn parse_replay_events(reader: impl BufRead) -> Result<Vec<ReplayEvent>> {
    let mut events = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: ReplayEvent = serde_json::from_str(&line)
            .with_context(|| format!("invalid JSON at line {}", idx + 1))?;
        events.push(event);
    }

    events.sort_by_key(|e| e.timestamp);
    Ok(events)
}

/// Pause before `event`, given the one replayed just before it.
pub(super) fn replay_delay_ms(cfg: &ReplayCfg, prev: &ReplayEvent, event: &ReplayEvent) -> u64 {
    if let Some(step_ms) = cfg.fixed_step_ms {
        return step_ms;
    }
    let delta_s = event.timestamp.saturating_sub(prev.timestamp).max(0) as f64;
    let scaled = (delta_s * 1000.0 / cfg.speed).round() as u64;
    scaled.clamp(cfg.min_delay_ms, cfg.max_delay_ms)
}
