//! Relay pipeline: parse → dedup → broadcast → persist.
//!
//! One `Pipeline` is owned by the single message loop, so the dedup log is
//! never shared.  Broadcasting is awaited; the persistence write is started
//! afterwards on the blocking pool and not waited for.

use std::collections::HashSet;
use std::fmt;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dedup::DedupLog;
use crate::spawn::{self, SpawnRecord};

/// One chat message as received from a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub text: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub author_id: String,
    #[serde(default)]
    pub origin_group: String,
}

impl InboundMessage {
    pub fn context(&self) -> MessageContext {
        MessageContext {
            channel: self.channel.clone(),
            author_id: self.author_id.clone(),
            origin_group: self.origin_group.clone(),
        }
    }
}

/// Where a report came from.  Stored for audit, never shown to viewers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContext {
    pub channel: String,
    pub author_id: String,
    pub origin_group: String,
}

/// Row written to the persistence sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredSpawn {
    pub name: String,
    pub lat: String,
    pub lon: String,
    pub iv: Option<u8>,
    pub channel: String,
    pub author_id: String,
    pub origin_group: String,
    /// RFC 3339, UTC.
    pub seen_at: String,
}

impl StoredSpawn {
    fn new(record: SpawnRecord, ctx: MessageContext) -> Self {
        Self {
            name: record.name,
            lat: record.lat,
            lon: record.lon,
            iv: record.iv,
            channel: ctx.channel,
            author_id: ctx.author_id,
            origin_group: ctx.origin_group,
            seen_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Real-time delivery to viewers.  Best effort: a failed delivery is
/// logged by the caller and never retried.
pub trait FanOut {
    /// Send one new spawn to every viewer.
    async fn publish(&self, record: &SpawnRecord) -> Result<()>;

    /// Register a viewer so later `publish` calls reach it.
    async fn subscribe(&self, viewer: i64) -> Result<()>;

    /// Send the current history (newest first) to a single new viewer.
    async fn snapshot(&self, viewer: i64, records: &[SpawnRecord]) -> Result<()>;
}

/// Durable record of every relayed spawn.  Writes are blocking and run off
/// the message loop.
pub trait SpawnStore: Clone + Send + 'static {
    fn insert(&self, spawn: &StoredSpawn) -> Result<()>;
}

/// What happened to one inbound message.
#[derive(Debug)]
pub enum Delivery {
    /// Channel not on the allow-list.
    NotAllowed,
    /// Not a spawn report.
    Rejected,
    /// Parsed, but the creature is on the suppressed-names list.
    Filtered,
    /// Already relayed and still in the dedup log.
    Duplicate,
    /// Broadcast done; the handle resolves once the persistence write ends.
    Relayed(JoinHandle<()>),
}

/// Static relay settings.
#[derive(Debug, Clone, Default)]
pub struct RelayRules {
    /// Lowercased channel names.  Empty means every channel is accepted.
    pub allowed_channels: HashSet<String>,
    /// Exact (title-cased) creature names that are never relayed.
    pub filtered_names: HashSet<String>,
}

impl RelayRules {
    pub fn allows_channel(&self, channel: &str) -> bool {
        self.allowed_channels.is_empty()
            || self
                .allowed_channels
                .contains(&channel.trim_start_matches('@').to_lowercase())
    }

    pub fn is_filtered(&self, name: &str) -> bool {
        self.filtered_names.contains(name)
    }
}

pub struct Pipeline<F, S> {
    rules: RelayRules,
    log: DedupLog,
    fan_out: F,
    store: S,
}

impl<F: FanOut, S: SpawnStore> Pipeline<F, S> {
    pub fn new(rules: RelayRules, log: DedupLog, fan_out: F, store: S) -> Self {
        Self {
            rules,
            log,
            fan_out,
            store,
        }
    }

    pub fn log(&self) -> &DedupLog {
        &self.log
    }

    /// Full path for one chat message.
    pub async fn handle(&mut self, msg: &InboundMessage) -> Delivery {
        if !self.rules.allows_channel(&msg.channel) {
            debug!("Message from #{} ignored – channel not allowed", msg.channel);
            return Delivery::NotAllowed;
        }

        let Some(record) = spawn::parse(&msg.text).accepted() else {
            debug!("Not a spawn report: {:?}", msg.text);
            return Delivery::Rejected;
        };

        if self.rules.is_filtered(&record.name) {
            debug!("{} is on the filtered list – skipping", record.name);
            return Delivery::Filtered;
        }

        self.accept(record, msg.context()).await
    }

    /// Relay a parsed record unless it is already in the dedup log.
    pub async fn accept(&mut self, record: SpawnRecord, ctx: MessageContext) -> Delivery {
        if self.log.contains(&record.name, &record.lat, &record.lon) {
            debug!("Dedup: {record} already relayed – suppressed");
            return Delivery::Duplicate;
        }

        self.log.record(record.clone());
        info!("Spotted: {record} (from #{})", ctx.channel);

        if let Err(e) = self.fan_out.publish(&record).await {
            warn!("Failed to broadcast {record}: {e}");
        }

        Delivery::Relayed(self.persist(StoredSpawn::new(record, ctx)))
    }

    /// Subscribe a viewer and hand it the current history.  Runs on the
    /// message loop, so no spawn can be published between the two steps:
    /// every spawn reaches the viewer either in the backfill or live.
    pub async fn join_viewer(&self, viewer: i64) {
        if let Err(e) = self.fan_out.subscribe(viewer).await {
            warn!("Failed to subscribe viewer {viewer}: {e}");
            return;
        }
        let history = self.log.snapshot();
        if let Err(e) = self.fan_out.snapshot(viewer, &history).await {
            warn!("Failed to backfill viewer {viewer}: {e}");
        }
    }

    fn persist(&self, spawn: StoredSpawn) -> JoinHandle<()> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = store.insert(&spawn) {
                warn!(
                    "Failed to persist {} at {}, {}: {e}",
                    spawn.name, spawn.lat, spawn.lon
                );
            }
        })
    }
}

impl<F, S> fmt::Display for Pipeline<F, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut channels: Vec<_> = self.rules.allowed_channels.iter().collect();
        channels.sort();
        let mut filtered: Vec<_> = self.rules.filtered_names.iter().collect();
        filtered.sort();
        write!(
            f,
            "Pipeline(channels={channels:?}, filtered={filtered:?}, max_history={})",
            self.log.capacity(),
        )
    }
}
