//! Viewer bot: subscriber store (SQLite), long-poll loop, spawn fan-out.

use anyhow::{Result, anyhow};
use futures_util::future::join_all;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use sqlite::State;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::pipeline::FanOut;
use crate::spawn::SpawnRecord;
use crate::store::{SharedDb, lock};

/// Telegram rejects messages above 4096 chars; stay well under.
const MAX_MESSAGE_CHARS: usize = 3500;

// ---------------------------------------------------------------------------
// Subscriber database
// ---------------------------------------------------------------------------

/// Open (or create) the subscriber database and ensure the schema exists.
pub fn open_db(path: &str) -> Result<SharedDb> {
    let conn = sqlite::open(path)?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subscribers (
            chat_id  INTEGER PRIMARY KEY,
            added_at TEXT    NOT NULL DEFAULT (datetime('now'))
         );",
    )?;
    info!("Subscriber DB opened at {path}");
    Ok(Arc::new(Mutex::new(conn)))
}

pub fn add_subscriber(db: &SharedDb, chat_id: i64) -> Result<()> {
    let db = lock(db)?;
    let mut stmt = db.prepare("INSERT OR IGNORE INTO subscribers (chat_id) VALUES (?)")?;
    stmt.bind((1, chat_id))?;
    stmt.next()?;
    Ok(())
}

pub fn remove_subscriber(db: &SharedDb, chat_id: i64) -> Result<()> {
    let db = lock(db)?;
    let mut stmt = db.prepare("DELETE FROM subscribers WHERE chat_id = ?")?;
    stmt.bind((1, chat_id))?;
    stmt.next()?;
    Ok(())
}

pub fn get_subscribers(db: &SharedDb) -> Result<Vec<i64>> {
    let db = lock(db)?;
    let mut stmt = db.prepare("SELECT chat_id FROM subscribers")?;
    let mut ids = Vec::new();
    while let Ok(State::Row) = stmt.next() {
        ids.push(stmt.read::<i64, _>(0)?);
    }
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Live notification for one spawn.  Coordinates go on their own line so
/// they can be copied in one tap.
pub fn format_spawn(record: &SpawnRecord) -> String {
    let title = match record.iv {
        Some(iv) => format!("📍 {} ({iv}%)", record.name),
        None => format!("📍 {}", record.name),
    };
    format!("{title}\n{}, {}", record.lat, record.lon)
}

/// Backfill for a new viewer, split into Telegram-sized chunks.
pub fn format_snapshot(records: &[SpawnRecord]) -> Vec<String> {
    if records.is_empty() {
        return vec!["No spawns seen yet. New ones will show up here.".into()];
    }

    let mut chunks = Vec::new();
    let mut current = format!("🗂 Recent spawns ({}), newest first:\n", records.len());
    for record in records {
        let line = format!("• {record}\n");
        if current.len() + line.len() > MAX_MESSAGE_CHARS {
            chunks.push(std::mem::take(&mut current));
        }
        current.push_str(&line);
    }
    chunks.push(current);
    chunks
}

// ---------------------------------------------------------------------------
// Bot API types (getUpdates)
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    result: Vec<TgUpdate>,
}

#[derive(Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Deserialize)]
struct TgMessage {
    chat: TgChat,
    text: Option<String>,
}

#[derive(Deserialize)]
struct TgChat {
    id: i64,
}

// ---------------------------------------------------------------------------
// Sending helpers
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SendMessagePayload<'a> {
    chat_id: i64,
    text: &'a str,
    disable_web_page_preview: bool,
}

/// Send a single message to one chat via the Bot API.
pub async fn send_message(
    http: &HttpClient,
    bot_token: &str,
    chat_id: i64,
    text: &str,
) -> Result<()> {
    let url = format!("https://api.telegram.org/bot{bot_token}/sendMessage");
    let body = SendMessagePayload {
        chat_id,
        text,
        disable_web_page_preview: true,
    };
    let resp = http.post(&url).json(&body).send().await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        return Err(anyhow!("sendMessage failed: {status} body={raw}"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Delivers spawns to every subscribed chat.
#[derive(Clone)]
pub struct BotFanOut {
    http: HttpClient,
    token: String,
    db: SharedDb,
}

impl BotFanOut {
    pub fn new(http: HttpClient, token: String, db: SharedDb) -> Self {
        Self { http, token, db }
    }
}

impl FanOut for BotFanOut {
    async fn publish(&self, record: &SpawnRecord) -> Result<()> {
        let subscribers = get_subscribers(&self.db)?;
        if subscribers.is_empty() {
            debug!("Broadcast skipped – no subscribers.");
            return Ok(());
        }

        let text = format_spawn(record);
        let sends = subscribers
            .iter()
            .map(|&chat_id| send_message(&self.http, &self.token, chat_id, &text));
        let results = join_all(sends).await;

        let mut delivered = 0usize;
        for (chat_id, result) in subscribers.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Failed to deliver to chat_id={chat_id}: {e}"),
            }
        }
        info!("Broadcast {} to {delivered}/{} subscriber(s).", record.name, subscribers.len());
        Ok(())
    }

    async fn subscribe(&self, viewer: i64) -> Result<()> {
        add_subscriber(&self.db, viewer)?;
        if let Err(e) = send_message(
            &self.http,
            &self.token,
            viewer,
            "✅ Subscribed! Recent spawns follow, then live reports.",
        )
        .await
        {
            warn!("Failed to greet chat_id={viewer}: {e}");
        }
        Ok(())
    }

    async fn snapshot(&self, viewer: i64, records: &[SpawnRecord]) -> Result<()> {
        for chunk in format_snapshot(records) {
            send_message(&self.http, &self.token, viewer, &chunk).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Long-poll loop
// ---------------------------------------------------------------------------

/// Runs forever: polls `getUpdates` and handles /start_receive / /stop_receive.
/// `/start_receive` only forwards the chat id on `joined`; the message loop
/// subscribes the viewer (see [`BotFanOut::subscribe`]) and sends its
/// backfill.
pub async fn run_bot_polling(
    http: HttpClient,
    bot_token: String,
    db: SharedDb,
    joined: mpsc::Sender<i64>,
) {
    let mut offset: i64 = 0;
    info!("Bot long-poll loop started.");

    loop {
        let url = format!(
            "https://api.telegram.org/bot{bot_token}/getUpdates\
             ?timeout=30&offset={offset}&allowed_updates=[\"message\"]"
        );

        let resp = match tokio::time::timeout(Duration::from_secs(40), http.get(&url).send()).await
        {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => {
                warn!("getUpdates HTTP error: {e}");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
            Err(_elapsed) => {
                warn!("getUpdates request timed out locally – retrying");
                continue;
            }
        };

        let updates: GetUpdatesResponse = match resp.json().await {
            Ok(u) => u,
            Err(e) => {
                warn!("Failed to deserialize getUpdates response: {e}");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        if !updates.ok {
            warn!("getUpdates returned ok=false");
            tokio::time::sleep(Duration::from_secs(5)).await;
            continue;
        }

        for update in updates.result {
            offset = update.update_id + 1;

            let Some(msg) = update.message else {
                continue;
            };

            let chat_id = msg.chat.id;
            let raw_text = msg.text.unwrap_or_default();
            // Strip optional @BotName suffix (e.g. /start_receive@MyBot)
            let cmd = raw_text.trim().split('@').next().unwrap_or("").trim();

            match cmd {
                "/start" => {
                    let _ = send_message(
                        &http,
                        &bot_token,
                        chat_id,
                        "👋 Hello!\n\
                         /start_receive – get live spawn reports\n\
                         /stop_receive  – stop them",
                    )
                    .await;
                }

                "/start_receive" => {
                    info!("chat_id={chat_id} → subscribe");
                    // Registration and backfill happen on the message loop.
                    if joined.send(chat_id).await.is_err() {
                        warn!("Message loop gone; cannot subscribe chat_id={chat_id}");
                    }
                }

                "/stop_receive" => {
                    info!("chat_id={chat_id} → unsubscribe");
                    match remove_subscriber(&db, chat_id) {
                        Ok(_) => {
                            let _ = send_message(
                                &http,
                                &bot_token,
                                chat_id,
                                "🛑 Unsubscribed. You will no longer receive spawns.",
                            )
                            .await;
                        }
                        Err(e) => warn!("remove_subscriber({chat_id}): {e}"),
                    }
                }

                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn(name: &str, iv: Option<u8>) -> SpawnRecord {
        SpawnRecord {
            name: name.into(),
            lat: "40.7128".into(),
            lon: "-74.0060".into(),
            iv,
        }
    }

    #[test]
    fn subscriber_roundtrip() {
        let db = open_db(":memory:").unwrap();
        add_subscriber(&db, 1).unwrap();
        add_subscriber(&db, 2).unwrap();
        add_subscriber(&db, 1).unwrap();
        let mut ids = get_subscribers(&db).unwrap();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);

        remove_subscriber(&db, 1).unwrap();
        assert_eq!(get_subscribers(&db).unwrap(), vec![2]);
    }

    #[test]
    fn spawn_message_has_copyable_coordinates() {
        assert_eq!(
            format_spawn(&spawn("Pidgey", Some(95))),
            "📍 Pidgey (95%)\n40.7128, -74.0060"
        );
        assert_eq!(format_spawn(&spawn("Pidgey", None)), "📍 Pidgey\n40.7128, -74.0060");
    }

    #[test]
    fn empty_snapshot_still_says_something() {
        let chunks = format_snapshot(&[]);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].starts_with("No spawns"));
    }

    #[test]
    fn snapshot_keeps_order_and_size_limit() {
        let records: Vec<_> = (0..300).map(|i| spawn(&format!("Zubat{i}"), None)).collect();
        let chunks = format_snapshot(&records);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= MAX_MESSAGE_CHARS));

        let joined = chunks.concat();
        let first = joined.find("Zubat0 ").unwrap();
        let last = joined.find("Zubat299 ").unwrap();
        assert!(first < last);
    }
}
