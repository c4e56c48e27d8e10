use crate::bot::{self, BotFanOut};
use crate::dedup::DedupLog;
use crate::pipeline::{InboundMessage, Pipeline};
use crate::store::SqliteStore;
use crate::telegram;
use anyhow::Result;
use grammers_client::Update;
use reqwest::Client as HttpClient;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::shared::{load_bot_cfg, load_relay_cfg};

pub(super) async fn run() -> Result<()> {
    let tg = telegram::load_tg_cfg()?;
    let bot_cfg = load_bot_cfg()?;
    let relay = load_relay_cfg()?;

    let bot_db = bot::open_db(&bot_cfg.db_path)?;
    let (joined_tx, mut joined_rx) = mpsc::channel::<i64>(64);
    {
        let http = HttpClient::new();
        let token = bot_cfg.token.clone();
        let db = bot_db.clone();
        tokio::spawn(async move {
            bot::run_bot_polling(http, token, db, joined_tx).await;
        });
    }

    let store = SqliteStore::open(&relay.spawn_db_path)?;
    let fan_out = BotFanOut::new(HttpClient::new(), bot_cfg.token.clone(), bot_db);
    let mut pipeline = Pipeline::new(
        relay.rules(&tg.channels),
        DedupLog::new(relay.max_history),
        fan_out,
        store,
    );
    info!("Relay config: {pipeline}");

    let (client, pool) = telegram::connect(&tg)?;

    let runner = pool.runner;
    tokio::spawn(async move {
        runner.run().await;
    });

    let updates_rx = pool.updates;

    telegram::ensure_user_login(&client, &tg).await?;
    let watched = telegram::resolve_channels(&client, &tg).await?;

    // Telegram updates are turned into plain messages on their own task so
    // the loop below only ever waits on channels.
    let (msg_tx, mut msg_rx) = mpsc::channel::<InboundMessage>(1024);
    tokio::spawn(async move {
        let mut stream = client.stream_updates(
            updates_rx,
            grammers_client::UpdatesConfiguration {
                catch_up: true,
                update_queue_limit: Some(2048),
            },
        );

        loop {
            let Ok(update) = stream.next().await else {
                warn!("Update stream ended.");
                break;
            };

            let Update::NewMessage(msg) = update else {
                continue;
            };
            let Ok(peer) = msg.peer() else {
                continue;
            };
            let Some(channel) = watched.get(&peer.id().bare_id()) else {
                continue;
            };
            let text = msg.text().trim();
            if text.is_empty() {
                continue;
            }

            let inbound = InboundMessage {
                text: text.to_string(),
                channel: channel.clone(),
                author_id: msg
                    .sender()
                    .map(|s| s.id().bare_id().to_string())
                    .unwrap_or_default(),
                origin_group: peer.name().unwrap_or("<unknown>").to_string(),
            };
            if msg_tx.send(inbound).await.is_err() {
                break;
            }
        }
    });

    info!("Running in live mode. Waiting for spawn reports...");
    loop {
        tokio::select! {
            msg = msg_rx.recv() => {
                let Some(msg) = msg else {
                    warn!("Message source closed.");
                    break;
                };
                // Persistence runs detached; its outcome is only logged.
                pipeline.handle(&msg).await;
            }
            Some(viewer) = joined_rx.recv() => {
                pipeline.join_viewer(viewer).await;
            }
        }
    }

    Ok(())
}
