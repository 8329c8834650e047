//! Notification collaborator
//!
//! Users get one notification per graded submission. With Redis configured
//! the notification is pushed to the user's list and published on a channel
//! for live subscribers; otherwise it is only logged.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Redis key constants
pub mod keys {
    /// Per-user notification list prefix
    pub const NOTIFICATION_PREFIX: &str = "gavel:notifications:";

    /// Notification channel (for pub/sub)
    pub const NOTIFICATION_CHANNEL: &str = "gavel:notifications";
}

/// Notifications kept per user
const KEEP_PER_USER: isize = 100;
const CONNECT_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(3);

/// Sender id used for messages generated by the judge itself
pub const SYSTEM_USER: i64 = 0;

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub user_id: i64,
    pub from_user_id: i64,
    pub text: String,
    pub link: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn system(user_id: i64, text: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            user_id,
            from_user_id: SYSTEM_USER,
            text: text.into(),
            link: link.into(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log only
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        info!(
            "Notify user {}: {} ({})",
            notification.user_id, notification.text, notification.link
        );
        Ok(())
    }
}

pub struct RedisNotifier {
    client: redis::Client,
    conn: Mutex<MultiplexedConnection>,
}

impl RedisNotifier {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;
        let conn = get_connection_with_retry(&client).await?;
        info!("Connected to Redis at {}", redis_url);
        Ok(Self {
            client,
            conn: Mutex::new(conn),
        })
    }

    async fn push(conn: &mut MultiplexedConnection, key: &str, json: &str) -> redis::RedisResult<()> {
        redis::pipe()
            .rpush(key, json)
            .ignore()
            .ltrim(key, -KEEP_PER_USER, -1)
            .ignore()
            .query_async(conn)
            .await
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let json = serde_json::to_string(notification)?;
        let key = format!("{}{}", keys::NOTIFICATION_PREFIX, notification.user_id);

        let mut conn = self.conn.lock().await;
        // Try to store, reconnect on failure
        if let Err(e) = Self::push(&mut conn, &key, &json).await {
            warn!("Failed to store notification: {}. Reconnecting...", e);
            *conn = get_connection_with_retry(&self.client).await?;
            Self::push(&mut conn, &key, &json).await?;
        }

        // Publish to channel (ignore errors as there may be no subscribers)
        let _ = conn
            .publish::<_, _, ()>(keys::NOTIFICATION_CHANNEL, &json)
            .await;

        Ok(())
    }
}

/// Get a Redis connection, retrying a few times before giving up
async fn get_connection_with_retry(client: &redis::Client) -> Result<MultiplexedConnection> {
    let mut attempt = 1;
    loop {
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => return Ok(conn),
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                warn!(
                    "Failed to connect to Redis: {}. Retrying in {} seconds...",
                    e,
                    RETRY_DELAY.as_secs()
                );
                attempt += 1;
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(e) => return Err(e).context("Failed to connect to Redis"),
        }
    }
}
