//! Notification outbox worker and delivery abstraction.
//!
//! The reset flow enqueues rows in `notification_outbox` inside the same
//! transaction that persists the reset token, so the HTTP response never
//! waits on an outbound send. A background task polls for pending rows,
//! locks a batch with `FOR UPDATE SKIP LOCKED` (multiple workers never
//! double-send), and hands each row to a [`NotificationSender`]. Failures
//! are retried with exponential backoff and jitter until a max-attempts
//! cap, then marked `failed`. The default sender for local dev logs the
//! payload and reports success.

use anyhow::{Context, Result};
use rand::Rng;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

const BACKOFF_BASE: Duration = Duration::from_secs(5);
const BACKOFF_MAX: Duration = Duration::from_secs(300);

#[derive(Clone, Debug)]
pub struct Notification {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

/// Delivery abstraction used by the outbox worker.
pub trait NotificationSender: Send + Sync {
    /// Deliver a notification or return an error to schedule a retry.
    fn send(&self, notification: &Notification) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogNotificationSender;

impl NotificationSender for LogNotificationSender {
    fn send(&self, notification: &Notification) -> Result<()> {
        info!(
            to_email = %notification.to_email,
            template = %notification.template,
            payload = %notification.payload_json,
            "notification outbox send stub"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct OutboxConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
}

impl OutboxConfig {
    /// Default worker config: 5s poll interval, 10 rows per batch, 5
    /// attempts before a row is marked failed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds.max(1));
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the background task that drains the notification outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: Arc<dyn NotificationSender>,
    config: OutboxConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(err) = process_batch(&pool, sender.as_ref(), &config).await {
                error!("notification outbox batch failed: {err}");
            }
            sleep(config.poll_interval()).await;
        }
    })
}

async fn process_batch(
    pool: &PgPool,
    sender: &dyn NotificationSender,
    config: &OutboxConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start outbox transaction")?;

    let query = r"
        SELECT id, to_email, template, payload_json::text AS payload_json, attempts
        FROM notification_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size()).unwrap_or(1))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load outbox batch")?;

    let row_count = rows.len();
    for row in rows {
        let id: Uuid = row.get("id");
        let attempts: i32 = row.get("attempts");
        let attempts = u32::try_from(attempts).unwrap_or(0).saturating_add(1);
        let notification = Notification {
            to_email: row.get("to_email"),
            template: row.get("template"),
            payload_json: row.get("payload_json"),
        };

        match sender.send(&notification) {
            Ok(()) => mark_sent(&mut tx, id, attempts).await?,
            Err(err) => mark_failed(&mut tx, id, attempts, &err.to_string(), config).await?,
        }
    }

    tx.commit().await.context("failed to commit outbox batch")?;
    Ok(row_count)
}

async fn mark_sent(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    attempts: u32,
) -> Result<()> {
    let query = r"
        UPDATE notification_outbox
        SET status = 'sent',
            attempts = $2,
            last_error = NULL,
            sent_at = NOW()
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(i32::try_from(attempts).unwrap_or(i32::MAX))
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to mark outbox row sent")?;
    Ok(())
}

async fn mark_failed(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    attempts: u32,
    last_error: &str,
    config: &OutboxConfig,
) -> Result<()> {
    let attempts_i32 = i32::try_from(attempts).unwrap_or(i32::MAX);
    if attempts >= config.max_attempts() {
        let query = r"
            UPDATE notification_outbox
            SET status = 'failed',
                attempts = $2,
                last_error = $3
            WHERE id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(attempts_i32)
            .bind(last_error)
            .execute(&mut **tx)
            .instrument(span)
            .await
            .context("failed to mark outbox row failed")?;
        return Ok(());
    }

    let delay_ms = i64::try_from(backoff_delay(attempts).as_millis()).unwrap_or(i64::MAX);
    let query = r"
        UPDATE notification_outbox
        SET status = 'pending',
            attempts = $2,
            last_error = $3,
            next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(attempts_i32)
        .bind(last_error)
        .bind(delay_ms)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to schedule outbox retry")?;
    Ok(())
}

/// Exponential backoff with jitter: between half and the full delay for the
/// attempt, capped at [`BACKOFF_MAX`].
fn backoff_delay(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = BACKOFF_BASE.checked_mul(factor).unwrap_or(BACKOFF_MAX);
    let capped = delay.min(BACKOFF_MAX);

    let delay_ms = u64::try_from(capped.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return capped;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_floors_degenerate_values() {
        let config = OutboxConfig::new()
            .with_poll_interval_seconds(0)
            .with_batch_size(0)
            .with_max_attempts(0);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.batch_size(), 1);
        assert_eq!(config.max_attempts(), 1);
    }

    #[test]
    fn backoff_grows_and_caps() {
        // Jitter keeps the delay between half and the full nominal value.
        let first = backoff_delay(1);
        assert!(first >= Duration::from_millis(2_500));
        assert!(first <= Duration::from_secs(5));

        let deep = backoff_delay(30);
        assert!(deep >= BACKOFF_MAX / 2);
        assert!(deep <= BACKOFF_MAX);
    }

    #[test]
    fn log_sender_accepts_everything() {
        let sender = LogNotificationSender;
        let notification = Notification {
            to_email: "a@x.com".to_string(),
            template: "password_reset".to_string(),
            payload_json: "{}".to_string(),
        };
        assert!(sender.send(&notification).is_ok());
    }
}
