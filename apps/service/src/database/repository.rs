use anyhow::Result;
use async_trait::async_trait;
use libsql::params;

use crate::monitoring::history::WindowId;
use crate::monitoring::types::{Alert, CheckResult, UptimeRecord};
use crate::pool::{LibsqlManager, LibsqlPool};

/// Durable storage used by the history store and the alert dispatcher.
///
/// Callers treat every method as best effort: failures are logged and never
/// change in-memory state.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Save one check result
    async fn save_check_result(&self, result: &CheckResult) -> Result<()>;

    /// Insert an alert, or update it when the id is already known
    async fn save_alert(&self, alert: &Alert) -> Result<()>;

    /// Aggregate of the stored results inside `window`, `None` when there are none
    async fn load_uptime_window(&self, endpoint_id: &str, window: WindowId) -> Result<Option<UptimeRecord>>;
}

/// Persistence used when the database is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPersistence;

#[async_trait]
impl Persistence for NoopPersistence {
    async fn save_check_result(&self, _result: &CheckResult) -> Result<()> {
        Ok(())
    }

    async fn save_alert(&self, _alert: &Alert) -> Result<()> {
        Ok(())
    }

    async fn load_uptime_window(&self, _endpoint_id: &str, _window: WindowId) -> Result<Option<UptimeRecord>> {
        Ok(None)
    }
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl Persistence for DatabaseImpl {
    async fn save_check_result(&self, result: &CheckResult) -> Result<()> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO check_results (endpoint_id, timestamp, outcome, latency_ms, status_code, detail) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                result.endpoint_id.clone(),
                result.timestamp.timestamp_millis(),
                result.outcome.as_str(),
                result.latency_ms.map(|v| v as i64),
                result.status_code.map(|v| v as i64),
                result.detail.clone()
            ],
        )
        .await?;

        Ok(())
    }

    async fn save_alert(&self, alert: &Alert) -> Result<()> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO alerts (id, endpoint_id, severity, message, raised_at, acknowledged) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET acknowledged = excluded.acknowledged, message = excluded.message",
            params![
                alert.id.to_string(),
                alert.endpoint_id.clone(),
                alert.severity.as_str(),
                alert.message.clone(),
                alert.raised_at.timestamp_millis(),
                if alert.acknowledged { 1 } else { 0 }
            ],
        )
        .await?;

        Ok(())
    }

    async fn load_uptime_window(&self, endpoint_id: &str, window: WindowId) -> Result<Option<UptimeRecord>> {
        let conn = self.get_conn().await?;
        let stmt = conn
            .prepare(
                "SELECT COUNT(*), COALESCE(SUM(CASE WHEN outcome = 'failure' THEN 0 ELSE 1 END), 0)
                 FROM check_results WHERE endpoint_id = ? AND timestamp >= ? AND timestamp < ?",
            )
            .await?;

        let mut rows = stmt
            .query(params![
                endpoint_id.to_string(),
                window.start.timestamp_millis(),
                window.end.timestamp_millis()
            ])
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let total_checks = row.get::<i64>(0)?.max(0) as u64;
        if total_checks == 0 {
            return Ok(None);
        }

        Ok(Some(UptimeRecord {
            endpoint_id: endpoint_id.to_string(),
            window_start: window.start,
            total_checks,
            successful_checks: row.get::<i64>(1)?.max(0) as u64,
        }))
    }
}
