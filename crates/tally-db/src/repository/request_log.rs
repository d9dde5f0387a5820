//! # Request Log Repository
//!
//! One row per submitted request, written off the critical path.
//!
//! ## Row Lifecycle
//! ```text
//! log_request()    ──► status = PROCESSING, processing_start = now
//!       │
//!       ├── mark_completed(response_ms) ──► COMPLETED, processing_end
//!       └── mark_failed(response_ms, msg) ──► FAILED, error_message
//! ```
//!
//! Updates for an unknown request id are logged and ignored: the insert
//! and the update travel through a best-effort executor and the insert may
//! have been dropped.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::DbResult;
use tally_core::CallerType;

/// Request status as stored in `request_log.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Processing,
    Completed,
    Failed,
}

/// Aggregates over a time window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct RequestStats {
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
    pub processing: i64,
    pub avg_response_ms: Option<f64>,
    pub max_response_ms: Option<i64>,
    pub min_response_ms: Option<i64>,
}

/// Repository for the `request_log` table.
#[derive(Debug, Clone)]
pub struct RequestLogRepository {
    pool: SqlitePool,
}

impl RequestLogRepository {
    /// Creates a new RequestLogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RequestLogRepository { pool }
    }

    /// Records a new request in PROCESSING state.
    ///
    /// Logging the same request id twice keeps the first row, so a writer
    /// that needs the row to exist can call this before `mark_*`.
    pub async fn log_request(
        &self,
        request_id: &str,
        request_type: &str,
        user_id: Option<&str>,
        caller_type: Option<CallerType>,
        started_at: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(request_id = %request_id, request_type = %request_type, "Logging request");

        sqlx::query(
            r#"
            INSERT INTO request_log (
                request_id, request_type, user_id, caller_type, status, processing_start
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (request_id) DO NOTHING
            "#,
        )
        .bind(request_id)
        .bind(request_type)
        .bind(user_id)
        .bind(caller_type)
        .bind(RequestStatus::Processing)
        .bind(started_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Marks a request COMPLETED.
    pub async fn mark_completed(&self, request_id: &str, response_time_ms: i64) -> DbResult<bool> {
        self.finish(request_id, RequestStatus::Completed, response_time_ms, None)
            .await
    }

    /// Marks a request FAILED with its error message.
    pub async fn mark_failed(
        &self,
        request_id: &str,
        response_time_ms: i64,
        error_message: &str,
    ) -> DbResult<bool> {
        self.finish(
            request_id,
            RequestStatus::Failed,
            response_time_ms,
            Some(error_message),
        )
        .await
    }

    async fn finish(
        &self,
        request_id: &str,
        status: RequestStatus,
        response_time_ms: i64,
        error_message: Option<&str>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE request_log SET
                status = ?2,
                response_time_ms = ?3,
                error_message = ?4,
                processing_end = ?5
            WHERE request_id = ?1
            "#,
        )
        .bind(request_id)
        .bind(status)
        .bind(response_time_ms)
        .bind(error_message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let found = result.rows_affected() > 0;
        if !found {
            warn!(request_id = %request_id, ?status, "Request id not found in request log");
        }

        Ok(found)
    }

    /// Aggregates requests started within the last `window`.
    pub async fn stats_since(&self, window: Duration) -> DbResult<RequestStats> {
        let since = Utc::now() - window;

        let stats = sqlx::query_as::<_, RequestStats>(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status = 'COMPLETED' THEN 1 ELSE 0 END), 0) AS completed,
                COALESCE(SUM(CASE WHEN status = 'FAILED' THEN 1 ELSE 0 END), 0) AS failed,
                COALESCE(SUM(CASE WHEN status = 'PROCESSING' THEN 1 ELSE 0 END), 0) AS processing,
                AVG(response_time_ms) AS avg_response_ms,
                MAX(response_time_ms) AS max_response_ms,
                MIN(response_time_ms) AS min_response_ms
            FROM request_log
            WHERE processing_start >= ?1
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }

    /// Number of rows currently in `status`.
    pub async fn count_by_status(&self, status: RequestStatus) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM request_log WHERE status = ?1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Deletes rows started more than `days` days ago. Returns rows removed.
    pub async fn cleanup_older_than(&self, days: i64) -> DbResult<u64> {
        let cutoff = Utc::now() - Duration::days(days);

        let result = sqlx::query("DELETE FROM request_log WHERE processing_start < ?1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        debug!(removed = result.rows_affected(), days, "Request log cleaned up");
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_request_lifecycle_and_stats() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let log = db.request_log();
        let now = Utc::now();

        log.log_request("r1", "CREATE_BILL", Some("u1"), Some(CallerType::Cashier), now)
            .await
            .unwrap();
        log.log_request("r2", "CREATE_BILL", Some("u2"), Some(CallerType::Customer), now)
            .await
            .unwrap();
        log.log_request("r3", "CREATE_BILL", None, None, now)
            .await
            .unwrap();
        log.log_request("r1", "CREATE_BILL", Some("u1"), Some(CallerType::Cashier), now)
            .await
            .unwrap();

        assert!(log.mark_completed("r1", 40).await.unwrap());
        assert!(log.mark_failed("r2", 10, "Insufficient stock").await.unwrap());
        assert!(!log.mark_completed("missing", 1).await.unwrap());

        let stats = log.stats_since(Duration::hours(1)).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.max_response_ms, Some(40));
        assert_eq!(stats.min_response_ms, Some(10));
        assert_eq!(stats.avg_response_ms, Some(25.0));

        assert_eq!(log.count_by_status(RequestStatus::Processing).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_removes_old_rows_only() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let log = db.request_log();

        log.log_request("old", "CREATE_BILL", None, None, Utc::now() - Duration::days(10))
            .await
            .unwrap();
        log.log_request("new", "CREATE_BILL", None, None, Utc::now())
            .await
            .unwrap();

        assert_eq!(log.cleanup_older_than(7).await.unwrap(), 1);
        assert_eq!(log.stats_since(Duration::days(30)).await.unwrap().total, 1);
    }
}
