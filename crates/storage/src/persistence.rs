// SPDX-License-Identifier: MIT

//! `scans` / `db_meta` persistence (spec §6), backed by an embedded
//! SQLite database via `sqlx`.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use thiserror::Error;
use vg_core::{ProbeStats, ScanConfig, ScanId, ScanRecord, ScanStatus};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub const SCHEMA_VERSION: &str = "1";

/// Owns the connection pool and migration state for the `scans` table
/// (spec §6) and the `db_meta` schema-version marker.
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self, PersistenceError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scans (
                id TEXT PRIMARY KEY,
                target_type TEXT NOT NULL,
                target_name TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at INTEGER,
                completed_at INTEGER,
                total_probes INTEGER NOT NULL DEFAULT 0,
                passed INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                pass_rate REAL,
                error_message TEXT,
                report_path TEXT,
                html_report_path TEXT,
                report_key TEXT,
                html_report_key TEXT,
                probe_stats_json TEXT,
                config_json TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_scans_status ON scans(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_scans_target ON scans(target_type, target_name)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_scans_started_at ON scans(started_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS db_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("INSERT OR IGNORE INTO db_meta (key, value) VALUES ('schema_version', ?)")
            .bind(SCHEMA_VERSION)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn upsert(&self, record: &ScanRecord) -> Result<(), PersistenceError> {
        let status = status_str(record.status);
        let config_json = serde_json::to_string(&record.config)
            .map_err(|e| PersistenceError::Corrupt(e.to_string()))?;
        let probe_stats_json = record
            .probe_stats
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| PersistenceError::Corrupt(e.to_string()))?;
        let pass_rate = record.pass_rate();
        sqlx::query(
            r#"
            INSERT INTO scans (
                id, target_type, target_name, status, started_at, completed_at,
                total_probes, passed, failed, pass_rate, error_message,
                report_path, html_report_path, report_key, html_report_key,
                probe_stats_json, config_json, created_at
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                total_probes = excluded.total_probes,
                passed = excluded.passed,
                failed = excluded.failed,
                pass_rate = excluded.pass_rate,
                error_message = excluded.error_message,
                report_path = excluded.report_path,
                html_report_path = excluded.html_report_path,
                report_key = excluded.report_key,
                html_report_key = excluded.html_report_key,
                probe_stats_json = excluded.probe_stats_json
            "#,
        )
        .bind(record.scan_id.to_string())
        .bind(&record.config.target_type)
        .bind(&record.config.target_name)
        .bind(status)
        .bind(record.started_at_ms.map(|v| v as i64))
        .bind(record.completed_at_ms.map(|v| v as i64))
        .bind(record.total_probes as i64)
        .bind(record.passed as i64)
        .bind(record.failed as i64)
        .bind(pass_rate)
        .bind(&record.error_message)
        .bind(&record.jsonl_path)
        .bind(&record.html_path)
        .bind(&record.jsonl_key)
        .bind(&record.html_key)
        .bind(probe_stats_json)
        .bind(config_json)
        .bind(record.created_at_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, scan_id: ScanId) -> Result<Option<ScanRecord>, PersistenceError> {
        let row = sqlx::query("SELECT * FROM scans WHERE id = ?")
            .bind(scan_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_record(&r)).transpose()
    }

    pub async fn delete(&self, scan_id: ScanId) -> Result<(), PersistenceError> {
        sqlx::query("DELETE FROM scans WHERE id = ?")
            .bind(scan_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Unfiltered listing; `vg-controller`'s history/statistics modules
    /// apply pagination, filtering, and sorting in-process.
    pub async fn list_all(&self) -> Result<Vec<ScanRecord>, PersistenceError> {
        let rows = sqlx::query("SELECT * FROM scans ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }
}

fn status_str(status: ScanStatus) -> &'static str {
    match status {
        ScanStatus::Pending => "pending",
        ScanStatus::Running => "running",
        ScanStatus::Completed => "completed",
        ScanStatus::Failed => "failed",
        ScanStatus::Cancelled => "cancelled",
    }
}

fn parse_status(s: &str) -> Result<ScanStatus, PersistenceError> {
    match s {
        "pending" => Ok(ScanStatus::Pending),
        "running" => Ok(ScanStatus::Running),
        "completed" => Ok(ScanStatus::Completed),
        "failed" => Ok(ScanStatus::Failed),
        "cancelled" => Ok(ScanStatus::Cancelled),
        other => Err(PersistenceError::Corrupt(format!("unknown status {other}"))),
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<ScanRecord, PersistenceError> {
    let id: String = row.try_get("id")?;
    let scan_id: ScanId = id
        .parse()
        .map_err(|_| PersistenceError::Corrupt(format!("bad scan id {id}")))?;
    let config_json: String = row.try_get("config_json")?;
    let config: ScanConfig = serde_json::from_str(&config_json)
        .map_err(|e| PersistenceError::Corrupt(e.to_string()))?;
    let created_at_ms: i64 = row.try_get("created_at")?;

    let mut record = ScanRecord::new(scan_id, config, created_at_ms as u64);
    record.status = parse_status(row.try_get::<String, _>("status")?.as_str())?;
    record.started_at_ms = row.try_get::<Option<i64>, _>("started_at")?.map(|v| v as u64);
    record.completed_at_ms = row.try_get::<Option<i64>, _>("completed_at")?.map(|v| v as u64);
    record.total_probes = row.try_get::<i64, _>("total_probes")? as u32;
    record.passed = row.try_get::<i64, _>("passed")? as u32;
    record.failed = row.try_get::<i64, _>("failed")? as u32;
    record.error_message = row.try_get("error_message")?;
    record.jsonl_path = row.try_get("report_path")?;
    record.html_path = row.try_get("html_report_path")?;
    record.jsonl_key = row.try_get("report_key")?;
    record.html_key = row.try_get("html_report_key")?;
    if record.status.is_terminal() {
        record.progress = 100;
    }
    let probe_stats_json: Option<String> = row.try_get("probe_stats_json")?;
    if let Some(json) = probe_stats_json {
        record.probe_stats = Some(
            serde_json::from_str::<ProbeStats>(&json)
                .map_err(|e| PersistenceError::Corrupt(e.to_string()))?,
        );
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vg_core::scan_config::tests_support::minimal;

    async fn in_memory_store() -> Store {
        Store::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let store = in_memory_store().await;
        let scan_id = ScanId::new();
        let mut record = ScanRecord::new(scan_id, minimal(), 1_000);
        record.transition_to(ScanStatus::Running, 1_100);
        record.passed = 2;
        store.upsert(&record).await.unwrap();

        let fetched = store.get(scan_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ScanStatus::Running);
        assert_eq!(fetched.passed, 2);
        assert_eq!(fetched.config.target_name, "llama3.2:3b");
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_conflict() {
        let store = in_memory_store().await;
        let scan_id = ScanId::new();
        let mut record = ScanRecord::new(scan_id, minimal(), 1_000);
        store.upsert(&record).await.unwrap();
        record.transition_to(ScanStatus::Completed, 2_000);
        record.passed = 5;
        store.upsert(&record).await.unwrap();

        let fetched = store.get(scan_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ScanStatus::Completed);
        assert_eq!(fetched.passed, 5);
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let store = in_memory_store().await;
        let scan_id = ScanId::new();
        let record = ScanRecord::new(scan_id, minimal(), 1_000);
        store.upsert(&record).await.unwrap();
        store.delete(scan_id).await.unwrap();
        assert!(store.get(scan_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_scan_returns_none() {
        let store = in_memory_store().await;
        assert!(store.get(ScanId::new()).await.unwrap().is_none());
    }
}
