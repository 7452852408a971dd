//! ABOUTME: System scan repository tracking multi-check scan lifecycles
//! ABOUTME: pending -> running -> completed | failed

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::fmt;
use vb_core::{time::now_iso8601, Error, Id, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScanStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ScanStatus::Pending),
            "running" => Ok(ScanStatus::Running),
            "completed" => Ok(ScanStatus::Completed),
            "failed" => Ok(ScanStatus::Failed),
            other => Err(Error::Validation(format!("Unknown scan status: {}", other))),
        }
    }
}

/// System scan entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SystemScan {
    pub id: String,
    pub target: String,
    pub checks: String, // JSON array of check names
    pub status: String,
    pub results: Option<String>, // JSON object keyed by check
    pub veriscore: Option<i64>,
    pub error: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl SystemScan {
    pub fn status(&self) -> Result<ScanStatus> {
        self.status.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSystemScan {
    pub target: String,
    pub checks: Vec<String>,
}

pub struct SystemScanRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SystemScanRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, request: CreateSystemScan) -> Result<SystemScan> {
        let id = Id::new().to_string();
        let now = now_iso8601();
        let checks = serde_json::to_string(&request.checks)
            .map_err(|e| Error::Database(format!("Failed to encode checks: {}", e)))?;

        sqlx::query_as::<_, SystemScan>(
            r#"
            INSERT INTO system_scans (id, target, checks, status, created_at)
            VALUES (?1, ?2, ?3, 'pending', ?4)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&request.target)
        .bind(&checks)
        .bind(&now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create system scan: {}", e)))
    }

    pub async fn mark_running(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE system_scans SET status = 'running', started_at = ?1 WHERE id = ?2 AND status = 'pending'",
        )
        .bind(now_iso8601())
        .bind(id)
        .execute(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to start system scan: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    /// Store results and the aggregate score; only a running scan completes
    pub async fn complete(
        &self,
        id: &str,
        results: &serde_json::Value,
        veriscore: Option<i64>,
    ) -> Result<Option<SystemScan>> {
        sqlx::query_as::<_, SystemScan>(
            r#"
            UPDATE system_scans
            SET status = 'completed', results = ?1, veriscore = ?2, completed_at = ?3
            WHERE id = ?4 AND status = 'running'
            RETURNING *
            "#,
        )
        .bind(results.to_string())
        .bind(veriscore)
        .bind(now_iso8601())
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to complete system scan: {}", e)))
    }

    pub async fn fail(&self, id: &str, error: &str) -> Result<Option<SystemScan>> {
        sqlx::query_as::<_, SystemScan>(
            r#"
            UPDATE system_scans
            SET status = 'failed', error = ?1, completed_at = ?2
            WHERE id = ?3 AND status IN ('pending', 'running')
            RETURNING *
            "#,
        )
        .bind(error)
        .bind(now_iso8601())
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to fail system scan: {}", e)))
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<SystemScan>> {
        sqlx::query_as::<_, SystemScan>("SELECT * FROM system_scans WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to find system scan: {}", e)))
    }

    pub async fn list(
        &self,
        status: Option<ScanStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<SystemScan>> {
        sqlx::query_as::<_, SystemScan>(
            r#"
            SELECT * FROM system_scans
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY created_at DESC, id DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list system scans: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::create_test_db;

    fn request() -> CreateSystemScan {
        CreateSystemScan {
            target: "example.com".to_string(),
            checks: vec!["dns".to_string(), "ssl".to_string()],
        }
    }

    #[tokio::test]
    async fn test_scan_lifecycle() {
        let (db, _dir) = create_test_db().await;
        let repo = SystemScanRepository::new(db.pool());

        let scan = repo.create(request()).await.unwrap();
        assert_eq!(scan.status().unwrap(), ScanStatus::Pending);
        assert_eq!(scan.checks, r#"["dns","ssl"]"#);

        // Completing a scan that never started is refused
        let results = serde_json::json!({"dns": {"records": ["192.0.2.1"]}});
        assert!(repo.complete(&scan.id, &results, Some(90)).await.unwrap().is_none());

        assert!(repo.mark_running(&scan.id).await.unwrap());
        assert!(!repo.mark_running(&scan.id).await.unwrap());

        let done = repo
            .complete(&scan.id, &results, Some(90))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status().unwrap(), ScanStatus::Completed);
        assert_eq!(done.veriscore, Some(90));
        assert!(done.started_at.is_some());
        assert!(done.completed_at.is_some());

        // Terminal scans cannot fail afterwards
        assert!(repo.fail(&scan.id, "late").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fail_and_list_by_status() {
        let (db, _dir) = create_test_db().await;
        let repo = SystemScanRepository::new(db.pool());

        let a = repo.create(request()).await.unwrap();
        let _b = repo.create(request()).await.unwrap();

        let failed = repo.fail(&a.id, "executor unavailable").await.unwrap().unwrap();
        assert_eq!(failed.status().unwrap(), ScanStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("executor unavailable"));

        assert_eq!(repo.list(None, 0, 10).await.unwrap().len(), 2);
        assert_eq!(
            repo.list(Some(ScanStatus::Failed), 0, 10).await.unwrap().len(),
            1
        );
        assert_eq!(
            repo.list(Some(ScanStatus::Pending), 0, 10).await.unwrap().len(),
            1
        );
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("running".parse::<ScanStatus>().unwrap(), ScanStatus::Running);
        assert!("done".parse::<ScanStatus>().is_err());
        assert!(ScanStatus::Failed.is_terminal());
        assert!(!ScanStatus::Pending.is_terminal());
    }
}
