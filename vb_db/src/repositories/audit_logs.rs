//! ABOUTME: Audit log repository recording every tool invocation
//! ABOUTME: Supports filtered listing for the audit-logs endpoint

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use vb_core::{time::now_iso8601, Error, Id, Result};

/// One tool invocation
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    pub id: String,
    pub tool: String,
    pub target: Option<String>,
    pub command_line: Option<String>,
    pub success: bool,
    pub exit_code: Option<i64>,
    pub duration_ms: i64,
    pub client_ip: Option<String>,
    /// JSON blob with tool-specific context
    pub details: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateAuditLog {
    pub tool: String,
    pub target: Option<String>,
    pub command_line: Option<String>,
    pub success: bool,
    pub exit_code: Option<i64>,
    pub duration_ms: i64,
    pub client_ip: Option<String>,
    pub details: Option<String>,
}

/// Optional filters for [`AuditLogRepository::list`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLogFilter {
    pub tool: Option<String>,
    pub success: Option<bool>,
    /// RFC3339 lower bound on `created_at`
    pub since: Option<String>,
}

pub struct AuditLogRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuditLogRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, entry: CreateAuditLog) -> Result<AuditLog> {
        let id = Id::new().to_string();
        let now = now_iso8601();

        sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs
                (id, tool, target, command_line, success, exit_code, duration_ms, client_ip, details, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&entry.tool)
        .bind(&entry.target)
        .bind(&entry.command_line)
        .bind(entry.success)
        .bind(entry.exit_code)
        .bind(entry.duration_ms)
        .bind(&entry.client_ip)
        .bind(&entry.details)
        .bind(&now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to record audit log: {}", e)))
    }

    pub async fn list(
        &self,
        filter: &AuditLogFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuditLog>> {
        sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT * FROM audit_logs
            WHERE (?1 IS NULL OR tool = ?1)
              AND (?2 IS NULL OR success = ?2)
              AND (?3 IS NULL OR created_at >= ?3)
            ORDER BY created_at DESC, id DESC
            LIMIT ?4 OFFSET ?5
            "#,
        )
        .bind(&filter.tool)
        .bind(filter.success)
        .bind(&filter.since)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list audit logs: {}", e)))
    }

    pub async fn count(&self, filter: &AuditLogFilter) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM audit_logs
            WHERE (?1 IS NULL OR tool = ?1)
              AND (?2 IS NULL OR success = ?2)
              AND (?3 IS NULL OR created_at >= ?3)
            "#,
        )
        .bind(&filter.tool)
        .bind(filter.success)
        .bind(&filter.since)
        .fetch_one(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to count audit logs: {}", e)))
    }
}
