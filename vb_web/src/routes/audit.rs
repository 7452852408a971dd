//! Read access to the tool audit trail.

use crate::{
    error::{ApiError, ApiResult},
    models::{ApiResponse, AuditLogQuery, Page},
    AppState,
};
use actix_web::{web, HttpResponse};
use chrono::{DateTime, SecondsFormat, Utc};
use vb_db::{AuditLogFilter, AuditLogRepository};

/// Parse an RFC3339 bound and render it the way rows are stored
fn normalize_since(raw: &str) -> ApiResult<String> {
    let parsed = DateTime::parse_from_rfc3339(raw.trim()).map_err(|e| {
        ApiError::validation(format!("'since' must be an RFC3339 timestamp: {}", e))
    })?;
    Ok(parsed
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Nanos, true))
}

#[utoipa::path(
    get,
    path = "/api/v1/audit-logs",
    tag = "audit",
    params(AuditLogQuery),
    responses(
        (status = 200, description = "Page of tool invocations, newest first"),
        (status = 422, description = "Invalid filter", body = crate::models::ErrorResponse),
    )
)]
pub async fn list_audit_logs(
    state: web::Data<AppState>,
    query: web::Query<AuditLogQuery>,
) -> ApiResult<HttpResponse> {
    let query = query.into_inner();
    let since = query.since.as_deref().map(normalize_since).transpose()?;
    let filter = AuditLogFilter {
        tool: query.tool.filter(|t| !t.is_empty()),
        success: query.success,
        since,
    };
    let offset = query.offset.unwrap_or(0).max(0);
    let limit = query.limit.unwrap_or(50).clamp(1, 200);

    let repo = AuditLogRepository::new(state.db.pool());
    let items = repo.list(&filter, offset, limit).await?;
    let total = repo.count(&filter).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(Page {
        items,
        total,
        offset,
        limit,
    })))
}
