//! System scans: create (runs in the background), list, inspect.

use crate::{
    error::{ApiError, ApiResult},
    models::{ApiResponse, CreateScanRequest, Page, ScanInfo, ScanListQuery, SCAN_CHECKS},
    AppState,
};
use actix_web::{web, HttpResponse};
use tracing::info;
use validator::Validate;
use vb_db::{CreateSystemScan, ScanStatus, SqlValue, SystemScanRepository, TableQuery};
use vb_exec::validate_target;

#[utoipa::path(
    post,
    path = "/api/v1/scans",
    tag = "scans",
    request_body = CreateScanRequest,
    responses(
        (status = 202, description = "Scan accepted and queued", body = ScanInfo),
        (status = 422, description = "Invalid target or checks", body = crate::models::ErrorResponse),
    )
)]
pub async fn create_scan(
    state: web::Data<AppState>,
    body: web::Json<CreateScanRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let body = body.into_inner();
    let target = validate_target(&body.target)?.to_string();

    let mut checks = if body.checks.is_empty() {
        SCAN_CHECKS.iter().map(|c| c.to_string()).collect()
    } else {
        body.checks
    };
    checks.sort();
    checks.dedup();

    let scan = SystemScanRepository::new(state.db.pool())
        .create(CreateSystemScan { target, checks })
        .await?;
    info!(scan_id = %scan.id, target = %scan.target, "System scan queued");

    state.scanner.spawn(scan.clone());
    Ok(HttpResponse::Accepted().json(ApiResponse::ok(ScanInfo::from(scan))))
}

#[utoipa::path(
    get,
    path = "/api/v1/scans",
    tag = "scans",
    params(ScanListQuery),
    responses(
        (status = 200, description = "Page of scans, newest first"),
        (status = 422, description = "Unknown status filter", body = crate::models::ErrorResponse),
    )
)]
pub async fn list_scans(
    state: web::Data<AppState>,
    query: web::Query<ScanListQuery>,
) -> ApiResult<HttpResponse> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ScanStatus>)
        .transpose()?;
    let offset = query.offset.unwrap_or(0).max(0);
    let limit = query.limit.unwrap_or(50).clamp(1, 200);

    let items = SystemScanRepository::new(state.db.pool())
        .list(status, offset, limit)
        .await?
        .into_iter()
        .map(ScanInfo::from)
        .collect();

    let filters: Vec<(&str, SqlValue)> = status
        .map(|s| vec![("status", SqlValue::from(s.as_str()))])
        .unwrap_or_default();
    let total = TableQuery::new("system_scans")?
        .count(&filters)?
        .fetch_count(state.db.pool())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(Page {
        items,
        total,
        offset,
        limit,
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/scans/{id}",
    tag = "scans",
    params(("id" = String, Path, description = "Scan id")),
    responses(
        (status = 200, description = "Scan state and results", body = ScanInfo),
        (status = 404, description = "Not found", body = crate::models::ErrorResponse),
    )
)]
pub async fn get_scan(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let scan = SystemScanRepository::new(state.db.pool())
        .find_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Scan {} not found", id)))?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(ScanInfo::from(scan))))
}
