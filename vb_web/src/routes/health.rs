//! Service health.

use crate::{
    error::ApiResult,
    models::{ApiResponse, ErrorResponse, HealthInfo},
    AppState,
};
use actix_web::{web, HttpResponse};
use tracing::warn;

/// Database connectivity and service version
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy", body = HealthInfo),
        (status = 503, description = "Database unavailable", body = ErrorResponse),
    )
)]
pub async fn health(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let version = env!("CARGO_PKG_VERSION").to_string();

    match state.db.health_check().await {
        Ok(()) => Ok(HttpResponse::Ok().json(ApiResponse::ok(HealthInfo {
            status: "ok".to_string(),
            version,
            database: "ok".to_string(),
        }))),
        Err(e) => {
            warn!("Health check failed: {}", e);
            Ok(HttpResponse::ServiceUnavailable().json(
                ErrorResponse::new("unavailable", "Database unavailable").with_details(
                    serde_json::json!({ "version": version, "database": "unreachable" }),
                ),
            ))
        }
    }
}
