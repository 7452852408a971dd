//! Stored firewall configuration CRUD.

use crate::{
    error::{ApiError, ApiResult},
    models::{
        ApiResponse, CreateFirewallConfigRequest, FirewallConfigInfo, Page,
        Pagination, UpdateFirewallConfigRequest,
    },
    AppState,
};
use actix_web::{web, HttpResponse};
use tracing::info;
use validator::Validate;
use vb_core::Error;
use vb_db::{CreateFirewallConfig, FirewallConfigRepository, TableQuery, UpdateFirewallConfig};

fn not_found(id: &str) -> ApiError {
    ApiError::not_found(format!("Firewall configuration {} not found", id))
}

/// Unique-name violations are a client problem, not a server one
fn map_write_error(error: Error) -> ApiError {
    match error {
        Error::Database(msg) if msg.contains("UNIQUE") => {
            ApiError::validation("A firewall configuration with this name already exists")
        }
        other => other.into(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/firewall/configs",
    tag = "firewall",
    params(Pagination),
    responses((status = 200, description = "Page of firewall configurations"))
)]
pub async fn list_configs(
    state: web::Data<AppState>,
    query: web::Query<Pagination>,
) -> ApiResult<HttpResponse> {
    let (offset, limit) = query.bounds();
    let repo = FirewallConfigRepository::new(state.db.pool());

    let items = repo
        .list(offset, limit)
        .await?
        .into_iter()
        .map(FirewallConfigInfo::from)
        .collect();
    let total = TableQuery::new("firewall_configs")?
        .count(&[])?
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
    post,
    path = "/api/v1/firewall/configs",
    tag = "firewall",
    request_body = CreateFirewallConfigRequest,
    responses(
        (status = 201, description = "Configuration stored", body = FirewallConfigInfo),
        (status = 422, description = "Invalid configuration", body = crate::models::ErrorResponse),
    )
)]
pub async fn create_config(
    state: web::Data<AppState>,
    body: web::Json<CreateFirewallConfigRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let body = body.into_inner();

    let config = FirewallConfigRepository::new(state.db.pool())
        .create(CreateFirewallConfig {
            name: body.name.trim().to_string(),
            device_type: body.device_type,
            description: body.description,
            rules: body.rules.to_string(),
        })
        .await
        .map_err(map_write_error)?;

    info!(id = %config.id, name = %config.name, "Firewall configuration created");
    Ok(HttpResponse::Created().json(ApiResponse::ok(FirewallConfigInfo::from(config))))
}

#[utoipa::path(
    get,
    path = "/api/v1/firewall/configs/{id}",
    tag = "firewall",
    params(("id" = String, Path, description = "Configuration id")),
    responses(
        (status = 200, description = "Configuration", body = FirewallConfigInfo),
        (status = 404, description = "Not found", body = crate::models::ErrorResponse),
    )
)]
pub async fn get_config(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let config = FirewallConfigRepository::new(state.db.pool())
        .find_by_id(&id)
        .await?
        .ok_or_else(|| not_found(&id))?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(FirewallConfigInfo::from(config))))
}

#[utoipa::path(
    put,
    path = "/api/v1/firewall/configs/{id}",
    tag = "firewall",
    params(("id" = String, Path, description = "Configuration id")),
    request_body = UpdateFirewallConfigRequest,
    responses(
        (status = 200, description = "Updated configuration", body = FirewallConfigInfo),
        (status = 404, description = "Not found", body = crate::models::ErrorResponse),
        (status = 422, description = "Invalid fields", body = crate::models::ErrorResponse),
    )
)]
pub async fn update_config(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UpdateFirewallConfigRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let id = path.into_inner();
    let body = body.into_inner();

    let update = UpdateFirewallConfig {
        name: body.name.map(|n| n.trim().to_string()),
        device_type: body.device_type,
        description: body.description,
        rules: body.rules.map(|r| r.to_string()),
        is_active: body.is_active,
    };
    let config = FirewallConfigRepository::new(state.db.pool())
        .update(&id, update)
        .await
        .map_err(map_write_error)?
        .ok_or_else(|| not_found(&id))?;

    info!(id = %config.id, "Firewall configuration updated");
    Ok(HttpResponse::Ok().json(ApiResponse::ok(FirewallConfigInfo::from(config))))
}

#[utoipa::path(
    delete,
    path = "/api/v1/firewall/configs/{id}",
    tag = "firewall",
    params(("id" = String, Path, description = "Configuration id")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "Not found", body = crate::models::ErrorResponse),
    )
)]
pub async fn delete_config(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let deleted = FirewallConfigRepository::new(state.db.pool())
        .delete(&id)
        .await?;
    if !deleted {
        return Err(not_found(&id));
    }

    info!(id = %id, "Firewall configuration deleted");
    Ok(HttpResponse::Ok().json(ApiResponse::ok(serde_json::json!({ "id": id, "deleted": true }))))
}
