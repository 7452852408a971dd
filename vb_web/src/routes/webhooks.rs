//! Webhook registration and signed inbound delivery.

use crate::{
    error::{ApiError, ApiResult},
    models::{ApiResponse, CreateWebhookRequest, Page, Pagination, WebhookInfo, WebhookReceipt},
    webhooks::{verify, SIGNATURE_HEADER},
    AppState,
};
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::{info, warn};
use validator::Validate;
use vb_core::{telemetry::security_event, time::now_iso8601, unix_timestamp};
use vb_db::{CreateWebhook, TableQuery, WebhookRepository};

#[utoipa::path(
    post,
    path = "/api/v1/webhooks",
    tag = "webhooks",
    request_body = CreateWebhookRequest,
    responses(
        (status = 201, description = "Webhook registered; the secret is shown only here", body = WebhookInfo),
        (status = 422, description = "Invalid URL or events", body = crate::models::ErrorResponse),
    )
)]
pub async fn create_webhook(
    state: web::Data<AppState>,
    body: web::Json<CreateWebhookRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let body = body.into_inner();
    if !(body.url.starts_with("https://") || body.url.starts_with("http://")) {
        return Err(ApiError::validation("Webhook URL must use http or https"));
    }

    let hook = WebhookRepository::new(state.db.pool())
        .create(CreateWebhook {
            url: body.url,
            events: body.events,
        })
        .await?;
    info!(webhook_id = %hook.id, url = %hook.url, "Webhook registered");

    let secret = hook.secret.clone();
    let info = WebhookInfo {
        secret: Some(secret),
        ..WebhookInfo::from(hook)
    };
    Ok(HttpResponse::Created().json(ApiResponse::ok(info)))
}

#[utoipa::path(
    get,
    path = "/api/v1/webhooks",
    tag = "webhooks",
    params(Pagination),
    responses((status = 200, description = "Page of webhooks without secrets"))
)]
pub async fn list_webhooks(
    state: web::Data<AppState>,
    query: web::Query<Pagination>,
) -> ApiResult<HttpResponse> {
    let (offset, limit) = query.bounds();
    let items = WebhookRepository::new(state.db.pool())
        .list(offset, limit)
        .await?
        .into_iter()
        .map(WebhookInfo::from)
        .collect();
    let total = TableQuery::new("webhooks")?
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
    delete,
    path = "/api/v1/webhooks/{id}",
    tag = "webhooks",
    params(("id" = String, Path, description = "Webhook id")),
    responses(
        (status = 200, description = "Webhook deactivated"),
        (status = 404, description = "Unknown or already inactive", body = crate::models::ErrorResponse),
    )
)]
pub async fn delete_webhook(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    if !WebhookRepository::new(state.db.pool()).deactivate(&id).await? {
        return Err(ApiError::not_found(format!("Active webhook {} not found", id)));
    }

    info!(webhook_id = %id, "Webhook deactivated");
    Ok(HttpResponse::Ok().json(ApiResponse::ok(serde_json::json!({ "id": id, "is_active": false }))))
}

/// Accept a payload signed with the webhook's secret.
///
/// The raw body is verified before it is parsed, so the signature covers
/// exactly the bytes that were sent.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/{id}/receive",
    tag = "webhooks",
    params(
        ("id" = String, Path, description = "Webhook id"),
        ("X-VeriBits-Signature" = String, Header, description = "t=<unix>,v1=<hex HMAC-SHA256>"),
    ),
    responses(
        (status = 200, description = "Payload accepted", body = WebhookReceipt),
        (status = 400, description = "Body is not JSON", body = crate::models::ErrorResponse),
        (status = 401, description = "Missing, stale or invalid signature", body = crate::models::ErrorResponse),
        (status = 404, description = "Unknown or inactive webhook", body = crate::models::ErrorResponse),
    )
)]
pub async fn receive_webhook(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let hook = WebhookRepository::new(state.db.pool())
        .find_by_id(&id)
        .await?
        .filter(|hook| hook.is_active)
        .ok_or_else(|| ApiError::not_found(format!("Active webhook {} not found", id)))?;

    let header = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if let Err(e) = verify(
        &hook.secret,
        header,
        &body,
        unix_timestamp(),
        state.webhooks_config.signature_tolerance_secs,
    ) {
        warn!(webhook_id = %id, "Rejected inbound webhook: {}", e);
        security_event(
            "webhook_signature_rejected",
            &format!("webhook={} reason={}", id, e),
        );
        return Err(ApiError::invalid_signature(e.to_string()));
    }

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))?;
    let event = payload
        .get("event")
        .and_then(|e| e.as_str())
        .map(str::to_string);
    info!(webhook_id = %id, event = ?event, bytes = body.len(), "Inbound webhook accepted");

    Ok(HttpResponse::Ok().json(ApiResponse::ok(WebhookReceipt {
        webhook_id: id,
        event,
        received_at: now_iso8601(),
    })))
}
