//! ABOUTME: Endpoints for the network and security tools
//! ABOUTME: Each call is validated, run, audited and wrapped in the envelope

use crate::{
    audit::{record_tool_call, CallContext},
    error::{ApiError, ApiResult},
    middleware::client_ip::client_ip,
    models::{
        ApiResponse, DnsLookupRequest, HashRequest, PingRequest, PortScanRequest,
        RblCheckRequest, SslCheckRequest, TracerouteRequest, WhoisRequest,
    },
    AppState,
};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use std::future::Future;
use tracing::info;
use validator::Validate;
use vb_core::{MonotonicTimer, Result};
use vb_tools::{RecordType, ToolOutcome};

/// Run a tool, record the call and render the outcome.
///
/// A tool that ran but failed is reported as 502 with the outcome in the
/// error details, so callers still see command lines and exit codes.
async fn run_tool<T, F>(
    state: &AppState,
    req: &HttpRequest,
    tool: &'static str,
    target: &str,
    run: F,
) -> ApiResult<HttpResponse>
where
    T: Serialize,
    F: Future<Output = Result<ToolOutcome<T>>>,
{
    let client_ip = client_ip(req, &state.rate_limit_config.trusted_proxies);
    let timer = MonotonicTimer::new();
    let result = run.await;

    let context = CallContext {
        client_ip: Some(&client_ip),
        scan_id: None,
    };
    record_tool_call(
        &state.db,
        &state.metrics,
        tool,
        target,
        &context,
        &result,
        timer.elapsed(),
    )
    .await;

    let outcome = result?;
    info!(
        tool,
        success = outcome.success,
        duration_ms = outcome.duration_ms,
        "Tool call finished"
    );

    if outcome.success {
        return Ok(HttpResponse::Ok().json(ApiResponse::ok(&outcome)));
    }
    let message = outcome
        .error
        .clone()
        .unwrap_or_else(|| format!("{} failed", tool));
    let details = serde_json::to_value(&outcome).unwrap_or_default();
    Err(ApiError::tool_failed(message).with_details(details))
}

#[utoipa::path(
    post,
    path = "/api/v1/tools/dns-lookup",
    tag = "tools",
    request_body = DnsLookupRequest,
    responses(
        (status = 200, description = "DNS records", body = crate::models::ToolEnvelope),
        (status = 422, description = "Invalid domain or record type", body = crate::models::ErrorResponse),
        (status = 502, description = "Lookup failed", body = crate::models::ErrorResponse),
    )
)]
pub async fn dns_lookup(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<DnsLookupRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let record_type = match body.record_type.as_deref() {
        Some(t) => t.parse::<RecordType>()?,
        None => RecordType::A,
    };
    run_tool(
        &state,
        &req,
        "dns_lookup",
        &body.domain,
        state.tools.dns_lookup(&body.domain, record_type),
    )
    .await
}

#[utoipa::path(
    post,
    path = "/api/v1/tools/ping",
    tag = "tools",
    request_body = PingRequest,
    responses(
        (status = 200, description = "Ping statistics", body = crate::models::ToolEnvelope),
        (status = 422, description = "Invalid host or count", body = crate::models::ErrorResponse),
        (status = 502, description = "Ping failed", body = crate::models::ErrorResponse),
    )
)]
pub async fn ping(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<PingRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    run_tool(
        &state,
        &req,
        "ping",
        &body.host,
        state.tools.ping(&body.host, body.count),
    )
    .await
}

#[utoipa::path(
    post,
    path = "/api/v1/tools/traceroute",
    tag = "tools",
    request_body = TracerouteRequest,
    responses(
        (status = 200, description = "Route hops", body = crate::models::ToolEnvelope),
        (status = 422, description = "Invalid host or hop limit", body = crate::models::ErrorResponse),
        (status = 502, description = "Traceroute failed", body = crate::models::ErrorResponse),
    )
)]
pub async fn traceroute(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<TracerouteRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    run_tool(
        &state,
        &req,
        "traceroute",
        &body.host,
        state.tools.traceroute(&body.host, body.max_hops),
    )
    .await
}

#[utoipa::path(
    post,
    path = "/api/v1/tools/whois",
    tag = "tools",
    request_body = WhoisRequest,
    responses(
        (status = 200, description = "Registration data", body = crate::models::ToolEnvelope),
        (status = 422, description = "Invalid domain", body = crate::models::ErrorResponse),
        (status = 502, description = "WHOIS query failed", body = crate::models::ErrorResponse),
    )
)]
pub async fn whois(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<WhoisRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    run_tool(
        &state,
        &req,
        "whois",
        &body.domain,
        state.tools.whois(&body.domain),
    )
    .await
}

#[utoipa::path(
    post,
    path = "/api/v1/tools/ssl-check",
    tag = "tools",
    request_body = SslCheckRequest,
    responses(
        (status = 200, description = "Certificate details and VeriScore", body = crate::models::ToolEnvelope),
        (status = 422, description = "Invalid host or port", body = crate::models::ErrorResponse),
        (status = 502, description = "No certificate could be fetched", body = crate::models::ErrorResponse),
    )
)]
pub async fn ssl_check(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<SslCheckRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    run_tool(
        &state,
        &req,
        "ssl_check",
        &body.host,
        state.tools.ssl_check(&body.host, body.port),
    )
    .await
}

#[utoipa::path(
    post,
    path = "/api/v1/tools/port-scan",
    tag = "tools",
    request_body = PortScanRequest,
    responses(
        (status = 200, description = "Port states", body = crate::models::ToolEnvelope),
        (status = 422, description = "Invalid host or port list", body = crate::models::ErrorResponse),
        (status = 502, description = "Scan failed", body = crate::models::ErrorResponse),
    )
)]
pub async fn port_scan(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<PortScanRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    run_tool(
        &state,
        &req,
        "port_scan",
        &body.host,
        state.tools.port_scan(&body.host, &body.ports),
    )
    .await
}

#[utoipa::path(
    post,
    path = "/api/v1/tools/rbl-check",
    tag = "tools",
    request_body = RblCheckRequest,
    responses(
        (status = 200, description = "Blacklist listings and VeriScore", body = crate::models::ToolEnvelope),
        (status = 422, description = "Invalid IP address", body = crate::models::ErrorResponse),
        (status = 502, description = "No DNSBL zone could be queried", body = crate::models::ErrorResponse),
    )
)]
pub async fn rbl_check(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<RblCheckRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    run_tool(
        &state,
        &req,
        "rbl_check",
        &body.ip,
        state.tools.rbl_check(&body.ip),
    )
    .await
}

#[utoipa::path(
    post,
    path = "/api/v1/tools/hash",
    tag = "tools",
    request_body = HashRequest,
    responses(
        (status = 200, description = "Algorithm candidates and digests", body = crate::models::ToolEnvelope),
        (status = 422, description = "Empty or oversized input", body = crate::models::ErrorResponse),
    )
)]
pub async fn hash_analyze(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<HashRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    // The input may be a secret; only its length reaches the audit log
    let target = format!("{} bytes", body.input.len());
    let result = state.tools.hash_analyze(&body.input);
    run_tool(&state, &req, "hash_analyze", &target, async { result }).await
}
