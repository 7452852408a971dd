//! ABOUTME: Web API layer exposing the tools, scans, webhooks and audit trail
//! ABOUTME: Provides REST endpoints under /api/v1 and OpenAPI documentation

use actix_web::{dev::Service, web, App, HttpResponse, HttpServer};
use std::{sync::Arc, time::Duration};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use vb_config::{Config, WebhooksConfig};
use vb_core::{Error, MonotonicTimer, Result};
use vb_db::Db;
use vb_obs::Metrics;
use vb_tools::ToolKit;

pub mod audit;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod scanner;
pub mod webhooks;

use middleware::{
    bodylimits::{BodyLimits, BodyLimitsConfig},
    ratelimit::{RateLimit, RateLimitConfig, RateLimiter},
};
use routes::{audit as audit_routes, firewall, health, scans, tools, webhooks as webhook_routes};
use scanner::ScanRunner;
use webhooks::WebhookDispatcher;

/// Application state shared across all handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: Db,
    pub tools: ToolKit,
    pub metrics: Arc<Metrics>,
    pub dispatcher: WebhookDispatcher,
    pub scanner: ScanRunner,
    pub webhooks_config: WebhooksConfig,
    pub rate_limit_config: RateLimitConfig,
    pub rate_limiter: RateLimiter,
    pub body_limits_config: BodyLimitsConfig,
}

impl AppState {
    pub fn new(config: &Config, db: Db, tools: ToolKit, metrics: Arc<Metrics>) -> Result<Self> {
        let dispatcher = WebhookDispatcher::new(Duration::from_secs(
            config.webhooks.delivery_timeout_secs,
        ))?;
        let scanner = ScanRunner::new(
            db.clone(),
            tools.clone(),
            metrics.clone(),
            dispatcher.clone(),
        );
        let rate_limit_config = RateLimitConfig::from(&config.server.rate_limit);
        let rate_limiter = RateLimiter::new(
            rate_limit_config.requests_per_window,
            rate_limit_config.window_duration,
        );

        Ok(Self {
            db,
            tools,
            metrics,
            dispatcher,
            scanner,
            webhooks_config: config.webhooks.clone(),
            rate_limit_config,
            rate_limiter,
            body_limits_config: BodyLimitsConfig::from(&config.server.body_limits),
        })
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        tools::dns_lookup,
        tools::ping,
        tools::traceroute,
        tools::whois,
        tools::ssl_check,
        tools::port_scan,
        tools::rbl_check,
        tools::hash_analyze,
        firewall::list_configs,
        firewall::create_config,
        firewall::get_config,
        firewall::update_config,
        firewall::delete_config,
        scans::create_scan,
        scans::list_scans,
        scans::get_scan,
        webhook_routes::create_webhook,
        webhook_routes::list_webhooks,
        webhook_routes::delete_webhook,
        webhook_routes::receive_webhook,
        audit_routes::list_audit_logs,
    ),
    components(
        schemas(
            models::ErrorBody,
            models::ErrorResponse,
            models::ToolEnvelope,
            models::HealthInfo,
            models::DnsLookupRequest,
            models::PingRequest,
            models::TracerouteRequest,
            models::WhoisRequest,
            models::SslCheckRequest,
            models::PortScanRequest,
            models::RblCheckRequest,
            models::HashRequest,
            models::CreateFirewallConfigRequest,
            models::UpdateFirewallConfigRequest,
            models::FirewallConfigInfo,
            models::CreateScanRequest,
            models::ScanInfo,
            models::CreateWebhookRequest,
            models::WebhookInfo,
            models::WebhookReceipt,
        ),
    ),
    tags(
        (name = "system", description = "Service health"),
        (name = "tools", description = "Network and security tools"),
        (name = "firewall", description = "Stored firewall configurations"),
        (name = "scans", description = "Background system scans"),
        (name = "webhooks", description = "Outbound event subscriptions and signed inbound delivery"),
        (name = "audit", description = "Tool invocation audit trail"),
    )
)]
pub struct ApiDoc;

/// Create the main web application service factory
pub fn create_app(
    state: AppState,
) -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let metrics = state.metrics.clone();
    let rate_limit = RateLimit::with_limiter(
        state.rate_limit_config.clone(),
        state.rate_limiter.clone(),
    );
    let body_limits_config = state.body_limits_config.clone();
    let json_config = web::JsonConfig::default()
        .limit(body_limits_config.default_json_limit)
        .error_handler(error::json_error_handler);

    App::new()
        .app_data(web::Data::new(state))
        .app_data(json_config)
        .wrap(actix_web::middleware::Logger::default())
        .wrap_fn(move |req, srv| {
            let metrics = metrics.clone();
            let timer = MonotonicTimer::new();
            let fut = srv.call(req);
            async move {
                let res = fut.await;
                metrics.inc_requests();
                metrics.observe_duration(timer.elapsed().as_secs_f64());
                res
            }
        })
        // Apply body size limits globally
        .wrap(BodyLimits::new(body_limits_config))
        .service(SwaggerUi::new("/docs/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .service(
            web::scope("/api/v1")
                .wrap(rate_limit)
                .configure(routes::configure),
        )
        .default_service(web::route().to(|| async {
            HttpResponse::NotFound().json(models::ErrorResponse::new(
                "not_found",
                "No route matches this request",
            ))
        }))
}

/// Start the web server
pub async fn start_server(bind_addr: &str, state: AppState) -> Result<()> {
    tracing::info!("Starting web server on {}", bind_addr);

    // Forget clients whose window has passed
    let limiter = state.rate_limiter.clone();
    let window = state.rate_limit_config.window_duration.max(Duration::from_secs(1));
    let pruner = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(window);
        loop {
            ticker.tick().await;
            limiter.prune();
        }
    });

    let result = HttpServer::new(move || create_app(state.clone()))
        .bind(bind_addr)
        .map_err(|e| Error::Config(format!("Failed to bind web server: {}", e)))?
        .run()
        .await
        .map_err(|e| Error::Config(format!("Web server error: {}", e)));

    pruner.abort();
    result
}

#[cfg(test)]
mod tests;
