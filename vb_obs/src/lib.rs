//! ABOUTME: Observability services including health checks and metrics
//! ABOUTME: Prometheus registry for HTTP and per-tool counters

use actix_web::{
    dev::{ServiceRequest, ServiceResponse},
    middleware::Logger,
    web, App, HttpResponse, HttpServer, Result as ActixResult,
};
use prometheus_client::{
    encoding::{text::encode, EncodeLabelSet},
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::Registry,
};
use serde_json::json;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use vb_core::{Error, Result};

/// Readiness gate flipped once the database is available
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    ready: Arc<AtomicBool>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ToolLabels {
    pub tool: String,
}

/// Terminal state of a scan or a webhook delivery
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: String,
}

fn tool_duration_histogram() -> Histogram {
    Histogram::new([0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0].into_iter())
}

/// Metrics registry for Prometheus
#[derive(Debug)]
pub struct Metrics {
    registry: Arc<Mutex<Registry>>,
    http_requests_total: Counter,
    http_request_duration_seconds: Histogram,
    tool_invocations_total: Family<ToolLabels, Counter>,
    tool_failures_total: Family<ToolLabels, Counter>,
    tool_duration_seconds: Family<ToolLabels, Histogram>,
    command_rejections_total: Counter,
    scans_finished_total: Family<OutcomeLabels, Counter>,
    webhook_deliveries_total: Family<OutcomeLabels, Counter>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_requests_total = Counter::default();
        registry.register(
            "http_requests",
            "Total number of HTTP requests",
            http_requests_total.clone(),
        );

        let http_request_duration_seconds =
            Histogram::new([0.1, 0.5, 1.0, 2.5, 5.0, 10.0].into_iter());
        registry.register(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_request_duration_seconds.clone(),
        );

        let tool_invocations_total = Family::<ToolLabels, Counter>::default();
        registry.register(
            "tool_invocations",
            "Tool invocations by tool name",
            tool_invocations_total.clone(),
        );

        let tool_failures_total = Family::<ToolLabels, Counter>::default();
        registry.register(
            "tool_failures",
            "Tool invocations that did not succeed",
            tool_failures_total.clone(),
        );

        let tool_duration_seconds =
            Family::<ToolLabels, Histogram>::new_with_constructor(tool_duration_histogram as fn() -> Histogram);
        registry.register(
            "tool_duration_seconds",
            "Tool wall-clock duration in seconds",
            tool_duration_seconds.clone(),
        );

        let command_rejections_total = Counter::default();
        registry.register(
            "command_rejections",
            "Requests refused because a command was not allow-listed",
            command_rejections_total.clone(),
        );

        let scans_finished_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "scans_finished",
            "System scans that reached a terminal state",
            scans_finished_total.clone(),
        );

        let webhook_deliveries_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "webhook_deliveries",
            "Outbound webhook delivery attempts",
            webhook_deliveries_total.clone(),
        );

        Self {
            registry: Arc::new(Mutex::new(registry)),
            http_requests_total,
            http_request_duration_seconds,
            tool_invocations_total,
            tool_failures_total,
            tool_duration_seconds,
            command_rejections_total,
            scans_finished_total,
            webhook_deliveries_total,
        }
    }

    pub fn inc_requests(&self) {
        self.http_requests_total.inc();
    }

    pub fn observe_duration(&self, duration: f64) {
        self.http_request_duration_seconds.observe(duration);
    }

    /// Count one tool run and its duration
    pub fn record_tool(&self, tool: &str, success: bool, duration_secs: f64) {
        let labels = ToolLabels {
            tool: tool.to_string(),
        };
        self.tool_invocations_total.get_or_create(&labels).inc();
        if !success {
            self.tool_failures_total.get_or_create(&labels).inc();
        }
        self.tool_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    pub fn inc_command_rejections(&self) {
        self.command_rejections_total.inc();
    }

    /// `status` is the scan's final state, e.g. "completed"
    pub fn record_scan(&self, status: &str) {
        self.scans_finished_total
            .get_or_create(&OutcomeLabels {
                outcome: status.to_string(),
            })
            .inc();
    }

    pub fn record_webhook_delivery(&self, success: bool) {
        let outcome = if success { "delivered" } else { "failed" };
        self.webhook_deliveries_total
            .get_or_create(&OutcomeLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    pub fn encode(&self) -> Result<String> {
        let registry = self
            .registry
            .lock()
            .map_err(|e| Error::Config(format!("Failed to lock metrics registry: {}", e)))?;

        let mut buffer = String::new();
        encode(&mut buffer, &registry)
            .map_err(|e| Error::Config(format!("Failed to encode metrics: {}", e)))?;

        Ok(buffer)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Application state for observability endpoints
#[derive(Debug, Clone)]
pub struct ObsState {
    pub readiness: ReadinessGate,
    pub metrics: Arc<Metrics>,
}

impl ObsState {
    pub fn new() -> Self {
        Self {
            readiness: ReadinessGate::new(),
            metrics: Arc::new(Metrics::new()),
        }
    }
}

impl Default for ObsState {
    fn default() -> Self {
        Self::new()
    }
}

async fn health() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "veribits",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

async fn readiness(state: web::Data<ObsState>) -> ActixResult<HttpResponse> {
    let is_ready = state.readiness.is_ready();
    tracing::debug!("Readiness check requested, ready: {}", is_ready);

    if is_ready {
        Ok(HttpResponse::Ok().json(json!({
            "status": "ready"
        })))
    } else {
        Ok(HttpResponse::ServiceUnavailable().json(json!({
            "status": "not ready"
        })))
    }
}

async fn metrics(state: web::Data<ObsState>) -> ActixResult<HttpResponse> {
    match state.metrics.encode() {
        Ok(metrics_text) => Ok(HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4; charset=utf-8")
            .body(metrics_text)),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to encode metrics"
            })))
        }
    }
}

/// Create observability service factory
pub fn create_service(
    state: ObsState,
) -> App<
    impl actix_web::dev::ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(web::Data::new(state))
        .wrap(Logger::default())
        .route("/healthz", web::get().to(health))
        .route("/readyz", web::get().to(readiness))
        .route("/metrics", web::get().to(metrics))
}

/// Start observability server
pub async fn start_server(bind_addr: &str, state: ObsState) -> Result<()> {
    tracing::info!("Starting observability server on {}", bind_addr);

    HttpServer::new(move || create_service(state.clone()))
        .bind(bind_addr)
        .map_err(|e| Error::Config(format!("Failed to bind observability server: {}", e)))?
        .run()
        .await
        .map_err(|e| Error::Config(format!("Observability server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test as actix_test;

    #[actix_web::test]
    async fn test_health_endpoint() {
        let app = actix_test::init_service(create_service(ObsState::new())).await;

        let req = actix_test::TestRequest::get().uri("/healthz").to_request();
        let resp = actix_test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
    }

    #[actix_web::test]
    async fn test_readiness_reflects_gate() {
        let state = ObsState::new();
        state.readiness.set_ready(false);
        let app = actix_test::init_service(create_service(state.clone())).await;

        let req = actix_test::TestRequest::get().uri("/readyz").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), 503);
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["status"], "not ready");

        state.readiness.set_ready(true);
        let req = actix_test::TestRequest::get().uri("/readyz").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_metrics_endpoint_exposes_tool_counters() {
        let state = ObsState::new();
        state.metrics.inc_requests();
        state.metrics.record_tool("dns_lookup", true, 0.2);
        state.metrics.record_tool("ping", false, 1.5);
        state.metrics.inc_command_rejections();

        let app = actix_test::init_service(create_service(state)).await;
        let req = actix_test::TestRequest::get().uri("/metrics").to_request();
        let resp = actix_test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/plain; version=0.0.4; charset=utf-8"
        );

        let body = actix_test::read_body(resp).await;
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains("http_requests_total"));
        assert!(text.contains(r#"tool_invocations_total{tool="dns_lookup"} 1"#));
        assert!(text.contains(r#"tool_failures_total{tool="ping"} 1"#));
        assert!(!text.contains(r#"tool_failures_total{tool="dns_lookup"}"#));
        assert!(text.contains("tool_duration_seconds"));
        assert!(text.contains("command_rejections_total 1"));
    }

    #[test]
    fn test_scan_and_delivery_outcomes() {
        let metrics = Metrics::new();
        metrics.record_scan("completed");
        metrics.record_scan("completed");
        metrics.record_scan("failed");
        metrics.record_webhook_delivery(true);
        metrics.record_webhook_delivery(false);

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"scans_finished_total{outcome="completed"} 2"#));
        assert!(text.contains(r#"scans_finished_total{outcome="failed"} 1"#));
        assert!(text.contains(r#"webhook_deliveries_total{outcome="delivered"} 1"#));
        assert!(text.contains(r#"webhook_deliveries_total{outcome="failed"} 1"#));
    }

    #[test]
    fn test_readiness_gate_toggle() {
        let gate = ReadinessGate::new();
        assert!(gate.is_ready());
        gate.set_ready(false);
        assert!(!gate.is_ready());
    }
}
