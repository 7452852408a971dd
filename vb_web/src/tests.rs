//! ABOUTME: Integration tests for the web API layer
//! ABOUTME: Drives the full app with a scripted executor and a temporary database

use super::*;
use actix_web::{http::StatusCode, test as actix_test};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Mutex;
use test_support::{temp_db_path, TempDir};
use vb_config::ToolsConfig;
use vb_db::{AuditLogFilter, AuditLogRepository, DbOptions};
use vb_exec::{render_command_line, ExecOutput, ExecRequest, Executor};

type Responder = Box<dyn Fn(&ExecRequest) -> Result<ExecOutput> + Send + Sync>;

/// Stands in for the process executor so no real binaries run
struct ScriptedExecutor {
    responder: Responder,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, request: ExecRequest) -> Result<ExecOutput> {
        let line = render_command_line(&request.command, &request.args);
        self.calls.lock().unwrap().push(line.clone());
        let mut output = (self.responder)(&request)?;
        output.command_line = line;
        Ok(output)
    }
}

fn exited(stdout: &str, stderr: &str, code: i32) -> ExecOutput {
    ExecOutput {
        command_line: String::new(),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        exit_code: Some(code),
        output: if stdout.is_empty() { stderr } else { stdout }.to_string(),
        error: (code != 0).then(|| stderr.to_string()),
        execution_time_ms: 3,
        timed_out: false,
        stdout_truncated: false,
        stderr_truncated: false,
    }
}

/// dig answers, everything else fails
fn default_responder(request: &ExecRequest) -> Result<ExecOutput> {
    match request.command.as_str() {
        "dig" => Ok(exited("93.184.216.34\n", "", 0)),
        _ => Ok(exited("", "connection refused", 1)),
    }
}

struct TestApp {
    state: AppState,
    _dir: TempDir,
}

async fn create_test_app_state_with(
    config: Config,
    responder: impl Fn(&ExecRequest) -> Result<ExecOutput> + Send + Sync + 'static,
) -> TestApp {
    let dir = TempDir::new().expect("temp dir");
    let path = temp_db_path(dir.path());
    let db = Db::new(path.to_str().expect("utf-8 path"), DbOptions::default())
        .await
        .expect("Failed to create test database");

    let executor = Arc::new(ScriptedExecutor {
        responder: Box::new(responder),
        calls: Mutex::new(Vec::new()),
    });
    let tools = ToolKit::new(executor, ToolsConfig::default());
    let state = AppState::new(&config, db, tools, Arc::new(Metrics::new()))
        .expect("Failed to build app state");

    TestApp { state, _dir: dir }
}

async fn create_test_app_state() -> TestApp {
    create_test_app_state_with(Config::default(), default_responder).await
}

#[actix_web::test]
async fn test_health_reports_database() {
    let t = create_test_app_state().await;
    let app = actix_test::init_service(create_app(t.state.clone())).await;

    let req = actix_test::TestRequest::get().uri("/api/v1/health").to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = actix_test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["database"], "ok");
    assert!(body["timestamp"].is_string());
}

#[actix_web::test]
async fn test_dns_lookup_success_is_audited() {
    let t = create_test_app_state().await;
    let app = actix_test::init_service(create_app(t.state.clone())).await;

    let req = actix_test::TestRequest::post()
        .uri("/api/v1/tools/dns-lookup")
        .set_json(json!({ "domain": "Example.com" }))
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = actix_test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["success"], true);
    assert_eq!(body["data"]["report"]["records"][0], "93.184.216.34");

    let repo = AuditLogRepository::new(t.state.db.pool());
    let logs = repo.list(&AuditLogFilter::default(), 0, 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].tool, "dns_lookup");
    assert_eq!(logs[0].target.as_deref(), Some("example.com"));
    assert!(logs[0].success);
    assert_eq!(
        logs[0].command_line.as_deref(),
        Some("dig +short +time=5 +tries=2 example.com A")
    );
}

#[actix_web::test]
async fn test_tool_failure_returns_bad_gateway_with_outcome() {
    let t = create_test_app_state_with(Config::default(), |_| {
        Ok(exited("", ";; connection timed out", 9))
    })
    .await;
    let app = actix_test::init_service(create_app(t.state.clone())).await;

    let req = actix_test::TestRequest::post()
        .uri("/api/v1/tools/dns-lookup")
        .set_json(json!({ "domain": "example.com", "record_type": "MX" }))
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    let body: Value = actix_test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "tool_failed");
    assert_eq!(body["error"]["details"]["exit_code"], 9);

    let repo = AuditLogRepository::new(t.state.db.pool());
    let failed = AuditLogFilter {
        success: Some(false),
        ..Default::default()
    };
    assert_eq!(repo.count(&failed).await.unwrap(), 1);
}

#[actix_web::test]
async fn test_invalid_input_is_rejected_before_execution() {
    let t = create_test_app_state().await;
    let app = actix_test::init_service(create_app(t.state.clone())).await;

    let req = actix_test::TestRequest::post()
        .uri("/api/v1/tools/dns-lookup")
        .set_json(json!({ "domain": "example.com; rm -rf /" }))
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = actix_test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "validation_failed");

    let req = actix_test::TestRequest::post()
        .uri("/api/v1/tools/dns-lookup")
        .set_json(json!({ "domain": "example.com", "record_type": "ANY" }))
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let req = actix_test::TestRequest::post()
        .uri("/api/v1/tools/port-scan")
        .set_json(json!({ "host": "example.com", "ports": [0] }))
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[actix_web::test]
async fn test_malformed_json_is_bad_request() {
    let t = create_test_app_state().await;
    let app = actix_test::init_service(create_app(t.state.clone())).await;

    let req = actix_test::TestRequest::post()
        .uri("/api/v1/tools/whois")
        .insert_header(("content-type", "application/json"))
        .set_payload("{\"domain\": ")
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = actix_test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[actix_web::test]
async fn test_oversized_body_is_rejected() {
    let mut config = Config::default();
    config.server.body_limits.json_limit = 64;
    let t = create_test_app_state_with(config, default_responder).await;
    let app = actix_test::init_service(create_app(t.state.clone())).await;

    let req = actix_test::TestRequest::post()
        .uri("/api/v1/tools/hash")
        .set_json(json!({ "input": "a".repeat(200) }))
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[actix_web::test]
async fn test_hash_input_is_not_stored() {
    let t = create_test_app_state().await;
    let app = actix_test::init_service(create_app(t.state.clone())).await;

    let digest = "5f4dcc3b5aa765d61d8327deb882cf99";
    let req = actix_test::TestRequest::post()
        .uri("/api/v1/tools/hash")
        .set_json(json!({ "input": digest }))
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let repo = AuditLogRepository::new(t.state.db.pool());
    let logs = repo.list(&AuditLogFilter::default(), 0, 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].tool, "hash_analyze");
    let stored = serde_json::to_string(&logs[0]).unwrap();
    assert!(!stored.contains(digest));
}

#[actix_web::test]
async fn test_firewall_config_crud() {
    let t = create_test_app_state().await;
    let app = actix_test::init_service(create_app(t.state.clone())).await;

    let payload = json!({
        "name": "edge",
        "device_type": "iptables",
        "rules": [{ "action": "allow", "port": 443 }]
    });
    let req = actix_test::TestRequest::post()
        .uri("/api/v1/firewall/configs")
        .set_json(&payload)
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = actix_test::read_body_json(resp).await;
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["rules"][0]["port"], 443);

    // Duplicate names are a client error
    let req = actix_test::TestRequest::post()
        .uri("/api/v1/firewall/configs")
        .set_json(&payload)
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let req = actix_test::TestRequest::put()
        .uri(&format!("/api/v1/firewall/configs/{}", id))
        .set_json(json!({ "description": "public edge", "is_active": false }))
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = actix_test::read_body_json(resp).await;
    assert_eq!(body["data"]["description"], "public edge");
    assert_eq!(body["data"]["is_active"], false);

    let req = actix_test::TestRequest::get()
        .uri("/api/v1/firewall/configs")
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    let body: Value = actix_test::read_body_json(resp).await;
    assert_eq!(body["data"]["total"], 1);

    let req = actix_test::TestRequest::delete()
        .uri(&format!("/api/v1/firewall/configs/{}", id))
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = actix_test::TestRequest::get()
        .uri(&format!("/api/v1/firewall/configs/{}", id))
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_scan_runs_in_background() {
    let t = create_test_app_state().await;
    let app = actix_test::init_service(create_app(t.state.clone())).await;

    let req = actix_test::TestRequest::post()
        .uri("/api/v1/scans")
        .set_json(json!({ "target": "Example.com", "checks": ["dns", "rbl"] }))
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body: Value = actix_test::read_body_json(resp).await;
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["target"], "example.com");

    let mut scan = Value::Null;
    for _ in 0..50 {
        let req = actix_test::TestRequest::get()
            .uri(&format!("/api/v1/scans/{}", id))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        let body: Value = actix_test::read_body_json(resp).await;
        scan = body["data"].clone();
        if scan["status"] == "completed" || scan["status"] == "failed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(scan["status"], "completed");
    assert_eq!(scan["results"]["dns"]["status"], "ok");
    assert_eq!(scan["results"]["rbl"]["status"], "skipped");

    let repo = AuditLogRepository::new(t.state.db.pool());
    let logs = repo.list(&AuditLogFilter::default(), 0, 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].details.as_deref().unwrap().contains(&id));
}

#[actix_web::test]
async fn test_scan_rejects_unknown_checks() {
    let t = create_test_app_state().await;
    let app = actix_test::init_service(create_app(t.state.clone())).await;

    let req = actix_test::TestRequest::post()
        .uri("/api/v1/scans")
        .set_json(json!({ "target": "example.com", "checks": ["exploit"] }))
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let req = actix_test::TestRequest::get()
        .uri("/api/v1/scans?status=sleeping")
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[actix_web::test]
async fn test_webhook_secret_is_shown_once() {
    let t = create_test_app_state().await;
    let app = actix_test::init_service(create_app(t.state.clone())).await;

    let req = actix_test::TestRequest::post()
        .uri("/api/v1/webhooks")
        .set_json(json!({ "url": "https://hooks.example.com/veribits", "events": ["scan.completed"] }))
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = actix_test::read_body_json(resp).await;
    assert!(body["data"]["secret"].is_string());

    let req = actix_test::TestRequest::get().uri("/api/v1/webhooks").to_request();
    let resp = actix_test::call_service(&app, req).await;
    let body: Value = actix_test::read_body_json(resp).await;
    assert_eq!(body["data"]["total"], 1);
    assert!(body["data"]["items"][0].get("secret").is_none());

    let req = actix_test::TestRequest::post()
        .uri("/api/v1/webhooks")
        .set_json(json!({ "url": "ftp://hooks.example.com" }))
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[actix_web::test]
async fn test_inbound_webhook_signature() {
    let t = create_test_app_state().await;
    let app = actix_test::init_service(create_app(t.state.clone())).await;

    let req = actix_test::TestRequest::post()
        .uri("/api/v1/webhooks")
        .set_json(json!({ "url": "https://hooks.example.com/in" }))
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    let body: Value = actix_test::read_body_json(resp).await;
    let id = body["data"]["id"].as_str().unwrap().to_string();
    let secret = body["data"]["secret"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/webhooks/{}/receive", id);

    let payload = br#"{"event":"scan.completed","data":{}}"#;
    let now = vb_core::unix_timestamp();

    let req = actix_test::TestRequest::post()
        .uri(&uri)
        .insert_header((webhooks::SIGNATURE_HEADER, webhooks::sign(&secret, now, payload)))
        .set_payload(payload.to_vec())
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = actix_test::read_body_json(resp).await;
    assert_eq!(body["data"]["event"], "scan.completed");

    // Signed bytes differ from the delivered ones
    let req = actix_test::TestRequest::post()
        .uri(&uri)
        .insert_header((webhooks::SIGNATURE_HEADER, webhooks::sign(&secret, now, payload)))
        .set_payload(br#"{"event":"scan.failed","data":{}}"#.to_vec())
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let stale = now - 3600;
    let req = actix_test::TestRequest::post()
        .uri(&uri)
        .insert_header((webhooks::SIGNATURE_HEADER, webhooks::sign(&secret, stale, payload)))
        .set_payload(payload.to_vec())
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = actix_test::TestRequest::post()
        .uri(&uri)
        .set_payload(payload.to_vec())
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = actix_test::TestRequest::delete()
        .uri(&format!("/api/v1/webhooks/{}", id))
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = actix_test::TestRequest::post()
        .uri(&uri)
        .insert_header((webhooks::SIGNATURE_HEADER, webhooks::sign(&secret, now, payload)))
        .set_payload(payload.to_vec())
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_audit_logs_filtering() {
    let t = create_test_app_state().await;
    let app = actix_test::init_service(create_app(t.state.clone())).await;

    for uri in ["/api/v1/tools/dns-lookup", "/api/v1/tools/whois"] {
        let req = actix_test::TestRequest::post()
            .uri(uri)
            .set_json(json!({ "domain": "example.com" }))
            .to_request();
        actix_test::call_service(&app, req).await;
    }

    let req = actix_test::TestRequest::get()
        .uri("/api/v1/audit-logs?tool=whois")
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = actix_test::read_body_json(resp).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["success"], false);

    let req = actix_test::TestRequest::get()
        .uri("/api/v1/audit-logs?success=true&since=2000-01-01T00:00:00Z")
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    let body: Value = actix_test::read_body_json(resp).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["tool"], "dns_lookup");

    let req = actix_test::TestRequest::get()
        .uri("/api/v1/audit-logs?since=2999-01-01T00:00:00Z")
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    let body: Value = actix_test::read_body_json(resp).await;
    assert_eq!(body["data"]["total"], 0);

    let req = actix_test::TestRequest::get()
        .uri("/api/v1/audit-logs?since=last-week")
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[actix_web::test]
async fn test_unknown_route_uses_error_envelope() {
    let t = create_test_app_state().await;
    let app = actix_test::init_service(create_app(t.state.clone())).await;

    let req = actix_test::TestRequest::get().uri("/api/v1/nope").to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = actix_test::TestRequest::get().uri("/nowhere").to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = actix_test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "not_found");
}

#[actix_web::test]
async fn test_rate_limit_applies_to_api() {
    let mut config = Config::default();
    config.server.rate_limit.requests_per_minute = 2;
    let t = create_test_app_state_with(config, default_responder).await;
    let app = actix_test::init_service(create_app(t.state.clone())).await;

    for _ in 0..2 {
        let req = actix_test::TestRequest::get().uri("/api/v1/health").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let req = actix_test::TestRequest::get().uri("/api/v1/health").to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key("retry-after"));
}

#[actix_web::test]
async fn test_openapi_document_is_served() {
    let t = create_test_app_state().await;
    let app = actix_test::init_service(create_app(t.state.clone())).await;

    let req = actix_test::TestRequest::get()
        .uri("/api-docs/openapi.json")
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = actix_test::read_body_json(resp).await;
    assert!(body["paths"]["/api/v1/tools/dns-lookup"].is_object());
    assert!(body["paths"]["/api/v1/webhooks/{id}/receive"].is_object());
}
