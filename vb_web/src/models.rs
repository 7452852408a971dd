//! ABOUTME: Request and response models for the REST API
//! ABOUTME: Response envelopes plus validated request bodies with OpenAPI schemas

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};
use vb_core::time::now_iso8601;

/// Checks a system scan can run
pub const SCAN_CHECKS: &[&str] = &["dns", "ssl", "rbl", "ports"];

/// Firewall dialects accepted for stored configurations
pub const DEVICE_TYPES: &[&str] = &["iptables", "nftables", "ufw", "pf", "firewalld", "windows"];

const DEFAULT_PAGE_LIMIT: i64 = 50;
const MAX_PAGE_LIMIT: i64 = 200;

/// Successful response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: now_iso8601(),
        }
    }
}

/// Error details inside the failure envelope
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

/// Failure response envelope
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
                details: None,
            },
            timestamp: now_iso8601(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }
}

/// Envelope shape used in the OpenAPI document for tool results
#[derive(Debug, Serialize, ToSchema)]
pub struct ToolEnvelope {
    pub success: bool,
    /// Tool outcome: report, rendered command lines, exit code and duration
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct DnsLookupRequest {
    #[validate(length(min = 1, max = 253))]
    pub domain: String,
    /// A, AAAA, MX, NS, TXT, CNAME, SOA or CAA; defaults to A
    pub record_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct PingRequest {
    #[validate(length(min = 1, max = 253))]
    pub host: String,
    #[validate(range(min = 1, max = 20))]
    pub count: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct TracerouteRequest {
    #[validate(length(min = 1, max = 253))]
    pub host: String,
    #[validate(range(min = 1, max = 64))]
    pub max_hops: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct WhoisRequest {
    #[validate(length(min = 1, max = 253))]
    pub domain: String,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct SslCheckRequest {
    #[validate(length(min = 1, max = 253))]
    pub host: String,
    pub port: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct PortScanRequest {
    #[validate(length(min = 1, max = 253))]
    pub host: String,
    /// Ports to probe; a common set is used when empty
    #[serde(default)]
    pub ports: Vec<u32>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct RblCheckRequest {
    #[validate(length(min = 2, max = 45))]
    pub ip: String,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct HashRequest {
    #[validate(length(min = 1))]
    pub input: String,
}

fn validate_device_type(device_type: &str) -> Result<(), ValidationError> {
    if DEVICE_TYPES.contains(&device_type) {
        Ok(())
    } else {
        Err(ValidationError::new("unknown_device_type"))
    }
}

fn validate_rules(rules: &serde_json::Value) -> Result<(), ValidationError> {
    if rules.is_array() {
        Ok(())
    } else {
        Err(ValidationError::new("rules_must_be_array"))
    }
}

fn validate_checks(checks: &[String]) -> Result<(), ValidationError> {
    if checks.iter().all(|c| SCAN_CHECKS.contains(&c.as_str())) {
        Ok(())
    } else {
        Err(ValidationError::new("unknown_check"))
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateFirewallConfigRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(custom(function = "validate_device_type"))]
    pub device_type: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    /// Ordered rule objects
    #[serde(default = "empty_rules")]
    #[validate(custom(function = "validate_rules"))]
    #[schema(value_type = Vec<Object>)]
    pub rules: serde_json::Value,
}

fn empty_rules() -> serde_json::Value {
    serde_json::Value::Array(Vec::new())
}

#[derive(Debug, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateFirewallConfigRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(custom(function = "validate_device_type"))]
    pub device_type: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(custom(function = "validate_rules"))]
    #[schema(value_type = Option<Vec<Object>>)]
    pub rules: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

/// Firewall configuration as returned by the API, rules decoded
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FirewallConfigInfo {
    pub id: String,
    pub name: String,
    pub device_type: String,
    pub description: Option<String>,
    #[schema(value_type = Vec<Object>)]
    pub rules: serde_json::Value,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<vb_db::FirewallConfig> for FirewallConfigInfo {
    fn from(config: vb_db::FirewallConfig) -> Self {
        Self {
            rules: serde_json::from_str(&config.rules).unwrap_or_else(|_| empty_rules()),
            id: config.id,
            name: config.name,
            device_type: config.device_type,
            description: config.description,
            is_active: config.is_active,
            created_at: config.created_at,
            updated_at: config.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateScanRequest {
    #[validate(length(min = 1, max = 253))]
    pub target: String,
    /// Subset of dns, ssl, rbl, ports; all when omitted
    #[serde(default)]
    #[validate(custom(function = "validate_checks"))]
    pub checks: Vec<String>,
}

/// System scan as returned by the API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScanInfo {
    pub id: String,
    pub target: String,
    pub checks: Vec<String>,
    pub status: String,
    #[schema(value_type = Option<Object>)]
    pub results: Option<serde_json::Value>,
    pub veriscore: Option<i64>,
    pub error: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl From<vb_db::SystemScan> for ScanInfo {
    fn from(scan: vb_db::SystemScan) -> Self {
        Self {
            checks: serde_json::from_str(&scan.checks).unwrap_or_default(),
            results: scan
                .results
                .as_deref()
                .and_then(|r| serde_json::from_str(r).ok()),
            id: scan.id,
            target: scan.target,
            status: scan.status,
            veriscore: scan.veriscore,
            error: scan.error,
            created_at: scan.created_at,
            started_at: scan.started_at,
            completed_at: scan.completed_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateWebhookRequest {
    #[validate(url, length(max = 2048))]
    pub url: String,
    /// Event names to deliver; every event when empty
    #[serde(default)]
    #[validate(length(max = 20))]
    pub events: Vec<String>,
}

/// Webhook as returned by the API; the secret only appears on creation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookInfo {
    pub id: String,
    pub url: String,
    pub events: Vec<String>,
    pub is_active: bool,
    pub failure_count: i64,
    pub last_status: Option<i64>,
    pub last_delivery_at: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl From<vb_db::Webhook> for WebhookInfo {
    fn from(hook: vb_db::Webhook) -> Self {
        Self {
            events: serde_json::from_str(&hook.events).unwrap_or_default(),
            id: hook.id,
            url: hook.url,
            is_active: hook.is_active,
            failure_count: hook.failure_count,
            last_status: hook.last_status,
            last_delivery_at: hook.last_delivery_at,
            created_at: hook.created_at,
            secret: None,
        }
    }
}

/// Inbound webhook acknowledgement
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookReceipt {
    pub webhook_id: String,
    pub event: Option<String>,
    pub received_at: String,
}

/// Offset pagination shared by list endpoints
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct Pagination {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl Pagination {
    /// Offset and limit clamped to sane bounds
    pub fn bounds(&self) -> (i64, i64) {
        let offset = self.offset.unwrap_or(0).max(0);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);
        (offset, limit)
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScanListQuery {
    /// pending, running, completed or failed
    pub status: Option<String>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditLogQuery {
    pub tool: Option<String>,
    pub success: Option<bool>,
    /// RFC3339 lower bound on creation time
    pub since: Option<String>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

/// Page of results with the total matching count
#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthInfo {
    pub status: String,
    pub version: String,
    pub database: String,
}
