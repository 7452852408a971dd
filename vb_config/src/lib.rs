//! ABOUTME: Configuration management with validation and environment loading
//! ABOUTME: Handles all application settings from environment variables and files

use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};
use vb_core::{Error, Result};

/// Hard upper bound for any single command execution, in seconds
pub const MAX_COMMAND_TIMEOUT_SECS: u64 = 60;

/// Main configuration struct
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct Config {
    /// "development" or "production"; selects log formatting
    #[validate(custom(function = "validate_environment"))]
    pub environment: String,
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub executor: ExecutorConfig,
    #[validate(nested)]
    pub tools: ToolsConfig,
    #[validate(nested)]
    pub webhooks: WebhooksConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            executor: ExecutorConfig::default(),
            tools: ToolsConfig::default(),
            webhooks: WebhooksConfig::default(),
        }
    }
}

fn validate_environment(env: &str) -> std::result::Result<(), ValidationError> {
    match env {
        "development" | "production" | "test" => Ok(()),
        _ => Err(ValidationError::new("unknown_environment")),
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    pub port: u16,
    pub obs_port: u16,
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,
    #[validate(nested)]
    pub body_limits: BodyLimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            obs_port: 9000,
            rate_limit: RateLimitConfig::default(),
            body_limits: BodyLimitsConfig::default(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum requests per window per client IP
    #[validate(range(min = 1, max = 10000))]
    pub requests_per_minute: u32,
    #[validate(range(min = 1, max = 3600))]
    pub window_seconds: u64,
    /// Peers allowed to set X-Forwarded-For / X-Real-IP
    pub trusted_proxies: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            window_seconds: 60,
            trusted_proxies: vec!["127.0.0.1".to_string(), "::1".to_string()],
        }
    }
}

/// Body size limits configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct BodyLimitsConfig {
    #[validate(range(min = 1024, max = 104857600))] // 1KB to 100MB
    pub json_limit: usize,
}

impl Default for BodyLimitsConfig {
    fn default() -> Self {
        Self {
            json_limit: 256 * 1024,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct DatabaseConfig {
    #[validate(length(min = 1))]
    pub path: String,
    #[validate(range(min = 1, max = 100))]
    pub pool_size: u32,
    /// A pooled connection is closed and replaced after this many uses
    #[validate(range(min = 1))]
    pub recycle_after_queries: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "veribits.db".to_string(),
            pool_size: 10,
            recycle_after_queries: 1000,
        }
    }
}

/// Command executor configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ExecutorConfig {
    #[validate(range(min = 1, max = 60))]
    pub default_timeout_secs: u64,
    /// Per-stream capture ceiling for stdout and stderr
    #[validate(range(min = 1024, max = 16777216))]
    pub output_limit_bytes: usize,
    /// Time between SIGTERM and SIGKILL when a deadline passes
    #[validate(range(min = 10, max = 10000))]
    pub kill_grace_ms: u64,
    /// Directory to resolve allow-listed binaries from instead of PATH
    pub bin_dir: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            output_limit_bytes: 1024 * 1024,
            kill_grace_ms: 500,
            bin_dir: None,
        }
    }
}

/// Network tool configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ToolsConfig {
    /// DNS blackhole list zones queried by the RBL check
    #[validate(length(min = 1, max = 50))]
    pub dnsbl_zones: Vec<String>,
    /// Largest number of ports accepted by one port scan
    #[validate(range(min = 1, max = 1024))]
    pub max_ports: usize,
    #[validate(range(min = 1, max = 20))]
    pub ping_count: u32,
    #[validate(range(min = 1, max = 64))]
    pub max_hops: u32,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            dnsbl_zones: vec![
                "zen.spamhaus.org".to_string(),
                "bl.spamcop.net".to_string(),
                "b.barracudacentral.org".to_string(),
                "dnsbl.sorbs.net".to_string(),
            ],
            max_ports: 100,
            ping_count: 4,
            max_hops: 30,
        }
    }
}

/// Webhook delivery and verification configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct WebhooksConfig {
    #[validate(range(min = 1, max = 60))]
    pub delivery_timeout_secs: u64,
    /// Maximum clock skew accepted on inbound signatures
    #[validate(range(min = 30, max = 3600))]
    pub signature_tolerance_secs: u64,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_secs: 10,
            signature_tolerance_secs: 300,
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional .env file and
    /// VERIBITS_* environment variables (nested keys use `__`)
    pub fn load() -> Result<Self> {
        let defaults = Config::default();

        let mut builder = ConfigBuilder::builder()
            .set_default("environment", defaults.environment.clone())?
            .set_default("server.host", defaults.server.host.clone())?
            .set_default("server.port", i64::from(defaults.server.port))?
            .set_default("server.obs_port", i64::from(defaults.server.obs_port))?
            .set_default("database.path", defaults.database.path.clone())?
            .set_default("database.pool_size", i64::from(defaults.database.pool_size))?
            .set_default(
                "executor.default_timeout_secs",
                defaults.executor.default_timeout_secs,
            )?
            .set_default(
                "executor.output_limit_bytes",
                defaults.executor.output_limit_bytes as u64,
            )?
            .set_default("executor.kill_grace_ms", defaults.executor.kill_grace_ms)?
            .set_default("tools.dnsbl_zones", defaults.tools.dnsbl_zones.clone())?;

        if std::path::Path::new(".env").exists() {
            builder = builder.add_source(File::with_name(".env").required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("VERIBITS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("tools.dnsbl_zones")
                .with_list_parse_key("server.rate_limit.trusted_proxies"),
        );

        let config = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build config: {}", e)))?;

        let parsed: Config = config
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to deserialize config: {}", e)))?;

        parsed
            .validate()
            .map_err(|e| Error::Config(format!("Config validation failed: {}", e)))?;

        Ok(parsed)
    }
}
