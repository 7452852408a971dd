use std::{process, sync::Arc};
use vb_config::Config;
use vb_core::telemetry;
use vb_db::{Db, DbOptions};
use vb_exec::{CommandExecutor, ExecutorSettings};
use vb_obs::ObsState;
use vb_tools::ToolKit;
use vb_web::AppState;

#[tokio::main]
async fn main() {
    // Load configuration - exit with non-zero if invalid
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    telemetry::init_tracing(&config.environment, "veribits");
    tracing::debug!(?config, "Configuration loaded successfully");
    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        obs_port = %config.server.obs_port,
        db_path = %config.database.path,
        "veribits starting"
    );

    // Observability comes up first so /readyz reports startup
    let obs_state = ObsState::new();
    obs_state.readiness.set_ready(false);

    // Initialize database with migrations
    let options = DbOptions {
        pool_size: config.database.pool_size,
        recycle_after_queries: config.database.recycle_after_queries,
    };
    let db = match Db::new(&config.database.path, options).await {
        Ok(db) => {
            tracing::info!("Database initialized successfully");
            db
        }
        Err(e) => {
            tracing::error!("Failed to initialize database: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = db.health_check().await {
        tracing::error!("Database health check failed: {}", e);
        process::exit(1);
    }

    // Every external binary runs through this executor
    let executor = CommandExecutor::new(ExecutorSettings::from(&config.executor));
    let tools = ToolKit::new(Arc::new(executor), config.tools.clone());

    let web_app_state = match AppState::new(&config, db, tools, obs_state.metrics.clone()) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to build application state: {}", e);
            process::exit(1);
        }
    };
    obs_state.readiness.set_ready(true);

    let obs_bind_addr = format!("0.0.0.0:{}", config.server.obs_port);
    let web_bind_addr = format!("{}:{}", config.server.host, config.server.port);

    // Run both servers; either exiting stops the process
    let result = tokio::select! {
        obs_result = vb_obs::start_server(&obs_bind_addr, obs_state) => {
            tracing::error!("Observability server exited");
            obs_result
        }
        web_result = vb_web::start_server(&web_bind_addr, web_app_state) => {
            tracing::info!("Web server exited");
            web_result
        }
    };

    if let Err(e) = result {
        tracing::error!("Server error: {}", e);
        process::exit(1);
    }
}
