//! ABOUTME: Database layer with SQLite, migrations, and repositories
//! ABOUTME: Stores audit logs, firewall configs, system scans and webhooks

use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Sqlite, SqlitePool, Transaction,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::{debug, info, instrument};
use vb_core::{Error, Result};

pub mod query;
pub mod repositories;

pub use query::{is_safe_sql_identifier, AllowedTable, BuiltQuery, SqlValue, TableQuery, ALLOWED_TABLES};
pub use repositories::{
    audit_logs::{AuditLog, AuditLogFilter, AuditLogRepository, CreateAuditLog},
    firewall_configs::{
        CreateFirewallConfig, FirewallConfig, FirewallConfigRepository, UpdateFirewallConfig,
    },
    system_scans::{CreateSystemScan, ScanStatus, SystemScan, SystemScanRepository},
    webhooks::{CreateWebhook, Webhook, WebhookRepository},
};

/// Pool tuning
#[derive(Debug, Clone)]
pub struct DbOptions {
    pub pool_size: u32,
    /// Every Nth release back to the pool closes that connection instead
    pub recycle_after_queries: u64,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            pool_size: 10,
            recycle_after_queries: 1000,
        }
    }
}

/// Database connection pool and operations
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
    recycled: Arc<AtomicU64>,
}

impl Db {
    /// Open (creating if needed) the database at `db_path` and run migrations
    #[instrument(skip(db_path, options))]
    pub async fn new(db_path: &str, options: DbOptions) -> Result<Self> {
        info!("Initializing database at: {}", db_path);

        let database_url = format!("sqlite://{}", db_path);
        if !Sqlite::database_exists(&database_url)
            .await
            .unwrap_or(false)
        {
            info!("Creating database: {}", database_url);
            Sqlite::create_database(&database_url)
                .await
                .map_err(|e| Error::Database(format!("Failed to create database: {}", e)))?;
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(db_path)
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true)
            .foreign_keys(true)
            .pragma("synchronous", "NORMAL")
            .pragma("temp_store", "memory")
            .pragma("busy_timeout", "30000");

        let recycled = Arc::new(AtomicU64::new(0));
        let releases = Arc::new(AtomicU64::new(0));
        let every = options.recycle_after_queries.max(1);
        let recycled_counter = recycled.clone();

        let pool = SqlitePoolOptions::new()
            .max_connections(options.pool_size.max(1))
            .min_connections(1)
            .after_release(move |_conn, _meta| {
                let n = releases.fetch_add(1, Ordering::Relaxed) + 1;
                let keep = n % every != 0;
                if !keep {
                    recycled_counter.fetch_add(1, Ordering::Relaxed);
                    debug!(releases = n, "Recycling database connection");
                }
                Box::pin(async move { Ok(keep) })
            })
            .connect_with(connect_options)
            .await
            .map_err(|e| Error::Database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool, recycled };
        db.migrate().await?;

        info!("Database initialized successfully");
        Ok(db)
    }

    /// Run database migrations
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Migration failed: {}", e)))?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a Db instance from an existing pool (for testing/reuse)
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            recycled: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of connections closed by the recycling policy so far
    pub fn recycled_connections(&self) -> u64 {
        self.recycled.load(Ordering::Relaxed)
    }

    /// Begin a transaction; dropping it without `commit` rolls back
    pub async fn transaction(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))
    }

    /// Check database health
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<()> {
        debug!("Performing database health check");

        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Health check failed: {}", e)))?;

        Ok(())
    }

    /// Row counts for every allow-listed table
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let mut table_counts = std::collections::HashMap::new();

        for table in ALLOWED_TABLES {
            let count = TableQuery::new(table.name)?
                .count(&[])?
                .fetch_count(&self.pool)
                .await?;
            table_counts.insert(table.name.to_string(), count);
        }

        Ok(DatabaseStats { table_counts })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DatabaseStats {
    pub table_counts: std::collections::HashMap<String, i64>,
}
