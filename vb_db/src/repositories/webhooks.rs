//! ABOUTME: Webhook subscription repository
//! ABOUTME: Generates signing secrets and tracks delivery outcomes

use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use vb_core::{time::now_iso8601, Error, Id, Result};

const SECRET_PREFIX: &str = "whsec_";
const SECRET_BYTES: usize = 32;

/// Webhook entity; the secret is never serialized
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Webhook {
    pub id: String,
    pub url: String,
    #[serde(skip_serializing)]
    pub secret: String,
    pub events: String, // JSON array of event names
    pub is_active: bool,
    pub failure_count: i64,
    pub last_status: Option<i64>,
    pub last_delivery_at: Option<String>,
    pub created_at: String,
}

impl Webhook {
    /// Whether this webhook subscribed to `event` (an empty list means all)
    pub fn wants(&self, event: &str) -> bool {
        let events: Vec<String> = serde_json::from_str(&self.events).unwrap_or_default();
        events.is_empty() || events.iter().any(|e| e == event || e == "*")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWebhook {
    pub url: String,
    pub events: Vec<String>,
}

fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("{}{}", SECRET_PREFIX, hex::encode(bytes))
}

pub struct WebhookRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> WebhookRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a new webhook with a freshly generated secret
    pub async fn create(&self, request: CreateWebhook) -> Result<Webhook> {
        let id = Id::new().to_string();
        let now = now_iso8601();
        let events = serde_json::to_string(&request.events)
            .map_err(|e| Error::Database(format!("Failed to encode events: {}", e)))?;

        sqlx::query_as::<_, Webhook>(
            r#"
            INSERT INTO webhooks (id, url, secret, events, is_active, failure_count, created_at)
            VALUES (?1, ?2, ?3, ?4, 1, 0, ?5)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&request.url)
        .bind(generate_secret())
        .bind(&events)
        .bind(&now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create webhook: {}", e)))
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Webhook>> {
        sqlx::query_as::<_, Webhook>("SELECT * FROM webhooks WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to find webhook: {}", e)))
    }

    pub async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Webhook>> {
        sqlx::query_as::<_, Webhook>(
            "SELECT * FROM webhooks ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list webhooks: {}", e)))
    }

    pub async fn list_active(&self) -> Result<Vec<Webhook>> {
        sqlx::query_as::<_, Webhook>(
            "SELECT * FROM webhooks WHERE is_active = 1 ORDER BY created_at ASC",
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list active webhooks: {}", e)))
    }

    pub async fn deactivate(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE webhooks SET is_active = 0 WHERE id = ?1 AND is_active = 1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to deactivate webhook: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a delivery attempt; failures accumulate, a success resets the count
    pub async fn record_delivery(
        &self,
        id: &str,
        status: Option<i64>,
        success: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhooks
            SET last_status = ?1,
                last_delivery_at = ?2,
                failure_count = CASE WHEN ?3 THEN 0 ELSE failure_count + 1 END
            WHERE id = ?4
            "#,
        )
        .bind(status)
        .bind(now_iso8601())
        .bind(success)
        .bind(id)
        .execute(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to record webhook delivery: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::create_test_db;

    #[tokio::test]
    async fn test_webhook_lifecycle() {
        let (db, _dir) = create_test_db().await;
        let repo = WebhookRepository::new(db.pool());

        let hook = repo
            .create(CreateWebhook {
                url: "https://hooks.example.com/veribits".to_string(),
                events: vec!["scan.completed".to_string()],
            })
            .await
            .unwrap();

        assert!(hook.secret.starts_with(SECRET_PREFIX));
        assert_eq!(hook.secret.len(), SECRET_PREFIX.len() + SECRET_BYTES * 2);
        assert!(hook.is_active);
        assert!(hook.wants("scan.completed"));
        assert!(!hook.wants("scan.failed"));

        repo.record_delivery(&hook.id, Some(500), false).await.unwrap();
        repo.record_delivery(&hook.id, None, false).await.unwrap();
        let after_failures = repo.find_by_id(&hook.id).await.unwrap().unwrap();
        assert_eq!(after_failures.failure_count, 2);
        assert_eq!(after_failures.last_status, None);

        repo.record_delivery(&hook.id, Some(200), true).await.unwrap();
        let after_success = repo.find_by_id(&hook.id).await.unwrap().unwrap();
        assert_eq!(after_success.failure_count, 0);
        assert_eq!(after_success.last_status, Some(200));

        assert_eq!(repo.list_active().await.unwrap().len(), 1);
        assert!(repo.deactivate(&hook.id).await.unwrap());
        assert!(!repo.deactivate(&hook.id).await.unwrap());
        assert!(repo.list_active().await.unwrap().is_empty());
        assert_eq!(repo.list(0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_secrets_are_unique_and_hidden() {
        let (db, _dir) = create_test_db().await;
        let repo = WebhookRepository::new(db.pool());
        let request = CreateWebhook {
            url: "https://a.example.com".to_string(),
            events: vec![],
        };

        let a = repo.create(request.clone()).await.unwrap();
        let b = repo.create(request).await.unwrap();
        assert_ne!(a.secret, b.secret);
        assert!(a.wants("anything"));

        let json = serde_json::to_value(&a).unwrap();
        assert!(json.get("secret").is_none());
    }
}
