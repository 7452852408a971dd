//! ABOUTME: Firewall configuration repository
//! ABOUTME: Stores named rule sets with partial updates through TableQuery

use crate::query::{SqlValue, TableQuery};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use vb_core::{time::now_iso8601, Error, Id, Result};

/// Firewall configuration entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FirewallConfig {
    pub id: String,
    pub name: String,
    /// iptables, nftables, ufw, pf ...
    pub device_type: String,
    pub description: Option<String>,
    pub rules: String, // JSON
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFirewallConfig {
    pub name: String,
    pub device_type: String,
    pub description: Option<String>,
    pub rules: String, // JSON
}

/// Fields left as `None` are not touched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateFirewallConfig {
    pub name: Option<String>,
    pub device_type: Option<String>,
    pub description: Option<String>,
    pub rules: Option<String>,
    pub is_active: Option<bool>,
}

pub struct FirewallConfigRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FirewallConfigRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, request: CreateFirewallConfig) -> Result<FirewallConfig> {
        let id = Id::new().to_string();
        let now = now_iso8601();

        sqlx::query_as::<_, FirewallConfig>(
            r#"
            INSERT INTO firewall_configs (id, name, device_type, description, rules, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&request.name)
        .bind(&request.device_type)
        .bind(&request.description)
        .bind(&request.rules)
        .bind(&now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create firewall config: {}", e)))
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<FirewallConfig>> {
        sqlx::query_as::<_, FirewallConfig>("SELECT * FROM firewall_configs WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to find firewall config: {}", e)))
    }

    pub async fn list(&self, offset: i64, limit: i64) -> Result<Vec<FirewallConfig>> {
        sqlx::query_as::<_, FirewallConfig>(
            "SELECT * FROM firewall_configs ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list firewall configs: {}", e)))
    }

    /// Apply the provided fields; returns `None` when the id does not exist
    pub async fn update(
        &self,
        id: &str,
        request: UpdateFirewallConfig,
    ) -> Result<Option<FirewallConfig>> {
        let mut set: Vec<(&str, SqlValue)> = Vec::new();
        if let Some(name) = request.name {
            set.push(("name", name.into()));
        }
        if let Some(device_type) = request.device_type {
            set.push(("device_type", device_type.into()));
        }
        if let Some(description) = request.description {
            set.push(("description", description.into()));
        }
        if let Some(rules) = request.rules {
            set.push(("rules", rules.into()));
        }
        if let Some(is_active) = request.is_active {
            set.push(("is_active", is_active.into()));
        }
        set.push(("updated_at", now_iso8601().into()));

        let affected = TableQuery::new("firewall_configs")?
            .update(&set, &[("id", id.into())])?
            .execute(self.pool)
            .await?;
        if affected == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM firewall_configs WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete firewall config: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::create_test_db;

    #[tokio::test]
    async fn test_firewall_config_crud_operations() {
        let (db, _dir) = create_test_db().await;
        let repo = FirewallConfigRepository::new(db.pool());

        let config = repo
            .create(CreateFirewallConfig {
                name: "edge".to_string(),
                device_type: "iptables".to_string(),
                description: Some("Edge router".to_string()),
                rules: r#"[{"action":"ACCEPT","port":443}]"#.to_string(),
            })
            .await
            .unwrap();
        assert_eq!(config.name, "edge");
        assert!(config.is_active);

        let found = repo.find_by_id(&config.id).await.unwrap().unwrap();
        assert_eq!(found.rules, config.rules);

        // Partial update leaves untouched fields alone
        let updated = repo
            .update(
                &config.id,
                UpdateFirewallConfig {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.name, "edge");
        assert_eq!(updated.description.as_deref(), Some("Edge router"));

        assert!(repo
            .update("missing", UpdateFirewallConfig::default())
            .await
            .unwrap()
            .is_none());

        assert_eq!(repo.list(0, 10).await.unwrap().len(), 1);
        assert!(repo.delete(&config.id).await.unwrap());
        assert!(!repo.delete(&config.id).await.unwrap());
        assert!(repo.find_by_id(&config.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let (db, _dir) = create_test_db().await;
        let repo = FirewallConfigRepository::new(db.pool());
        let request = CreateFirewallConfig {
            name: "dup".to_string(),
            device_type: "ufw".to_string(),
            description: None,
            rules: "[]".to_string(),
        };
        repo.create(request.clone()).await.unwrap();
        assert!(matches!(
            repo.create(request).await,
            Err(Error::Database(_))
        ));
    }
}
