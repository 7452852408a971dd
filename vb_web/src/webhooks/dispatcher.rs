//! Outbound delivery of signed webhook events.

use super::signature::{sign, SIGNATURE_HEADER};
use futures_util::future::join_all;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument, warn};
use vb_core::{time::now_iso8601, time::unix_timestamp, Error, Id, Result};
use vb_db::{Db, Webhook, WebhookRepository};

pub const EVENT_HEADER: &str = "X-VeriBits-Event";
pub const DELIVERY_HEADER: &str = "X-VeriBits-Delivery";

/// Body posted to subscribers
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope<'a> {
    pub id: String,
    pub event: &'a str,
    pub created_at: String,
    pub data: &'a serde_json::Value,
}

/// What happened to one delivery attempt
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResult {
    pub webhook_id: String,
    pub status: Option<u16>,
    pub success: bool,
    pub error: Option<String>,
}

/// Posts events to every active webhook subscribed to them
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(delivery_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(delivery_timeout)
            .user_agent(concat!("veribits-webhooks/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build webhook client: {}", e)))?;
        Ok(Self { client })
    }

    /// Deliver `event` to all interested webhooks concurrently and record each outcome
    #[instrument(skip(self, db, data))]
    pub async fn dispatch(
        &self,
        db: &Db,
        event: &str,
        data: &serde_json::Value,
    ) -> Result<Vec<DeliveryResult>> {
        let repo = WebhookRepository::new(db.pool());
        let hooks: Vec<Webhook> = repo
            .list_active()
            .await?
            .into_iter()
            .filter(|hook| hook.wants(event))
            .collect();

        if hooks.is_empty() {
            return Ok(Vec::new());
        }

        let envelope = EventEnvelope {
            id: Id::new().to_string(),
            event,
            created_at: now_iso8601(),
            data,
        };
        let body = serde_json::to_vec(&envelope)
            .map_err(|e| Error::External(format!("Failed to encode event: {}", e)))?;

        let deliveries = hooks
            .iter()
            .map(|hook| self.deliver(hook, event, &envelope.id, &body));
        let results = join_all(deliveries).await;

        for result in &results {
            let status = result.status.map(i64::from);
            if let Err(e) = repo
                .record_delivery(&result.webhook_id, status, result.success)
                .await
            {
                warn!(webhook_id = %result.webhook_id, "Failed to record delivery: {}", e);
            }
        }

        let delivered = results.iter().filter(|r| r.success).count();
        info!(event, delivered, attempted = results.len(), "Webhook event dispatched");
        Ok(results)
    }

    async fn deliver(
        &self,
        hook: &Webhook,
        event: &str,
        delivery_id: &str,
        body: &[u8],
    ) -> DeliveryResult {
        let signature = sign(&hook.secret, unix_timestamp(), body);

        let response = self
            .client
            .post(&hook.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_HEADER, event)
            .header(DELIVERY_HEADER, delivery_id)
            .body(body.to_vec())
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status();
                let success = status.is_success();
                if !success {
                    warn!(webhook_id = %hook.id, status = status.as_u16(), "Webhook rejected delivery");
                }
                DeliveryResult {
                    webhook_id: hook.id.clone(),
                    status: Some(status.as_u16()),
                    success,
                    error: (!success).then(|| format!("Endpoint returned {}", status)),
                }
            }
            Err(e) => {
                warn!(webhook_id = %hook.id, "Webhook delivery failed: {}", e);
                DeliveryResult {
                    webhook_id: hook.id.clone(),
                    status: None,
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhooks::signature::verify;
    use test_support::{temp_db_path, TempDir};
    use vb_db::{CreateWebhook, DbOptions};
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_db() -> (Db, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = temp_db_path(dir.path());
        let db = Db::new(path.to_str().unwrap(), DbOptions::default())
            .await
            .unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn test_dispatch_signs_and_records_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("x-veribits-event", "scan.completed"))
            .and(header_exists("x-veribits-signature"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let (db, _dir) = test_db().await;
        let hook = WebhookRepository::new(db.pool())
            .create(CreateWebhook {
                url: format!("{}/hook", server.uri()),
                events: vec!["scan.completed".to_string()],
            })
            .await
            .unwrap();

        let dispatcher = WebhookDispatcher::new(Duration::from_secs(5)).unwrap();
        let data = serde_json::json!({"scan_id": "abc", "veriscore": 90});
        let results = dispatcher
            .dispatch(&db, "scan.completed", &data)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(results[0].status, Some(204));

        let requests = server.received_requests().await.unwrap();
        let request = &requests[0];
        let signature = request
            .headers
            .get("x-veribits-signature")
            .and_then(|v| v.to_str().ok());
        assert!(verify(&hook.secret, signature, &request.body, unix_timestamp(), 60).is_ok());

        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(body["event"], "scan.completed");
        assert_eq!(body["data"]["veriscore"], 90);

        let stored = WebhookRepository::new(db.pool())
            .find_by_id(&hook.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_status, Some(204));
        assert_eq!(stored.failure_count, 0);
    }

    #[tokio::test]
    async fn test_failed_delivery_increments_failure_count() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (db, _dir) = test_db().await;
        let repo = WebhookRepository::new(db.pool());
        let hook = repo
            .create(CreateWebhook {
                url: server.uri(),
                events: Vec::new(),
            })
            .await
            .unwrap();

        let dispatcher = WebhookDispatcher::new(Duration::from_secs(5)).unwrap();
        let results = dispatcher
            .dispatch(&db, "scan.completed", &serde_json::json!({}))
            .await
            .unwrap();
        assert!(!results[0].success);
        assert_eq!(results[0].status, Some(500));

        let stored = repo.find_by_id(&hook.id).await.unwrap().unwrap();
        assert_eq!(stored.failure_count, 1);
    }

    #[tokio::test]
    async fn test_unsubscribed_and_inactive_hooks_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (db, _dir) = test_db().await;
        let repo = WebhookRepository::new(db.pool());
        repo.create(CreateWebhook {
            url: server.uri(),
            events: vec!["other.event".to_string()],
        })
        .await
        .unwrap();
        let inactive = repo
            .create(CreateWebhook {
                url: server.uri(),
                events: Vec::new(),
            })
            .await
            .unwrap();
        repo.deactivate(&inactive.id).await.unwrap();

        let dispatcher = WebhookDispatcher::new(Duration::from_secs(5)).unwrap();
        let results = dispatcher
            .dispatch(&db, "scan.completed", &serde_json::json!({}))
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
