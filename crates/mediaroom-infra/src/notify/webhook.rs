use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use mediaroom_core::models::Notification;
use mediaroom_core::NotificationConfig;
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::Notifier;

type HmacSha256 = Hmac<Sha256>;

const USER_AGENT: &str = "Mediaroom-Webhook/1.0";
const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// JSON body posted to the webhook endpoint
#[derive(Debug, Serialize)]
pub struct NotificationBody<'a> {
    pub id: Uuid,
    pub event: &'a str,
    pub media_id: Uuid,
    pub payload: &'a serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl<'a> From<&'a Notification> for NotificationBody<'a> {
    fn from(n: &'a Notification) -> Self {
        Self {
            id: n.id,
            event: &n.event,
            media_id: n.media_id,
            payload: &n.payload,
            created_at: n.created_at,
        }
    }
}

/// Sign a payload with HMAC-SHA256, hex encoded
pub fn sign_payload(body: &str, secret: &str) -> Result<String> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).context("Invalid signing secret")?;
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Posts notifications to a single configured endpoint
#[derive(Clone)]
pub struct WebhookNotifier {
    http_client: Client,
    url: String,
    signing_secret: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: String, signing_secret: Option<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("Failed to create HTTP client for webhooks")?;

        Ok(Self {
            http_client,
            url,
            signing_secret,
        })
    }

    /// `None` when no webhook URL is configured.
    pub fn from_config(config: &NotificationConfig) -> Result<Option<Self>> {
        config
            .webhook_url
            .clone()
            .map(|url| {
                Self::new(
                    url,
                    config.webhook_secret.clone(),
                    Duration::from_secs(config.timeout_secs),
                )
            })
            .transpose()
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[tracing::instrument(skip(self, notification), fields(notification_id = %notification.id, event = %notification.event))]
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let start = Instant::now();
        let body = serde_json::to_string(&NotificationBody::from(notification))
            .context("Failed to serialize notification body")?;

        let mut request = self
            .http_client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", USER_AGENT);

        if let Some(secret) = &self.signing_secret {
            let signature = sign_payload(&body, secret)?;
            request = request.header(SIGNATURE_HEADER, format!("v1={}", signature));
        }

        let response = request
            .body(body)
            .send()
            .await
            .context("Failed to send webhook request")?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(
                status_code = status.as_u16(),
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Webhook delivered"
            );
            return Ok(());
        }

        let response_body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("Failed to read response body"));
        Err(anyhow::anyhow!(
            "Webhook returned non-2xx status: {} - {}",
            status.as_u16(),
            response_body
        ))
    }
}
