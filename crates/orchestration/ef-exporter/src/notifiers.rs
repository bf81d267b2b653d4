//! Job lifecycle notifiers.

use async_trait::async_trait;
use ef_error::{ExportError, Result};
use ef_traits::Notifier;
use ef_types::{OptionKind, OptionSpec};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default timeout for webhook requests in seconds.
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 30;

/// Logs lifecycle events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl LogNotifier {
    pub const OPTIONS: &'static [OptionSpec] = &[];

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        ef_types::resolve_options("notifications.log", Self::OPTIONS, options)?;
        Ok(Self)
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_start(&self) -> Result<()> {
        info!("Export started");
        Ok(())
    }

    async fn notify_complete(&self, metadata: &Value) -> Result<()> {
        info!(
            elapsed_time = metadata.get("elapsed_time").and_then(serde_json::Value::as_f64).unwrap_or(0.0),
            bypassed_pipeline = metadata
                .get("bypassed_pipeline")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
            "Export completed"
        );
        Ok(())
    }

    async fn notify_failure(&self, message: &str, _trace: &str, _configuration: &Value) -> Result<()> {
        error!(message, "Export failed");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

#[derive(Debug, Deserialize)]
struct WebhookOptions {
    endpoints: Vec<String>,
    token: Option<String>,
    timeout_secs: u64,
}

/// Event delivered to webhook endpoints.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct WebhookPayload {
    /// `started`, `completed` or `failed`
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
}

impl WebhookPayload {
    fn event(event: &str) -> Self {
        Self {
            event: event.to_string(),
            metadata: None,
            message: None,
            trace: None,
            configuration: None,
        }
    }
}

/// POSTs lifecycle events as JSON to every endpoint.
pub struct WebhookNotifier {
    client: Client,
    endpoints: Vec<String>,
    token: Option<String>,
}

impl WebhookNotifier {
    pub const OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::required("endpoints", OptionKind::List),
        OptionSpec::optional("token", OptionKind::String).with_env("EXPORT_WEBHOOK_TOKEN"),
        OptionSpec::required("timeout_secs", OptionKind::Integer).with_default("30"),
    ];

    pub fn new(endpoints: Vec<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExportError::config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoints,
            token,
        })
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let opts: WebhookOptions =
            ef_types::parse_options("notifications.webhook", Self::OPTIONS, options)?;
        if opts.endpoints.is_empty() {
            return Err(ExportError::config("notifications.webhook: endpoints must not be empty"));
        }
        Self::new(opts.endpoints, opts.token, Duration::from_secs(opts.timeout_secs))
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Sends `payload` to every endpoint; fails if any endpoint failed.
    async fn send(&self, payload: &WebhookPayload) -> Result<()> {
        let mut failures = Vec::new();
        for url in &self.endpoints {
            if let Err(e) = self.send_one(url, payload).await {
                failures.push(e);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ExportError::Notification(failures.join("; ")))
        }
    }

    async fn send_one(&self, url: &str, payload: &WebhookPayload) -> std::result::Result<(), String> {
        debug!(url, event = %payload.event, "Sending webhook");

        let mut request = self.client.post(url).json(payload);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("webhook {url} failed: {e}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(url, status = %status, body = %body, "Webhook returned error status");
            return Err(format!("webhook {url} returned {status}: {body}"));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_start(&self) -> Result<()> {
        self.send(&WebhookPayload::event("started")).await
    }

    async fn notify_complete(&self, metadata: &Value) -> Result<()> {
        self.send(&WebhookPayload {
            metadata: Some(metadata.clone()),
            ..WebhookPayload::event("completed")
        })
        .await
    }

    async fn notify_failure(&self, message: &str, trace: &str, configuration: &Value) -> Result<()> {
        self.send(&WebhookPayload {
            message: Some(message.to_string()),
            trace: Some(trace.to_string()),
            configuration: Some(configuration.clone()),
            ..WebhookPayload::event("failed")
        })
        .await
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// The configured notifiers, in delivery order.
///
/// Delivery failures are logged and never propagate.
#[derive(Default)]
pub struct Notifications {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl Notifications {
    pub fn new(notifiers: Vec<Box<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    pub async fn notify_start(&self) {
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify_start().await {
                warn!(notifier = notifier.name(), error = %e, "Start notification failed");
            }
        }
    }

    pub async fn notify_complete(&self, metadata: &Value) {
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify_complete(metadata).await {
                warn!(notifier = notifier.name(), error = %e, "Completion notification failed");
            }
        }
    }

    pub async fn notify_failure(&self, message: &str, trace: &str, configuration: &Value) {
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify_failure(message, trace, configuration).await {
                warn!(notifier = notifier.name(), error = %e, "Failure notification failed");
            }
        }
    }
}
