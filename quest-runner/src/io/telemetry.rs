//! Usage telemetry RPCs (time-to-first-token and usage report).
//!
//! Both calls are plain JSON POSTs. Their response bodies are only logged. A
//! send or read error is a failure; a non-2xx status is reported back as an
//! `Error <code>: <detail>` message instead.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::io::transport::Transport;

/// Time-to-first-token report for one answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TtftReport {
    pub deployment_id: String,
    /// Milliseconds until the first fragment arrived.
    pub time_to_first_token: u64,
}

/// Usage report crediting one credential for one answered prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    pub wallet_address: String,
    pub agent_id: String,
    pub request_text: String,
    pub response_text: String,
    pub request_metadata: serde_json::Map<String, Value>,
}

/// Abstraction over the telemetry service.
#[async_trait]
pub trait Telemetry: Send + Sync {
    /// Post a TTFT report; returns the server's message for logging.
    async fn report_ttft(&self, transport: &Transport, report: &TtftReport) -> Result<String>;

    /// Post a usage report; returns the server's message for logging.
    async fn report_usage(&self, transport: &Transport, report: &UsageReport) -> Result<String>;
}

/// Telemetry over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpTelemetry {
    ttft_url: String,
    usage_url: String,
}

impl HttpTelemetry {
    pub fn new(ttft_url: impl Into<String>, usage_url: impl Into<String>) -> Self {
        Self {
            ttft_url: ttft_url.into(),
            usage_url: usage_url.into(),
        }
    }

    async fn post<T: Serialize + Sync>(
        &self,
        transport: &Transport,
        url: &str,
        payload: &T,
    ) -> Result<String> {
        let response = transport
            .client()
            .post(url)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("post {url} via {}", transport.route()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("read response from {url}"))?;
        if !status.is_success() {
            let message = format!("Error {}: {}", status.as_u16(), error_detail(&body));
            warn!(%url, %message, "telemetry call rejected");
            return Ok(message);
        }
        Ok(response_message(&body))
    }
}

#[async_trait]
impl Telemetry for HttpTelemetry {
    #[instrument(skip_all, fields(deployment = %report.deployment_id))]
    async fn report_ttft(&self, transport: &Transport, report: &TtftReport) -> Result<String> {
        self.post(transport, &self.ttft_url, report).await
    }

    #[instrument(skip_all, fields(wallet = %report.wallet_address))]
    async fn report_usage(&self, transport: &Transport, report: &UsageReport) -> Result<String> {
        self.post(transport, &self.usage_url, report).await
    }
}

/// The `message` field of a JSON body, or the raw body.
fn response_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// The `error` or `message` field of an error body, or the raw body.
fn error_detail(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    parsed
        .as_ref()
        .and_then(|value| {
            value
                .get("error")
                .or_else(|| value.get("message"))
                .and_then(Value::as_str)
        })
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}
