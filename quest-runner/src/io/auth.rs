//! Auth service RPCs used to register wallets.
//!
//! Registration is a ticket exchange: post a nonce, receive a ticket, sign it,
//! then post the signature. Unlike telemetry, a non-2xx status here is an
//! error so the caller moves on to the next egress path.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use crate::io::transport::Transport;

/// Body of the signature submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub blockchain_name: String,
    pub nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_id: Option<String>,
    pub signed_message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthResponse {
    pub success: bool,
    pub message: Option<String>,
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange `nonce` for the ticket to sign.
    async fn auth_ticket(&self, transport: &Transport, nonce: &str) -> Result<String>;

    async fn authenticate(&self, transport: &Transport, request: &AuthRequest)
    -> Result<AuthResponse>;

    /// Public address the service sees for `transport`.
    async fn current_ip(&self, transport: &Transport) -> Result<String>;
}

/// Auth service over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    auth_url: String,
    ip_url: String,
}

#[derive(Deserialize)]
struct TicketBody {
    payload: Option<String>,
}

#[derive(Deserialize)]
struct IpBody {
    ip: String,
}

impl HttpAuthApi {
    pub fn new(auth_url: impl Into<String>, ip_url: impl Into<String>) -> Self {
        Self {
            auth_url: auth_url.into().trim_end_matches('/').to_string(),
            ip_url: ip_url.into(),
        }
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("read response from {url}"))?;
        if !status.is_success() {
            bail!("{url} returned {}: {}", status.as_u16(), body.trim());
        }
        serde_json::from_str(&body).with_context(|| format!("decode response from {url}"))
    }

    async fn post<T, B>(&self, transport: &Transport, url: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let response = transport
            .client()
            .post(url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("post {url} via {}", transport.route()))?;
        Self::read_json(response, url).await
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    #[instrument(skip_all)]
    async fn auth_ticket(&self, transport: &Transport, nonce: &str) -> Result<String> {
        let url = format!("{}/get-auth-ticket", self.auth_url);
        let body: TicketBody = self
            .post(transport, &url, &json!({ "nonce": nonce }))
            .await?;
        let ticket = body.payload.unwrap_or_default().trim().to_string();
        if ticket.is_empty() {
            bail!("{url} returned no ticket");
        }
        Ok(ticket)
    }

    #[instrument(skip_all)]
    async fn authenticate(
        &self,
        transport: &Transport,
        request: &AuthRequest,
    ) -> Result<AuthResponse> {
        let url = format!("{}/eth", self.auth_url);
        self.post(transport, &url, request).await
    }

    #[instrument(skip_all)]
    async fn current_ip(&self, transport: &Transport) -> Result<String> {
        let response = transport
            .client()
            .get(&self.ip_url)
            .send()
            .await
            .with_context(|| format!("get {} via {}", self.ip_url, transport.route()))?;
        let body: IpBody = Self::read_json(response, &self.ip_url).await?;
        Ok(body.ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::http_stub::{StubReply, serve_once};
    use serde_json::Value;
    use std::time::Duration;

    fn transport() -> Transport {
        Transport::direct(Duration::from_secs(5)).expect("transport")
    }

    fn request(referral_id: Option<&str>) -> AuthRequest {
        AuthRequest {
            blockchain_name: "ethereum".to_string(),
            nonce: "timestamp_1".to_string(),
            referral_id: referral_id.map(str::to_string),
            signed_message: "0xsig".to_string(),
        }
    }

    #[tokio::test]
    async fn ticket_is_trimmed_payload() {
        let (base, server) =
            serve_once(StubReply::json(200, r#"{"payload":"  sign me\n"}"#)).await;
        let api = HttpAuthApi::new(format!("{base}/"), "unused");

        let ticket = api
            .auth_ticket(&transport(), "timestamp_42")
            .await
            .expect("ticket");

        assert_eq!(ticket, "sign me");
        let body: Value = serde_json::from_str(&server.await.expect("server")).expect("json body");
        assert_eq!(body, serde_json::json!({ "nonce": "timestamp_42" }));
    }

    #[tokio::test]
    async fn missing_ticket_is_an_error() {
        let (base, _server) = serve_once(StubReply::json(200, r#"{"success":false}"#)).await;
        let api = HttpAuthApi::new(base, "unused");

        let err = api.auth_ticket(&transport(), "n").await.unwrap_err();

        assert!(err.to_string().contains("no ticket"));
    }

    #[tokio::test]
    async fn authenticate_posts_camel_case_body() {
        let (base, server) = serve_once(StubReply::json(200, r#"{"success":true}"#)).await;
        let api = HttpAuthApi::new(base, "unused");

        let response = api
            .authenticate(&transport(), &request(None))
            .await
            .expect("authenticate");

        assert!(response.success);
        let body: Value = serde_json::from_str(&server.await.expect("server")).expect("json body");
        assert_eq!(body["blockchainName"], "ethereum");
        assert_eq!(body["signedMessage"], "0xsig");
        assert!(body.get("referralId").is_none());
    }

    #[tokio::test]
    async fn rejected_authentication_is_an_error() {
        let (base, _server) =
            serve_once(StubReply::json(403, r#"{"message":"blocked region"}"#)).await;
        let api = HttpAuthApi::new(base, "unused");

        let err = api
            .authenticate(&transport(), &request(Some("REF")))
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("403"));
    }

    #[tokio::test]
    async fn current_ip_reads_ip_field() {
        let (base, _server) = serve_once(StubReply::json(200, r#"{"ip":"203.0.113.7"}"#)).await;
        let api = HttpAuthApi::new("unused", base);

        let ip = api.current_ip(&transport()).await.expect("ip");

        assert_eq!(ip, "203.0.113.7");
    }
}
