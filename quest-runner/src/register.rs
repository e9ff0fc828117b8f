//! Wallet registration against the auth service.
//!
//! Each attempt takes the next proxy in round-robin order, so a refused
//! attempt moves the wallet to a different egress path. After the proxied
//! attempts are spent one direct attempt follows.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use tracing::{info, instrument, warn};

use crate::core::proxy::{ProxyDescriptor, ProxyRotator};
use crate::core::types::Credential;
use crate::io::auth::{AuthApi, AuthRequest};
use crate::io::config::QuestConfig;
use crate::io::signer::Signer;
use crate::io::transport::TransportCache;
use crate::retry::{RetryPolicy, is_timeout, with_retry};

const BLOCKCHAIN_NAME: &str = "ethereum";

/// Knobs for one registration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationSettings {
    /// Attempts per wallet; each proxied attempt uses the next proxy.
    pub attempts: u32,
    /// Pause before every attempt.
    pub attempt_delay: Duration,
    pub retry: RetryPolicy,
    pub referral_id: Option<String>,
    pub request_timeout: Duration,
}

impl RegistrationSettings {
    pub fn from_config(cfg: &QuestConfig) -> Self {
        Self {
            attempts: cfg.registration.attempts,
            attempt_delay: Duration::from_millis(cfg.registration.delay_ms),
            retry: cfg.retry_policy(),
            referral_id: cfg.registration.referral_id.clone(),
            request_timeout: cfg.request_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered { route: String },
    Failed { error: String },
}

/// Registers wallets one at a time.
pub struct Registrar<Au, S> {
    auth: Au,
    signer: S,
    settings: RegistrationSettings,
    rotator: ProxyRotator,
    transports: TransportCache,
}

impl<Au, S> Registrar<Au, S>
where
    Au: AuthApi,
    S: Signer,
{
    pub fn new(
        auth: Au,
        signer: S,
        settings: RegistrationSettings,
        use_proxy: bool,
        proxies: Vec<ProxyDescriptor>,
    ) -> Self {
        let rotator = ProxyRotator::new(use_proxy, proxies);
        if rotator.is_degraded() {
            warn!("proxy use requested but no proxies loaded, registering directly");
        }
        let transports = TransportCache::new(settings.request_timeout);
        Self {
            auth,
            signer,
            settings,
            rotator,
            transports,
        }
    }

    /// Register every credential in order; one failure never stops the rest.
    pub async fn register_all(
        &mut self,
        credentials: &[Credential],
    ) -> Vec<(String, RegistrationOutcome)> {
        let mut outcomes = Vec::with_capacity(credentials.len());
        for credential in credentials {
            let outcome = self.register(credential).await;
            match &outcome {
                RegistrationOutcome::Registered { route } => {
                    info!(wallet = %credential.address, %route, "wallet registered");
                }
                RegistrationOutcome::Failed { error } => {
                    warn!(wallet = %credential.address, %error, "wallet registration failed");
                }
            }
            outcomes.push((credential.address.clone(), outcome));
        }
        outcomes
    }

    #[instrument(skip_all, fields(wallet = %credential.address))]
    pub async fn register(&mut self, credential: &Credential) -> RegistrationOutcome {
        let mut last_error = None;
        for attempt in 1..=self.settings.attempts {
            let proxy = self.rotator.rotate();
            match self.attempt(credential, proxy.as_ref()).await {
                Ok(route) => return RegistrationOutcome::Registered { route },
                Err(err) => {
                    warn!(
                        attempt,
                        attempts = self.settings.attempts,
                        route = proxy.as_ref().map(ToString::to_string).as_deref().unwrap_or("direct"),
                        error = %format!("{err:#}"),
                        "registration attempt failed"
                    );
                    last_error = Some(err);
                }
            }
        }

        if self.rotator.is_active() {
            info!("proxied attempts exhausted, trying without proxy");
            match self.attempt(credential, None).await {
                Ok(route) => return RegistrationOutcome::Registered { route },
                Err(err) => last_error = Some(err),
            }
        }

        RegistrationOutcome::Failed {
            error: last_error
                .map(|err| format!("{err:#}"))
                .unwrap_or_else(|| "no attempts made".to_string()),
        }
    }

    /// One nonce, ticket, sign and authenticate exchange over one route.
    async fn attempt(
        &mut self,
        credential: &Credential,
        proxy: Option<&ProxyDescriptor>,
    ) -> Result<String> {
        if !self.settings.attempt_delay.is_zero() {
            tokio::time::sleep(self.settings.attempt_delay).await;
        }
        let transport = match proxy {
            Some(proxy) => self.transports.proxied(proxy)?,
            None => self.transports.direct()?,
        };
        let auth = &self.auth;
        let retry = &self.settings.retry;

        if proxy.is_some() {
            match with_retry(retry, "egress ip", is_timeout, || auth.current_ip(transport)).await {
                Ok(ip) => info!(route = %transport.route(), %ip, "egress ip"),
                Err(err) => warn!(
                    route = %transport.route(),
                    error = %format!("{err:#}"),
                    "egress ip unknown"
                ),
            }
        }

        let nonce = fresh_nonce();
        let ticket = with_retry(retry, "auth ticket", is_timeout, || {
            auth.auth_ticket(transport, &nonce)
        })
        .await?;
        let signed_message = self
            .signer
            .sign(credential, &ticket)
            .await
            .context("sign auth ticket")?;
        let request = AuthRequest {
            blockchain_name: BLOCKCHAIN_NAME.to_string(),
            nonce,
            referral_id: self.settings.referral_id.clone(),
            signed_message,
        };
        let response = with_retry(retry, "authenticate", is_timeout, || {
            auth.authenticate(transport, &request)
        })
        .await?;
        if !response.success {
            bail!(
                "authentication rejected: {}",
                response.message.as_deref().unwrap_or("no reason given")
            );
        }
        Ok(transport.route())
    }
}

/// `timestamp_<unix millis>`.
fn fresh_nonce() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("timestamp_{millis}")
}
