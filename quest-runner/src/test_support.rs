//! Test-only doubles for agents, telemetry, auth, signing and on-disk prompt
//! files.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rand::rngs::mock::StepRng;
use tempfile::TempDir;

use crate::answer::AnswerConfig;
use crate::core::proxy::{ProxyDescriptor, ProxyScheme};
use crate::core::types::{AgentEndpoint, AgentReply, Credential};
use crate::io::agent::AgentBackend;
use crate::io::auth::{AuthApi, AuthRequest, AuthResponse};
use crate::io::prompt_store::{load_optional_prompt_list, write_prompt_list};
use crate::io::signer::Signer;
use crate::io::telemetry::{Telemetry, TtftReport, UsageReport};
use crate::io::transport::Transport;
use crate::looping::{Orchestrator, OrchestratorParts, RunSettings};
use crate::pool::QuestionPool;
use crate::register::RegistrationSettings;
use crate::retry::RetryPolicy;

/// `n` deterministic endpoints with ids `agent-0`, `agent-1`, ...
pub fn endpoints(n: usize) -> Vec<AgentEndpoint> {
    (0..n)
        .map(|i| AgentEndpoint {
            url: format!("http://agent-{i}.invalid/main"),
            id: format!("agent-{i}"),
            name: format!("Agent {i}"),
        })
        .collect()
}

/// Plain HTTP proxy on port 8080 without credentials.
pub fn proxy(host: &str) -> ProxyDescriptor {
    ProxyDescriptor {
        scheme: ProxyScheme::Http,
        host: host.to_string(),
        port: 8080,
        auth: None,
    }
}

/// Production-like delays; tests run them under paused time.
pub fn settings(goal_points: u32, credit_points: u32) -> RunSettings {
    RunSettings {
        goal_points,
        credit_points,
        credential_delay: Duration::from_millis(3000),
        request_timeout: Duration::from_secs(10),
        answer: AnswerConfig {
            retry: RetryPolicy::default(),
            fallback_delay: Duration::from_millis(3000),
        },
    }
}

/// Orchestrator over scripted doubles that always picks the first untried
/// endpoint.
pub fn orchestrator(
    agents: ScriptedAgents,
    telemetry: ScriptedTelemetry,
    settings: RunSettings,
    endpoints: Vec<AgentEndpoint>,
    credentials: Vec<Credential>,
    pool: QuestionPool,
    proxies: Vec<ProxyDescriptor>,
) -> Orchestrator<ScriptedAgents, ScriptedTelemetry, StepRng> {
    Orchestrator::new(OrchestratorParts {
        agents,
        telemetry,
        rng: StepRng::new(0, 0),
        settings,
        endpoints,
        credentials,
        pool,
        use_proxy: true,
        proxies,
    })
}

#[derive(Debug, Clone)]
enum Scripted {
    Reply(String),
    Fail,
    Timeout,
}

#[derive(Debug, Default)]
struct AgentScript {
    by_prompt: HashMap<(String, String), VecDeque<Scripted>>,
    any_prompt: HashMap<String, VecDeque<Scripted>>,
    calls: Vec<(String, String)>,
}

/// Agent backend that plays back queued replies per `(endpoint id, prompt)`.
///
/// The last queued entry repeats once the queue drains. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgents {
    script: Arc<Mutex<AgentScript>>,
}

impl ScriptedAgents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, id: &str, prompt: &str, text: &str) -> Self {
        self.push(id, Some(prompt), Scripted::Reply(text.to_string()))
    }

    /// Reply with `text` for any prompt not scripted explicitly.
    pub fn reply_any(self, id: &str, text: &str) -> Self {
        self.push(id, None, Scripted::Reply(text.to_string()))
    }

    /// Non-retryable failure.
    pub fn fail(self, id: &str, prompt: &str) -> Self {
        self.push(id, Some(prompt), Scripted::Fail)
    }

    /// Retryable connection timeout.
    pub fn timeout(self, id: &str, prompt: &str) -> Self {
        self.push(id, Some(prompt), Scripted::Timeout)
    }

    /// Every `(endpoint id, prompt)` asked so far, in order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.script.lock().expect("agent script lock").calls.clone()
    }

    fn push(self, id: &str, prompt: Option<&str>, entry: Scripted) -> Self {
        {
            let mut script = self.script.lock().expect("agent script lock");
            let queue = match prompt {
                Some(prompt) => script
                    .by_prompt
                    .entry((id.to_string(), prompt.to_string()))
                    .or_default(),
                None => script.any_prompt.entry(id.to_string()).or_default(),
            };
            queue.push_back(entry);
        }
        self
    }

    fn next(&self, id: &str, prompt: &str) -> Option<Scripted> {
        let mut guard = self.script.lock().expect("agent script lock");
        let script = &mut *guard;
        let key = (id.to_string(), prompt.to_string());
        script.calls.push(key.clone());
        let queue = if script.by_prompt.contains_key(&key) {
            script.by_prompt.get_mut(&key)?
        } else {
            script.any_prompt.get_mut(id)?
        };
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl AgentBackend for ScriptedAgents {
    async fn ask(&self, endpoint: &AgentEndpoint, prompt: &str) -> Result<AgentReply> {
        match self.next(&endpoint.id, prompt) {
            Some(Scripted::Reply(text)) => Ok(AgentReply {
                text,
                first_token: Duration::from_millis(120),
            }),
            Some(Scripted::Fail) => Err(anyhow!("{} returned 500", endpoint.id)),
            Some(Scripted::Timeout) => Err(anyhow::Error::new(io::Error::new(
                io::ErrorKind::TimedOut,
                "connect timed out",
            ))),
            None => Err(anyhow!("no script for {} / {prompt}", endpoint.id)),
        }
    }
}

/// One recorded call to a scripted service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub kind: &'static str,
    pub route: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum FailureMode {
    #[default]
    Never,
    Proxied,
    Always,
    Rejected,
}

#[derive(Debug, Default)]
struct TelemetryLog {
    calls: Vec<RecordedCall>,
    ttft: Vec<TtftReport>,
    usage: Vec<UsageReport>,
}

/// Telemetry double recording every call and its route. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTelemetry {
    mode: FailureMode,
    log: Arc<Mutex<TelemetryLog>>,
}

impl ScriptedTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call that goes through a proxy.
    pub fn failing_proxied(mut self) -> Self {
        self.mode = FailureMode::Proxied;
        self
    }

    /// Fail every call.
    pub fn failing_everywhere(mut self) -> Self {
        self.mode = FailureMode::Always;
        self
    }

    /// Answer every call the way the HTTP client reports a non-2xx status.
    pub fn rejecting(mut self) -> Self {
        self.mode = FailureMode::Rejected;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.log.lock().expect("telemetry lock").calls.clone()
    }

    /// Accepted TTFT reports.
    pub fn ttft_reports(&self) -> Vec<TtftReport> {
        self.log.lock().expect("telemetry lock").ttft.clone()
    }

    /// Accepted usage reports.
    pub fn usage_reports(&self) -> Vec<UsageReport> {
        self.log.lock().expect("telemetry lock").usage.clone()
    }

    /// Record the call; `Ok(Some(message))` stands in for a rejected call.
    fn record(&self, kind: &'static str, transport: &Transport) -> Result<Option<String>> {
        self.log
            .lock()
            .expect("telemetry lock")
            .calls
            .push(RecordedCall {
                kind,
                route: transport.route(),
            });
        let fails = match self.mode {
            FailureMode::Never | FailureMode::Rejected => false,
            FailureMode::Proxied => !transport.is_direct(),
            FailureMode::Always => true,
        };
        if fails {
            return Err(anyhow!("{kind} via {} refused", transport.route()));
        }
        if self.mode == FailureMode::Rejected {
            return Ok(Some("Error 429: daily limit reached".to_string()));
        }
        Ok(None)
    }
}

#[async_trait]
impl Telemetry for ScriptedTelemetry {
    async fn report_ttft(&self, transport: &Transport, report: &TtftReport) -> Result<String> {
        if let Some(rejection) = self.record("ttft", transport)? {
            return Ok(rejection);
        }
        self.log
            .lock()
            .expect("telemetry lock")
            .ttft
            .push(report.clone());
        Ok("ttft recorded".to_string())
    }

    async fn report_usage(&self, transport: &Transport, report: &UsageReport) -> Result<String> {
        if let Some(rejection) = self.record("usage", transport)? {
            return Ok(rejection);
        }
        self.log
            .lock()
            .expect("telemetry lock")
            .usage
            .push(report.clone());
        Ok("usage recorded".to_string())
    }
}

/// Registration with three attempts, a two second pause and no referral.
pub fn registration_settings() -> RegistrationSettings {
    RegistrationSettings {
        attempts: 3,
        attempt_delay: Duration::from_millis(2000),
        retry: RetryPolicy::default(),
        referral_id: None,
        request_timeout: Duration::from_secs(10),
    }
}

#[derive(Debug, Default)]
struct AuthLog {
    calls: Vec<RecordedCall>,
    requests: Vec<AuthRequest>,
}

/// Auth service double that hands out `ticket-for-<nonce>`. Clones share
/// state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAuth {
    mode: FailureMode,
    log: Arc<Mutex<AuthLog>>,
}

impl ScriptedAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call that goes through a proxy.
    pub fn failing_proxied(mut self) -> Self {
        self.mode = FailureMode::Proxied;
        self
    }

    /// Answer every authentication with `success: false`.
    pub fn rejecting(mut self) -> Self {
        self.mode = FailureMode::Rejected;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.log.lock().expect("auth lock").calls.clone()
    }

    /// Submitted authentication bodies.
    pub fn requests(&self) -> Vec<AuthRequest> {
        self.log.lock().expect("auth lock").requests.clone()
    }

    fn record(&self, kind: &'static str, transport: &Transport) -> Result<()> {
        self.log.lock().expect("auth lock").calls.push(RecordedCall {
            kind,
            route: transport.route(),
        });
        let fails = match self.mode {
            FailureMode::Proxied => !transport.is_direct(),
            FailureMode::Always => true,
            FailureMode::Never | FailureMode::Rejected => false,
        };
        if fails {
            return Err(anyhow!("{kind} via {} refused", transport.route()));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthApi for ScriptedAuth {
    async fn auth_ticket(&self, transport: &Transport, nonce: &str) -> Result<String> {
        self.record("ticket", transport)?;
        Ok(format!("ticket-for-{nonce}"))
    }

    async fn authenticate(
        &self,
        transport: &Transport,
        request: &AuthRequest,
    ) -> Result<AuthResponse> {
        self.record("authenticate", transport)?;
        self.log
            .lock()
            .expect("auth lock")
            .requests
            .push(request.clone());
        Ok(AuthResponse {
            success: self.mode != FailureMode::Rejected,
            message: (self.mode == FailureMode::Rejected).then(|| "invalid signature".to_string()),
        })
    }

    async fn current_ip(&self, transport: &Transport) -> Result<String> {
        self.record("ip", transport)?;
        Ok("203.0.113.7".to_string())
    }
}

/// Signer double returning `sig:<address>:<message>`. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSigner {
    failing: bool,
    signed: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedSigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Every `(address, message)` signed so far.
    pub fn signed(&self) -> Vec<(String, String)> {
        self.signed.lock().expect("signer lock").clone()
    }
}

#[async_trait]
impl Signer for ScriptedSigner {
    async fn sign(&self, credential: &Credential, message: &str) -> Result<String> {
        self.signed
            .lock()
            .expect("signer lock")
            .push((credential.address.clone(), message.to_string()));
        if self.failing {
            return Err(anyhow!("signer exited with 1: bad key"));
        }
        Ok(format!("sig:{}:{message}", credential.address))
    }
}

/// Temporary directory holding a prompt superset and a pruned file.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new(prompts: &[&str]) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let ws = Self { dir };
        write_prompt_list(&ws.prompts_path(), &owned(prompts))?;
        Ok(ws)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn prompts_path(&self) -> PathBuf {
        self.root().join("payloads.json")
    }

    pub fn pruned_path(&self) -> PathBuf {
        self.root().join("unanswerable.json")
    }

    pub fn write_pruned(&self, prompts: &[&str]) -> Result<()> {
        write_prompt_list(&self.pruned_path(), &owned(prompts))
    }

    pub fn read_pruned(&self) -> Result<Vec<String>> {
        load_optional_prompt_list(&self.pruned_path())
    }

    pub fn pool(&self) -> Result<QuestionPool> {
        QuestionPool::load(&self.prompts_path(), &self.pruned_path())
    }
}

fn owned(prompts: &[&str]) -> Vec<String> {
    prompts.iter().map(|p| (*p).to_string()).collect()
}
