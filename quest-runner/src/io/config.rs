//! Quest configuration stored in `quest.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::AgentEndpoint;
use crate::retry::RetryPolicy;

/// Quest configuration (TOML).
///
/// Missing fields fall back to the defaults below, so an absent file is a
/// valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QuestConfig {
    /// Score at which a credential is done for the run.
    pub goal_points: u32,

    /// Points credited per successfully reported prompt.
    pub credit_points: u32,

    /// Per-call timeout for every outbound request.
    pub request_timeout_secs: u64,

    /// Pause between credentials for the same prompt.
    pub credential_delay_ms: u64,

    /// Pause before trying the next endpoint after an unhelpful or failed answer.
    pub agent_retry_delay_ms: u64,

    /// Route telemetry calls through the proxy list.
    pub use_proxy: bool,

    pub retry: RetryConfig,

    pub files: FilesConfig,

    pub telemetry: TelemetryConfig,

    pub registration: RegistrationConfig,

    pub agents: Vec<AgentEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    /// Constant pause between attempts.
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FilesConfig {
    /// JSON array with the full prompt superset.
    pub prompts: PathBuf,
    /// JSON array of prompts no endpoint could answer.
    pub pruned: PathBuf,
    /// Newline-delimited wallet addresses.
    pub credentials: PathBuf,
    /// Optional newline-delimited private keys, one per wallet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets: Option<PathBuf>,
    /// Newline-delimited proxy descriptors.
    pub proxies: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TelemetryConfig {
    pub ttft_url: String,
    pub usage_url: String,
}

/// Wallet registration against the auth service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Base URL; `/get-auth-ticket` and `/eth` are appended.
    pub auth_url: String,
    /// Returns `{"ip": ...}` for the calling address.
    pub ip_url: String,
    /// Proxied attempts per wallet before the direct fallback.
    pub attempts: u32,
    /// Pause before each attempt.
    pub delay_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_id: Option<String>,
    /// Program and arguments that sign a ticket read from stdin.
    pub signer_command: Vec<String>,
    pub signer_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            prompts: PathBuf::from("payloads.json"),
            pruned: PathBuf::from("unanswerable.json"),
            credentials: PathBuf::from("wallets.txt"),
            secrets: None,
            proxies: PathBuf::from("proxy.txt"),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            ttft_url: "https://quests-usage-dev.prod.zettablock.com/api/ttft".to_string(),
            usage_url: "https://quests-usage-dev.prod.zettablock.com/api/report_usage".to_string(),
        }
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            auth_url: "https://api-kiteai.bonusblock.io/api/auth".to_string(),
            ip_url: "https://api64.ipify.org?format=json".to_string(),
            attempts: 3,
            delay_ms: 2000,
            referral_id: None,
            signer_command: Vec::new(),
            signer_timeout_secs: 30,
        }
    }
}

impl Default for QuestConfig {
    fn default() -> Self {
        Self {
            goal_points: 200,
            credit_points: 10,
            request_timeout_secs: 10,
            credential_delay_ms: 3000,
            agent_retry_delay_ms: 3000,
            use_proxy: true,
            retry: RetryConfig::default(),
            files: FilesConfig::default(),
            telemetry: TelemetryConfig::default(),
            registration: RegistrationConfig::default(),
            agents: default_agents(),
        }
    }
}

fn default_agents() -> Vec<AgentEndpoint> {
    [
        (
            "https://deployment-r89ftdnxa7jwwhyr97wq9lkg.stag-vxzy.zettablock.com/main",
            "deployment_R89FtdnXa7jWWHyr97WQ9LKG",
            "Professor",
        ),
        (
            "https://deployment-fsegykivcls3m9nrpe9zguy9.stag-vxzy.zettablock.com/main",
            "deployment_fseGykIvCLs3m9Nrpe9Zguy9",
            "Sherlock",
        ),
        (
            "https://deployment-xkerjnnbdtazr9e15x3y7fi8.stag-vxzy.zettablock.com/main",
            "deployment_xkerJnNBdTaZr9E15X3Y7FI8",
            "Crypto Buddy",
        ),
    ]
    .into_iter()
    .map(|(url, id, name)| AgentEndpoint {
        url: url.to_string(),
        id: id.to_string(),
        name: name.to_string(),
    })
    .collect()
}

impl QuestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.goal_points == 0 {
            return Err(anyhow!("goal_points must be > 0"));
        }
        if self.credit_points == 0 {
            return Err(anyhow!("credit_points must be > 0"));
        }
        if self.credit_points > self.goal_points {
            return Err(anyhow!("credit_points must not exceed goal_points"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be > 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be > 0"));
        }
        if self.agents.is_empty() {
            return Err(anyhow!("agents must list at least one endpoint"));
        }
        for (idx, agent) in self.agents.iter().enumerate() {
            if agent.url.trim().is_empty() || agent.id.trim().is_empty() {
                return Err(anyhow!("agents[{idx}] must have a non-empty url and id"));
            }
        }
        if self.telemetry.ttft_url.trim().is_empty() || self.telemetry.usage_url.trim().is_empty()
        {
            return Err(anyhow!("telemetry urls must be non-empty"));
        }
        if self.registration.attempts == 0 {
            return Err(anyhow!("registration.attempts must be > 0"));
        }
        if self.registration.auth_url.trim().is_empty() {
            return Err(anyhow!("registration.auth_url must be non-empty"));
        }
        if self.registration.signer_timeout_secs == 0 {
            return Err(anyhow!("registration.signer_timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn credential_delay(&self) -> Duration {
        Duration::from_millis(self.credential_delay_ms)
    }

    pub fn agent_retry_delay(&self) -> Duration {
        Duration::from_millis(self.agent_retry_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            delay: Duration::from_millis(self.retry.delay_ms),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `QuestConfig::default()`.
pub fn load_config(path: &Path) -> Result<QuestConfig> {
    if !path.exists() {
        let cfg = QuestConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: QuestConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &QuestConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, QuestConfig::default());
        assert_eq!(cfg.agents.len(), 3);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("quest.toml");
        let cfg = QuestConfig {
            use_proxy: false,
            files: FilesConfig {
                secrets: Some(PathBuf::from("priv.txt")),
                ..FilesConfig::default()
            },
            ..QuestConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("quest.toml");
        fs::write(&path, "goal_points = 50\n\n[retry]\nmax_attempts = 5\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.goal_points, 50);
        assert_eq!(cfg.credit_points, 10);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.delay_ms, 1000);
    }

    #[test]
    fn validate_rejects_zero_attempts() {
        let cfg = QuestConfig {
            retry: RetryConfig {
                max_attempts: 0,
                delay_ms: 1000,
            },
            ..QuestConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn registration_section_parses_signer_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("quest.toml");
        fs::write(
            &path,
            "[registration]\nreferral_id = \"ABC\"\nsigner_command = [\"node\", \"sign.js\"]\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.registration.signer_command, vec!["node", "sign.js"]);
        assert_eq!(cfg.registration.referral_id.as_deref(), Some("ABC"));
        assert_eq!(cfg.registration.attempts, 3);
    }

    #[test]
    fn validate_rejects_empty_agent_list() {
        let cfg = QuestConfig {
            agents: Vec::new(),
            ..QuestConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
