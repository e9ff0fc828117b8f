//! Message signing for wallet registration.
//!
//! Signing is delegated to an external command so key handling stays outside
//! this process. The command reads the message on stdin, finds the wallet in
//! `QUEST_SIGNER_ADDRESS` and its secret in `QUEST_SIGNER_SECRET`, and prints
//! the signature on stdout.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::core::types::Credential;
use crate::io::process::run_command_with_timeout;

const SIGNATURE_LIMIT_BYTES: usize = 16 * 1024;

/// Produces a signature over `message` for one credential.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, credential: &Credential, message: &str) -> Result<String>;
}

/// Signer backed by an external program.
#[derive(Debug, Clone)]
pub struct CommandSigner {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandSigner {
    /// `command` is the program followed by its arguments.
    pub fn new(command: &[String], timeout: Duration) -> Result<Self> {
        let Some((program, args)) = command.split_first() else {
            bail!("signer command is empty; set registration.signer_command");
        };
        if program.trim().is_empty() {
            bail!("signer program must not be blank");
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }
}

#[async_trait]
impl Signer for CommandSigner {
    #[instrument(skip_all, fields(wallet = %credential.address, program = %self.program))]
    async fn sign(&self, credential: &Credential, message: &str) -> Result<String> {
        let secret = credential
            .secret()
            .with_context(|| format!("wallet {} has no secret to sign with", credential.address))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env("QUEST_SIGNER_ADDRESS", &credential.address)
            .env("QUEST_SIGNER_SECRET", secret);
        let input = message.as_bytes().to_vec();
        let timeout = self.timeout;

        let output = tokio::task::spawn_blocking(move || {
            run_command_with_timeout(cmd, &input, timeout, SIGNATURE_LIMIT_BYTES)
        })
        .await
        .context("signer task panicked")?
        .with_context(|| format!("run signer {}", self.program))?;

        if output.timed_out {
            bail!("signer timed out after {}s", timeout.as_secs());
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("signer exited with {}: {}", output.status, stderr.trim());
        }
        if output.stdout_truncated > 0 {
            bail!("signer output exceeds {SIGNATURE_LIMIT_BYTES} bytes");
        }
        let signature = String::from_utf8(output.stdout)
            .context("signer output is not UTF-8")?
            .trim()
            .to_string();
        if signature.is_empty() {
            bail!("signer printed no signature");
        }
        debug!(len = signature.len(), "message signed");
        Ok(signature)
    }
}
