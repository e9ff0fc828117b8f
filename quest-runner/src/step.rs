//! Orchestration for a single prompt across every selected credential.

use anyhow::Result;
use rand::Rng;
use tracing::{info, instrument, warn};

use crate::answer::answer_prompt;
use crate::core::proxy::ProxyDescriptor;
use crate::core::types::{Answer, AnswerOutcome, Credential};
use crate::io::agent::AgentBackend;
use crate::io::telemetry::{Telemetry, TtftReport, UsageReport};
use crate::looping::Orchestrator;
use crate::retry::{is_timeout, with_retry};

/// Outcome of reporting one answer for one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Both telemetry calls completed over `route`. A call the service
    /// rejected with a non-2xx status carries its `Error <code>` message.
    Reported {
        route: String,
        ttft_message: String,
        usage_message: String,
    },
    /// Proxied and direct attempts both failed to reach the service.
    Failed { error: String },
}

/// Per-credential result for one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStep {
    pub address: String,
    pub report: ReportOutcome,
    /// Score after this step.
    pub score: u32,
}

/// Result of processing one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub prompt: String,
    /// Endpoint id that produced the reported answer.
    pub answered_by: Option<String>,
    /// The prompt exhausted every endpoint and was newly pruned.
    pub pruned: bool,
    pub credentials: Vec<CredentialStep>,
    /// Every selected credential has reached the goal.
    pub goal_reached: bool,
}

impl<A, T, R> Orchestrator<A, T, R>
where
    A: AgentBackend,
    T: Telemetry,
    R: Rng,
{
    /// Answer `prompt` once, then report the shared answer for each credential
    /// in selection order. Failures are logged; nothing here aborts the run.
    #[instrument(skip_all)]
    pub async fn run_step(&mut self, prompt: &str) -> StepOutcome {
        info!(%prompt, "asking prompt");
        let outcome = answer_prompt(
            &self.agents,
            &self.endpoints,
            prompt,
            &self.settings.answer,
            &mut self.rng,
        )
        .await;

        let answer = match outcome {
            AnswerOutcome::Answered(answer) => answer,
            AnswerOutcome::Exhausted { tried } => {
                warn!(%prompt, tried = tried.len(), "no agent gave a useful answer");
                let pruned = match self.pool.record_total_failure(prompt) {
                    Ok(pruned) => pruned,
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), "could not prune prompt");
                        false
                    }
                };
                return StepOutcome {
                    prompt: prompt.to_string(),
                    answered_by: None,
                    pruned,
                    credentials: Vec::new(),
                    goal_reached: false,
                };
            }
        };
        info!(endpoint = %answer.endpoint.name, answer = %answer.text, "answer received");

        let mut credentials = Vec::with_capacity(self.credentials.len());
        for idx in 0..self.credentials.len() {
            let credential = self.credentials[idx].clone();
            let report = self.report_for_credential(&credential, prompt, &answer).await;
            let score = match &report {
                ReportOutcome::Reported { .. } => {
                    let score = self
                        .state
                        .progress
                        .credit(&credential.address, self.settings.credit_points);
                    info!(
                        credential = %credential.address,
                        score,
                        goal = self.settings.goal_points,
                        "usage credited"
                    );
                    score
                }
                ReportOutcome::Failed { error } => {
                    warn!(credential = %credential.address, %error, "usage not credited");
                    self.state.progress.score(&credential.address)
                }
            };
            credentials.push(CredentialStep {
                address: credential.address.clone(),
                report,
                score,
            });

            if !self.settings.credential_delay.is_zero() {
                tokio::time::sleep(self.settings.credential_delay).await;
            }
        }

        let goal_reached = self
            .state
            .progress
            .all_reached(self.credentials.iter().map(|c| c.address.as_str()));
        StepOutcome {
            prompt: prompt.to_string(),
            answered_by: Some(answer.endpoint.id.clone()),
            pruned: false,
            credentials,
            goal_reached,
        }
    }

    /// Report through the credential's sticky proxy, falling back to one
    /// direct attempt if the proxied attempt fails.
    async fn report_for_credential(
        &mut self,
        credential: &Credential,
        prompt: &str,
        answer: &Answer,
    ) -> ReportOutcome {
        let ttft = TtftReport {
            deployment_id: answer.endpoint.id.clone(),
            time_to_first_token: answer.first_token.as_millis() as u64,
        };
        let usage = UsageReport {
            wallet_address: credential.address.clone(),
            agent_id: answer.endpoint.id.clone(),
            request_text: prompt.to_string(),
            response_text: answer.text.clone(),
            request_metadata: serde_json::Map::new(),
        };

        if let Some(proxy) = self.state.rotator.assign(&credential.address) {
            match self.send_reports(Some(&proxy), &ttft, &usage).await {
                Ok(report) => return report,
                Err(err) => warn!(
                    credential = %credential.address,
                    %proxy,
                    error = %format!("{err:#}"),
                    "proxied report failed, retrying without proxy"
                ),
            }
        }

        match self.send_reports(None, &ttft, &usage).await {
            Ok(report) => report,
            Err(err) => ReportOutcome::Failed {
                error: format!("{err:#}"),
            },
        }
    }

    async fn send_reports(
        &mut self,
        proxy: Option<&ProxyDescriptor>,
        ttft: &TtftReport,
        usage: &UsageReport,
    ) -> Result<ReportOutcome> {
        let transport = match proxy {
            Some(proxy) => self.state.transports.proxied(proxy)?,
            None => self.state.transports.direct()?,
        };
        let telemetry = &self.telemetry;
        let retry = &self.settings.answer.retry;

        let ttft_message = with_retry(retry, "ttft report", is_timeout, || {
            telemetry.report_ttft(transport, ttft)
        })
        .await?;
        info!(route = %transport.route(), message = %ttft_message, "ttft reported");

        let usage_message = with_retry(retry, "usage report", is_timeout, || {
            telemetry.report_usage(transport, usage)
        })
        .await?;
        info!(route = %transport.route(), message = %usage_message, "usage reported");

        Ok(ReportOutcome::Reported {
            route: transport.route(),
            ttft_message,
            usage_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        ScriptedAgents, ScriptedTelemetry, TestWorkspace, endpoints, orchestrator, proxy, settings,
    };

    #[tokio::test(start_paused = true)]
    async fn exhausted_prompt_is_pruned_and_not_reported() {
        let ws = TestWorkspace::new(&["Q1"]).expect("workspace");
        let agents = ScriptedAgents::new()
            .reply("agent-0", "Q1", "Maaf")
            .reply("agent-1", "Q1", "Sorry");
        let telemetry = ScriptedTelemetry::new();
        let mut orch = orchestrator(
            agents,
            telemetry.clone(),
            settings(200, 10),
            endpoints(2),
            vec![Credential::new("0xw1")],
            ws.pool().expect("pool"),
            Vec::new(),
        );

        let step = orch.run_step("Q1").await;

        assert!(step.pruned);
        assert!(step.credentials.is_empty());
        assert!(telemetry.calls().is_empty());
        assert_eq!(ws.read_pruned().expect("pruned"), vec!["Q1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn shared_answer_is_reported_for_every_credential() {
        let ws = TestWorkspace::new(&["Q1"]).expect("workspace");
        let agents = ScriptedAgents::new().reply("agent-0", "Q1", "Answer");
        let telemetry = ScriptedTelemetry::new();
        let mut orch = orchestrator(
            agents.clone(),
            telemetry.clone(),
            settings(200, 10),
            endpoints(2),
            vec![Credential::new("0xw1"), Credential::new("0xw2")],
            ws.pool().expect("pool"),
            Vec::new(),
        );

        let step = orch.run_step("Q1").await;

        assert_eq!(agents.calls().len(), 1);
        let wallets: Vec<String> = telemetry
            .usage_reports()
            .into_iter()
            .map(|r| r.wallet_address)
            .collect();
        assert_eq!(wallets, vec!["0xw1", "0xw2"]);
        assert!(step.credentials.iter().all(|c| c.score == 10));
    }

    #[tokio::test(start_paused = true)]
    async fn proxied_failure_falls_back_to_direct_once() {
        let ws = TestWorkspace::new(&["Q1"]).expect("workspace");
        let agents = ScriptedAgents::new().reply_any("agent-0", "Answer");
        let telemetry = ScriptedTelemetry::new().failing_proxied();
        let mut orch = orchestrator(
            agents,
            telemetry.clone(),
            settings(200, 10),
            endpoints(1),
            vec![Credential::new("0xw1")],
            ws.pool().expect("pool"),
            vec![proxy("10.0.0.1")],
        );

        let step = orch.run_step("Q1").await;

        let routes: Vec<String> = telemetry.calls().into_iter().map(|c| c.route).collect();
        assert_eq!(routes, vec!["http://10.0.0.1:8080", "direct", "direct"]);
        assert!(matches!(
            step.credentials[0].report,
            ReportOutcome::Reported { ref route, .. } if route == "direct"
        ));
        assert_eq!(orch.score("0xw1"), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_reports_are_logged_and_still_credited() {
        let ws = TestWorkspace::new(&["Q1"]).expect("workspace");
        let telemetry = ScriptedTelemetry::new().rejecting();
        let mut orch = orchestrator(
            ScriptedAgents::new().reply_any("agent-0", "Answer"),
            telemetry.clone(),
            settings(200, 10),
            endpoints(1),
            vec![Credential::new("0xw1")],
            ws.pool().expect("pool"),
            vec![proxy("10.0.0.1")],
        );

        let step = orch.run_step("Q1").await;

        let routes: Vec<String> = telemetry.calls().into_iter().map(|c| c.route).collect();
        assert_eq!(routes, vec!["http://10.0.0.1:8080", "http://10.0.0.1:8080"]);
        assert!(matches!(
            step.credentials[0].report,
            ReportOutcome::Reported { ref usage_message, .. }
                if usage_message == "Error 429: daily limit reached"
        ));
        assert_eq!(step.credentials[0].score, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn total_report_failure_is_not_credited() {
        let ws = TestWorkspace::new(&["Q1"]).expect("workspace");
        let agents = ScriptedAgents::new().reply_any("agent-0", "Answer");
        let telemetry = ScriptedTelemetry::new().failing_everywhere();
        let mut orch = orchestrator(
            agents,
            telemetry.clone(),
            settings(200, 10),
            endpoints(1),
            vec![Credential::new("0xw1")],
            ws.pool().expect("pool"),
            vec![proxy("10.0.0.1")],
        );

        let step = orch.run_step("Q1").await;

        assert!(matches!(step.credentials[0].report, ReportOutcome::Failed { .. }));
        assert_eq!(step.credentials[0].score, 0);
        assert_eq!(telemetry.calls().len(), 2);
    }
}
