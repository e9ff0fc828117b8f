//! Run-level orchestration: one run processes one shuffled batch.

use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use crate::answer::AnswerConfig;
use crate::core::progress::ProgressTracker;
use crate::core::proxy::{ProxyDescriptor, ProxyRotator};
use crate::core::types::{AgentEndpoint, Credential};
use crate::io::agent::AgentBackend;
use crate::io::config::QuestConfig;
use crate::io::telemetry::Telemetry;
use crate::io::transport::TransportCache;
use crate::pool::QuestionPool;

/// Fixed parameters of a run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub goal_points: u32,
    pub credit_points: u32,
    /// Pause after each credential's reports.
    pub credential_delay: Duration,
    pub request_timeout: Duration,
    pub answer: AnswerConfig,
}

impl RunSettings {
    pub fn from_config(cfg: &QuestConfig) -> Self {
        Self {
            goal_points: cfg.goal_points,
            credit_points: cfg.credit_points,
            credential_delay: cfg.credential_delay(),
            request_timeout: cfg.request_timeout(),
            answer: AnswerConfig {
                retry: cfg.retry_policy(),
                fallback_delay: cfg.agent_retry_delay(),
            },
        }
    }
}

/// Why `run_batch` stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStop {
    /// Every selected credential reached the goal; the process should exit.
    GoalReached,
    /// All prompts in the batch were processed without reaching the goal.
    BatchExhausted,
    /// The working set was empty.
    PoolEmpty,
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub prompts_processed: u32,
    pub prompts_pruned: u32,
    /// Final score per credential, in selection order.
    pub scores: Vec<(String, u32)>,
    pub stop: RunStop,
}

/// Mutable state scoped to one run.
#[derive(Debug)]
pub(crate) struct RunState {
    pub(crate) progress: ProgressTracker,
    pub(crate) rotator: ProxyRotator,
    pub(crate) transports: TransportCache,
}

/// Everything an [`Orchestrator`] is built from.
pub struct OrchestratorParts<A, T, R> {
    pub agents: A,
    pub telemetry: T,
    pub rng: R,
    pub settings: RunSettings,
    pub endpoints: Vec<AgentEndpoint>,
    pub credentials: Vec<Credential>,
    pub pool: QuestionPool,
    pub use_proxy: bool,
    pub proxies: Vec<ProxyDescriptor>,
}

/// Drives prompts through the agents and reports usage for each credential.
///
/// Credentials and prompts are processed strictly one at a time.
pub struct Orchestrator<A, T, R> {
    pub(crate) agents: A,
    pub(crate) telemetry: T,
    pub(crate) rng: R,
    pub(crate) settings: RunSettings,
    pub(crate) endpoints: Vec<AgentEndpoint>,
    pub(crate) credentials: Vec<Credential>,
    pub(crate) pool: QuestionPool,
    pub(crate) state: RunState,
}

impl<A, T, R> Orchestrator<A, T, R>
where
    A: AgentBackend,
    T: Telemetry,
    R: Rng,
{
    pub fn new(parts: OrchestratorParts<A, T, R>) -> Self {
        let state = RunState {
            progress: ProgressTracker::new(parts.settings.goal_points),
            rotator: ProxyRotator::new(parts.use_proxy, parts.proxies),
            transports: TransportCache::new(parts.settings.request_timeout),
        };
        Self {
            agents: parts.agents,
            telemetry: parts.telemetry,
            rng: parts.rng,
            settings: parts.settings,
            endpoints: parts.endpoints,
            credentials: parts.credentials,
            pool: parts.pool,
            state,
        }
    }

    pub fn score(&self, address: &str) -> u32 {
        self.state.progress.score(address)
    }

    /// Reset run state, draw a fresh batch, and process it prompt by prompt.
    ///
    /// Returns early with [`RunStop::GoalReached`] as soon as every credential
    /// has reached the goal.
    pub async fn run_batch(&mut self) -> RunOutcome {
        self.reset_run_state();
        let batch = self.pool.next_batch(&mut self.rng);
        info!(
            prompts = batch.len(),
            credentials = self.credentials.len(),
            "run started"
        );

        let mut prompts_processed = 0u32;
        let mut prompts_pruned = 0u32;
        if batch.is_empty() {
            warn!("no prompts left to ask (all pruned?)");
            return self.outcome(prompts_processed, prompts_pruned, RunStop::PoolEmpty);
        }

        for prompt in &batch {
            let step = self.run_step(prompt).await;
            prompts_processed += 1;
            if step.pruned {
                prompts_pruned += 1;
            }
            if step.goal_reached {
                info!(goal = self.settings.goal_points, "every wallet reached the goal");
                return self.outcome(prompts_processed, prompts_pruned, RunStop::GoalReached);
            }
        }

        info!(prompts_processed, prompts_pruned, "batch exhausted");
        self.outcome(prompts_processed, prompts_pruned, RunStop::BatchExhausted)
    }

    fn reset_run_state(&mut self) {
        self.state
            .progress
            .reset(self.credentials.iter().map(|c| c.address.as_str()));
        self.state.rotator.reset();
        if self.state.rotator.is_degraded() {
            warn!("proxy usage is enabled but the proxy list is empty; using direct connections");
        }
    }

    fn outcome(&self, prompts_processed: u32, prompts_pruned: u32, stop: RunStop) -> RunOutcome {
        RunOutcome {
            prompts_processed,
            prompts_pruned,
            scores: self
                .credentials
                .iter()
                .map(|c| (c.address.clone(), self.state.progress.score(&c.address)))
                .collect(),
            stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        ScriptedAgents, ScriptedTelemetry, TestWorkspace, endpoints, orchestrator, settings,
    };

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_goal_without_processing_more_prompts() {
        let prompts: Vec<String> = (0..25).map(|i| format!("Q{i}")).collect();
        let prompt_refs: Vec<&str> = prompts.iter().map(String::as_str).collect();
        let ws = TestWorkspace::new(&prompt_refs).expect("workspace");
        let agents = ScriptedAgents::new().reply_any("agent-0", "useful");
        let telemetry = ScriptedTelemetry::new();
        let mut orch = orchestrator(
            agents,
            telemetry,
            settings(200, 10),
            endpoints(2),
            vec![Credential::new("0xw1")],
            ws.pool().expect("pool"),
            Vec::new(),
        );

        let outcome = orch.run_batch().await;

        assert_eq!(outcome.stop, RunStop::GoalReached);
        assert_eq!(outcome.prompts_processed, 20);
        assert_eq!(outcome.scores, vec![("0xw1".to_string(), 200)]);
        assert_eq!(orch.telemetry.usage_reports().len(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_pool_stops_immediately() {
        let ws = TestWorkspace::new(&["Q1"]).expect("workspace");
        ws.write_pruned(&["Q1"]).expect("pruned");
        let mut orch = orchestrator(
            ScriptedAgents::new(),
            ScriptedTelemetry::new(),
            settings(200, 10),
            endpoints(2),
            vec![Credential::new("0xw1")],
            ws.pool().expect("pool"),
            Vec::new(),
        );

        let outcome = orch.run_batch().await;

        assert_eq!(outcome.stop, RunStop::PoolEmpty);
        assert_eq!(outcome.prompts_processed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_pruned_file_does_not_stop_the_run() {
        let ws = TestWorkspace::new(&["Q1", "Q2"]).expect("workspace");
        let mut orch = orchestrator(
            ScriptedAgents::new().reply_any("agent-0", "useful"),
            ScriptedTelemetry::new(),
            settings(200, 10),
            endpoints(1),
            vec![Credential::new("0xw1")],
            ws.pool().expect("pool"),
            Vec::new(),
        );
        std::fs::write(ws.pruned_path(), "not json").expect("corrupt");

        let outcome = orch.run_batch().await;

        assert_eq!(outcome.stop, RunStop::BatchExhausted);
        assert_eq!(outcome.prompts_processed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn each_run_resets_scores() {
        let ws = TestWorkspace::new(&["Q1", "Q2"]).expect("workspace");
        let agents = ScriptedAgents::new().reply_any("agent-0", "useful");
        let mut orch = orchestrator(
            agents,
            ScriptedTelemetry::new(),
            settings(200, 10),
            endpoints(1),
            vec![Credential::new("0xw1")],
            ws.pool().expect("pool"),
            Vec::new(),
        );

        let first = orch.run_batch().await;
        let second = orch.run_batch().await;

        assert_eq!(first.stop, RunStop::BatchExhausted);
        assert_eq!(first.scores, vec![("0xw1".to_string(), 20)]);
        assert_eq!(second.scores, vec![("0xw1".to_string(), 20)]);
    }
}
