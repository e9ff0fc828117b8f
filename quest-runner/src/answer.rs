//! Answer selection across redundant agent endpoints.
//!
//! Endpoints are tried in random order without replacement until one returns a
//! useful answer. Every endpoint is tried at most once per prompt, and all of
//! them are tried before the prompt is declared exhausted.

use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use crate::core::selector::TriedSet;
use crate::core::types::{AgentEndpoint, Answer, AnswerOutcome};
use crate::core::usefulness::is_useful;
use crate::io::agent::AgentBackend;
use crate::retry::{RetryPolicy, is_timeout, with_retry};

/// Knobs for one selection pass.
#[derive(Debug, Clone, Copy)]
pub struct AnswerConfig {
    pub retry: RetryPolicy,
    /// Pause before moving on to the next endpoint.
    pub fallback_delay: Duration,
}

/// Ask the endpoint set about `prompt`.
///
/// After an unhelpful or failed answer, waits `fallback_delay` before the next
/// endpoint. No pause follows the final endpoint: an exhausted prompt returns
/// at once.
pub async fn answer_prompt<A, R>(
    backend: &A,
    endpoints: &[AgentEndpoint],
    prompt: &str,
    config: &AnswerConfig,
    rng: &mut R,
) -> AnswerOutcome
where
    A: AgentBackend + ?Sized,
    R: Rng + ?Sized,
{
    let mut tried = TriedSet::new(endpoints.len());
    let mut order = Vec::with_capacity(endpoints.len());

    while let Some(idx) = tried.pick(rng) {
        let endpoint = &endpoints[idx];
        order.push(endpoint.id.clone());
        info!(endpoint = %endpoint.name, "asking agent");

        let label = format!("ask {}", endpoint.name);
        let result = with_retry(&config.retry, &label, is_timeout, || {
            backend.ask(endpoint, prompt)
        })
        .await;

        match result {
            Ok(reply) if is_useful(&reply.text) => {
                return AnswerOutcome::Answered(Answer {
                    endpoint: endpoint.clone(),
                    text: reply.text,
                    first_token: reply.first_token,
                });
            }
            Ok(_) => {
                info!(endpoint = %endpoint.name, "answer was unhelpful, trying another agent");
            }
            Err(err) => {
                warn!(endpoint = %endpoint.name, error = %format!("{err:#}"), "agent request failed");
            }
        }

        if !tried.is_exhausted() && !config.fallback_delay.is_zero() {
            tokio::time::sleep(config.fallback_delay).await;
        }
    }

    AnswerOutcome::Exhausted { tried: order }
}
