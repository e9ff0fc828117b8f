//! Quest runner for usage-reward campaigns.
//!
//! For each prompt in a shuffled batch, the runner asks a set of redundant
//! answering agents until one returns a useful answer, then reports that
//! answer's usage and time-to-first-token once per credential, optionally
//! through a sticky per-credential proxy. Prompts no agent can answer are
//! pruned and persisted. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (selection, rotation, scoring,
//!   stream decoding). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config and list files, HTTP
//!   transports, agent and telemetry clients). Behind traits so tests can
//!   script them.
//!
//! Orchestration modules ([`retry`], [`answer`], [`pool`], [`step`],
//! [`looping`]) coordinate core logic with I/O to implement a run.
//! [`register`] enrolls wallets with the auth service before their first run.

pub mod answer;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod pool;
pub mod register;
pub mod retry;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
