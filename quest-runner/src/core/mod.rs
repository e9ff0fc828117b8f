//! Deterministic, pure logic shared by the quest runner.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests; any
//! randomness comes from an RNG supplied by the caller.

pub mod backlog;
pub mod progress;
pub mod proxy;
pub mod selector;
pub mod sse;
pub mod types;
pub mod usefulness;
