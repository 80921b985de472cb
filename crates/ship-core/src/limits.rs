//! Named bounds on the Judge's retry and convergence loops.
//!
//! The source this engine is modeled on left these as scattered magic
//! numbers; collecting them here makes the convergence ladder in
//! [`crate::judge`] readable top to bottom.

use std::time::Duration;

/// A `failed` task is retried until its `retries` counter reaches this
/// bound, after which it is cascaded instead.
pub const MAX_RETRIES: u32 = 10;

/// Number of passing adversarial rounds required before the Judge
/// declares the goal satisfied.
pub const MAX_ADV_ROUNDS: u32 = 3;

/// Consecutive adversarial rounds that may come back with no novel
/// challenges before the Judge gives up and finalizes anyway.
pub const MAX_ADV_ATTEMPTS: u32 = 3;

/// Upper bound on Refiner invocations per run.
pub const MAX_REFINE_ROUNDS: u32 = 10;

/// Upper bound on Replanner invocations per run.
pub const MAX_REPLAN_ROUNDS: u32 = 1;

/// How often the Judge wakes up to scan state.
pub const JUDGE_TICK: Duration = Duration::from_secs(5);

/// Grace period between SIGTERM and SIGKILL when stopping an LLM
/// subprocess, either on timeout or on cancellation.
pub const PROCESS_KILL_GRACE: Duration = Duration::from_secs(10);
