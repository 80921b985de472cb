//! Orchestration core: the planner -> queue -> worker-pool -> judge
//! control loop that turns a design document into a completed
//! codebase by driving an external LLM coding-agent CLI.
//!
//! [`ship_store`] owns durable state; this crate owns everything that
//! decides what to do with it.

pub mod config;
pub mod judge;
pub mod limits;
pub mod llm;
pub mod planner;
pub mod prompts;
pub mod queue;
pub mod refiner;
pub mod replanner;
pub mod spec_diff;
pub mod tags;
pub mod validator;
pub mod verifier;
pub mod worker;

pub use config::Config;
pub use judge::Judge;
pub use llm::{ClaudeCodeLlm, ClaudeConfig, LlmClient, LlmError};
pub use planner::{PlanParseError, Planner};
pub use queue::{WorkQueue, WorkerInbox};
pub use refiner::Refiner;
pub use replanner::Replanner;
pub use spec_diff::{SpecDecision, SpecDiffJudge};
pub use validator::{ValidationResult, Validator};
pub use verifier::Verifier;
pub use worker::Worker;
