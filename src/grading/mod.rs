//! Grading engine
//!
//! Leaves first: `input` turns raw test-case input into arguments, `sandbox`
//! and `languages` run a harness in isolation, `executor` interprets the run,
//! `comparator` checks the return value and `scoring` aggregates the results.

pub mod comparator;
pub mod executor;
pub mod input;
pub mod languages;
pub mod sandbox;
pub mod scoring;

pub use comparator::{ComparisonPolicy, compare};
pub use executor::{CodeExecutor, ExecutionFailure, ExecutionOutcome};
pub use input::InputError;
pub use languages::{LanguageExecutor, LanguageRegistry};
pub use sandbox::{
    DockerSandbox, MemoryRlimit, ProcessSandbox, Sandbox, SandboxError, SandboxOutput,
    SandboxRequest,
};
pub use scoring::{ScoreSummary, aggregate};
