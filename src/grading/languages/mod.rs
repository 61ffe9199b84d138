//! Language-specific harness generation
//!
//! Each supported language implements [`LanguageExecutor`]; the
//! [`LanguageRegistry`] is the single table mapping a [`Language`] to its
//! implementation. Adding a language means one new module and one registry row.

pub mod javascript;
pub mod python;

use std::sync::Arc;

use super::sandbox::MemoryRlimit;
use crate::{config::SandboxConfig, models::Language};

pub use javascript::JavaScriptExecutor;
pub use python::PythonExecutor;

/// Marker opening the harness result record on stdout
pub fn result_open_marker(execution_id: &str) -> String {
    format!("<<<RESULT:{}>>>", execution_id)
}

/// Marker closing the harness result record on stdout
pub fn result_close_marker(execution_id: &str) -> String {
    format!("<<<END:{}>>>", execution_id)
}

/// Strategy for running submitted code of one language
pub trait LanguageExecutor: Send + Sync {
    /// Language handled by this executor
    fn language(&self) -> Language;

    /// File the submitted code is written to, relative to the workdir
    fn source_file(&self) -> &'static str;

    /// File the generated harness is written to, relative to the workdir
    fn harness_file(&self) -> &'static str;

    /// Container image used by the docker backend
    fn image(&self) -> &'static str;

    /// Program and arguments that run the harness from inside the workdir
    fn command(&self, memory_limit_mb: u64) -> Vec<String>;

    /// rlimit that bounds the interpreter's memory
    fn memory_rlimit(&self) -> MemoryRlimit {
        MemoryRlimit::AddressSpace
    }

    /// Generate the harness that loads the submission, calls
    /// `function_name(*args)` and writes the serialized return value between
    /// the result markers for `execution_id`, as the last thing on stdout.
    fn render_harness(&self, function_name: &str, execution_id: &str) -> String;
}

/// Fixed table of language executors
#[derive(Clone)]
pub struct LanguageRegistry {
    executors: Vec<Arc<dyn LanguageExecutor>>,
}

impl LanguageRegistry {
    /// Build the registry with the interpreters named in `config`
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            executors: vec![
                Arc::new(PythonExecutor::new(&config.python_bin)),
                Arc::new(JavaScriptExecutor::new(&config.node_bin)),
            ],
        }
    }

    /// Get the executor for a language
    pub fn get(&self, language: Language) -> Option<Arc<dyn LanguageExecutor>> {
        self.executors
            .iter()
            .find(|e| e.language() == language)
            .cloned()
    }

    /// Languages with a registered executor
    pub fn languages(&self) -> Vec<Language> {
        self.executors.iter().map(|e| e.language()).collect()
    }
}
