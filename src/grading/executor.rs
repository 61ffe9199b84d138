//! Code executor
//!
//! Turns one (code, language, arguments) triple into a sandboxed run of the
//! language harness and interprets what came back. Every way the submitted
//! code can misbehave ends up as an [`ExecutionFailure`]; nothing here
//! returns an error to the caller.

use std::{sync::Arc, time::Duration};

use serde_json::Value;
use uuid::Uuid;

use super::{
    languages::{LanguageRegistry, result_close_marker, result_open_marker},
    sandbox::{Sandbox, SandboxOutput, SandboxRequest},
};
use crate::{
    constants::{MAX_ERROR_MESSAGE_CHARS, sandbox_files},
    models::Language,
};

/// Why an execution did not produce a usable return value
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionFailure {
    TimeLimitExceeded { seconds: f64 },
    OutputLimitExceeded { bytes: usize },
    /// Non-zero exit or death by signal (`exit_code` is `None` then)
    RuntimeError { exit_code: Option<i32> },
    /// Clean exit without a result record
    MissingResult,
    /// Infrastructure problem unrelated to the submitted code
    Internal(String),
}

/// Result of running a submission against one argument list
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    /// Serialized return value, present only on success
    pub return_value: Option<String>,
    pub stderr: String,
    pub timed_out: bool,
    pub execution_time_ms: u64,
    pub failure: Option<ExecutionFailure>,
}

impl ExecutionOutcome {
    fn internal(message: String) -> Self {
        Self {
            return_value: None,
            stderr: String::new(),
            timed_out: false,
            execution_time_ms: 0,
            failure: Some(ExecutionFailure::Internal(message)),
        }
    }

    /// Human-readable error for a failed execution, `None` on success
    pub fn error_message(&self) -> Option<String> {
        let failure = self.failure.as_ref()?;
        let message = match failure {
            ExecutionFailure::TimeLimitExceeded { seconds } => {
                format!("Time limit exceeded ({}s)", seconds)
            }
            ExecutionFailure::OutputLimitExceeded { bytes } => {
                format!("Output limit exceeded ({} bytes)", bytes)
            }
            ExecutionFailure::RuntimeError { exit_code } => {
                let stderr = self.stderr.trim();
                if !stderr.is_empty() {
                    tail_chars(stderr, MAX_ERROR_MESSAGE_CHARS).to_string()
                } else if let Some(code) = exit_code {
                    format!("Process exited with code {}", code)
                } else {
                    "Process was terminated by a signal".to_string()
                }
            }
            ExecutionFailure::MissingResult => {
                "Program finished without returning a result".to_string()
            }
            ExecutionFailure::Internal(detail) => format!("Internal execution error: {}", detail),
        };
        Some(message)
    }
}

/// Runs submitted functions through the language harnesses
pub struct CodeExecutor {
    registry: LanguageRegistry,
    sandbox: Arc<dyn Sandbox>,
    memory_limit_mb: u64,
    output_limit_bytes: usize,
}

impl CodeExecutor {
    /// Create a new executor
    pub fn new(
        registry: LanguageRegistry,
        sandbox: Arc<dyn Sandbox>,
        memory_limit_mb: u64,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            registry,
            sandbox,
            memory_limit_mb,
            output_limit_bytes,
        }
    }

    /// Call `function_name(*args)` from `code` in a fresh sandbox
    pub async fn execute(
        &self,
        code: &str,
        language: Language,
        args: &[Value],
        function_name: &str,
        time_limit_seconds: f64,
    ) -> ExecutionOutcome {
        let Some(handler) = self.registry.get(language) else {
            return ExecutionOutcome::internal(format!("no executor for {}", language));
        };

        let args_json = match serde_json::to_string(args) {
            Ok(json) => json,
            Err(e) => return ExecutionOutcome::internal(format!("cannot encode arguments: {}", e)),
        };

        let execution_id = Uuid::new_v4().simple().to_string();
        let request = SandboxRequest {
            execution_id: execution_id.clone(),
            files: vec![
                (handler.source_file().to_string(), code.to_string()),
                (
                    handler.harness_file().to_string(),
                    handler.render_harness(function_name, &execution_id),
                ),
                (sandbox_files::ARGS.to_string(), args_json),
            ],
            command: handler.command(self.memory_limit_mb),
            image: handler.image().to_string(),
            time_limit: Duration::from_secs_f64(time_limit_seconds),
            memory_limit_mb: self.memory_limit_mb,
            memory_rlimit: handler.memory_rlimit(),
        };

        match self.sandbox.run(request).await {
            Ok(output) => self.interpret(output, &execution_id, time_limit_seconds),
            Err(e) => {
                tracing::error!(
                    execution_id = %execution_id,
                    language = %language,
                    error = %e,
                    "Sandbox failure"
                );
                ExecutionOutcome::internal(e.to_string())
            }
        }
    }

    fn interpret(
        &self,
        output: SandboxOutput,
        execution_id: &str,
        time_limit_seconds: f64,
    ) -> ExecutionOutcome {
        let mut outcome = ExecutionOutcome {
            return_value: None,
            stderr: output.stderr,
            timed_out: output.timed_out,
            execution_time_ms: output.execution_time_ms,
            failure: None,
        };

        // Deadline and output cap win over whatever the process managed to print
        if output.timed_out {
            outcome.failure = Some(ExecutionFailure::TimeLimitExceeded {
                seconds: time_limit_seconds,
            });
        } else if output.output_truncated {
            outcome.failure = Some(ExecutionFailure::OutputLimitExceeded {
                bytes: self.output_limit_bytes,
            });
        } else if output.exit_code != Some(0) {
            outcome.failure = Some(ExecutionFailure::RuntimeError {
                exit_code: output.exit_code,
            });
        } else {
            match extract_result(&output.stdout, execution_id) {
                Some(value) => outcome.return_value = Some(value.to_string()),
                None => outcome.failure = Some(ExecutionFailure::MissingResult),
            }
        }

        outcome
    }
}

/// Payload of the last complete result record for `execution_id`.
///
/// The harness writes its record after the submitted function returned, so
/// anything the function itself printed with the markers comes earlier.
pub fn extract_result<'a>(stdout: &'a str, execution_id: &str) -> Option<&'a str> {
    let open = result_open_marker(execution_id);
    let close = result_close_marker(execution_id);
    let start = stdout.rfind(&open)? + open.len();
    let end = stdout[start..].find(&close)? + start;
    Some(&stdout[start..end])
}

/// Last `max` characters of `s`
fn tail_chars(s: &str, max: usize) -> &str {
    match s.char_indices().rev().nth(max.saturating_sub(1)) {
        Some((idx, _)) if max > 0 => &s[idx..],
        _ if max == 0 => "",
        _ => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SandboxConfig,
        grading::sandbox::{MemoryRlimit, MockSandbox, ProcessSandbox, SandboxError},
        test_utils::interpreter_available,
    };
    use serde_json::json;

    fn executor(sandbox: MockSandbox) -> CodeExecutor {
        CodeExecutor::new(
            LanguageRegistry::new(&SandboxConfig::default()),
            Arc::new(sandbox),
            128,
            1024,
        )
    }

    fn wrap(request: &SandboxRequest, payload: &str) -> String {
        format!(
            "{}{}{}",
            result_open_marker(&request.execution_id),
            payload,
            result_close_marker(&request.execution_id)
        )
    }

    #[tokio::test]
    async fn test_successful_execution_returns_payload() {
        let mut sandbox = MockSandbox::new();
        sandbox
            .expect_run()
            .withf(|req| {
                req.files.iter().any(|(p, c)| p == "solution.py" && c.contains("def add"))
                    && req.files.iter().any(|(p, c)| p == "args.json" && c == "[2,3]")
                    && req.time_limit == Duration::from_millis(1500)
                    && req.memory_rlimit == MemoryRlimit::AddressSpace
            })
            .times(1)
            .returning(|req| {
                Ok(SandboxOutput {
                    stdout: wrap(&req, "5"),
                    stderr: "debug print\n".to_string(),
                    exit_code: Some(0),
                    execution_time_ms: 12,
                    ..Default::default()
                })
            });

        let outcome = executor(sandbox)
            .execute(
                "def add(a, b):\n    return a + b\n",
                Language::Python,
                &[json!(2), json!(3)],
                "add",
                1.5,
            )
            .await;

        assert_eq!(outcome.return_value.as_deref(), Some("5"));
        assert_eq!(outcome.failure, None);
        assert_eq!(outcome.error_message(), None);
        assert_eq!(outcome.execution_time_ms, 12);
        assert_eq!(outcome.stderr, "debug print\n");
    }

    #[tokio::test]
    async fn test_forged_markers_are_ignored() {
        let mut sandbox = MockSandbox::new();
        sandbox.expect_run().returning(|_| {
            Ok(SandboxOutput {
                stdout: "<<<RESULT:guess>>>42<<<END:guess>>>".to_string(),
                exit_code: Some(0),
                ..Default::default()
            })
        });

        let outcome = executor(sandbox)
            .execute("", Language::JavaScript, &[], "f", 1.0)
            .await;

        assert_eq!(outcome.return_value, None);
        assert_eq!(outcome.failure, Some(ExecutionFailure::MissingResult));
    }

    #[tokio::test]
    async fn test_timeout_wins_over_partial_output() {
        let mut sandbox = MockSandbox::new();
        sandbox.expect_run().returning(|req| {
            Ok(SandboxOutput {
                stdout: wrap(&req, "1"),
                timed_out: true,
                execution_time_ms: 5000,
                ..Default::default()
            })
        });

        let outcome = executor(sandbox)
            .execute("", Language::Python, &[], "f", 5.0)
            .await;

        assert!(outcome.timed_out);
        assert_eq!(outcome.return_value, None);
        assert_eq!(
            outcome.error_message().as_deref(),
            Some("Time limit exceeded (5s)")
        );
    }

    #[tokio::test]
    async fn test_output_limit() {
        let mut sandbox = MockSandbox::new();
        sandbox.expect_run().returning(|_| {
            Ok(SandboxOutput {
                output_truncated: true,
                ..Default::default()
            })
        });

        let outcome = executor(sandbox)
            .execute("", Language::Python, &[], "f", 1.0)
            .await;

        assert_eq!(
            outcome.error_message().as_deref(),
            Some("Output limit exceeded (1024 bytes)")
        );
    }

    #[tokio::test]
    async fn test_runtime_error_uses_stderr() {
        let mut sandbox = MockSandbox::new();
        sandbox.expect_run().returning(|_| {
            Ok(SandboxOutput {
                stderr: "Traceback...\nZeroDivisionError: division by zero\n".to_string(),
                exit_code: Some(1),
                ..Default::default()
            })
        });

        let outcome = executor(sandbox)
            .execute("", Language::Python, &[], "f", 1.0)
            .await;

        assert_eq!(
            outcome.failure,
            Some(ExecutionFailure::RuntimeError { exit_code: Some(1) })
        );
        assert!(
            outcome
                .error_message()
                .is_some_and(|m| m.ends_with("ZeroDivisionError: division by zero"))
        );
    }

    #[tokio::test]
    async fn test_silent_non_zero_exit() {
        let mut sandbox = MockSandbox::new();
        sandbox.expect_run().returning(|_| {
            Ok(SandboxOutput {
                exit_code: Some(3),
                ..Default::default()
            })
        });

        let outcome = executor(sandbox)
            .execute("", Language::Python, &[], "f", 1.0)
            .await;

        assert_eq!(
            outcome.error_message().as_deref(),
            Some("Process exited with code 3")
        );
    }

    #[tokio::test]
    async fn test_sandbox_error_becomes_internal_failure() {
        let mut sandbox = MockSandbox::new();
        sandbox.expect_run().returning(|_| {
            Err(SandboxError::InvalidRequest("boom".to_string()))
        });

        let outcome = executor(sandbox)
            .execute("", Language::Python, &[], "f", 1.0)
            .await;

        assert!(matches!(outcome.failure, Some(ExecutionFailure::Internal(_))));
        assert!(
            outcome
                .error_message()
                .is_some_and(|m| m.starts_with("Internal execution error"))
        );
    }

    #[tokio::test]
    async fn test_each_execution_gets_fresh_id() {
        let mut sandbox = MockSandbox::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorder = seen.clone();
        sandbox.expect_run().times(2).returning(move |req| {
            recorder.lock().unwrap().push(req.execution_id.clone());
            Ok(SandboxOutput {
                stdout: wrap(&req, "null"),
                exit_code: Some(0),
                ..Default::default()
            })
        });

        let executor = executor(sandbox);
        executor.execute("", Language::Python, &[], "f", 1.0).await;
        executor.execute("", Language::Python, &[], "f", 1.0).await;

        let ids = seen.lock().unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_extract_result() {
        let stdout = "noise<<<RESULT:id>>>[1,2]<<<END:id>>>";
        assert_eq!(extract_result(stdout, "id"), Some("[1,2]"));
        assert_eq!(extract_result(stdout, "other"), None);
        assert_eq!(extract_result("<<<RESULT:id>>>unterminated", "id"), None);

        let printed_by_student = "<<<RESULT:id>>>999<<<END:id>>>\n<<<RESULT:id>>>1<<<END:id>>>";
        assert_eq!(extract_result(printed_by_student, "id"), Some("1"));
    }

    #[test]
    fn test_tail_chars() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("ab", 3), "ab");
        assert_eq!(tail_chars("héllo", 4), "éllo");
        assert_eq!(tail_chars("abc", 0), "");
    }

    fn real_executor() -> CodeExecutor {
        let config = SandboxConfig {
            isolation: false,
            max_processes: 0,
            ..SandboxConfig::default()
        };
        CodeExecutor::new(
            LanguageRegistry::new(&config),
            Arc::new(ProcessSandbox::new(config.clone())),
            config.memory_limit_mb,
            config.output_limit_bytes,
        )
    }

    const PYTHON_SHAPES: &str = r#"
def solution(kind, a, b):
    print("debugging", kind)
    if kind == "none":
        return None
    if kind == "tuple":
        return (a, b)
    if kind == "set":
        return {a}
    if kind == "text":
        return "hello world"
    return a + b
"#;

    #[tokio::test]
    async fn test_python_harness_serializes_return_values() {
        if !interpreter_available("python3") {
            eprintln!("python3 not available; skipping");
            return;
        }
        let executor = real_executor();

        for (kind, expected) in [
            ("none", "null"),
            ("tuple", "[2,3]"),
            ("set", "[2]"),
            ("text", "hello world"),
            ("sum", "5"),
        ] {
            let outcome = executor
                .execute(PYTHON_SHAPES, Language::Python, &[json!(kind), json!(2), json!(3)], "solution", 5.0)
                .await;
            assert_eq!(outcome.return_value.as_deref(), Some(expected), "{kind}: {:?}", outcome);
            assert!(outcome.stderr.contains("debugging"), "prints belong on stderr");
        }
    }

    #[tokio::test]
    async fn test_python_harness_failures() {
        if !interpreter_available("python3") {
            eprintln!("python3 not available; skipping");
            return;
        }
        let executor = real_executor();

        let missing = executor
            .execute("def other():\n    return 1\n", Language::Python, &[], "solution", 5.0)
            .await;
        assert!(matches!(missing.failure, Some(ExecutionFailure::RuntimeError { .. })));
        assert!(
            missing
                .error_message()
                .is_some_and(|m| m.contains("Function 'solution' is not defined"))
        );

        let syntax = executor
            .execute("def solution(:\n", Language::Python, &[], "solution", 5.0)
            .await;
        assert!(syntax.error_message().is_some_and(|m| m.contains("SyntaxError")));

        let looping = executor
            .execute(
                "def solution():\n    while True:\n        pass\n",
                Language::Python,
                &[],
                "solution",
                0.5,
            )
            .await;
        assert!(looping.timed_out);
        assert_eq!(
            looping.failure,
            Some(ExecutionFailure::TimeLimitExceeded { seconds: 0.5 })
        );
    }

    #[tokio::test]
    async fn test_python_marker_printed_by_submission_does_not_replace_result() {
        if !interpreter_available("python3") {
            eprintln!("python3 not available; skipping");
            return;
        }
        let code = r#"
import sys

def solution():
    harness = sys.modules["__main__"]
    sys.__stdout__.write(harness.OPEN_MARKER + "999" + harness.CLOSE_MARKER)
    sys.__stdout__.flush()
    return 1
"#;
        let outcome = real_executor()
            .execute(code, Language::Python, &[], "solution", 5.0)
            .await;
        assert_eq!(outcome.return_value.as_deref(), Some("1"));
    }

    const JS_SHAPES: &str = r#"
function solution(kind, a, b) {
  console.log("debugging", kind);
  if (kind === "undefined") return undefined;
  if (kind === "set") return new Set([a, a, b]);
  if (kind === "map") return new Map([["k", a]]);
  if (kind === "bool") return a < b;
  return a + b;
}
"#;

    #[tokio::test]
    async fn test_javascript_harness_serializes_return_values() {
        if !interpreter_available("node") {
            eprintln!("node not available; skipping");
            return;
        }
        let executor = real_executor();

        for (kind, expected) in [
            ("undefined", "null"),
            ("set", "[2,3]"),
            ("map", r#"{"k":2}"#),
            ("bool", "true"),
            ("sum", "5"),
        ] {
            let outcome = executor
                .execute(JS_SHAPES, Language::JavaScript, &[json!(kind), json!(2), json!(3)], "solution", 5.0)
                .await;
            assert_eq!(outcome.return_value.as_deref(), Some(expected), "{kind}: {:?}", outcome);
            assert!(outcome.stderr.contains("debugging"), "console.log belongs on stderr");
        }
    }

    #[tokio::test]
    async fn test_javascript_harness_failures() {
        if !interpreter_available("node") {
            eprintln!("node not available; skipping");
            return;
        }
        let executor = real_executor();

        let missing = executor
            .execute("function other() { return 1; }", Language::JavaScript, &[], "solution", 5.0)
            .await;
        assert!(
            missing
                .error_message()
                .is_some_and(|m| m.contains("Function 'solution' is not defined"))
        );

        let syntax = executor
            .execute("function solution( {", Language::JavaScript, &[], "solution", 5.0)
            .await;
        assert!(syntax.error_message().is_some_and(|m| m.contains("SyntaxError")));

        let off_heap = executor
            .execute(
                "function solution() { return Buffer.alloc(1024 * 1024 * 1024).length; }",
                Language::JavaScript,
                &[],
                "solution",
                10.0,
            )
            .await;
        assert_eq!(off_heap.return_value, None);
        assert!(matches!(off_heap.failure, Some(ExecutionFailure::RuntimeError { .. })));
    }
}
