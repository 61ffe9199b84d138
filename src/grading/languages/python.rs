//! Python language handler

use super::{LanguageExecutor, result_close_marker, result_open_marker};
use crate::{
    constants::{container_images, sandbox_files},
    models::Language,
};

/// The markers keep ordinary prints from being mistaken for the result.
/// They are not a boundary: the submission runs in the harness process and
/// can read them, which is why the executor trusts only the last record.
const HARNESS_TEMPLATE: &str = r#"import importlib.util
import json
import sys
import traceback

FUNCTION_NAME = "__FUNCTION_NAME__"
OPEN_MARKER = "__OPEN_MARKER__"
CLOSE_MARKER = "__CLOSE_MARKER__"


def serialize(value):
    if value is None:
        return "null"
    if isinstance(value, bool):
        return "true" if value else "false"
    if isinstance(value, str):
        return value
    if isinstance(value, (set, frozenset, tuple)):
        value = list(value)
    return json.dumps(value, separators=(",", ":"), default=str)


def main():
    result_channel = sys.stdout
    # Student prints must never reach the result channel
    sys.stdout = sys.stderr
    try:
        with open("__ARGS_FILE__", encoding="utf-8") as fh:
            args = json.load(fh)
        spec = importlib.util.spec_from_file_location("solution", "__SOURCE_FILE__")
        module = importlib.util.module_from_spec(spec)
        spec.loader.exec_module(module)
        func = getattr(module, FUNCTION_NAME, None)
        if not callable(func):
            sys.stderr.write("Function '%s' is not defined\n" % FUNCTION_NAME)
            return 1
        payload = serialize(func(*args))
    except BaseException:
        traceback.print_exc()
        return 1
    result_channel.write(OPEN_MARKER + payload + CLOSE_MARKER)
    result_channel.flush()
    return 0


if __name__ == "__main__":
    sys.exit(main())
"#;

/// Runs submissions with CPython
#[derive(Debug, Clone)]
pub struct PythonExecutor {
    interpreter: String,
}

impl PythonExecutor {
    pub fn new(interpreter: &str) -> Self {
        Self {
            interpreter: interpreter.to_string(),
        }
    }
}

impl LanguageExecutor for PythonExecutor {
    fn language(&self) -> Language {
        Language::Python
    }

    fn source_file(&self) -> &'static str {
        "solution.py"
    }

    fn harness_file(&self) -> &'static str {
        "harness.py"
    }

    fn image(&self) -> &'static str {
        container_images::PYTHON
    }

    fn command(&self, _memory_limit_mb: u64) -> Vec<String> {
        // -I: isolated mode (no user site, no PYTHON* env), -B: no .pyc files
        vec![
            self.interpreter.clone(),
            "-I".to_string(),
            "-B".to_string(),
            self.harness_file().to_string(),
        ]
    }

    fn render_harness(&self, function_name: &str, execution_id: &str) -> String {
        HARNESS_TEMPLATE
            .replace("__FUNCTION_NAME__", function_name)
            .replace("__OPEN_MARKER__", &result_open_marker(execution_id))
            .replace("__CLOSE_MARKER__", &result_close_marker(execution_id))
            .replace("__ARGS_FILE__", sandbox_files::ARGS)
            .replace("__SOURCE_FILE__", self.source_file())
    }
}
