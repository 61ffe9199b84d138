//! JavaScript (Node.js) language handler

use super::{LanguageExecutor, result_close_marker, result_open_marker};
use crate::{
    constants::{NODE_DATA_HEADROOM_MB, container_images, sandbox_files},
    grading::sandbox::MemoryRlimit,
    models::Language,
};

const HARNESS_TEMPLATE: &str = r#""use strict";
const fs = require("fs");

const FUNCTION_NAME = "__FUNCTION_NAME__";
const OPEN_MARKER = "__OPEN_MARKER__";
const CLOSE_MARKER = "__CLOSE_MARKER__";

function serialize(value) {
  if (value === undefined || value === null) return "null";
  if (typeof value === "string") return value;
  if (typeof value === "boolean") return value ? "true" : "false";
  if (typeof value === "bigint") return value.toString();
  if (value instanceof Set) value = Array.from(value);
  if (value instanceof Map) value = Object.fromEntries(value);
  const json = JSON.stringify(value);
  return json === undefined ? String(value) : json;
}

async function main() {
  // Student logging must never reach the result channel
  const toStderr = (...parts) => console.error(...parts);
  console.log = toStderr;
  console.info = toStderr;
  console.debug = toStderr;

  const args = JSON.parse(fs.readFileSync("__ARGS_FILE__", "utf8"));
  const source = fs.readFileSync("__SOURCE_FILE__", "utf8");
  const module = { exports: {} };
  const load = new Function(
    "module",
    "exports",
    "require",
    source +
      "\n;return (typeof " + FUNCTION_NAME + " !== \"undefined\") ? " + FUNCTION_NAME +
      " : module.exports[\"" + FUNCTION_NAME + "\"];"
  );
  const fn = load(module, module.exports, require);
  if (typeof fn !== "function") {
    throw new Error("Function '" + FUNCTION_NAME + "' is not defined");
  }

  let result = fn(...args);
  if (result && typeof result.then === "function") {
    result = await result;
  }
  fs.writeSync(1, OPEN_MARKER + serialize(result) + CLOSE_MARKER);
}

main().catch((err) => {
  process.stderr.write((err && err.stack ? err.stack : String(err)) + "\n");
  process.exitCode = 1;
});
"#;

/// Runs submissions with Node.js
#[derive(Debug, Clone)]
pub struct JavaScriptExecutor {
    interpreter: String,
}

impl JavaScriptExecutor {
    pub fn new(interpreter: &str) -> Self {
        Self {
            interpreter: interpreter.to_string(),
        }
    }
}

impl LanguageExecutor for JavaScriptExecutor {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn source_file(&self) -> &'static str {
        "solution.js"
    }

    fn harness_file(&self) -> &'static str {
        "harness.js"
    }

    fn image(&self) -> &'static str {
        container_images::JAVASCRIPT
    }

    fn command(&self, memory_limit_mb: u64) -> Vec<String> {
        vec![
            self.interpreter.clone(),
            format!("--max-old-space-size={}", memory_limit_mb),
            self.harness_file().to_string(),
        ]
    }

    // V8 reserves far more virtual memory than it uses, so RLIMIT_AS would
    // kill it at startup. RLIMIT_DATA still catches off-heap Buffers.
    fn memory_rlimit(&self) -> MemoryRlimit {
        MemoryRlimit::Data {
            headroom_mb: NODE_DATA_HEADROOM_MB,
        }
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
