//! Input validation utilities

use std::sync::LazyLock;

use regex::Regex;

use crate::constants;

/// Identifiers valid in both Python and JavaScript
static FUNCTION_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("valid regex"));

/// Validate source code size
pub fn validate_source_code(code: &str) -> Result<(), &'static str> {
    if code.trim().is_empty() {
        return Err("Source code cannot be empty");
    }
    if code.len() > constants::MAX_SOURCE_CODE_SIZE {
        return Err("Source code exceeds maximum size of 64KB");
    }
    Ok(())
}

/// Validate the entry point an exercise asks the harness to call.
///
/// The name is spliced into generated harness code, so only plain
/// identifiers are accepted.
pub fn validate_function_name(name: &str) -> Result<(), &'static str> {
    if name.len() > 100 {
        return Err("Function name must be at most 100 characters");
    }
    if !FUNCTION_NAME_RE.is_match(name) {
        return Err("Function name must be a plain identifier");
    }
    Ok(())
}
