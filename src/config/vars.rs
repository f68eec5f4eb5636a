//! Environment variable interpolation for config files.
//!
//! Supported syntax:
//! - `$VAR` or `${VAR}` - substitute the env var value, error if missing
//! - `${VAR:-default}` - use the default if VAR is unset OR empty
//! - `${VAR-default}` - use the default only if VAR is unset
//! - `$$` - literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # escape sequence
        |
        \$\{
            ([A-Za-z_][A-Za-z0-9_]*)   # braced variable name
            (?:
                (:?-)                  # default separator, :- or -
                ([^}]*)                # default value
            )?
        \}
        |
        \$([A-Za-z_][A-Za-z0-9_]*)     # unbraced variable
        ",
    )
    .expect("Invalid regex pattern")
});

/// Result of environment variable interpolation.
///
/// Errors are accumulated rather than failing fast so the user sees every
/// missing variable at once.
#[derive(Debug)]
pub struct InterpolationResult {
    pub text: String,
    pub errors: Vec<String>,
}

impl InterpolationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Interpolate environment variables in the given text.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN
        .replace_all(input, |caps: &Captures| resolve(caps, &mut errors))
        .to_string();

    InterpolationResult { text, errors }
}

fn resolve(caps: &Captures, errors: &mut Vec<String>) -> String {
    let full_match = caps.get(0).unwrap().as_str();
    if full_match == "$$" {
        return "$".to_string();
    }

    let name = caps
        .get(1)
        .or_else(|| caps.get(4))
        .map(|m| m.as_str())
        .unwrap_or_default();
    let separator = caps.get(2).map(|m| m.as_str());
    let default = caps.get(3).map(|m| m.as_str());

    match env::var(name) {
        Ok(value) => {
            // Block config injection through multi-line values.
            if value.contains('\n') || value.contains('\r') {
                errors.push(format!(
                    "environment variable '{name}' contains newlines, which is not allowed"
                ));
                return full_match.to_string();
            }
            if value.is_empty() && separator == Some(":-") {
                return default.unwrap_or_default().to_string();
            }
            value
        }
        Err(_) => match default {
            Some(default) => default.to_string(),
            None => {
                errors.push(format!("environment variable '{name}' is not set"));
                full_match.to_string()
            }
        },
    }
}
