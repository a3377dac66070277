//! Log redaction utilities.
//!
//! Sandbox launches carry per-server credentials read from the host
//! environment. Anything that might echo those values (container launch
//! logging, lint output, captured stderr) goes through this module first so
//! secrets never reach the log stream.

/// Minimum length for a secret to be redacted inside free text. Shorter
/// values cause false positives in legitimate content.
const MIN_SECRET_LENGTH_FOR_REDACTION: usize = 8;

/// Resolved secret values collected for one sandbox launch.
#[derive(Debug, Default, Clone)]
pub struct SecretContext {
    secrets: Vec<String>,
}

impl SecretContext {
    /// Collect the auth values for the given servers from the host
    /// environment. Base URLs are not secrets and are not collected.
    #[must_use]
    pub fn for_servers(server_names: &[String]) -> Self {
        let mut secrets: Vec<String> = server_names
            .iter()
            .filter_map(|name| std::env::var(crate::constants::server_auth_var(name)).ok())
            .filter(|value| !value.is_empty())
            .collect();
        secrets.sort();
        secrets.dedup();
        Self { secrets }
    }

    /// Redact every occurrence of a known secret in `text`.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();
        for secret in &self.secrets {
            if secret.len() >= MIN_SECRET_LENGTH_FOR_REDACTION {
                result = result.replace(secret, "[REDACTED]");
            }
        }
        result
    }

    /// True when this context holds at least one secret.
    #[must_use]
    pub const fn has_secrets(&self) -> bool {
        !self.secrets.is_empty()
    }
}

/// Whether an environment variable name carries credential material.
///
/// Single source of truth for deciding which injected variables get their
/// values masked when the container environment is logged.
#[must_use]
pub fn is_secret_env_var(name: &str) -> bool {
    name.ends_with(crate::constants::ENV_SUFFIX_AUTH)
}

/// Mask a value for display.
#[must_use]
pub fn redact_value(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        "[REDACTED]".to_string()
    }
}
