//! Error handling module for MFP
//!
//! All application failures are represented by a single [`Error`] enum. Typed
//! variants mirror the pipeline stages (compile, security scan, lint, sandbox
//! execution, cache) so that the meta-tool surface can flatten each failure to
//! a stable `error_type` token, and carry their stage-specific payloads
//! (linter output, sandbox stderr and exit code) alongside the message.

use crate::constants;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // External errors that convert directly
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Swagger parsing or code generation failure.
    #[error("Compile error: {message}")]
    Compile { message: Cow<'static, str> },

    /// Failed to fetch or load a swagger document. A subkind of compile
    /// failure: the compile loop treats it identically.
    #[error("Spec fetch error: {message}")]
    SpecFetch { message: String },

    /// Submitted code failed the static security scan.
    #[error("Security violation: {message}")]
    Security { message: String },

    /// Submitted code failed linting. Carries the linter's output.
    #[error("Lint error: {message}")]
    Lint { message: String, output: String },

    /// Sandbox exited non-zero or could not be driven.
    #[error("Execution error: {message}")]
    Execution {
        message: String,
        stderr: String,
        exit_code: i32,
    },

    /// Sandbox exceeded the execution deadline.
    #[error("Execution timed out after {seconds}s")]
    ExecutionTimeout { seconds: u64 },

    /// Cache store read/write failure.
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// Requested server is not in the registry.
    #[error("Server '{name}' not found. Available: {available:?}")]
    ServerNotFound { name: String, available: Vec<String> },

    /// Requested function does not exist within a known server.
    #[error("Function '{function}' not found in server '{server}'. Available: {available:?}")]
    FunctionNotFound {
        server: String,
        function: String,
        available: Vec<String>,
    },

    /// Invalid or missing configuration.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Create a compile error.
    pub fn compile(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Compile {
            message: message.into(),
        }
    }

    /// Create a spec fetch error.
    pub fn spec_fetch(message: impl Into<String>) -> Self {
        Self::SpecFetch {
            message: message.into(),
        }
    }

    /// Create a security violation.
    pub fn security(message: impl Into<String>) -> Self {
        Self::Security {
            message: message.into(),
        }
    }

    /// Create a lint error carrying the linter's stdout.
    pub fn lint(message: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Lint {
            message: message.into(),
            output: output.into(),
        }
    }

    /// Create an execution error with sandbox stderr and exit code.
    pub fn execution(message: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self::Execution {
            message: message.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Create an execution timeout error.
    #[must_use]
    pub const fn execution_timeout(seconds: u64) -> Self {
        Self::ExecutionTimeout { seconds }
    }

    /// Create a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Create a server-not-found error listing the registered servers.
    pub fn server_not_found(name: impl Into<String>, available: Vec<String>) -> Self {
        Self::ServerNotFound {
            name: name.into(),
            available,
        }
    }

    /// Create a function-not-found error listing the server's functions.
    pub fn function_not_found(
        server: impl Into<String>,
        function: impl Into<String>,
        available: Vec<String>,
    ) -> Self {
        Self::FunctionNotFound {
            server: server.into(),
            function: function.into(),
            available,
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The stable `error_type` token for this failure class, as surfaced to
    /// the LLM through the meta-tool responses.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Security { .. } => constants::ERROR_TYPE_SECURITY,
            Self::Lint { .. } => constants::ERROR_TYPE_LINT,
            Self::ExecutionTimeout { .. } => constants::ERROR_TYPE_TIMEOUT,
            Self::Execution { .. } => constants::ERROR_TYPE_EXECUTION,
            Self::Cache { .. } => constants::ERROR_TYPE_CACHE,
            Self::ServerNotFound { .. } => constants::ERROR_TYPE_SERVER_NOT_FOUND,
            Self::FunctionNotFound { .. } => constants::ERROR_TYPE_FUNCTION_NOT_FOUND,
            _ => constants::ERROR_TYPE_INTERNAL,
        }
    }

    /// Whether this error originated in the compile phase.
    #[must_use]
    pub const fn is_compile_error(&self) -> bool {
        matches!(self, Self::Compile { .. } | Self::SpecFetch { .. })
    }

    /// Convert to the structured JSON representation used for CLI
    /// `--json-errors` output.
    #[must_use]
    pub fn to_json(&self) -> JsonError {
        JsonError {
            error_type: Cow::Borrowed(self.error_type()),
            message: self.to_string(),
            detail: match self {
                Self::Lint { output, .. } => Some(output.clone()),
                Self::Execution { stderr, .. } => Some(stderr.clone()),
                _ => None,
            },
        }
    }
}

/// JSON representation of an error for structured output.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonError {
    pub error_type: Cow<'static, str>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_tokens() {
        assert_eq!(Error::security("bad").error_type(), "security");
        assert_eq!(Error::lint("msg", "out").error_type(), "lint");
        assert_eq!(Error::execution_timeout(30).error_type(), "timeout");
        assert_eq!(Error::execution("m", "s", 1).error_type(), "execution");
        assert_eq!(Error::cache("db").error_type(), "cache");
        assert_eq!(
            Error::server_not_found("x", vec![]).error_type(),
            "server_not_found"
        );
        assert_eq!(
            Error::function_not_found("x", "y", vec![]).error_type(),
            "function_not_found"
        );
        assert_eq!(Error::compile("boom").error_type(), "internal");
        assert_eq!(Error::config("missing").error_type(), "internal");
    }

    #[test]
    fn test_spec_fetch_is_compile_error() {
        assert!(Error::spec_fetch("net down").is_compile_error());
        assert!(Error::compile("bad yaml").is_compile_error());
        assert!(!Error::cache("oops").is_compile_error());
    }

    #[test]
    fn test_to_json_carries_stage_payload() {
        let err = Error::execution("sandbox exited with code 2", "KeyError: 'x'", 2);
        let json = err.to_json();
        assert_eq!(json.error_type, "execution");
        assert_eq!(json.detail.as_deref(), Some("KeyError: 'x'"));
    }
}
