//! Static security policies for user-submitted code.
//!
//! Three literal sets drive the AST guard: blocked modules, blocked calls,
//! and blocked attributes. There is no allowlist enforcement: modules
//! outside the blocked set (notably generated `<server>.functions` modules)
//! are permitted; `ALLOWED_MODULES` documents the sandbox image contents for
//! the LLM-facing tool descriptions.

use crate::error::Error;
use tracing::warn;

/// Modules that may never be imported, by top-level name.
pub const BLOCKED_MODULES: &[&str] = &[
    // Process / filesystem access
    "os",
    "sys",
    "subprocess",
    "shutil",
    "pathlib",
    "glob",
    "tempfile",
    "io",
    "pty",
    "tty",
    "termios",
    // Network (httpx is the sanctioned client)
    "socket",
    "urllib",
    "http",
    "requests",
    "aiohttp",
    "xmlrpc",
    "ftplib",
    "smtplib",
    "poplib",
    "imaplib",
    "telnetlib",
    // Reflection / debugging
    "inspect",
    "ast",
    "pdb",
    "dis",
    "gc",
    "code",
    "codeop",
    "trace",
    "profile",
    "pstats",
    "timeit",
    "tokenize",
    "token",
    "keyword",
    "symtable",
    // Serialization with code execution
    "pickle",
    "marshal",
    "shelve",
    // Concurrency
    "threading",
    "multiprocessing",
    "concurrent",
    // Low-level
    "ctypes",
    "signal",
    "resource",
    // Web frameworks
    "flask",
    "django",
    "fastapi",
    "starlette",
    "tornado",
    // Interpreter internals
    "builtins",
    "importlib",
    "pkgutil",
];

/// Modules available inside the sandbox image (informational; the guard does
/// not enforce this list).
pub const ALLOWED_MODULES: &[&str] = &[
    "httpx",
    "json",
    "datetime",
    "re",
    "math",
    "typing",
    "dataclasses",
    "collections",
    "itertools",
    "functools",
    "operator",
    "string",
    "decimal",
    "statistics",
    "enum",
    "copy",
    "hashlib",
    "hmac",
    "base64",
    "time",
    "uuid",
];

/// Builtin calls that are never allowed.
pub const BLOCKED_CALLS: &[&str] = &[
    "eval",
    "exec",
    "compile",
    "__import__",
    "open",
    "input",
    "breakpoint",
    "vars",
    "dir",
    "globals",
    "locals",
];

/// Attribute names whose read or call is never allowed: class-introspection
/// dunders plus environment and process access.
pub const BLOCKED_ATTRIBUTES: &[&str] = &[
    "__class__",
    "__subclasses__",
    "__globals__",
    "__builtins__",
    "__mro__",
    "__bases__",
    "__dict__",
    "__loader__",
    "__spec__",
    "__import__",
    "environ",
    "system",
    "popen",
    "spawn",
    "fork",
    "kill",
    "getenv",
    "setenv",
    "putenv",
];

#[must_use]
pub fn is_blocked_module(top_level: &str) -> bool {
    BLOCKED_MODULES.contains(&top_level)
}

#[must_use]
pub fn is_blocked_call(name: &str) -> bool {
    BLOCKED_CALLS.contains(&name)
}

#[must_use]
pub fn is_blocked_attribute(name: &str) -> bool {
    BLOCKED_ATTRIBUTES.contains(&name)
}

/// Reject a mutating method against a read-only server.
///
/// Compile-time filtering never generates mutating endpoints for read-only
/// sources, but compiled output on disk can predate a source flipping to
/// read-only. The executor calls this for every function a program imports
/// from a read-only server before launching the sandbox.
///
/// # Errors
///
/// Returns [`Error::Security`] when `method` mutates state.
pub fn enforce_read_only(method: &str, server_name: &str) -> Result<(), Error> {
    if crate::constants::is_mutating_method(method) {
        warn!(server = %server_name, method = %method, "read-only violation");
        return Err(Error::security(format!(
            "Server '{server_name}' is read-only but code attempts {method} operation"
        )));
    }
    Ok(())
}

/// Verify that a URL's host is covered by the allowed-domains list.
/// An empty list permits all domains.
///
/// # Errors
///
/// Returns [`Error::Security`] when the host matches no allowed domain.
pub fn check_domain_allowed(url: &str, allowed_domains: &[String]) -> Result<(), Error> {
    if allowed_domains.is_empty() {
        return Ok(());
    }

    let hostname = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();

    let allowed = allowed_domains
        .iter()
        .any(|domain| hostname == *domain || hostname.ends_with(&format!(".{domain}")));

    if allowed {
        Ok(())
    } else {
        warn!(url = %url, hostname = %hostname, "domain blocked");
        Err(Error::security(format!(
            "Domain '{hostname}' is not in the allowed domains list"
        )))
    }
}
