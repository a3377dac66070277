//! Centralized string constants for MFP
//!
//! Commonly used literals live here to keep the env-variable scheme, on-disk
//! layout, and wire tokens consistent across the codebase.

// Environment variable scheme
pub const ENV_PREFIX: &str = "MFP_";
pub const ENV_SUFFIX_BASE_URL: &str = "_BASE_URL";
pub const ENV_SUFFIX_AUTH: &str = "_AUTH";

// Compiled directory layout
pub const FUNCTIONS_FILENAME: &str = "functions.py";
pub const MANIFEST_FILENAME: &str = "manifest.json";
pub const INIT_FILENAME: &str = "__init__.py";

// HTTP methods
pub const HTTP_METHOD_GET: &str = "GET";
pub const HTTP_METHOD_POST: &str = "POST";
pub const HTTP_METHOD_PUT: &str = "PUT";
pub const HTTP_METHOD_PATCH: &str = "PATCH";
pub const HTTP_METHOD_DELETE: &str = "DELETE";
pub const HTTP_METHOD_HEAD: &str = "HEAD";
pub const HTTP_METHOD_OPTIONS: &str = "OPTIONS";

/// All HTTP methods the parser will consider.
pub const STANDARD_METHODS: &[&str] = &[
    "get", "post", "put", "patch", "delete", "head", "options",
];

/// Methods that mutate server state. Dropped from read-only sources.
pub const MUTATING_METHODS: &[&str] = &["POST", "PUT", "PATCH", "DELETE"];

/// Methods that carry a JSON request body in generated functions.
pub const BODY_METHODS: &[&str] = &["POST", "PUT", "PATCH"];

// Parameter locations
pub const PARAM_LOCATION_QUERY: &str = "query";
pub const PARAM_LOCATION_PATH: &str = "path";
pub const PARAM_LOCATION_HEADER: &str = "header";
pub const PARAM_LOCATION_BODY: &str = "body";

// Content types
pub const CONTENT_TYPE_JSON: &str = "application/json";

// Error-type tokens surfaced to the LLM
pub const ERROR_TYPE_SECURITY: &str = "security";
pub const ERROR_TYPE_LINT: &str = "lint";
pub const ERROR_TYPE_TIMEOUT: &str = "timeout";
pub const ERROR_TYPE_EXECUTION: &str = "execution";
pub const ERROR_TYPE_CACHE: &str = "cache";
pub const ERROR_TYPE_SERVER_NOT_FOUND: &str = "server_not_found";
pub const ERROR_TYPE_FUNCTION_NOT_FOUND: &str = "function_not_found";
pub const ERROR_TYPE_INTERNAL: &str = "internal";

// Schema keywords the parser refuses to flatten
pub const COMPLEX_SCHEMA_KEYWORDS: &[&str] = &["oneOf", "anyOf", "allOf", "discriminator", "not"];

/// Maximum nesting depth for response-field extraction.
pub const MAX_SCHEMA_DEPTH: usize = 2;

// Bounds on operation metadata carried into manifests
pub const MAX_SUMMARY_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 1000;

// Subprocess deadlines
pub const LINT_TIMEOUT_SECS: u64 = 10;
pub const GENERATED_LINT_TIMEOUT_SECS: u64 = 30;
pub const SPEC_FETCH_TIMEOUT_SECS: u64 = 30;

// Output caps
pub const MAX_STDERR_BYTES: usize = 4096;
pub const MAX_FALLBACK_DATA_BYTES: usize = 4096;

/// Exit code reported for a killed (timed-out) sandbox.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Build the per-server base-URL environment variable name.
#[must_use]
pub fn server_base_url_var(server_name: &str) -> String {
    format!(
        "{ENV_PREFIX}{}{ENV_SUFFIX_BASE_URL}",
        server_name.to_uppercase()
    )
}

/// Build the per-server auth-header environment variable name.
#[must_use]
pub fn server_auth_var(server_name: &str) -> String {
    format!("{ENV_PREFIX}{}{ENV_SUFFIX_AUTH}", server_name.to_uppercase())
}

/// Check whether a method string mutates server state.
#[must_use]
pub fn is_mutating_method(method: &str) -> bool {
    MUTATING_METHODS
        .iter()
        .any(|m| m.eq_ignore_ascii_case(method))
}
