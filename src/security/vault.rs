//! Credential materialization for sandbox launches.
//!
//! Per-server credentials live only in the host environment as
//! `MFP_<SERVER>_BASE_URL` / `MFP_<SERVER>_AUTH`. They are read at launch
//! time and injected into the container environment, never embedded into
//! generated source or cache entries.

use crate::constants;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::warn;

/// Resolve `${VAR}` environment references in a string.
///
/// Unresolvable references are left literal and logged, so a misconfigured
/// auth header fails visibly at the API instead of silently sending an empty
/// credential.
#[must_use]
pub fn resolve_env_references(value: &str) -> String {
    let pattern = Regex::new(r"\$\{([^}]+)\}").expect("hardcoded pattern is valid");

    pattern
        .replace_all(value, |caps: &regex::Captures<'_>| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| {
                warn!(var_name = %var_name, "env var reference not found");
                caps[0].to_string()
            })
        })
        .into_owned()
}

/// Build the environment map for one server's credentials.
#[must_use]
pub fn build_server_env_vars(server_name: &str) -> BTreeMap<String, String> {
    let mut env_vars = BTreeMap::new();

    let base_url_key = constants::server_base_url_var(server_name);
    let auth_key = constants::server_auth_var(server_name);

    if let Ok(base_url) = std::env::var(&base_url_key) {
        if !base_url.is_empty() {
            env_vars.insert(base_url_key, base_url);
        }
    }

    if let Ok(auth) = std::env::var(&auth_key) {
        if !auth.is_empty() {
            env_vars.insert(auth_key, resolve_env_references(&auth));
        }
    }

    env_vars
}

/// Build the combined environment map for every server a program imports.
#[must_use]
pub fn build_all_server_env_vars(server_names: &[String]) -> BTreeMap<String, String> {
    let mut combined = BTreeMap::new();
    for name in server_names {
        combined.extend(build_server_env_vars(name));
    }
    combined
}
