//! Code generator: renders a [`ServerSpec`] into a self-contained Python
//! function module.
//!
//! Each endpoint becomes one function. Generated modules read their base URL
//! and auth header from `MFP_<SERVER>_*` process environment variables at
//! call time; credentials are never rendered into source. A single shared
//! `_request` helper per module carries the httpx plumbing so the per-function
//! bodies stay readable for the LLM that inspects them.

use crate::constants;
use crate::error::Error;
use crate::spec::models::{EndpointSpec, ParamSchema, ServerSpec};
use std::collections::HashSet;
use std::fmt::Write as _;
use tracing::debug;

/// Python keywords that cannot be used as parameter names.
const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue",
    "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import",
    "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while",
    "with", "yield",
];

/// Generates Python function modules from compiled [`ServerSpec`]s.
#[derive(Debug, Default)]
pub struct CodeGenerator;

impl CodeGenerator {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Render the Python source module for `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Compile`] when an endpoint carries an operation ID
    /// that is not renderable as a unique Python identifier.
    pub fn generate(&self, spec: &ServerSpec) -> Result<String, Error> {
        let mut seen: HashSet<&str> = HashSet::new();
        for endpoint in &spec.endpoints {
            if !is_valid_identifier(&endpoint.operation_id) {
                return Err(Error::compile(format!(
                    "Invalid operation id '{}' for {}",
                    endpoint.operation_id, spec.name
                )));
            }
            if !seen.insert(&endpoint.operation_id) {
                return Err(Error::compile(format!(
                    "Duplicate operation id '{}' for {}",
                    endpoint.operation_id, spec.name
                )));
            }
        }

        let mut code = self.render_module_header(spec);
        for endpoint in &spec.endpoints {
            code.push_str(&render_function(endpoint));
        }

        debug!(
            server = %spec.name,
            functions = spec.endpoints.len(),
            code_size = code.len(),
            "code generated"
        );
        Ok(code)
    }

    #[allow(clippy::unused_self)]
    fn render_module_header(&self, spec: &ServerSpec) -> String {
        let base_url_var = constants::server_base_url_var(&spec.name);
        let auth_var = constants::server_auth_var(&spec.name);
        let description = escape_docstring(&spec.description);
        let default_base_url = escape_py_string(&spec.base_url);

        format!(
            r#""""Auto-generated MFP functions for {name}.

{description}
"""

from __future__ import annotations

import json
import os
from typing import Any

import httpx

_BASE_URL_ENV = "{base_url_var}"
_AUTH_ENV = "{auth_var}"
_DEFAULT_BASE_URL = "{default_base_url}"


def _request(
    method: str,
    path: str,
    params: dict[str, Any] | None = None,
    headers: dict[str, Any] | None = None,
    json_body: dict[str, Any] | None = None,
) -> Any:
    base_url = os.environ.get(_BASE_URL_ENV) or _DEFAULT_BASE_URL
    merged_headers: dict[str, str] = {{}}
    auth = os.environ.get(_AUTH_ENV, "")
    if auth:
        header_name, _, header_value = auth.partition(":")
        if header_value:
            merged_headers[header_name.strip()] = header_value.strip()
        else:
            merged_headers["Authorization"] = auth.strip()
    if headers:
        merged_headers.update({{k: str(v) for k, v in headers.items() if v is not None}})
    with httpx.Client(base_url=base_url, timeout=30.0) as client:
        response = client.request(
            method, path, params=params, headers=merged_headers, json=json_body
        )
        response.raise_for_status()
        try:
            return response.json()
        except json.JSONDecodeError:
            return response.text

"#,
            name = spec.name,
        )
    }
}

fn render_function(endpoint: &EndpointSpec) -> String {
    let signature = build_signature(endpoint);
    let docstring = build_docstring(endpoint);
    let path_expr = build_path_expr(endpoint);
    let has_body = endpoint.request_body_schema.is_some()
        && constants::BODY_METHODS.contains(&endpoint.method.as_str());

    let mut body = String::new();

    let query_params: Vec<&ParamSchema> = endpoint
        .parameters
        .iter()
        .filter(|p| p.location == constants::PARAM_LOCATION_QUERY)
        .collect();
    if query_params.is_empty() {
        body.push_str("    params = None\n");
    } else {
        body.push_str("    params = {\n");
        for param in &query_params {
            let _ = writeln!(
                body,
                "        \"{}\": {},",
                escape_py_string(&param.name),
                safe_param_name(&param.name)
            );
        }
        body.push_str("    }\n");
        body.push_str("    params = {k: v for k, v in params.items() if v is not None}\n");
    }

    let header_params: Vec<&ParamSchema> = endpoint
        .parameters
        .iter()
        .filter(|p| p.location == constants::PARAM_LOCATION_HEADER)
        .collect();
    if header_params.is_empty() {
        body.push_str("    headers = None\n");
    } else {
        body.push_str("    headers = {\n");
        for param in &header_params {
            let _ = writeln!(
                body,
                "        \"{}\": {},",
                escape_py_string(&param.name),
                safe_param_name(&param.name)
            );
        }
        body.push_str("    }\n");
    }

    let json_body_arg = if has_body { "json_body" } else { "None" };
    let _ = writeln!(
        body,
        "    return _request(\"{}\", {path_expr}, params=params, headers=headers, json_body={json_body_arg})",
        endpoint.method
    );

    format!(
        "\ndef {name}({signature}) -> Any:\n{docstring}{body}\n",
        name = endpoint.operation_id,
    )
}

/// Build the parameter list: required parameters first, then optional ones
/// with nullable defaults, then `json_body` for body-carrying methods.
fn build_signature(endpoint: &EndpointSpec) -> String {
    let mut parts: Vec<String> = Vec::new();

    for param in endpoint.parameters.iter().filter(|p| p.required) {
        parts.push(format!(
            "{}: {}",
            safe_param_name(&param.name),
            python_type(&param.param_type)
        ));
    }

    for param in endpoint.parameters.iter().filter(|p| !p.required) {
        parts.push(format!(
            "{}: {} | None = {}",
            safe_param_name(&param.name),
            python_type(&param.param_type),
            python_default(param)
        ));
    }

    if endpoint.request_body_schema.is_some()
        && constants::BODY_METHODS.contains(&endpoint.method.as_str())
    {
        parts.push("json_body: dict[str, Any] | None = None".to_string());
    }

    parts.join(", ")
}

fn build_docstring(endpoint: &EndpointSpec) -> String {
    let mut doc = format!("    \"\"\"{}\n", escape_docstring(&endpoint.summary));

    if !endpoint.parameters.is_empty() || endpoint.request_body_schema.is_some() {
        doc.push_str("\n    Args:\n");
        for param in &endpoint.parameters {
            let requirement = if param.required { "Required" } else { "Optional" };
            let description = if param.description.is_empty() {
                param.name.clone()
            } else {
                param.description.clone()
            };
            let _ = writeln!(
                doc,
                "        {} ({}): {}. {}.",
                safe_param_name(&param.name),
                python_type(&param.param_type),
                escape_docstring(description.trim_end_matches('.')),
                requirement
            );
            if let Some(values) = &param.enum_values {
                let _ = writeln!(doc, "            One of: {}.", values.join(", "));
            }
        }
        if endpoint.request_body_schema.is_some()
            && constants::BODY_METHODS.contains(&endpoint.method.as_str())
        {
            doc.push_str("        json_body (dict | None): Request body as JSON object. Optional.\n");
        }
    }

    doc.push_str("\n    Returns:\n");
    let field_names: Vec<&str> = endpoint
        .response_schema
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    if field_names.is_empty() {
        doc.push_str("        Parsed JSON object/list, or raw response text.\n");
    } else {
        let _ = writeln!(
            doc,
            "        Parsed JSON with fields: {}.",
            field_names.join(", ")
        );
    }
    doc.push_str("    \"\"\"\n");
    doc
}

/// Build the path expression: an f-string when the path carries placeholders,
/// a plain literal otherwise. Placeholders are rewritten to the sanitized
/// parameter identifiers.
fn build_path_expr(endpoint: &EndpointSpec) -> String {
    let mut path = endpoint.path.clone();
    for param in endpoint
        .parameters
        .iter()
        .filter(|p| p.location == constants::PARAM_LOCATION_PATH)
    {
        path = path.replace(
            &format!("{{{}}}", param.name),
            &format!("{{{}}}", safe_param_name(&param.name)),
        );
    }

    if path.contains('{') {
        format!("f\"{}\"", escape_py_string(&path))
    } else {
        format!("\"{}\"", escape_py_string(&path))
    }
}

/// Map a swagger type to a Python annotation.
fn python_type(swagger_type: &str) -> &'static str {
    match swagger_type {
        "string" => "str",
        "integer" => "int",
        "number" => "float",
        "boolean" => "bool",
        "object" => "dict[str, Any]",
        "array" => "list[Any]",
        _ => "Any",
    }
}

/// Render the default value for an optional parameter as a Python literal.
fn python_default(param: &ParamSchema) -> String {
    let Some(default) = &param.default else {
        return "None".to_string();
    };

    match param.param_type.as_str() {
        "string" => format!("\"{}\"", escape_py_string(default)),
        "boolean" => match default.to_lowercase().as_str() {
            "true" => "True".to_string(),
            "false" => "False".to_string(),
            _ => "None".to_string(),
        },
        "integer" | "number" if default.parse::<f64>().is_ok() => default.clone(),
        _ => "None".to_string(),
    }
}

/// Sanitize a parameter name to a valid Python identifier, preserving case.
fn safe_param_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');

    if trimmed.is_empty() {
        "param".to_string()
    } else if trimmed.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("p_{trimmed}")
    } else if PYTHON_KEYWORDS.contains(&trimmed) {
        format!("{trimmed}_")
    } else {
        trimmed.to_string()
    }
}

fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.chars().next().is_some_and(|c| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !PYTHON_KEYWORDS.contains(&name)
}

fn escape_py_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn escape_docstring(s: &str) -> String {
    s.replace("\"\"\"", "'''")
}
