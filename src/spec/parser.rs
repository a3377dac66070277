//! Swagger/OpenAPI parser: normalizes specs into [`ServerSpec`] models.
//!
//! Documents are parsed into a generic JSON tree and hand-walked rather than
//! deserialized into a typed OpenAPI model: sources in the wild range from
//! Swagger 2.0 to OpenAPI 3.1 and are frequently partially malformed, and a
//! single broken operation must never fail the whole server.

use crate::constants;
use crate::error::Error;
use crate::hashing::hash_content;
use crate::spec::models::{EndpointSpec, ParamSchema, ResponseField, ServerSpec, SwaggerSource};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

/// Parses OpenAPI 3.x / Swagger 2.0 documents into normalized [`ServerSpec`]s.
pub struct SwaggerParser {
    source: SwaggerSource,
}

impl SwaggerParser {
    #[must_use]
    pub const fn new(source: SwaggerSource) -> Self {
        Self { source }
    }

    /// Fetch and parse the swagger document for this source.
    ///
    /// The raw bytes are hashed before any parsing so the hash is bit-exact
    /// reproducible regardless of YAML/JSON formatting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SpecFetch`] when the document cannot be loaded and
    /// [`Error::Compile`] when it is not a YAML/JSON mapping.
    pub async fn parse(&self) -> Result<ServerSpec, Error> {
        let raw_content = self.fetch_document().await?;
        let doc = self.load_document(&raw_content)?;

        let swagger_hash = hash_content(raw_content.as_bytes());
        let description = self.extract_description(&doc);
        let endpoints = self.parse_paths(&doc);

        info!(
            server = %self.source.name,
            total_endpoints = endpoints.len(),
            swagger_hash = &swagger_hash[..12],
            "swagger parsed"
        );

        Ok(ServerSpec {
            name: self.source.name.clone(),
            description,
            base_url: self.source.base_url.clone(),
            is_read_only: self.source.is_read_only,
            endpoints,
            swagger_hash,
        })
    }

    /// Fetch the document from an HTTP(S) URL or a local file path.
    async fn fetch_document(&self) -> Result<String, Error> {
        let url = &self.source.swagger_url;
        if url.starts_with("http://") || url.starts_with("https://") {
            self.fetch_remote(url).await
        } else {
            tokio::fs::read_to_string(url)
                .await
                .map_err(|e| Error::spec_fetch(format!("Failed to read swagger file {url}: {e}")))
        }
    }

    async fn fetch_remote(&self, url: &str) -> Result<String, Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(constants::SPEC_FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::spec_fetch(format!("Failed to build HTTP client: {e}")))?;

        let response = client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::spec_fetch(format!("Failed to fetch swagger from {url}: {e}")))?;

        response
            .text()
            .await
            .map_err(|e| Error::spec_fetch(format!("Failed to read swagger body from {url}: {e}")))
    }

    /// Parse YAML or JSON document content into a JSON tree. YAML is a
    /// superset of JSON, so one parser covers both.
    fn load_document(&self, content: &str) -> Result<Value, Error> {
        let doc: Value = serde_yaml::from_str(content).map_err(|e| {
            Error::compile(format!(
                "Failed to parse swagger YAML/JSON for {}: {e}",
                self.source.name
            ))
        })?;

        if doc.is_object() {
            Ok(doc)
        } else {
            Err(Error::compile(format!(
                "Swagger document for {} is not a mapping",
                self.source.name
            )))
        }
    }

    /// Server description: `info.description` → `info.title` → source name.
    fn extract_description(&self, doc: &Value) -> String {
        let info = doc.get("info");
        info.and_then(|i| i.get("description"))
            .and_then(Value::as_str)
            .or_else(|| info.and_then(|i| i.get("title")).and_then(Value::as_str))
            .map_or_else(|| self.source.name.clone(), str::to_string)
    }

    fn parse_paths(&self, doc: &Value) -> Vec<EndpointSpec> {
        let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
            return Vec::new();
        };

        let mut endpoints = Vec::new();
        let mut skipped = 0usize;

        for (path, path_item) in paths {
            let Some(item) = path_item.as_object() else {
                continue;
            };

            let path_level_params: Vec<Value> = item
                .get("parameters")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            for (method, operation) in item {
                if !constants::STANDARD_METHODS.contains(&method.to_lowercase().as_str()) {
                    continue;
                }
                let Some(op) = operation.as_object() else {
                    continue;
                };

                match self.parse_operation(doc, path, &method.to_uppercase(), op, &path_level_params)
                {
                    Some(endpoint) => endpoints.push(endpoint),
                    None => skipped += 1,
                }
            }
        }

        if skipped > 0 {
            info!(server = %self.source.name, count = skipped, "endpoints skipped");
        }

        dedup_operation_ids(&mut endpoints);
        endpoints
    }

    /// Parse a single operation. Returns `None` for operations dropped by the
    /// read-only policy; extraction problems degrade to empty schemas rather
    /// than failing the server.
    fn parse_operation(
        &self,
        doc: &Value,
        path: &str,
        method: &str,
        operation: &serde_json::Map<String, Value>,
        path_level_params: &[Value],
    ) -> Option<EndpointSpec> {
        if self.source.is_read_only && constants::is_mutating_method(method) {
            debug!(path = %path, method = %method, "skipped read-only mutating method");
            return None;
        }

        let operation_id = operation
            .get("operationId")
            .and_then(Value::as_str)
            .map_or_else(|| generate_operation_id(method, path), sanitize_identifier);

        let summary = operation
            .get("summary")
            .and_then(Value::as_str)
            .or_else(|| operation.get("description").and_then(Value::as_str))
            .map_or_else(|| format!("{method} {path}"), str::to_string);
        let description = operation
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        // Path-level parameters come first so they win name dedup.
        let mut all_params = path_level_params.to_vec();
        if let Some(op_params) = operation.get("parameters").and_then(Value::as_array) {
            all_params.extend(op_params.iter().cloned());
        }
        let parameters = parse_parameters(doc, &all_params);

        let request_body_schema = if constants::BODY_METHODS.contains(&method) {
            parse_request_body(doc, operation.get("requestBody"))
        } else {
            None
        };

        let response_schema = parse_response_schema(doc, operation.get("responses"));

        let tags = operation
            .get("tags")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Some(EndpointSpec {
            path: path.to_string(),
            method: method.to_string(),
            operation_id,
            summary: truncate_chars(&summary, constants::MAX_SUMMARY_LEN),
            description: truncate_chars(&description, constants::MAX_DESCRIPTION_LEN),
            parameters,
            request_body_schema,
            response_schema,
            tags,
        })
    }
}

/// Make operation IDs unique within a server by suffixing collisions with a
/// counter (`get_hotels`, `get_hotels_2`, …).
fn dedup_operation_ids(endpoints: &mut [EndpointSpec]) {
    let mut seen: HashSet<String> = HashSet::new();
    for endpoint in endpoints {
        if seen.insert(endpoint.operation_id.clone()) {
            continue;
        }
        let mut counter = 2;
        let unique = loop {
            let candidate = format!("{}_{counter}", endpoint.operation_id);
            if seen.insert(candidate.clone()) {
                break candidate;
            }
            counter += 1;
        };
        endpoint.operation_id = unique;
    }
}

/// Synthesize an operation ID from method and path, e.g.
/// `GET /hotels/{id}/rooms` → `get_hotels_id_rooms`.
fn generate_operation_id(method: &str, path: &str) -> String {
    let sanitized: String = path
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '/' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let parts: Vec<&str> = sanitized
        .split('/')
        .filter(|p| !p.is_empty() && p.chars().any(|c| c != '_'))
        .collect();

    if parts.is_empty() {
        format!("{}_endpoint", method.to_lowercase())
    } else {
        sanitize_identifier(&format!("{}_{}", method.to_lowercase(), parts.join("_")))
    }
}

/// Convert an arbitrary string into a valid snake_case Python identifier:
/// non-alphanumerics become underscores, runs collapse, a leading digit gets
/// an `fn_` prefix, and the result is lowercased.
#[must_use]
pub fn sanitize_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');

    if trimmed.is_empty() {
        "endpoint".to_string()
    } else if trimmed.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("fn_{trimmed}")
    } else {
        trimmed.to_string()
    }
}

fn parse_parameters(doc: &Value, raw_params: &[Value]) -> Vec<ParamSchema> {
    let mut params = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for raw in raw_params {
        let Some(obj) = raw.as_object() else {
            continue;
        };

        // Resolve $ref at the parameter root.
        let owned;
        let param = if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
            match resolve_ref(doc, reference).and_then(|v| v.as_object().cloned()) {
                Some(resolved) => {
                    owned = resolved;
                    &owned
                }
                None => continue,
            }
        } else {
            obj
        };

        let Some(name) = param.get("name").and_then(Value::as_str) else {
            continue;
        };
        if name.is_empty() || !seen.insert(name.to_string()) {
            continue;
        }

        let location = param
            .get("in")
            .and_then(Value::as_str)
            .unwrap_or(constants::PARAM_LOCATION_QUERY)
            .to_string();

        // OpenAPI 3.x carries types under `schema`; Swagger 2.0 puts them on
        // the parameter object itself.
        let schema_source: Value = param
            .get("schema")
            .cloned()
            .unwrap_or_else(|| Value::Object(param.clone()));

        let param_type = extract_type(&schema_source);
        let required = param
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(false)
            || location == constants::PARAM_LOCATION_PATH;

        let default = schema_source.get("default").map(value_to_display_string);
        let enum_values = schema_source
            .get("enum")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().map(value_to_display_string).collect());

        params.push(ParamSchema {
            name: name.to_string(),
            location,
            param_type,
            required,
            description: param
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            default,
            enum_values,
        });
    }

    params
}

fn parse_request_body(doc: &Value, body: Option<&Value>) -> Option<Value> {
    let schema = body?
        .get("content")?
        .get(constants::CONTENT_TYPE_JSON)?
        .get("schema")?;

    if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
        return resolve_ref(doc, reference);
    }

    if is_complex_schema(schema) {
        return None;
    }

    Some(schema.clone())
}

/// Extract response fields from the first of the 200/201 responses.
fn parse_response_schema(doc: &Value, responses: Option<&Value>) -> Vec<ResponseField> {
    let Some(responses) = responses.and_then(Value::as_object) else {
        return Vec::new();
    };

    for status_code in ["200", "201", "200-299"] {
        if let Some(resp) = responses.get(status_code) {
            if resp.is_object() {
                return extract_response_fields(doc, resp);
            }
        }
    }

    Vec::new()
}

fn extract_response_fields(doc: &Value, response: &Value) -> Vec<ResponseField> {
    let mut schema = response
        .get("content")
        .and_then(|c| c.get(constants::CONTENT_TYPE_JSON))
        .and_then(|j| j.get("schema"))
        .cloned()
        .unwrap_or_else(empty_object);

    if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
        schema = resolve_ref(doc, reference).unwrap_or_else(empty_object);
    }

    if is_complex_schema(&schema) {
        return Vec::new();
    }

    schema_to_fields(doc, &schema, 0)
}

/// Recursively flatten a JSON schema into [`ResponseField`]s, capped at
/// [`constants::MAX_SCHEMA_DEPTH`] levels.
fn schema_to_fields(doc: &Value, schema: &Value, depth: usize) -> Vec<ResponseField> {
    if depth > constants::MAX_SCHEMA_DEPTH || !schema.is_object() {
        return Vec::new();
    }

    let schema_type = schema
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("object");
    let mut fields = Vec::new();

    if schema_type == "object" || schema.get("properties").is_some() {
        let Some(props) = schema.get("properties").and_then(Value::as_object) else {
            return fields;
        };
        for (prop_name, prop_schema) in props {
            let mut prop_schema = prop_schema.clone();
            if let Some(reference) = prop_schema.get("$ref").and_then(Value::as_str) {
                prop_schema = resolve_ref(doc, reference).unwrap_or_else(empty_object);
            }

            let field_type = extract_type(&prop_schema);
            let nested = if field_type == "object" && depth < constants::MAX_SCHEMA_DEPTH {
                let children = schema_to_fields(doc, &prop_schema, depth + 1);
                (!children.is_empty()).then_some(children)
            } else {
                None
            };

            fields.push(ResponseField {
                name: prop_name.clone(),
                field_type,
                description: prop_schema
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                nested,
            });
        }
    } else if schema_type == "array" {
        let mut items = schema.get("items").cloned().unwrap_or_else(empty_object);
        if let Some(reference) = items.get("$ref").and_then(Value::as_str) {
            items = resolve_ref(doc, reference).unwrap_or_else(empty_object);
        }
        let item_fields = schema_to_fields(doc, &items, depth + 1);
        if !item_fields.is_empty() {
            fields.push(ResponseField {
                name: "items".to_string(),
                field_type: "array".to_string(),
                description: String::new(),
                nested: (depth < constants::MAX_SCHEMA_DEPTH).then_some(item_fields),
            });
        }
    }

    fields
}

/// A schema using polymorphism keywords is reduced to an empty field set
/// instead of failing the operation.
fn is_complex_schema(schema: &Value) -> bool {
    schema.as_object().is_some_and(|obj| {
        constants::COMPLEX_SCHEMA_KEYWORDS
            .iter()
            .any(|k| obj.contains_key(*k))
    })
}

/// Primary type string of a schema. Nullable type arrays like
/// `["string", "null"]` collapse to the non-null member.
fn extract_type(schema: &Value) -> String {
    let Some(raw_type) = schema.get("type") else {
        return "string".to_string();
    };

    match raw_type {
        Value::String(s) => s.clone(),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null")
            .unwrap_or("string")
            .to_string(),
        _ => "string".to_string(),
    }
}

/// Resolve a local `$ref` pointer like `#/components/schemas/Hotel`.
/// External references are not supported and resolve to `None`.
fn resolve_ref(doc: &Value, reference: &str) -> Option<Value> {
    let pointer = reference.strip_prefix('#')?;
    let node = doc.pointer(pointer)?;
    node.is_object().then(|| node.clone())
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn value_to_display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
