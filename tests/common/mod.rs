//! Shared fixtures for integration tests.
#![allow(dead_code)]

use mfp::config::MfpConfig;
use mfp::spec::models::SwaggerSource;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const WEATHER_SPEC: &str = r"
openapi: 3.0.0
info:
  title: Weather API
  description: Weather forecast and conditions API
paths:
  /weather/current:
    get:
      operationId: getCurrentWeather
      summary: Get current weather for a location
      parameters:
        - name: city
          in: query
          required: true
          schema: {type: string}
          description: City name
        - name: units
          in: query
          schema:
            type: string
            default: metric
            enum: [metric, imperial, kelvin]
      responses:
        '200':
          content:
            application/json:
              schema:
                type: object
                properties:
                  temperature: {type: number}
                  humidity: {type: integer}
                  condition: {type: string}
  /weather/forecast/{days}:
    get:
      operationId: getForecast
      summary: Get the forecast for the next days
      parameters:
        - name: days
          in: path
          required: true
          schema: {type: integer}
      responses:
        '200':
          content:
            application/json:
              schema:
                type: array
                items:
                  type: object
                  properties:
                    date: {type: string}
                    high: {type: number}
";

pub const HOTEL_SPEC: &str = r"
openapi: 3.0.0
info:
  title: Hotel API
  description: Hotel booking API
paths:
  /hotels:
    get:
      operationId: listHotels
      summary: List hotels
      responses:
        '200':
          content:
            application/json:
              schema:
                type: array
                items:
                  type: object
                  properties:
                    id: {type: integer}
                    name: {type: string}
    post:
      operationId: createHotel
      summary: Create a hotel
      requestBody:
        content:
          application/json:
            schema:
              type: object
              properties:
                name: {type: string}
      responses:
        '201':
          content:
            application/json:
              schema:
                type: object
                properties:
                  id: {type: integer}
  /hotels/{id}:
    delete:
      operationId: deleteHotel
      summary: Delete a hotel
      parameters:
        - name: id
          in: path
          required: true
          schema: {type: integer}
      responses: {}
";

/// Write a spec file under `dir` and return its path.
pub fn write_spec(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(format!("{name}.yaml"));
    std::fs::write(&path, content).unwrap();
    path
}

pub fn source(name: &str, swagger_url: &str, is_read_only: bool) -> SwaggerSource {
    SwaggerSource {
        name: name.to_string(),
        swagger_url: swagger_url.to_string(),
        base_url: format!("https://api.{name}.example.com/v1"),
        auth_header: String::new(),
        is_read_only,
        extra_headers: BTreeMap::new(),
    }
}

/// Write a `servers:` source list file and return its path.
pub fn write_sources_file(dir: &Path, entries: &[(&str, &Path, bool)]) -> PathBuf {
    let mut content = String::from("servers:\n");
    for (name, spec_path, read_only) in entries {
        content.push_str(&format!(
            "  - name: {name}\n    swagger_url: {}\n    base_url: https://api.{name}.example.com/v1\n    is_read_only: {read_only}\n",
            spec_path.display()
        ));
    }
    let path = dir.join("swaggers.yaml");
    std::fs::write(&path, content).unwrap();
    path
}

/// A config rooted in a temp directory, with the sandbox linter pointed at a
/// binary that does not exist so lint is skipped.
pub fn test_config(tmp: &Path) -> MfpConfig {
    MfpConfig {
        compiled_output_dir: tmp.join("compiled").display().to_string(),
        swagger_config_file: tmp.join("swaggers.yaml").display().to_string(),
        cache_db_path: tmp.join("data").join("cache.db").display().to_string(),
        lint_command: "mfp-test-no-such-linter".to_string(),
        execution_timeout_seconds: 2,
        debug: false,
        ..MfpConfig::default()
    }
}
