mod common;

use common::{source, write_spec, WEATHER_SPEC};
use mfp::error::Error;
use mfp::hashing::hash_content;
use mfp::spec::parser::SwaggerParser;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_parse_from_local_file() {
    let dir = TempDir::new().unwrap();
    let spec_path = write_spec(dir.path(), "weather", WEATHER_SPEC);

    let parser = SwaggerParser::new(source(
        "weather",
        &spec_path.display().to_string(),
        true,
    ));
    let spec = parser.parse().await.unwrap();

    assert_eq!(spec.name, "weather");
    assert_eq!(spec.description, "Weather forecast and conditions API");
    assert!(spec.is_read_only);
    assert_eq!(spec.endpoints.len(), 2);
    assert_eq!(spec.swagger_hash, hash_content(WEATHER_SPEC.as_bytes()));
}

#[tokio::test]
async fn test_parse_from_http_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/openapi.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(WEATHER_SPEC))
        .mount(&server)
        .await;

    let url = format!("{}/openapi.yaml", server.uri());
    let parser = SwaggerParser::new(source("weather", &url, false));
    let spec = parser.parse().await.unwrap();

    assert_eq!(spec.endpoints.len(), 2);
    // The hash covers the raw bytes as served, identical to a local parse.
    assert_eq!(spec.swagger_hash, hash_content(WEATHER_SPEC.as_bytes()));
}

#[tokio::test]
async fn test_http_error_is_spec_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/openapi.yaml"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let url = format!("{}/openapi.yaml", server.uri());
    let parser = SwaggerParser::new(source("weather", &url, false));
    let err = parser.parse().await.unwrap_err();

    assert!(matches!(err, Error::SpecFetch { .. }));
    assert!(err.is_compile_error());
}

#[tokio::test]
async fn test_missing_file_is_spec_fetch_error() {
    let parser = SwaggerParser::new(source("weather", "/nonexistent/weather.yaml", false));
    let err = parser.parse().await.unwrap_err();
    assert!(matches!(err, Error::SpecFetch { .. }));
}

#[tokio::test]
async fn test_non_mapping_document_is_compile_error() {
    let dir = TempDir::new().unwrap();
    let spec_path = write_spec(dir.path(), "bad", "- just\n- a\n- list\n");

    let parser = SwaggerParser::new(source(
        "bad",
        &spec_path.display().to_string(),
        false,
    ));
    let err = parser.parse().await.unwrap_err();
    assert!(matches!(err, Error::Compile { .. }));
}

#[tokio::test]
async fn test_reparse_same_bytes_same_hash() {
    let dir = TempDir::new().unwrap();
    let spec_path = write_spec(dir.path(), "weather", WEATHER_SPEC);
    let src = source("weather", &spec_path.display().to_string(), true);

    let first = SwaggerParser::new(src.clone()).parse().await.unwrap();
    let second = SwaggerParser::new(src).parse().await.unwrap();
    assert_eq!(first.swagger_hash, second.swagger_hash);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_description_falls_back_to_title_then_name() {
    let dir = TempDir::new().unwrap();

    let titled = write_spec(
        dir.path(),
        "titled",
        "info:\n  title: Only A Title\npaths: {}\n",
    );
    let spec = SwaggerParser::new(source("titled", &titled.display().to_string(), false))
        .parse()
        .await
        .unwrap();
    assert_eq!(spec.description, "Only A Title");

    let bare = write_spec(dir.path(), "bare", "paths: {}\n");
    let spec = SwaggerParser::new(source("bare", &bare.display().to_string(), false))
        .parse()
        .await
        .unwrap();
    assert_eq!(spec.description, "bare");
}
