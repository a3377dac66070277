//! Swagger/OpenAPI models and normalization.
//!
//! `models` holds the normalized data model shared by the compiler and the
//! runtime; `parser` turns raw swagger documents into it.

pub mod models;
pub mod parser;

pub use models::{
    EndpointManifest, EndpointSpec, ParamSchema, ResponseField, ServerManifest, ServerSpec,
    SwaggerSource,
};
pub use parser::SwaggerParser;
