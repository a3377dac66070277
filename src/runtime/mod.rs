//! Runtime side of MFP: registry lookups, the execution pipeline, and the
//! durable code cache.

pub mod cache;
pub mod executor;
pub mod models;
pub mod registry;
pub mod sandbox;

pub use cache::CacheStore;
pub use executor::CodeExecutor;
pub use registry::Registry;
pub use sandbox::{DockerSandbox, Sandbox, SandboxOutput};
