//! MFP configuration loaded from `MFP_`-prefixed environment variables.
//!
//! An optional `.env` file in the working directory is applied first (existing
//! process environment wins). Unknown `MFP_*` keys are ignored; values that
//! fail to parse for a known key are configuration errors.

use crate::error::Error;

/// Main MFP server configuration.
#[derive(Debug, Clone)]
pub struct MfpConfig {
    // Server
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub debug: bool,

    // Compiler
    pub compile_on_startup: bool,
    pub compiled_output_dir: String,
    pub swagger_config_file: String,
    pub llm_enhance: bool,

    // Executor
    pub docker_image: String,
    pub execution_timeout_seconds: u64,
    pub max_output_size_bytes: usize,
    pub network_mode: String,
    pub lint_command: String,

    // Cache
    pub cache_enabled: bool,
    pub cache_ttl_seconds: u64,
    pub cache_max_entries: usize,
    pub cache_db_path: String,

    // Security
    pub allowed_domains: Vec<String>,
    pub max_code_size_bytes: usize,
}

impl Default for MfpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "INFO".to_string(),
            debug: false,
            compile_on_startup: true,
            compiled_output_dir: "./compiled".to_string(),
            swagger_config_file: "./config/swaggers.yaml".to_string(),
            llm_enhance: false,
            docker_image: "mfp-sandbox:latest".to_string(),
            execution_timeout_seconds: 30,
            max_output_size_bytes: 1_048_576,
            network_mode: "mfp_network".to_string(),
            lint_command: "ruff".to_string(),
            cache_enabled: true,
            cache_ttl_seconds: 3600,
            cache_max_entries: 500,
            cache_db_path: "./data/cache.db".to_string(),
            allowed_domains: Vec::new(),
            max_code_size_bytes: 65_536,
        }
    }
}

impl MfpConfig {
    /// Load configuration from the process environment, applying an optional
    /// `.env` file first.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when a known key holds an unparseable value.
    pub fn load() -> Result<Self, Error> {
        // Existing environment variables take precedence over .env entries.
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Build configuration from the current process environment only.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when a known key holds an unparseable value.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(v) = env_var("HOST") {
            config.host = v;
        }
        if let Some(v) = env_var("PORT") {
            config.port = parse_value("MFP_PORT", &v)?;
        }
        if let Some(v) = env_var("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Some(v) = env_var("DEBUG") {
            config.debug = parse_bool("MFP_DEBUG", &v)?;
        }
        if let Some(v) = env_var("COMPILE_ON_STARTUP") {
            config.compile_on_startup = parse_bool("MFP_COMPILE_ON_STARTUP", &v)?;
        }
        if let Some(v) = env_var("COMPILED_OUTPUT_DIR") {
            config.compiled_output_dir = v;
        }
        if let Some(v) = env_var("SWAGGER_CONFIG_FILE") {
            config.swagger_config_file = v;
        }
        if let Some(v) = env_var("LLM_ENHANCE") {
            config.llm_enhance = parse_bool("MFP_LLM_ENHANCE", &v)?;
        }
        if let Some(v) = env_var("DOCKER_IMAGE") {
            config.docker_image = v;
        }
        if let Some(v) = env_var("EXECUTION_TIMEOUT_SECONDS") {
            config.execution_timeout_seconds = parse_value("MFP_EXECUTION_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = env_var("MAX_OUTPUT_SIZE_BYTES") {
            config.max_output_size_bytes = parse_value("MFP_MAX_OUTPUT_SIZE_BYTES", &v)?;
        }
        if let Some(v) = env_var("NETWORK_MODE") {
            config.network_mode = v;
        }
        if let Some(v) = env_var("LINT_COMMAND") {
            config.lint_command = v;
        }
        if let Some(v) = env_var("CACHE_ENABLED") {
            config.cache_enabled = parse_bool("MFP_CACHE_ENABLED", &v)?;
        }
        if let Some(v) = env_var("CACHE_TTL_SECONDS") {
            config.cache_ttl_seconds = parse_value("MFP_CACHE_TTL_SECONDS", &v)?;
        }
        if let Some(v) = env_var("CACHE_MAX_ENTRIES") {
            config.cache_max_entries = parse_value("MFP_CACHE_MAX_ENTRIES", &v)?;
        }
        if let Some(v) = env_var("CACHE_DB_PATH") {
            config.cache_db_path = v;
        }
        if let Some(v) = env_var("ALLOWED_DOMAINS") {
            config.allowed_domains = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = env_var("MAX_CODE_SIZE_BYTES") {
            config.max_code_size_bytes = parse_value("MFP_MAX_CODE_SIZE_BYTES", &v)?;
        }

        Ok(config)
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{}{suffix}", crate::constants::ENV_PREFIX)).ok()
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, Error>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::config(format!("Invalid value for {key}: '{value}' ({e})")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::config(format!(
            "Invalid boolean for {key}: '{other}'"
        ))),
    }
}
