use clap::Parser;
use mfp::cli::{tracing_init, Cli, Commands, Transport};
use mfp::compiler::Orchestrator;
use mfp::config::MfpConfig;
use mfp::error::Error;
use mfp::runtime::{CacheStore, CodeExecutor, DockerSandbox, Registry};
use mfp::server::{serve_http, serve_stdio, MetaTools};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match MfpConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    tracing_init::init_tracing(&config.log_level);

    if let Err(e) = run_command(cli, config).await {
        print_error(&e);
        std::process::exit(1);
    }
}

async fn run_command(cli: Cli, mut config: MfpConfig) -> Result<(), Error> {
    match cli.command {
        Commands::Compile {
            dry_run,
            llm_enhance,
        } => {
            if llm_enhance {
                config.llm_enhance = true;
                tracing::warn!("LLM enhancement requested but no enhancer is configured; skipping");
            }
            let exit = cmd_compile(&config, dry_run).await?;
            if exit != 0 {
                std::process::exit(exit);
            }
        }
        Commands::Serve {
            transport,
            host,
            port,
        } => {
            apply_overrides(&mut config, host, port);
            if config.compile_on_startup {
                let orchestrator = Orchestrator::new(config.clone());
                if let Err(e) = orchestrator.compile_all(false).await {
                    tracing::warn!(error = %e, "startup compile failed, serving existing output");
                }
            }
            cmd_serve(config, transport).await?;
        }
        Commands::Run {
            transport,
            host,
            port,
        } => {
            apply_overrides(&mut config, host, port);
            let exit = cmd_compile(&config, false).await?;
            if exit != 0 {
                std::process::exit(exit);
            }
            cmd_serve(config, transport).await?;
        }
    }

    Ok(())
}

fn apply_overrides(config: &mut MfpConfig, host: Option<String>, port: Option<u16>) {
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
}

/// Compile all configured sources and print the summary. Returns the process
/// exit code (1 when any source failed).
async fn cmd_compile(config: &MfpConfig, dry_run: bool) -> Result<i32, Error> {
    let orchestrator = Orchestrator::new(config.clone());
    let result = orchestrator.compile_all(dry_run).await?;

    if !result.compiled.is_empty() {
        println!(
            "✅ Compiled: {} ({} endpoints)",
            result.compiled.join(", "),
            result.total_endpoints
        );
    }
    if !result.skipped.is_empty() {
        println!("⏭  Skipped (up-to-date): {}", result.skipped.join(", "));
    }
    if !result.failed.is_empty() {
        eprintln!("❌ Compile failed for: {}", result.failed.join(", "));
        return Ok(1);
    }

    Ok(0)
}

async fn cmd_serve(config: MfpConfig, transport: Transport) -> Result<(), Error> {
    let cache = CacheStore::open(
        &config.cache_db_path,
        config.cache_ttl_seconds,
        config.cache_max_entries,
    )
    .await?;
    cache.cleanup_expired().await?;

    let mut registry = Registry::new(&config.compiled_output_dir);
    registry.load();
    let registry = Arc::new(registry);

    let sandbox = Arc::new(DockerSandbox::new(
        &config.docker_image,
        &config.network_mode,
        &config.compiled_output_dir,
    ));
    let executor = CodeExecutor::new(
        config.clone(),
        cache.clone(),
        Arc::clone(&registry),
        sandbox,
    );

    tracing::info!(
        servers = registry.list_servers().len(),
        transport = ?transport,
        host = %config.host,
        port = config.port,
        "mfp starting"
    );

    let host = config.host.clone();
    let port = config.port;
    let tools = Arc::new(MetaTools::new(config, registry, cache, executor));

    match transport {
        Transport::Stdio => serve_stdio(tools).await,
        Transport::Http => serve_http(tools, &host, port).await,
    }
}

/// Prints a user-friendly error message with a hint where we have one.
fn print_error(error: &Error) {
    match error {
        Error::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => {
                eprintln!("File not found: {io_err}\n\nHint: Check that the path exists.");
            }
            std::io::ErrorKind::PermissionDenied => {
                eprintln!("Permission denied: {io_err}\n\nHint: Check file permissions.");
            }
            _ => eprintln!("File system error: {io_err}"),
        },
        Error::Network(req_err) => {
            eprintln!("Network error: {req_err}\n\nHint: Check that the spec URL is reachable.");
        }
        Error::Config { message } => {
            eprintln!("Configuration error: {message}\n\nHint: Check MFP_* environment variables and the swagger source file.");
        }
        other => eprintln!("{other}"),
    }
}
