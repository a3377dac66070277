pub mod tracing_init;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    /// Newline-delimited JSON over stdin/stdout (default)
    Stdio,
    /// HTTP POST /tools/{name}
    Http,
}

#[derive(Parser, Debug)]
#[command(
    name = "mfp",
    version,
    about = "MFP: turn any Swagger/OpenAPI spec into LLM-callable functions",
    long_about = "MFP compiles Swagger/OpenAPI specifications into Python function\n\
                  modules and exposes them to an LLM through four meta-tools:\n\
                  list_servers, get_function, execute_code, and get_cached_code.\n\
                  Submitted programs are statically vetted, linted, and executed\n\
                  in a single-use sandbox container; successful programs are\n\
                  cached for reuse.\n\n\
                  Examples:\n  \
                  mfp compile                 # compile all configured sources\n  \
                  mfp compile --dry-run       # parse and count, write nothing\n  \
                  mfp serve --transport http  # serve the meta-tools over HTTP\n  \
                  mfp run                     # compile then serve"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile swagger sources to Python function modules
    Compile {
        /// Parse swaggers but don't write output
        #[arg(long)]
        dry_run: bool,
        /// Use an LLM to improve generated code quality
        #[arg(long)]
        llm_enhance: bool,
    },
    /// Start the meta-tool server
    Serve {
        /// Transport mode
        #[arg(long, value_enum, default_value = "stdio")]
        transport: Transport,
        /// Override host for HTTP transport
        #[arg(long)]
        host: Option<String>,
        /// Override port for HTTP transport
        #[arg(long)]
        port: Option<u16>,
    },
    /// Compile then start the meta-tool server
    Run {
        /// Transport mode
        #[arg(long, value_enum, default_value = "stdio")]
        transport: Transport,
        /// Override host for HTTP transport
        #[arg(long)]
        host: Option<String>,
        /// Override port for HTTP transport
        #[arg(long)]
        port: Option<u16>,
    },
}
