use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "lazyrun",
    about = "lazyrun: evaluate through a runtime that is only loaded when first needed",
    version
)]
pub struct Cli {
    /// Log bridge lifecycle events at debug level (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the runtime lives and how it is loaded.
#[derive(Args, Debug, Clone, Default)]
pub struct RuntimeArgs {
    /// Path to a TOML bridge config
    #[arg(long)]
    pub config: Option<String>,

    /// Runtime module location (overrides the config file)
    #[arg(long)]
    pub module: Option<String>,

    /// Argument passed to the runtime on every evaluation (repeatable; replaces config args)
    #[arg(long = "arg", allow_hyphen_values = true)]
    pub runtime_args: Vec<String>,

    /// Expected `sha256:<hex>` digest of the runtime module
    #[arg(long)]
    pub integrity: Option<String>,

    /// Give up loading the runtime after this many milliseconds
    #[arg(long)]
    pub load_timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate inputs in order; all are queued before the runtime loads
    Run {
        #[command(flatten)]
        runtime: RuntimeArgs,

        /// Source text to evaluate (repeatable)
        inputs: Vec<String>,

        /// Read one source text from a file (repeatable, evaluated after INPUTs)
        #[arg(long = "file")]
        files: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive runner: one line per run, `:clear`, `:state`, `:quit`
    Repl {
        #[command(flatten)]
        runtime: RuntimeArgs,

        /// Start loading the runtime before the first line is read
        #[arg(long)]
        preload: bool,
    },

    /// Serve the bridge over HTTP (POST /run, GET /state, GET /healthz)
    Serve {
        #[command(flatten)]
        runtime: RuntimeArgs,

        /// Bind address
        #[arg(long, default_value = "127.0.0.1:8787")]
        bind: String,

        /// Largest accepted request body in bytes
        #[arg(long, default_value_t = 1024 * 1024)]
        max_body_bytes: usize,

        /// Start loading the runtime before the first request
        #[arg(long)]
        preload: bool,
    },

    /// Load the runtime eagerly and report whether it became ready
    Check {
        #[command(flatten)]
        runtime: RuntimeArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
