use crate::cli::RuntimeArgs;
use lazyrun_core::BridgeConfig;
use std::io;
use std::path::PathBuf;
use std::process;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the stderr subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false);

    // A subscriber may already be installed when embedded in tests.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();
}

/// Merge the optional config file with flag overrides.
pub fn resolve_config(args: &RuntimeArgs) -> Result<BridgeConfig, String> {
    let mut config = match (&args.config, &args.module) {
        (Some(path), _) => BridgeConfig::load_toml(path).map_err(|e| e.to_string())?,
        (None, Some(module)) => BridgeConfig::new(module),
        (None, None) => {
            return Err("no runtime module given (use --module or --config)".to_string());
        }
    };

    if let Some(module) = &args.module {
        config.module = PathBuf::from(module);
    }
    if !args.runtime_args.is_empty() {
        config.args = args.runtime_args.clone();
    }
    if let Some(integrity) = &args.integrity {
        config.integrity = Some(integrity.clone());
    }
    if let Some(timeout) = args.load_timeout_ms {
        config.load_timeout_ms = Some(timeout);
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

pub fn resolve_config_or_exit(args: &RuntimeArgs) -> BridgeConfig {
    resolve_config(args).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(2);
    })
}

pub fn build_runtime_or_exit() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        })
}

pub fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
