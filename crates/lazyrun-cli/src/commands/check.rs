use crate::cli::RuntimeArgs;
use crate::support::{build_runtime_or_exit, resolve_config_or_exit, yes_no};
use lazyrun_core::{Bridge, LoaderState};
use serde_json::json;
use std::process;
use std::time::Instant;

pub fn run(runtime_args: RuntimeArgs, json: bool) {
    let config = resolve_config_or_exit(&runtime_args);
    let runtime = build_runtime_or_exit();
    let bridge = Bridge::from_config(&config, runtime.handle().clone());

    let started = Instant::now();
    let state = runtime.block_on(async {
        bridge.preload();
        bridge.settled().await
    });
    let elapsed_ms = started.elapsed().as_millis();
    let ready = state == LoaderState::Ready;

    if json {
        let payload = json!({
            "module": config.module.display().to_string(),
            "integrityChecked": config.integrity.is_some(),
            "state": state,
            "loadError": bridge.load_error(),
            "elapsedMs": elapsed_ms,
        });
        let rendered = serde_json::to_string_pretty(&payload).unwrap_or_else(|err| {
            eprintln!("error: failed to render check payload: {err}");
            process::exit(2);
        });
        println!("{rendered}");
    } else {
        println!("lazyrun check");
        println!("  module: {}", config.module.display());
        println!("  integrity checked: {}", yes_no(config.integrity.is_some()));
        println!("  state: {state}");
        println!("  elapsed: {elapsed_ms}ms");
        if let Some(error) = bridge.load_error() {
            println!("  error: {error}");
        }
    }

    if !ready {
        process::exit(1);
    }
}
