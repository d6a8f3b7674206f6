use crate::cli::RuntimeArgs;
use crate::support::{build_runtime_or_exit, resolve_config_or_exit};
use chrono::{DateTime, Utc};
use lazyrun_core::{Bridge, EvalOutput};
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::process;
use std::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunRecord {
    /// Position among this run's inputs, from 0.
    index: usize,
    input: String,
    output: String,
    is_error: bool,
    completed_at: DateTime<Utc>,
}

pub fn run(runtime_args: RuntimeArgs, mut inputs: Vec<String>, files: Vec<String>, json: bool) {
    for path in &files {
        let source = fs::read_to_string(path).unwrap_or_else(|e| {
            eprintln!("error: failed to read {path}: {e}");
            process::exit(2);
        });
        inputs.push(source);
    }
    if inputs.is_empty() {
        eprintln!("error: nothing to run (pass INPUT or --file)");
        process::exit(2);
    }

    let config = resolve_config_or_exit(&runtime_args);
    let runtime = build_runtime_or_exit();
    let bridge = Bridge::from_config(&config, runtime.handle().clone());

    debug!(inputs = inputs.len(), module = %config.module.display(), "submitting inputs");
    let (tx, rx) = mpsc::channel::<(usize, EvalOutput, DateTime<Utc>)>();
    for (index, input) in inputs.iter().enumerate() {
        let tx = tx.clone();
        bridge.run(input.clone(), move |output| {
            let _ = tx.send((index, output, Utc::now()));
        });
    }
    drop(tx);

    let mut records: Vec<RunRecord> = rx
        .iter()
        .map(|(index, output, completed_at)| RunRecord {
            index,
            input: inputs[index].clone(),
            output: output.output,
            is_error: output.is_error,
            completed_at,
        })
        .collect();
    records.sort_by_key(|record| record.index);

    let failed = records.iter().filter(|record| record.is_error).count();

    if json {
        let payload = json!({
            "module": config.module.display().to_string(),
            "state": bridge.state(),
            "loadError": bridge.load_error(),
            "results": records,
            "errors": failed,
        });
        let rendered = serde_json::to_string_pretty(&payload).unwrap_or_else(|err| {
            eprintln!("error: failed to render run transcript: {err}");
            process::exit(2);
        });
        println!("{rendered}");
    } else {
        for record in &records {
            if record.is_error {
                println!("[{}] error: {}", record.index, record.output);
            } else {
                println!("[{}] {}", record.index, record.output);
            }
        }
    }

    if failed > 0 {
        process::exit(1);
    }
}
