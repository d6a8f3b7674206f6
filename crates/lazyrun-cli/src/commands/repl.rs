use crate::cli::RuntimeArgs;
use crate::support::{build_runtime_or_exit, resolve_config_or_exit};
use lazyrun_core::Bridge;
use lazyrun_ux::{EvalBackend, RUNNING_INDICATION, ResultStyle, RunnerBoard, UiEvent};
use std::io::{self, BufRead, Write};
use std::process;

const RUNNER_ID: &str = "repl";

pub fn run(runtime_args: RuntimeArgs, preload: bool) {
    let config = resolve_config_or_exit(&runtime_args);
    let runtime = build_runtime_or_exit();
    let bridge = Bridge::from_config(&config, runtime.handle().clone());
    if preload {
        bridge.preload();
    }

    let mut board = RunnerBoard::new(bridge);
    let runner = board.mount(RUNNER_ID, "");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line.unwrap_or_else(|e| {
            eprintln!("error: failed to read stdin: {e}");
            process::exit(1);
        });
        let line = line.trim();
        match line {
            "" => continue,
            ":quit" => break,
            ":state" => {
                println!("{}", board.backend().state());
                continue;
            }
            ":clear" => {
                if let Err(e) = board.handle(&UiEvent::clear(RUNNER_ID)) {
                    eprintln!("error: {e}");
                }
                continue;
            }
            source => runner.set_source(source),
        }

        match board.handle(&UiEvent::run(RUNNER_ID)) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                eprintln!("error: {e}");
                continue;
            }
        }
        // A ready runtime has already answered by now.
        if !runner.view().run_enabled {
            eprintln!("{RUNNING_INDICATION}");
        }

        let view = runner.wait_settled();
        if let Some(panel) = view.result {
            match panel.style {
                ResultStyle::Error => println!("error: {}", panel.text),
                _ => println!("{}", panel.text),
            }
        }
        let _ = stdout.flush();
    }
}
