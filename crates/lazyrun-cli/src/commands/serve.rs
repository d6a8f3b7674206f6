use crate::cli::RuntimeArgs;
use crate::support::{build_runtime_or_exit, resolve_config_or_exit};
use lazyrun_core::Bridge;
use lazyrun_ux::http::{HttpServerConfig, serve_eval_api};
use std::net::SocketAddr;
use std::process;

pub struct Args {
    pub runtime: RuntimeArgs,
    pub bind: String,
    pub max_body_bytes: usize,
    pub preload: bool,
}

pub fn run(args: Args) {
    let bind_addr: SocketAddr = args.bind.parse().unwrap_or_else(|e| {
        eprintln!("error: invalid --bind address `{}`: {e}", args.bind);
        process::exit(1);
    });
    let config = resolve_config_or_exit(&args.runtime);
    let runtime = build_runtime_or_exit();
    let bridge = Bridge::from_config(&config, runtime.handle().clone());
    if args.preload {
        bridge.preload();
    }

    println!("lazyrun serve");
    println!("  bind: {bind_addr}");
    println!("  module: {}", config.module.display());
    println!("  state: {}", bridge.state());
    println!("  routes:");
    println!("    GET /healthz");
    println!("    GET /state");
    println!("    GET /run?source=<text>");
    println!("    POST /run");

    let http = HttpServerConfig {
        bind: bind_addr,
        max_body_bytes: args.max_body_bytes,
    };
    if let Err(e) = serve_eval_api(http, &bridge) {
        eprintln!("error: evaluation API failed: {e}");
        process::exit(1);
    }
}
