//! lazyrun CLI: the `lazyrun` command.

mod cli;
mod commands;
mod support;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    support::init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            runtime,
            inputs,
            files,
            json,
        } => commands::run::run(runtime, inputs, files, json),

        Commands::Repl { runtime, preload } => commands::repl::run(runtime, preload),

        Commands::Serve {
            runtime,
            bind,
            max_body_bytes,
            preload,
        } => commands::serve::run(commands::serve::Args {
            runtime,
            bind,
            max_body_bytes,
            preload,
        }),

        Commands::Check { runtime, json } => commands::check::run(runtime, json),
    }
}
