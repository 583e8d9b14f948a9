mod cli;
mod commands;
mod config;
mod resource;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        Command::Resources(args) => {
            commands::resources::run(&ctx, args.resource_type.as_deref(), args.json)
        }
        Command::Plan(args) => commands::lifecycle::plan(&ctx, args.manifest.as_deref()),
        Command::Apply(args) => {
            commands::lifecycle::apply(&ctx, args.manifest.manifest.as_deref(), args.json)
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "switchyard", &mut io::stdout());
            Ok(())
        }
    }
}
