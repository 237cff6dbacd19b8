//! Moonbridge command-line runner
//!
//! Runs, evaluates and syntax-checks Lua scripts on the Moonbridge engine.
//! Errors raised by scripts are reported on stderr through the engine's
//! error handler; the process exits with status 1 when any script fails.

mod commands;
mod config;
mod logging;
mod session;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "moonbridge")]
#[command(about = "Run Lua scripts on the Moonbridge engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (defaults to ./moonbridge.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by commands that execute code
#[derive(clap::Args, Debug, Clone, Default)]
struct ExecFlags {
    /// Run against a restricted global environment
    #[arg(long)]
    sandbox: bool,

    /// Do not open any standard library
    #[arg(long)]
    no_std: bool,

    /// Append stack tracebacks to runtime errors
    #[arg(long)]
    traceback: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Lua file
    Run {
        /// Script to run
        file: PathBuf,
        /// Arguments exposed to the script through the `arg` table
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
        #[command(flatten)]
        flags: ExecFlags,
    },

    /// Evaluate an inline chunk and print its results
    Eval {
        /// Lua source
        code: String,
        #[command(flatten)]
        flags: ExecFlags,
    },

    /// Compile files without running them
    Check {
        /// Files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cwd = std::env::current_dir()?;
    let config = match config::CliConfig::discover(cli.config.as_deref(), &cwd) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { file, args, flags } => {
            commands::run::execute(&config, &flags.into(), &file, args)
        }
        Commands::Eval { code, flags } => commands::eval::execute(&config, &flags.into(), &code),
        Commands::Check { files } => commands::check::execute(&config, &files),
    };

    match result {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

impl From<ExecFlags> for session::Overrides {
    fn from(flags: ExecFlags) -> Self {
        Self {
            sandbox: flags.sandbox,
            no_std: flags.no_std,
            traceback: flags.traceback,
        }
    }
}
