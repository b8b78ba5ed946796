// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use clap::{Parser, Subcommand};
use std::process;

mod commands;
mod error;
mod output;

use commands::coordinator::{self, CoordinatorCommands};
use commands::query::{self, QueryCommands};
use commands::worker::{self, WorkerCommands};
use error::exit_codes;

/// coordfab - run and query a distributed worker coordination fabric
#[derive(Parser)]
#[command(name = "coordfab")]
#[command(author = "Coord Fabric Contributors")]
#[command(version)]
#[command(about = "Run and query a distributed worker coordination fabric", long_about = None)]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Coordinator process commands
    #[command(subcommand)]
    Coordinator(CoordinatorCommands),

    /// Worker agent commands
    #[command(subcommand)]
    Worker(WorkerCommands),

    /// Query a running coordinator
    #[command(subcommand)]
    Query(QueryCommands),

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Handle color output
    if cli.no_color {
        colored::control::set_override(false);
    }

    // Execute command
    let exit_code = match cli.command {
        Commands::Coordinator(cmd) => match coordinator::execute(cmd, cli.verbose).await {
            Ok(()) => exit_codes::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e}");
                exit_codes::ERROR
            }
        },
        Commands::Worker(cmd) => match worker::execute(cmd, cli.verbose).await {
            Ok(()) => exit_codes::SUCCESS,
            Err(e) => {
                e.print_error();
                e.exit_code()
            }
        },
        Commands::Query(cmd) => match query::execute(cmd).await {
            Ok(()) => exit_codes::SUCCESS,
            Err(e) => {
                e.print_error();
                e.exit_code()
            }
        },
        Commands::Completions { shell } => {
            generate_completions(shell);
            exit_codes::SUCCESS
        }
    };

    if exit_code != exit_codes::SUCCESS {
        process::exit(exit_code);
    }
}

fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}
