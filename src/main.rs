//! switchyard CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::{CommandFactory, Parser};
use std::process::ExitCode;

use switchyard::cli::{Cli, Commands};
use switchyard::core::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = cli
        .log_level
        .as_deref()
        .and_then(logging::LogLevel::from_arg)
        .or_else(logging::level_from_env)
        .unwrap_or_default();
    let log_format = if cli.json_output {
        logging::LogFormat::Json
    } else {
        logging::format_from_env().unwrap_or_default()
    };
    logging::init(log_level, log_format, logging::file_from_env(), cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), "{e}");
            eprintln!("error[{}]: {e}", e.error_code());
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> switchyard::Result<()> {
    let format = cli.effective_format();
    let pretty = cli.pretty;
    let config_path = cli.config.as_deref();

    match cli.command {
        None => {
            print_quickstart();
            Ok(())
        }

        Some(Commands::Route(args)) => {
            switchyard::cli::route::execute(&args, config_path, format, pretty).await
        }

        Some(Commands::Audit(cmd)) => {
            switchyard::cli::audit::execute(&cmd, config_path, format, pretty)
        }

        Some(Commands::Status(args)) => {
            switchyard::cli::status::execute_status(&args, config_path, format, pretty).await
        }

        Some(Commands::Budget(args)) => {
            switchyard::cli::status::execute_budget(&args, config_path, format, pretty)
        }

        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Print quickstart help when no command is given.
fn print_quickstart() {
    println!(
        r"switchyard - budget-aware operation router

Route operations across AI providers under budget, health, and approval
constraints, with a tamper-evident audit trail.

USAGE:
    switchyard [OPTIONS] <COMMAND>

COMMANDS:
    route        Route one operation through the configured providers
    audit        List, verify, or export the audit chain
    status       Show providers, budget ceiling, and chain health
    budget       Show remaining budget for an identity
    completions  Generate shell completions

QUICK START:
    switchyard route --identity you@example.com --input 'hello there'
    switchyard status --probe
    switchyard audit verify
    switchyard budget --identity you@example.com

ROBOT MODE (for scripts):
    switchyard route --identity u1 --input hi --json
    switchyard audit export --pretty

Provider credentials come from ANTHROPIC_API_KEY, OPENAI_API_KEY, and
GEMINI_API_KEY. For more help: switchyard --help
"
    );
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
}
