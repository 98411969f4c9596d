//! `audit` command: list, verify, and export the chain.

use crate::audit::VerifyOutcome;
use crate::cli::args::{AuditCommand, OutputFormat};
use crate::error::{Result, SwitchyardError};
use crate::storage::AppPaths;

/// Execute an `audit` subcommand.
pub fn execute(
    cmd: &AuditCommand,
    config_path: Option<&std::path::Path>,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let config = crate::cli::load_config(config_path)?;
    let paths = AppPaths::new();
    paths.ensure_dirs()?;
    let log = crate::cli::open_audit_log(&config, &paths)?;

    match cmd {
        AuditCommand::List { limit } => {
            let entries = log.export()?;
            let start = entries.len().saturating_sub(*limit);
            let window = &entries[start..];

            match format {
                OutputFormat::Json => print_json(window, pretty)?,
                OutputFormat::Human => {
                    if window.is_empty() {
                        println!("audit chain is empty");
                        return Ok(());
                    }
                    println!(
                        "{:<8} {:<25} {:<18} {:<24} hash",
                        "index", "timestamp", "kind", "operation"
                    );
                    for entry in window {
                        println!(
                            "{:<8} {:<25} {:<18} {:<24} {}",
                            entry.index,
                            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            entry.kind.to_string(),
                            entry.operation_id,
                            &entry.hash[..12]
                        );
                    }
                    println!("({} of {} entries)", window.len(), entries.len());
                }
            }
            Ok(())
        }

        AuditCommand::Verify => {
            let outcome = log.verify()?;
            match format {
                OutputFormat::Json => print_json(&outcome, pretty)?,
                OutputFormat::Human => match &outcome {
                    VerifyOutcome::Valid { length } => {
                        println!("audit chain valid ({length} entries)");
                    }
                    VerifyOutcome::TamperedAt { index, reason } => {
                        println!("audit chain TAMPERED at index {index}: {reason}");
                    }
                },
            }
            match outcome {
                VerifyOutcome::Valid { .. } => Ok(()),
                VerifyOutcome::TamperedAt { index, reason } => {
                    Err(SwitchyardError::AuditTampered { index, reason })
                }
            }
        }

        AuditCommand::Export => {
            let entries = log.export()?;
            print_json(&entries, pretty)
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T, pretty: bool) -> Result<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{rendered}");
    Ok(())
}
