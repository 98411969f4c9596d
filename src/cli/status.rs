//! `status` and `budget` commands: read-only views over configuration,
//! providers, the audit chain, and the spend ledger.

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;

use crate::cli::args::{BudgetArgs, OutputFormat, StatusArgs};
use crate::error::Result;
use crate::providers::{AdapterRegistry, ProviderId};
use crate::storage::{AppPaths, SpendHistory};
use crate::util::format::format_usd;
use crate::util::time::{format_countdown, next_rollover, today_utc};

#[derive(Serialize)]
struct ProviderStatus {
    provider: ProviderId,
    key_present: bool,
    reachable: Option<bool>,
}

#[derive(Serialize)]
struct StatusReport {
    providers: Vec<ProviderStatus>,
    daily_ceiling_usd: f64,
    operations_committed_today: u64,
    audit_entries: u64,
    audit_valid: bool,
}

/// Execute the `status` command.
pub async fn execute_status(
    args: &StatusArgs,
    config_path: Option<&std::path::Path>,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let config = crate::cli::load_config(config_path)?;
    let paths = AppPaths::new();
    paths.ensure_dirs()?;

    let priority = config.provider_priority()?;
    let mut providers: Vec<ProviderStatus> = priority
        .iter()
        .map(|&provider| ProviderStatus {
            provider,
            key_present: std::env::var(provider.api_key_env()).is_ok(),
            reachable: None,
        })
        .collect();

    if args.probe {
        let adapters = AdapterRegistry::from_env(&priority)?;
        let probes = join_all(adapters.iter().map(|adapter| async move {
            (adapter.id(), adapter.probe().await)
        }))
        .await;
        for (provider, reachable) in probes {
            if let Some(status) = providers.iter_mut().find(|s| s.provider == provider) {
                status.reachable = Some(reachable);
            }
        }
    }

    let log = crate::cli::open_audit_log(&config, &paths)?;
    let entries = log.export()?;
    let verify = log.verify()?;

    let history = SpendHistory::open(&paths.spend_history_file())?;
    let report = StatusReport {
        providers,
        daily_ceiling_usd: config.budget.daily_ceiling_usd,
        operations_committed_today: history.operations_on(today_utc())?,
        audit_entries: entries.len() as u64,
        audit_valid: verify.is_valid(),
    };

    match format {
        OutputFormat::Json => {
            let rendered = if pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            println!("{rendered}");
        }
        OutputFormat::Human => {
            println!("providers (priority order):");
            for status in &report.providers {
                let key = if status.key_present { "key" } else { "no key" };
                let reach = match status.reachable {
                    Some(true) => ", reachable",
                    Some(false) => ", UNREACHABLE",
                    None => "",
                };
                println!(
                    "  {:<12} {}{}",
                    status.provider.display_name(),
                    key,
                    reach
                );
            }
            println!(
                "budget ceiling: {} per identity per day",
                format_usd(report.daily_ceiling_usd)
            );
            println!(
                "operations committed today: {}",
                report.operations_committed_today
            );
            println!(
                "audit chain: {} entries, {}",
                report.audit_entries,
                if report.audit_valid { "valid" } else { "TAMPERED" }
            );
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct BudgetReport {
    identity: String,
    committed_usd: f64,
    ceiling_usd: f64,
    remaining_usd: f64,
    resets: String,
}

/// Execute the `budget` command.
pub fn execute_budget(
    args: &BudgetArgs,
    config_path: Option<&std::path::Path>,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let config = crate::cli::load_config(config_path)?;
    let paths = AppPaths::new();
    paths.ensure_dirs()?;

    let history = SpendHistory::open(&paths.spend_history_file())?;
    let committed = history.committed_total(&args.identity, today_utc())?;
    let ceiling = config.budget.daily_ceiling_usd;

    let report = BudgetReport {
        identity: args.identity.clone(),
        committed_usd: committed,
        ceiling_usd: ceiling,
        remaining_usd: (ceiling - committed).max(0.0),
        resets: format_countdown(next_rollover(Utc::now())),
    };

    match format {
        OutputFormat::Json => {
            let rendered = if pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            println!("{rendered}");
        }
        OutputFormat::Human => {
            println!(
                "{}: {} of {} committed today, {} remaining (resets {})",
                report.identity,
                format_usd(report.committed_usd),
                format_usd(report.ceiling_usd),
                format_usd(report.remaining_usd),
                report.resets
            );
        }
    }
    Ok(())
}
