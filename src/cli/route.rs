//! `route` command: run one operation through the live router.

use std::io::BufRead;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cli::args::{OutputFormat, RouteArgs};
use crate::core::approval::{ApprovalDecision, ApprovalGate, ApprovalTicket};
use crate::core::health::HealthMonitor;
use crate::core::ledger::BudgetLedger;
use crate::core::pricing::PricingRegistry;
use crate::core::request::{Criticality, OperationClass, OperationRequest};
use crate::core::router::{Router, RouterParts};
use crate::error::{Result, SwitchyardError};
use crate::providers::{AdapterRegistry, ProviderId};
use crate::storage::{AppPaths, SpendHistory};
use crate::util::format::{format_duration_ms, format_usd};

/// Execute the `route` command.
pub async fn execute(
    args: &RouteArgs,
    config_path: Option<&std::path::Path>,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let config = crate::cli::load_config(config_path)?;
    let paths = AppPaths::new();
    paths.ensure_dirs()?;

    let priority = config.provider_priority()?;
    let adapters = AdapterRegistry::from_env(&priority)?;
    if adapters.is_empty() {
        let vars: Vec<&str> = priority.iter().map(|p| p.api_key_env()).collect();
        return Err(SwitchyardError::Config(format!(
            "no provider API keys found; set one of: {}",
            vars.join(", ")
        )));
    }

    let pricing = Arc::new(PricingRegistry::from_config(
        config.pricing.table.as_deref(),
        std::time::Duration::from_secs(config.pricing.cache_ttl_secs),
    )?);
    let health = Arc::new(HealthMonitor::new(config.breaker_config()));
    let history = Arc::new(SpendHistory::open(&paths.spend_history_file())?);
    let ledger = Arc::new(BudgetLedger::with_history(config.ledger_config(), history));
    let audit = Arc::new(crate::cli::open_audit_log(&config, &paths)?);

    let approval_config = config.approval_config()?;
    let (approval, tickets) = ApprovalGate::new(approval_config.wait_timeout);
    let approver = spawn_terminal_approver(tickets);

    let router = Router::new(RouterParts {
        adapters,
        pricing,
        health,
        ledger,
        approval: Arc::new(approval),
        audit,
        approval_config,
        invoke_timeout: config.invoke_timeout(),
    });

    let mut request = OperationRequest::new(
        args.identity.clone(),
        OperationClass::from_cli_name(&args.class)?,
        args.input.clone(),
    )
    .with_criticality(Criticality::from_cli_name(&args.criticality)?);
    if let Some(units) = args.units {
        request = request.with_units(units);
    }
    if let Some(provider) = &args.provider {
        request = request.with_preferred_provider(ProviderId::from_cli_name(provider)?);
    }

    let result = router.route(request).await;
    approver.abort();

    let result = result?;
    match format {
        OutputFormat::Json => {
            let rendered = if pretty {
                serde_json::to_string_pretty(&result)?
            } else {
                serde_json::to_string(&result)?
            };
            println!("{rendered}");
        }
        OutputFormat::Human => {
            println!(
                "completed via {} ({}) in {}",
                result.provider.display_name(),
                result.model,
                format_duration_ms(result.duration_ms)
            );
            println!(
                "  committed {} ({} attempt{})",
                format_usd(result.committed_usd),
                result.attempts,
                if result.attempts == 1 { "" } else { "s" }
            );
            println!();
            println!("{}", result.output);
        }
    }
    Ok(())
}

/// Answer approval tickets from the controlling terminal.
///
/// EOF or unreadable stdin rejects the ticket; the gate stays fail-closed
/// when nobody can answer.
fn spawn_terminal_approver(mut tickets: mpsc::Receiver<ApprovalTicket>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(ticket) = tickets.recv().await {
            eprintln!(
                "approval required for {}: {}",
                ticket.record.operation_id, ticket.record.reason
            );
            eprint!("approve? [y/N] ");

            let answer = tokio::task::spawn_blocking(|| {
                let mut line = String::new();
                std::io::stdin().lock().read_line(&mut line).map(|_| line)
            })
            .await;

            let approved = matches!(
                answer,
                Ok(Ok(ref line)) if matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
            );
            let decision = if approved {
                ApprovalDecision::Approve
            } else {
                ApprovalDecision::Reject
            };
            let _ = ticket.responder.send(decision);
        }
    })
}
