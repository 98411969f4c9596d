//! CLI argument parsing and command dispatch.

pub mod args;
pub mod audit;
pub mod route;
pub mod status;

use std::path::Path;
use std::sync::Arc;

use crate::audit::{AuditLog, FileAuditStore};
use crate::error::Result;
use crate::storage::{AppPaths, RouterConfig};

pub use args::{Cli, Commands, OutputFormat};

/// Open the audit log the way every command sees it: config override first,
/// platform data dir otherwise.
pub(crate) fn open_audit_log(config: &RouterConfig, paths: &AppPaths) -> Result<AuditLog> {
    let log_path = config
        .audit
        .log_file
        .clone()
        .unwrap_or_else(|| paths.audit_log_file());
    let store = Arc::new(FileAuditStore::new(log_path)?);
    AuditLog::open(store, config.append_timeout())
}

/// Resolve config honoring the `--config` flag.
pub(crate) fn load_config(flag_path: Option<&Path>) -> Result<RouterConfig> {
    RouterConfig::resolve(flag_path)
}
