//! Persistence: app paths, configuration, committed-spend history.

pub mod config;
pub mod paths;
pub mod spend_history;

pub use config::RouterConfig;
pub use paths::AppPaths;
pub use spend_history::SpendHistory;
