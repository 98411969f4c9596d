//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Budget-aware operation router for multi-provider AI backends.
#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    // === Global flags ===
    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Config file path (overrides SWITCHYARD_CONFIG)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub const fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Human,
    /// Machine-readable JSON.
    Json,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Route one operation through the configured providers
    Route(RouteArgs),

    /// Inspect and verify the audit chain
    #[command(subcommand)]
    Audit(AuditCommand),

    /// Show breaker states, configuration, and provider reachability
    Status(StatusArgs),

    /// Show remaining budget for an identity
    Budget(BudgetArgs),

    /// Generate shell completions
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Arguments for the `route` command.
#[derive(Parser, Debug)]
pub struct RouteArgs {
    /// Identity the operation is billed to
    #[arg(long, value_name = "ID")]
    pub identity: String,

    /// Operation class (generate, embed, transcribe, moderate)
    #[arg(long, default_value = "generate", value_name = "CLASS")]
    pub class: String,

    /// Operation input payload
    #[arg(long, value_name = "TEXT")]
    pub input: String,

    /// Size hint in units (defaults to a size derived from the input)
    #[arg(long, value_name = "N")]
    pub units: Option<u64>,

    /// Preferred provider (tried first when healthy)
    #[arg(long, value_name = "PROVIDER")]
    pub provider: Option<String>,

    /// Criticality tag (routine, elevated, critical)
    #[arg(long, default_value = "routine", value_name = "LEVEL")]
    pub criticality: String,
}

/// Subcommands for `audit`.
#[derive(Subcommand, Debug)]
pub enum AuditCommand {
    /// List recent entries
    List {
        /// Maximum entries to show, newest last
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Verify the whole chain
    Verify,
    /// Export the whole chain as JSON
    Export,
}

/// Arguments for the `status` command.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Probe provider reachability
    #[arg(long)]
    pub probe: bool,
}

/// Arguments for the `budget` command.
#[derive(Parser, Debug)]
pub struct BudgetArgs {
    /// Identity to report on
    #[arg(long, value_name = "ID")]
    pub identity: String,
}
