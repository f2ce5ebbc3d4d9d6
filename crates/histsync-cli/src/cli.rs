use clap::{Args, Parser, Subcommand, ValueEnum};
use histsync_core::{Filters, ScrollPosition};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    Off,
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    Info,
    /// Debug messages
    Debug,
    /// Trace-level messages (most verbose)
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON array, one object per step
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "hsync")]
#[command(about = "hsync - drive a scrolling history panel against a synthetic server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Set log level (off, error, warn, info, debug, trace)
    /// If not specified, uses the config file value
    #[arg(short = 'l', long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Enable verbose logging (shortcut for --log-level=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (defaults to ~/.config/histsync/config.toml)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

impl Cli {
    /// Level requested on the command line, if any.
    pub fn requested_level(&self) -> Option<LevelFilter> {
        match (self.log_level, self.verbose) {
            (Some(level), _) => Some(level.into()),
            (None, true) => Some(LevelFilter::DEBUG),
            (None, false) => None,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scroll through a synthetic list and print each settled payload
    Simulate(SimulateArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Debug, Clone, Args)]
pub struct SimulateArgs {
    /// Rows in the synthetic list (hids 1..=N)
    #[arg(long, default_value_t = 100)]
    pub rows: usize,

    /// Page size (overrides the config file)
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Position to visit; repeat for a path (`top`, `0.5`, `cursor:0.25`, `key:42`)
    #[arg(short, long = "position")]
    pub positions: Vec<ScrollPosition>,

    /// Append this many rows after the last position and watch the head
    #[arg(long, default_value_t = 0)]
    pub grow: usize,

    /// Filter text, e.g. `deleted:any name:dataset`
    #[arg(long)]
    pub filter: Option<Filters>,

    /// Soft-delete every Nth row before starting
    #[arg(long)]
    pub delete_every: Option<usize>,

    /// Simulated server latency in milliseconds
    #[arg(long, default_value_t = 0)]
    pub latency_ms: u64,

    /// Seconds to wait for each step to settle
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,

    /// Print the default config file location
    Path,

    /// Write a config file with default values
    Init {
        /// Target path (defaults to the default location)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
