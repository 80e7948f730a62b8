//! Command-line interface for duet.
use std::str::FromStr;

use clap::Parser;

/// Log level argument validated against the names `tracing` accepts.
#[derive(Clone, Copy, Debug)]
pub struct LogLevelArg(&'static str);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let name = match value.trim().to_ascii_lowercase().as_str() {
            "off" => "off",
            "error" | "err" => "error",
            "warn" | "warning" => "warn",
            "info" => "info",
            "debug" => "debug",
            "trace" => "trace",
            other => return Err(format!("invalid log level '{other}'")),
        };

        Ok(LogLevelArg(name))
    }
}

/// Command-line interface for the duet supervisor.
///
/// Invoked with no arguments, duet starts the compiled-in service pair and
/// supervises it until the container is stopped.
#[derive(Parser)]
#[command(name = "duet", version, author)]
#[command(about = "A minimal in-container supervisor for co-located services", long_about = None)]
pub struct Cli {
    /// Path to a YAML service manifest replacing the built-in service pair.
    #[arg(short, long, value_name = "PATH")]
    pub manifest: Option<String>,

    /// Override the shutdown grace period (e.g. "10s", "500ms", "2m").
    #[arg(long, value_name = "DURATION")]
    pub grace_period: Option<String>,

    /// Validate the manifest and print the service list without starting
    /// anything.
    #[arg(long)]
    pub check: bool,

    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<LogLevelArg>,
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
