//! Constants shared across the supervisor.

use std::time::Duration;

/// Shell used to execute service command strings.
pub const DEFAULT_SHELL: &str = "sh";

/// Shell argument flag for executing command strings.
pub const SHELL_COMMAND_FLAG: &str = "-c";

/// Interval between child exit-status polls.
pub const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Time services are given to exit after a termination request before they
/// are forcibly killed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Advertised port of the built-in dashboard service.
pub const DASHBOARD_PORT: u16 = 8501;

/// Advertised port of the built-in API service.
pub const API_PORT: u16 = 8000;
