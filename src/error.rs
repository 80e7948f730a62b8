//! Error handling for duet.
use thiserror::Error;

/// Defines all possible errors raised by the supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Error reading or accessing a manifest file.
    #[error("Failed to read manifest file: {0}")]
    ManifestRead(#[from] std::io::Error),

    /// Error parsing a YAML manifest.
    #[error("Invalid manifest format: {0}")]
    ManifestParse(#[from] serde_yaml::Error),

    /// A manifest with an empty service list.
    #[error("Manifest declares no services")]
    NoServices,

    /// Two services sharing one name.
    #[error("Duplicate service name '{0}' in manifest")]
    DuplicateService(String),

    /// A `$VAR` reference in the manifest with no matching variable set.
    #[error("Missing environment variable referenced by manifest: {0}")]
    MissingEnvVar(String),

    /// An unparseable grace-period value.
    #[error("Invalid duration value: '{0}'")]
    InvalidDuration(String),

    /// Error spawning a service process.
    #[error("Failed to start service '{service}': {source}")]
    ServiceStart {
        /// The service name that failed to start.
        service: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error signalling a service process.
    #[error("Failed to stop service '{service}': {source}")]
    ServiceStop {
        /// The service name that failed to stop.
        service: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error installing the termination signal handler.
    #[error("Failed to install signal handler: {0}")]
    SignalHandler(#[from] ctrlc::Error),
}
