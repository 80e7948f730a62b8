//! Service manifest handling.
//!
//! The supervisor ships with a compiled-in manifest describing the two
//! co-located applications it was built to run (a dashboard and a web API).
//! A YAML manifest can replace that pair, which keeps the descriptor list an
//! explicit input and lets tests drive the supervisor with fake commands.
use regex::Regex;
use serde::Deserialize;
use std::{
    collections::{HashMap, HashSet},
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{error, warn};

use crate::{
    constants::{API_PORT, DASHBOARD_PORT, DEFAULT_GRACE_PERIOD},
    error::SupervisorError,
};

/// Represents the structure of the manifest file.
#[derive(Debug, Deserialize)]
pub struct Manifest {
    /// Manifest format version.
    pub version: String,
    /// Services in start order.
    pub services: Vec<ServiceSpec>,
    /// Time to wait for services to exit after a termination request
    /// (e.g. `"10s"`, `"500ms"`). Defaults to ten seconds.
    pub grace_period: Option<String>,
    /// Root directory from which relative paths are resolved.
    pub project_dir: Option<String>,
}

/// Declarative record of how to start one long-lived process.
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceSpec {
    /// Unique service name.
    pub name: String,
    /// Command used to start the service.
    pub command: String,
    /// Working directory for the process. Relative paths resolve against the
    /// manifest's directory.
    pub dir: Option<String>,
    /// Port the service is expected to bind. Advertised metadata only; the
    /// supervisor never probes it.
    pub port: Option<u16>,
    /// Optional environment variables for the service.
    pub env: Option<EnvSpec>,
}

/// Represents environment variables for a service.
#[derive(Debug, Deserialize, Clone)]
pub struct EnvSpec {
    /// Optional path to a dotenv-style file.
    pub file: Option<String>,
    /// Key-value pairs of environment variables.
    pub vars: Option<HashMap<String, String>>,
}

impl EnvSpec {
    /// Resolves the full path to the env file based on a base directory.
    pub fn path(&self, base: &Path) -> Option<PathBuf> {
        self.file.as_ref().map(|f| {
            let path = Path::new(f);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                base.join(path)
            }
        })
    }
}

impl ServiceSpec {
    /// Absolute working directory for the service process.
    pub fn resolved_dir(&self, project_root: &Path) -> PathBuf {
        match &self.dir {
            Some(dir) => {
                let path = Path::new(dir);
                if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    project_root.join(path)
                }
            }
            None => project_root.to_path_buf(),
        }
    }

    /// Builds the child process environment, giving inline `vars` precedence
    /// over entries loaded from `file`.
    pub fn environment(&self, working_dir: &Path) -> HashMap<String, String> {
        let mut resolved = HashMap::new();
        let Some(env) = &self.env else {
            return resolved;
        };

        if let Some(file_path) = env.path(working_dir) {
            match fs::read_to_string(&file_path) {
                Ok(content) => {
                    for raw_line in content.lines() {
                        let line = raw_line.trim();
                        if line.is_empty() || line.starts_with('#') {
                            continue;
                        }

                        if let Some((key, value)) = line.split_once('=') {
                            let key = key.trim().to_string();
                            let mut value = value.trim();

                            if value.starts_with('"')
                                && value.ends_with('"')
                                && value.len() >= 2
                            {
                                value = &value[1..value.len() - 1];
                            }

                            resolved.entry(key).or_insert_with(|| value.to_string());
                        } else {
                            warn!(
                                "Ignoring malformed line in env file for '{}': {line}",
                                self.name
                            );
                        }
                    }
                }
                Err(err) => {
                    error!("Failed to read env file for '{}': {err}", self.name);
                }
            }
        }

        if let Some(vars) = &env.vars {
            for (key, value) in vars {
                resolved.insert(key.clone(), value.clone());
            }
        }

        resolved
    }
}

impl Manifest {
    /// The compiled-in service pair: the dashboard first (matching the
    /// original start order), then the API it talks to. The dashboard
    /// retries its API connection itself, so no start ordering is enforced.
    pub fn builtin() -> Self {
        Self {
            version: "1".into(),
            services: vec![
                ServiceSpec {
                    name: "dashboard".into(),
                    command:
                        "streamlit run main.py --server.address 0.0.0.0 --server.port 8501"
                            .into(),
                    dir: Some("/app/frontend".into()),
                    port: Some(DASHBOARD_PORT),
                    env: None,
                },
                ServiceSpec {
                    name: "api".into(),
                    command: "uvicorn main:app --host 0.0.0.0 --port 8000".into(),
                    dir: Some("/app/backend".into()),
                    port: Some(API_PORT),
                    env: None,
                },
            ],
            grace_period: None,
            project_dir: None,
        }
    }

    /// Checks the manifest invariants: at least one service, unique names.
    pub fn validate(&self) -> Result<(), SupervisorError> {
        if self.services.is_empty() {
            return Err(SupervisorError::NoServices);
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            if !seen.insert(service.name.as_str()) {
                return Err(SupervisorError::DuplicateService(service.name.clone()));
            }
        }

        Ok(())
    }

    /// The configured grace period, falling back to the default.
    pub fn grace_period(&self) -> Result<Duration, SupervisorError> {
        match &self.grace_period {
            Some(raw) => parse_duration(raw),
            None => Ok(DEFAULT_GRACE_PERIOD),
        }
    }

    /// Base directory for resolving relative service paths.
    pub fn project_root(&self) -> PathBuf {
        self.project_dir
            .as_deref()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Expands `$VAR` / `${VAR}` references within a string from the process
/// environment. A reference to an unset variable is an error.
fn expand_env_vars(input: &str) -> Result<String, SupervisorError> {
    let re = Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").unwrap();
    let mut missing: Option<String> = None;

    let result = re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    if let Some(var_name) = missing {
        return Err(SupervisorError::MissingEnvVar(var_name));
    }

    Ok(result.into_owned())
}

/// Parses a human-readable duration such as `"10s"`, `"500ms"`, `"2m"` or
/// `"1h"`. A bare number is interpreted as seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, SupervisorError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(SupervisorError::InvalidDuration(raw.into()));
    }

    let (amount_str, unit_ms) = if let Some(stripped) = value.strip_suffix("ms") {
        (stripped.trim(), 1u64)
    } else if let Some(stripped) = value.strip_suffix('s') {
        (stripped.trim(), 1_000)
    } else if let Some(stripped) = value.strip_suffix('m') {
        (stripped.trim(), 60_000)
    } else if let Some(stripped) = value.strip_suffix('h') {
        (stripped.trim(), 3_600_000)
    } else {
        (value, 1_000)
    };

    let amount: u64 = amount_str
        .parse()
        .map_err(|_| SupervisorError::InvalidDuration(raw.into()))?;

    Ok(Duration::from_millis(amount.saturating_mul(unit_ms)))
}

/// Loads and parses a manifest file, expanding environment variables.
pub fn load_manifest(manifest_path: &str) -> Result<Manifest, SupervisorError> {
    let path = Path::new(manifest_path);
    let content = fs::read_to_string(path).map_err(|e| {
        SupervisorError::ManifestRead(std::io::Error::new(
            e.kind(),
            format!("{} ({})", e, path.display()),
        ))
    })?;

    let expanded = expand_env_vars(&content)?;
    let mut manifest: Manifest = serde_yaml::from_str(&expanded)?;

    let base_path = path.parent().unwrap_or_else(|| Path::new("."));
    manifest.project_dir = Some(base_path.to_string_lossy().to_string());

    manifest.validate()?;
    Ok(manifest)
}
