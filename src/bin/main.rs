use std::{
    process,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use duet::{
    cli::{Cli, parse_args},
    config::{Manifest, load_manifest},
    error::SupervisorError,
    supervisor::Supervisor,
};

fn main() {
    let args = parse_args();
    init_logging(&args);

    match run(args) {
        Ok(code) => process::exit(code),
        Err(err) => {
            error!("Supervisor exited with error: {err}");
            process::exit(1);
        }
    }
}

fn run(args: Cli) -> Result<i32, SupervisorError> {
    let mut manifest = match args.manifest.as_deref() {
        Some(path) => load_manifest(path)?,
        None => Manifest::builtin(),
    };

    if let Some(raw) = &args.grace_period {
        manifest.grace_period = Some(raw.clone());
    }

    if args.check {
        manifest.validate()?;
        let grace = manifest.grace_period()?;
        for service in &manifest.services {
            match service.port {
                Some(port) => {
                    info!("Service '{}' (port {port}): {}", service.name, service.command)
                }
                None => info!("Service '{}': {}", service.name, service.command),
            }
        }
        info!(
            "Manifest OK: {} service(s), grace period {grace:?}",
            manifest.services.len()
        );
        return Ok(0);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    register_signal_handler(Arc::clone(&shutdown))?;

    let mut supervisor = Supervisor::from_manifest(manifest, shutdown)?;
    supervisor.start()?;
    supervisor.run()
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Traps SIGINT/SIGTERM/SIGHUP and flips the shared shutdown flag observed
/// by the supervisor loop. A second signal exits immediately.
fn register_signal_handler(
    shutdown: Arc<AtomicBool>,
) -> Result<(), SupervisorError> {
    ctrlc::set_handler(move || {
        if shutdown.swap(true, Ordering::SeqCst) {
            process::exit(1);
        }
    })?;

    Ok(())
}
