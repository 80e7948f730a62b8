//! Supervisor runtime: launches the declared services, multiplexes their
//! exit events, and maps the outcome onto the container exit status.
//!
//! Every child runs in its own process group so the supervisor can signal a
//! whole service tree without touching its own group. Child stdout/stderr
//! are inherited, so service logs flow straight to the container runtime.

use std::{
    os::unix::process::{CommandExt, ExitStatusExt},
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use tracing::{debug, error, info, warn};

use crate::{
    config::{Manifest, ServiceSpec},
    constants::{CHILD_POLL_INTERVAL, DEFAULT_SHELL, SHELL_COMMAND_FLAG},
    error::SupervisorError,
};

/// A launched service plus the exit status captured once it terminates.
struct RunningService {
    name: String,
    child: Child,
    exited: Option<ExitStatus>,
}

impl RunningService {
    /// The service's process group ID. Children call `setpgid(0, 0)` before
    /// exec, so the group ID equals the child PID.
    fn pgid(&self) -> Pid {
        Pid::from_raw(self.child.id() as i32)
    }

    /// Records and returns the exit status if the process has terminated.
    fn poll(&mut self) -> Option<ExitStatus> {
        if self.exited.is_none() {
            match self.child.try_wait() {
                Ok(Some(status)) => self.exited = Some(status),
                Ok(None) => {}
                Err(err) => error!("Failed to check status of '{}': {err}", self.name),
            }
        }
        self.exited
    }

    /// Asks the service's process group to terminate.
    fn request_termination(&self) -> Result<(), SupervisorError> {
        match signal::killpg(self.pgid(), Signal::SIGTERM) {
            Ok(()) => {
                debug!(
                    "Sent SIGTERM to process group {} for service '{}'",
                    self.pgid(),
                    self.name
                );
                Ok(())
            }
            Err(Errno::ESRCH) => {
                debug!("Service '{}' no longer has a live process group", self.name);
                Ok(())
            }
            Err(err) => {
                warn!(
                    "Failed to signal process group {} for '{}': {err}; falling back to a direct signal",
                    self.pgid(),
                    self.name
                );
                match signal::kill(self.pgid(), Signal::SIGTERM) {
                    Ok(()) | Err(Errno::ESRCH) => Ok(()),
                    Err(_) => Err(SupervisorError::ServiceStop {
                        service: self.name.clone(),
                        source: std::io::Error::from_raw_os_error(err as i32),
                    }),
                }
            }
        }
    }

    /// Forcibly terminates the service's process group and reaps it.
    fn force_kill(&mut self) {
        if let Err(err) = signal::killpg(self.pgid(), Signal::SIGKILL)
            && err != Errno::ESRCH
        {
            warn!(
                "Failed to kill process group {} for '{}': {err}",
                self.pgid(),
                self.name
            );
            let _ = self.child.kill();
        }

        match self.child.wait() {
            Ok(status) => self.exited = Some(status),
            Err(err) => error!("Failed to reap service '{}': {err}", self.name),
        }
    }
}

/// Starts, monitors, and stops the declared services. Holds the only
/// reference to each child process handle.
pub struct Supervisor {
    services: Vec<ServiceSpec>,
    children: Vec<RunningService>,
    grace_period: Duration,
    shutdown: Arc<AtomicBool>,
    project_root: PathBuf,
}

impl Supervisor {
    /// Creates a supervisor from a manifest. The shutdown flag is shared
    /// with the signal handler; flipping it initiates graceful shutdown.
    pub fn from_manifest(
        manifest: Manifest,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, SupervisorError> {
        manifest.validate()?;
        let grace_period = manifest.grace_period()?;
        let project_root = manifest.project_root();

        Ok(Self {
            services: manifest.services,
            children: Vec::new(),
            grace_period,
            shutdown,
            project_root,
        })
    }

    /// Launches every declared service in listed order without waiting for
    /// readiness, so both services run concurrently. A spawn failure tears
    /// down the services already started and is fatal.
    pub fn start(&mut self) -> Result<(), SupervisorError> {
        let specs = self.services.clone();
        for spec in &specs {
            match launch_service(spec, &self.project_root) {
                Ok(child) => {
                    let pid = child.id();
                    match spec.port {
                        Some(port) => info!(
                            "Started service '{}' (PID {pid}), advertising port {port}",
                            spec.name
                        ),
                        None => info!("Started service '{}' (PID {pid})", spec.name),
                    }
                    self.children.push(RunningService {
                        name: spec.name.clone(),
                        child,
                        exited: None,
                    });
                }
                Err(err) => {
                    error!("{err}");
                    if !self.children.is_empty() {
                        warn!("Tearing down already-started services after launch failure");
                        self.stop_all();
                    }
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// PIDs of the services under supervision.
    pub fn child_pids(&self) -> Vec<u32> {
        self.children.iter().map(|svc| svc.child.id()).collect()
    }

    /// Blocks until a shutdown is requested or any service exits, then stops
    /// everything and returns the container exit code.
    ///
    /// Any service exit before a shutdown request is fatal: there is no state
    /// in which one service is up and the other permanently down. Restarting
    /// a crashed pair is the orchestrator's job.
    pub fn run(&mut self) -> Result<i32, SupervisorError> {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("Termination request received; stopping services");
                return Ok(self.stop_all());
            }

            if let Some((name, status)) = self.poll_children() {
                warn!(
                    "Service '{name}' exited unexpectedly with {status:?}; stopping remaining services"
                );
                self.stop_all();
                return Ok(exit_code_for(status));
            }

            thread::sleep(CHILD_POLL_INTERVAL);
        }
    }

    /// Returns the first service observed to have exited, if any.
    fn poll_children(&mut self) -> Option<(String, ExitStatus)> {
        for svc in &mut self.children {
            if let Some(status) = svc.poll() {
                return Some((svc.name.clone(), status));
            }
        }
        None
    }

    /// Asks every live service to terminate, waits up to the grace period,
    /// then SIGKILLs stragglers. Returns 0 only if every service stopped
    /// cleanly.
    fn stop_all(&mut self) -> i32 {
        let mut unclean = false;

        for svc in &mut self.children {
            if svc.poll().is_some() {
                continue;
            }
            if let Err(err) = svc.request_termination() {
                error!("{err}");
                unclean = true;
            }
        }

        let deadline = Instant::now() + self.grace_period;
        while self.children.iter_mut().any(|svc| svc.poll().is_none()) {
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(CHILD_POLL_INTERVAL);
        }

        for svc in &mut self.children {
            if svc.poll().is_none() {
                warn!(
                    "Service '{}' did not exit within the grace period; sending SIGKILL",
                    svc.name
                );
                svc.force_kill();
                unclean = true;
            }
        }

        for svc in &self.children {
            match svc.exited {
                Some(status) if stopped_cleanly(status) => {
                    debug!("Service '{}' stopped cleanly", svc.name);
                }
                Some(status) => {
                    warn!("Service '{}' stopped uncleanly with {status:?}", svc.name);
                    unclean = true;
                }
                None => unclean = true,
            }
        }

        if unclean { 1 } else { 0 }
    }
}

/// Launches a service as a child process in its own process group.
///
/// On Linux, children additionally receive `SIGTERM` through
/// `PR_SET_PDEATHSIG` if the supervisor itself dies abruptly, so a crashed
/// supervisor cannot leave orphans behind.
fn launch_service(
    spec: &ServiceSpec,
    project_root: &Path,
) -> Result<Child, SupervisorError> {
    let working_dir = spec.resolved_dir(project_root);
    debug!(
        "Launching service '{}' in {:?} with command `{}`",
        spec.name, working_dir, spec.command
    );

    let mut cmd = Command::new(DEFAULT_SHELL);
    cmd.arg(SHELL_COMMAND_FLAG).arg(&spec.command);
    cmd.current_dir(&working_dir);
    // Stdout/stderr stay inherited: service logs are pass-through.
    cmd.stdin(Stdio::null());

    let merged_env = spec.environment(&working_dir);
    if !merged_env.is_empty() {
        let keys: Vec<_> = merged_env.keys().cloned().collect();
        debug!("Setting environment variables for '{}': {keys:?}", spec.name);
        for (key, value) in merged_env {
            cmd.env(key, value);
        }
    }

    unsafe {
        cmd.pre_exec(|| {
            // Place the service in its own process group so the whole tree
            // can be signalled without touching the supervisor's group.
            if libc::setpgid(0, 0) < 0 {
                return Err(std::io::Error::last_os_error());
            }

            #[cfg(target_os = "linux")]
            {
                use libc::{PR_SET_PDEATHSIG, SIGTERM, prctl};
                if prctl(PR_SET_PDEATHSIG, SIGTERM, 0, 0, 0) < 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }

            Ok(())
        });
    }

    cmd.spawn().map_err(|source| SupervisorError::ServiceStart {
        service: spec.name.clone(),
        source,
    })
}

/// Whether an exit status counts as a clean stop during shutdown. Exit 0
/// qualifies, as does death by the SIGTERM the supervisor forwarded; needing
/// SIGKILL or exiting non-zero does not.
fn stopped_cleanly(status: ExitStatus) -> bool {
    status.code() == Some(0) || status.signal() == Some(libc::SIGTERM)
}

/// Container exit code for a service that died without a shutdown request.
/// A non-zero child code is propagated as-is; a premature clean exit is
/// still a failure; signal deaths map to the usual `128 + signo`.
fn exit_code_for(status: ExitStatus) -> i32 {
    match status.code() {
        Some(0) => 1,
        Some(code) => code,
        None => status.signal().map_or(1, |signo| 128 + signo),
    }
}
