use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::{process::Command, sync::watch};

use crate::error::{Error, Result};

/// Caller configuration forwarded to the backend on its command line.
///
/// Each field maps to one flag; a flag is appended only when its field is
/// set, so the backend never sees empty or placeholder flags.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// IDE the product is integrated into (`--integration-mode <v>`)
    pub integration_mode: Option<String>,
    /// Web port override for the backend's server (`--web-port <v>`)
    pub web_port: Option<u16>,
    /// Backend log level (`--log-level <v>`)
    pub log_level: Option<String>,
    /// Run the backend middleware in debug mode (`--debug-nodejs`)
    pub debug_nodejs: bool,
    /// Mirror backend log output to the console (`--log-to-console`)
    pub log_to_console: bool,
    /// Suppress automatic help tours (`--suppress-automatic-help-tours`)
    pub suppress_automatic_help_tours: bool,
    /// Opt in to usage statistics collection (`--usage-statistics-opt-in`)
    pub usage_statistics_opt_in: bool,
    /// Opt out of usage statistics collection (`--usage-statistics-opt-out`)
    pub usage_statistics_opt_out: bool,
    /// Print the usage statistics agreement text
    /// (`--print-usage-statistics-agreement`)
    pub print_usage_statistics_agreement: bool,
}

impl LaunchOptions {
    /// Builds the full backend argv for the given rendezvous port.
    fn to_argv(&self, rendezvous_port: u16) -> Vec<String> {
        let mut argv = vec![
            "--frontend-service-socket-port".to_string(),
            rendezvous_port.to_string(),
        ];

        if let Some(mode) = &self.integration_mode {
            argv.push("--integration-mode".to_string());
            argv.push(mode.clone());
        }
        if let Some(port) = self.web_port {
            argv.push("--web-port".to_string());
            argv.push(port.to_string());
        }
        if let Some(level) = &self.log_level {
            argv.push("--log-level".to_string());
            argv.push(level.clone());
        }
        if self.debug_nodejs {
            argv.push("--debug-nodejs".to_string());
        }
        if self.log_to_console {
            argv.push("--log-to-console".to_string());
        }
        if self.suppress_automatic_help_tours {
            argv.push("--suppress-automatic-help-tours".to_string());
        }
        if self.usage_statistics_opt_in {
            argv.push("--usage-statistics-opt-in".to_string());
        }
        if self.usage_statistics_opt_out {
            argv.push("--usage-statistics-opt-out".to_string());
        }
        if self.print_usage_statistics_agreement {
            argv.push("--print-usage-statistics-agreement".to_string());
        }

        argv
    }
}

/// One-shot latch behind the "backend closed" notification.
///
/// The child's termination can be observed through more than one underlying
/// signal; whichever arrives first flips the latch and notifies, later ones
/// are no-ops.
struct CloseLatch {
    fired: AtomicBool,
    tx:    watch::Sender<bool>,
}

impl CloseLatch {
    fn fire(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            tracing::info!("backend process closed");
            let _ = self.tx.send(true);
        }
    }
}

/// Cloneable receiver for the single terminal "backend closed" event.
///
/// The orchestrating layer consumes this to trigger full application
/// shutdown once the backend is gone, whatever the exit reason.
#[derive(Debug, Clone)]
pub struct CloseSignal {
    rx: watch::Receiver<bool>,
}

impl CloseSignal {
    /// Resolves once the backend has terminated. Returns immediately if it
    /// already has.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Whether the close notification has already fired.
    pub fn is_closed(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Handle to the spawned backend process.
///
/// The handle does not own the OS process directly; a detached reaper task
/// waits on it and fires the close latch. Dropping the handle neither kills
/// nor detaches the child; teardown is by process exit.
#[derive(Debug)]
pub struct BackendHandle {
    pid:   Option<u32>,
    close: CloseSignal,
}

impl BackendHandle {
    /// OS process id of the backend, if it was still known at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// A fresh receiver for the one-shot close notification.
    pub fn close_signal(&self) -> CloseSignal {
        self.close.clone()
    }
}

/// Spawns the backend executable, wiring its standard streams through to the
/// parent's and arming the one-shot close notification.
///
/// Spawning does not wait for the backend to become ready; readiness is only
/// learned through the rendezvous handshake.
pub fn spawn(
    executable: &Path,
    rendezvous_port: u16,
    options: &LaunchOptions,
) -> Result<BackendHandle> {
    let argv = options.to_argv(rendezvous_port);
    tracing::info!(?executable, ?argv, "spawning backend process");

    let mut child = Command::new(executable)
        .args(&argv)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| Error::Spawn {
            path: PathBuf::from(executable),
            source,
        })?;

    let pid = child.id();

    // Forward the child's diagnostic output to our own streams. These tasks
    // end on their own when the child closes its pipes; they have no bearing
    // on protocol correctness.
    if let Some(mut stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let _ = tokio::io::copy(&mut stdout, &mut tokio::io::stdout()).await;
        });
    }
    if let Some(mut stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let _ = tokio::io::copy(&mut stderr, &mut tokio::io::stderr()).await;
        });
    }

    let (tx, rx) = watch::channel(false);
    let latch = Arc::new(CloseLatch {
        fired: AtomicBool::new(false),
        tx,
    });

    let reaper_latch = Arc::clone(&latch);
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => tracing::info!(%status, "backend process exited"),
            Err(error) => tracing::warn!(%error, "failed to await backend process"),
        }
        reaper_latch.fire();
    });

    tracing::info!(?pid, "backend process was spawned successfully");
    Ok(BackendHandle {
        pid,
        close: CloseSignal { rx },
    })
}
