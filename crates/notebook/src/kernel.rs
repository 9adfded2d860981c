//! Kernel status monitoring and package installation.
//!
//! The kernel is a shared remote interpreter; this module only reflects its
//! state and mutates its package set through the REST contract. Status is
//! best-effort display data: a failed fetch becomes the `"error"` sentinel
//! instead of an error, so an unreachable kernel never blocks editing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use lab_api::{InstallOutput, KernelStatus, NotebookApi};
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::session::SessionEvent;

pub struct KernelMonitor {
    api: Arc<dyn NotebookApi>,
    status: StdMutex<KernelStatus>,
}

impl KernelMonitor {
    pub fn new(api: Arc<dyn NotebookApi>) -> Self {
        KernelMonitor {
            api,
            status: StdMutex::new(KernelStatus::unknown()),
        }
    }

    pub fn current(&self) -> KernelStatus {
        self.status.lock().unwrap().clone()
    }

    pub(crate) fn set(&self, status: KernelStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Fetch the kernel's status. Transport failures degrade to the
    /// `"error"` sentinel rather than propagating.
    pub async fn refresh(&self) -> KernelStatus {
        let status = match self.api.kernel_status().await {
            Ok(status) => status,
            Err(e) => {
                warn!("[kernel] status fetch failed: {}", e);
                KernelStatus::error_sentinel()
            }
        };
        self.set(status.clone());
        status
    }
}

pub struct PackageInstaller {
    api: Arc<dyn NotebookApi>,
    monitor: Arc<KernelMonitor>,
    events: mpsc::UnboundedSender<SessionEvent>,
    installing: AtomicBool,
    last_output: StdMutex<Option<InstallOutput>>,
}

impl PackageInstaller {
    pub fn new(
        api: Arc<dyn NotebookApi>,
        monitor: Arc<KernelMonitor>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        PackageInstaller {
            api,
            monitor,
            events,
            installing: AtomicBool::new(false),
            last_output: StdMutex::new(None),
        }
    }

    pub fn is_installing(&self) -> bool {
        self.installing.load(Ordering::Acquire)
    }

    /// Captured output of the most recent install, for the output pane.
    pub fn last_output(&self) -> Option<InstallOutput> {
        self.last_output.lock().unwrap().clone()
    }

    /// Install one package into the kernel. Returns `false` when the name is
    /// empty after trimming or another install is still in flight.
    ///
    /// The kernel status is refreshed afterward regardless of outcome, since
    /// a failed install may still have changed kernel state. The in-flight
    /// flag covers that refresh, so two installs cannot interleave their
    /// status updates.
    pub async fn install(&self, package: &str) -> bool {
        let package = package.trim();
        if package.is_empty() {
            return false;
        }
        if self
            .installing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("[kernel] install already in flight, ignoring {}", package);
            return false;
        }

        *self.last_output.lock().unwrap() = None;
        info!("[kernel] installing package {}", package);

        match self.api.install_package(package).await {
            Ok(output) => {
                *self.last_output.lock().unwrap() = Some(output);
            }
            Err(e) => {
                warn!("[kernel] install failed for {}: {}", package, e);
                let _ = self.events.send(SessionEvent::Error(
                    e.user_message("Failed to install package"),
                ));
            }
        }

        self.monitor.refresh().await;
        self.installing.store(false, Ordering::Release);
        true
    }
}
