//! Remote cell execution.
//!
//! Runs one cell's *current* in-memory code against the kernel. A run never
//! requires a prior save, so users can experiment before the autosave
//! commits. One run may be in flight at a time; a second request while one
//! is pending is ignored. The running indicator is cleared through a drop
//! guard, so it is released exactly once whether the request resolves,
//! fails, or the future is dropped.

use std::sync::{Arc, Mutex as StdMutex};

use lab_api::{NotebookApi, ResourceId};
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::cell_store::SharedCellStore;
use crate::session::SessionEvent;

type RunningSlot = Arc<StdMutex<Option<ResourceId>>>;

pub struct ExecutionInvoker {
    api: Arc<dyn NotebookApi>,
    store: SharedCellStore,
    events: mpsc::UnboundedSender<SessionEvent>,
    running: RunningSlot,
}

/// Clears the running indicator when the run completes or is dropped.
struct RunningGuard {
    running: RunningSlot,
    cell_id: ResourceId,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let mut running = self.running.lock().unwrap();
        if running.as_ref() == Some(&self.cell_id) {
            *running = None;
        }
    }
}

impl ExecutionInvoker {
    pub fn new(
        api: Arc<dyn NotebookApi>,
        store: SharedCellStore,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        ExecutionInvoker {
            api,
            store,
            events,
            running: Arc::new(StdMutex::new(None)),
        }
    }

    /// The cell currently executing, if any.
    pub fn running_cell(&self) -> Option<ResourceId> {
        self.running.lock().unwrap().clone()
    }

    /// Execute a cell. Returns `false` without side effects when the cell is
    /// unknown or another run is already in flight.
    ///
    /// On success the store is reconciled via `apply_run`, which merges only
    /// the output fields: a save response racing this one cannot be
    /// clobbered, and local edits typed mid-run keep their code. On failure
    /// the cell's previous outputs are left untouched.
    pub async fn run(&self, cell_id: &ResourceId) -> bool {
        let code = {
            let store = self.store.lock().unwrap();
            match store.get(cell_id) {
                Some(cell) => cell.code.clone(),
                None => {
                    debug!("[exec] run requested for unknown cell {}", cell_id);
                    return false;
                }
            }
        };

        {
            let mut running = self.running.lock().unwrap();
            if let Some(current) = running.as_ref() {
                debug!(
                    "[exec] run for cell {} rejected, cell {} still in flight",
                    cell_id, current
                );
                return false;
            }
            *running = Some(cell_id.clone());
        }
        let _guard = RunningGuard {
            running: Arc::clone(&self.running),
            cell_id: cell_id.clone(),
        };

        info!("[exec] running cell {}", cell_id);
        match self.api.run_cell(cell_id, &code).await {
            Ok(server_cell) => {
                let applied = self.store.lock().unwrap().apply_run(cell_id, &server_cell);
                if !applied {
                    debug!("[exec] cell {} gone, dropping run response", cell_id);
                }
            }
            Err(e) => {
                warn!("[exec] run failed for cell {}: {}", cell_id, e);
                let _ = self
                    .events
                    .send(SessionEvent::Error(e.user_message("Failed to run cell")));
            }
        }
        true
    }
}
