//! Debounced per-cell autosave.
//!
//! Coalesces rapid edits into one remote update per quiet period: scheduling
//! a save for a cell cancels and replaces any pending timer for that cell,
//! so only the most recent patch within the window is sent. The registry is
//! owned by the session and torn down with it; `cancel_all` aborts every
//! pending timer without firing.
//!
//! Aborting a timer whose request is already in flight drops the request
//! future, so a superseded save can never reconcile a stale response.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use lab_api::{CellPatch, NotebookApi, ResourceId};
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cell_store::SharedCellStore;
use crate::session::SessionEvent;

/// Quiet period between the last edit and the save request.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(800);

struct PendingSave {
    seq: u64,
    task: JoinHandle<()>,
}

type TimerMap = Arc<StdMutex<HashMap<ResourceId, PendingSave>>>;

pub struct SaveScheduler {
    api: Arc<dyn NotebookApi>,
    store: SharedCellStore,
    events: mpsc::UnboundedSender<SessionEvent>,
    quiet_period: Duration,
    timers: TimerMap,
    next_seq: AtomicU64,
}

impl SaveScheduler {
    pub fn new(
        api: Arc<dyn NotebookApi>,
        store: SharedCellStore,
        events: mpsc::UnboundedSender<SessionEvent>,
        quiet_period: Duration,
    ) -> Self {
        SaveScheduler {
            api,
            store,
            events,
            quiet_period,
            timers: Arc::new(StdMutex::new(HashMap::new())),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Arm (or re-arm) the save timer for one cell.
    ///
    /// After the quiet period the patch is sent and the store reconciled
    /// with the server's echo via `apply_save`. Failures go to the session
    /// event channel; the optimistic local edit stays in place and the next
    /// edit retries through the same path.
    pub fn schedule(&self, cell_id: ResourceId, patch: CellPatch) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        let api = Arc::clone(&self.api);
        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        let timers = Arc::clone(&self.timers);
        let quiet_period = self.quiet_period;
        let id = cell_id.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;

            match api.update_cell(&id, &patch).await {
                Ok(server_cell) => {
                    let applied = store.lock().unwrap().apply_save(&id, &server_cell);
                    if applied {
                        debug!("[autosave] saved cell {}", id);
                    } else {
                        debug!("[autosave] cell {} gone, dropping save response", id);
                    }
                }
                Err(e) => {
                    warn!("[autosave] save failed for cell {}: {}", id, e);
                    let _ = events.send(SessionEvent::Error(
                        e.user_message("Failed to save cell"),
                    ));
                }
            }

            // Drop our registry entry unless a newer timer replaced it.
            let mut timers = timers.lock().unwrap();
            if timers.get(&id).map(|p| p.seq) == Some(seq) {
                timers.remove(&id);
            }
        });

        let mut timers = self.timers.lock().unwrap();
        if let Some(previous) = timers.insert(cell_id, PendingSave { seq, task }) {
            previous.task.abort();
        }
    }

    /// Cancel the pending save for one cell, if any. Used when the cell is
    /// removed while its timer is armed.
    pub fn cancel(&self, cell_id: &ResourceId) -> bool {
        match self.timers.lock().unwrap().remove(cell_id) {
            Some(pending) => {
                pending.task.abort();
                debug!("[autosave] cancelled pending save for cell {}", cell_id);
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer without firing. Safe to call when none
    /// are pending; invoked on session close and on drop.
    pub fn cancel_all(&self) {
        let mut timers = self.timers.lock().unwrap();
        for (_, pending) in timers.drain() {
            pending.task.abort();
        }
    }

    pub fn pending_count(&self) -> usize {
        self.timers.lock().unwrap().len()
    }
}

impl Drop for SaveScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
