//! Notebook session lifecycle.
//!
//! [`NotebookSession`] composes the cell store, the debounced autosave
//! scheduler, the execution invoker, and the kernel monitor/installer for a
//! single open notebook. Opening fetches the notebook, its cells, and the
//! kernel status concurrently; only the first two are required, and a failed
//! status fetch degrades to a sentinel. Non-fatal failures after open are
//! reported as [`SessionEvent`]s on the channel returned from `open`, never
//! propagated.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use lab_api::{
    Cell, CellPatch, InstallOutput, KernelStatus, Notebook, NotebookApi, NotebookPatch, ResourceId,
};
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::cell_store::{CellStore, SharedCellStore};
use crate::execution::ExecutionInvoker;
use crate::kernel::{KernelMonitor, PackageInstaller};
use crate::save_scheduler::{SaveScheduler, DEFAULT_QUIET_PERIOD};

/// Events surfaced to the view layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A non-fatal operation failed; the message is already user-facing.
    Error(String),
}

/// Error opening a session. Anything after open is a [`SessionEvent`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    Load(String),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Quiet period for the autosave debounce.
    pub quiet_period: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            quiet_period: DEFAULT_QUIET_PERIOD,
        }
    }
}

pub struct NotebookSession {
    notebook_id: ResourceId,
    api: Arc<dyn NotebookApi>,
    store: SharedCellStore,
    scheduler: SaveScheduler,
    invoker: ExecutionInvoker,
    kernel: Arc<KernelMonitor>,
    installer: PackageInstaller,
    notebook: StdMutex<Notebook>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl NotebookSession {
    /// Open a notebook with the default configuration.
    pub async fn open(
        api: Arc<dyn NotebookApi>,
        notebook_id: ResourceId,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), SessionError> {
        Self::open_with(api, notebook_id, SessionConfig::default()).await
    }

    /// Open a notebook: fetch metadata, cells, and kernel status
    /// concurrently. Notebook and cells are required; kernel status is
    /// best-effort and degrades to the `"error"` sentinel.
    pub async fn open_with(
        api: Arc<dyn NotebookApi>,
        notebook_id: ResourceId,
        config: SessionConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), SessionError> {
        let (notebook, cells, status) = tokio::join!(
            api.get_notebook(&notebook_id),
            api.list_cells(&notebook_id),
            api.kernel_status(),
        );

        let notebook = notebook
            .map_err(|e| SessionError::Load(e.user_message("Failed to load notebook")))?;
        let cells =
            cells.map_err(|e| SessionError::Load(e.user_message("Failed to load notebook")))?;
        let status = status.unwrap_or_else(|e| {
            warn!("[session] kernel status unavailable on load: {}", e);
            KernelStatus::error_sentinel()
        });

        info!(
            "[session] opened notebook {} ({} cells, kernel {})",
            notebook_id,
            cells.len(),
            status.status
        );

        let (events, events_rx) = mpsc::unbounded_channel();
        let store = CellStore::shared();
        store.lock().unwrap().load(cells);

        let kernel = Arc::new(KernelMonitor::new(Arc::clone(&api)));
        kernel.set(status);

        let session = NotebookSession {
            scheduler: SaveScheduler::new(
                Arc::clone(&api),
                Arc::clone(&store),
                events.clone(),
                config.quiet_period,
            ),
            invoker: ExecutionInvoker::new(Arc::clone(&api), Arc::clone(&store), events.clone()),
            installer: PackageInstaller::new(
                Arc::clone(&api),
                Arc::clone(&kernel),
                events.clone(),
            ),
            notebook: StdMutex::new(notebook),
            notebook_id,
            api,
            store,
            kernel,
            events,
        };
        Ok((session, events_rx))
    }

    pub fn notebook_id(&self) -> &ResourceId {
        &self.notebook_id
    }

    pub fn notebook(&self) -> Notebook {
        self.notebook.lock().unwrap().clone()
    }

    /// Cells in display order.
    pub fn cells(&self) -> Vec<Cell> {
        self.store.lock().unwrap().ordered()
    }

    pub fn kernel_status(&self) -> KernelStatus {
        self.kernel.current()
    }

    pub fn running_cell(&self) -> Option<ResourceId> {
        self.invoker.running_cell()
    }

    pub fn last_install_output(&self) -> Option<InstallOutput> {
        self.installer.last_output()
    }

    /// Record a local edit and arm the autosave timer for that cell.
    pub fn edit_cell(&self, cell_id: &ResourceId, code: &str) {
        let patch = CellPatch::code(code);
        if !self.store.lock().unwrap().apply_local(cell_id, &patch) {
            debug!("[session] edit for unknown cell {}, ignoring", cell_id);
            return;
        }
        self.scheduler.schedule(cell_id.clone(), patch);
    }

    /// Execute a cell's current code. See [`ExecutionInvoker::run`].
    pub async fn run_cell(&self, cell_id: &ResourceId) -> bool {
        self.invoker.run(cell_id).await
    }

    /// Create an empty cell at the end of the notebook.
    pub async fn add_cell(&self) -> Option<ResourceId> {
        match self
            .api
            .create_cell(&self.notebook_id, &CellPatch::code(""))
            .await
        {
            Ok(cell) => {
                info!(
                    "[session] added cell {} at position {}",
                    cell.id, cell.position
                );
                let id = cell.id.clone();
                self.store.lock().unwrap().append(cell);
                Some(id)
            }
            Err(e) => {
                self.emit_error(e.user_message("Failed to add cell"));
                None
            }
        }
    }

    /// Drop a cell from the session, cancelling any pending save so no
    /// update for it is ever sent. The backend row is managed elsewhere.
    pub fn remove_cell(&self, cell_id: &ResourceId) -> bool {
        self.scheduler.cancel(cell_id);
        self.store.lock().unwrap().remove(cell_id)
    }

    /// Rename the notebook. The new name is applied optimistically and kept
    /// even if the remote update fails.
    pub async fn rename(&self, name: &str) {
        self.notebook.lock().unwrap().name = name.to_string();
        match self
            .api
            .update_notebook(&self.notebook_id, &NotebookPatch::name(name))
            .await
        {
            Ok(notebook) => {
                *self.notebook.lock().unwrap() = notebook;
            }
            Err(e) => {
                self.emit_error(e.user_message("Failed to rename notebook"));
            }
        }
    }

    /// Delete the notebook. Returns `true` when the caller should navigate
    /// away; on failure the session stays usable.
    pub async fn delete(&self) -> bool {
        match self.api.delete_notebook(&self.notebook_id).await {
            Ok(()) => {
                info!("[session] deleted notebook {}", self.notebook_id);
                self.close();
                true
            }
            Err(e) => {
                self.emit_error(e.user_message("Failed to delete notebook"));
                false
            }
        }
    }

    /// Install a package into the kernel. See [`PackageInstaller::install`].
    pub async fn install_package(&self, package: &str) -> bool {
        self.installer.install(package).await
    }

    pub async fn refresh_kernel_status(&self) -> KernelStatus {
        self.kernel.refresh().await
    }

    /// Tear the session down: every pending autosave timer is cancelled, not
    /// fired. In-flight responses that can no longer be cancelled are
    /// discarded by the store's id checks.
    pub fn close(&self) {
        debug!("[session] closing notebook {}", self.notebook_id);
        self.scheduler.cancel_all();
    }

    fn emit_error(&self, message: String) {
        warn!("[session] {}", message);
        let _ = self.events.send(SessionEvent::Error(message));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::fake_api::FakeApi;

    async fn open_fixture(
        api: Arc<FakeApi>,
    ) -> (NotebookSession, mpsc::UnboundedReceiver<SessionEvent>) {
        NotebookSession::open_with(
            api,
            ResourceId::from("nb-1"),
            SessionConfig {
                quiet_period: Duration::from_millis(40),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_open_loads_notebook_cells_and_status() {
        let api = Arc::new(FakeApi::new());
        api.seed_cell(1, 1, "b");
        api.seed_cell(2, 0, "a");

        let (session, _rx) = open_fixture(api).await;

        assert_eq!(session.notebook().name, "Scratch");
        let cells = session.cells();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].id, ResourceId::from(2));
        assert_eq!(session.kernel_status().status, "ok");
    }

    #[tokio::test]
    async fn test_open_degrades_to_error_sentinel_when_kernel_down() {
        let api = Arc::new(FakeApi::new());
        api.seed_cell(1, 0, "x = 1");
        api.fail_status.store(true, Ordering::Release);

        let (session, _rx) = open_fixture(api).await;

        // Cells still load and stay editable; status shows the sentinel.
        assert_eq!(session.cells().len(), 1);
        assert_eq!(session.kernel_status().status, "error");
    }

    #[tokio::test]
    async fn test_open_fails_when_cell_list_fails() {
        let api = Arc::new(FakeApi::new());
        api.fail_cells.store(true, Ordering::Release);

        let result =
            NotebookSession::open(api, ResourceId::from("nb-1")).await;
        match result {
            Err(SessionError::Load(message)) => {
                assert_eq!(message, "injected cells failure");
            }
            Ok(_) => panic!("open should fail when the cell list fetch fails"),
        }
    }

    #[tokio::test]
    async fn test_open_fails_when_notebook_fetch_fails() {
        let api = Arc::new(FakeApi::new());
        api.fail_notebook.store(true, Ordering::Release);

        assert!(NotebookSession::open(api, ResourceId::from("nb-1"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_rename_takes_server_copy_on_success() {
        let api = Arc::new(FakeApi::new());
        let (session, _rx) = open_fixture(api).await;

        session.rename("Q3 experiments").await;

        let notebook = session.notebook();
        assert_eq!(notebook.name, "Q3 experiments");
        assert!(notebook.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_rename_keeps_optimistic_name_on_failure() {
        let api = Arc::new(FakeApi::new());
        api.fail_rename.store(true, Ordering::Release);
        let (session, mut rx) = open_fixture(api).await;

        session.rename("New name").await;

        // No rollback: the typed name stays, the error is surfaced.
        assert_eq!(session.notebook().name, "New name");
        let SessionEvent::Error(message) = rx.try_recv().unwrap();
        assert_eq!(message, "injected rename failure");
    }

    #[tokio::test]
    async fn test_add_cell_appends_server_assigned_cell() {
        let api = Arc::new(FakeApi::new());
        api.seed_cell(1, 0, "first");
        let (session, _rx) = open_fixture(api).await;

        let id = session.add_cell().await.expect("cell should be created");

        let cells = session.cells();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[1].id, id);
        assert_eq!(cells[1].code, "");
        assert!(cells[1].position > cells[0].position);
    }

    #[tokio::test]
    async fn test_add_cell_failure_surfaces_error() {
        let api = Arc::new(FakeApi::new());
        api.fail_create.store(true, Ordering::Release);
        let (session, mut rx) = open_fixture(api).await;

        assert!(session.add_cell().await.is_none());
        assert!(session.cells().is_empty());
        let SessionEvent::Error(message) = rx.try_recv().unwrap();
        assert_eq!(message, "injected create failure");
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_session() {
        let api = Arc::new(FakeApi::new());
        api.fail_delete.store(true, Ordering::Release);
        let (session, mut rx) = open_fixture(api).await;

        assert!(!session.delete().await);
        let SessionEvent::Error(message) = rx.try_recv().unwrap();
        assert_eq!(message, "injected delete failure");
    }

    #[tokio::test]
    async fn test_delete_success_signals_navigation() {
        let api = Arc::new(FakeApi::new());
        let (session, _rx) = open_fixture(api).await;

        assert!(session.delete().await);
    }

    #[tokio::test]
    async fn test_edit_unknown_cell_schedules_nothing() {
        let api = Arc::new(FakeApi::new());
        let (session, _rx) = open_fixture(api.clone()).await;

        session.edit_cell(&ResourceId::from(42), "x");

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(api.update_calls.lock().unwrap().is_empty());
    }
}
