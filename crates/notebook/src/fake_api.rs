//! In-memory fake backend for tests.
//!
//! Implements [`NotebookApi`] against mutable in-memory state with
//! per-operation failure toggles, optional latency, and call recording.
//! Mirrors the real backend where it matters for reconciliation: cell
//! updates echo the full row, runs populate the `last_*` fields but return
//! the *stored* code (not the code that was submitted), and created cells
//! get the next position after the current maximum.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use lab_api::{
    ApiError, Cell, CellPatch, InstallOutput, KernelStatus, Notebook, NotebookApi, NotebookPatch,
    ResourceId,
};

pub struct FakeApi {
    pub notebook: StdMutex<Notebook>,
    pub cells: StdMutex<Vec<Cell>>,
    pub status: StdMutex<KernelStatus>,

    pub update_calls: StdMutex<Vec<(ResourceId, CellPatch)>>,
    pub run_calls: StdMutex<Vec<(ResourceId, String)>>,
    pub install_calls: StdMutex<Vec<String>>,
    pub status_calls: AtomicUsize,

    pub fail_notebook: AtomicBool,
    pub fail_cells: AtomicBool,
    pub fail_rename: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_run: AtomicBool,
    pub fail_status: AtomicBool,
    pub fail_install: AtomicBool,

    pub update_latency: StdMutex<Option<Duration>>,
    pub run_latency: StdMutex<Option<Duration>>,
    pub install_latency: StdMutex<Option<Duration>>,

    next_cell_id: AtomicI64,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeApi {
    pub fn new() -> Self {
        FakeApi {
            notebook: StdMutex::new(Notebook {
                id: ResourceId::from("nb-1"),
                name: "Scratch".to_string(),
                updated_at: None,
            }),
            cells: StdMutex::new(Vec::new()),
            status: StdMutex::new(KernelStatus {
                status: "ok".to_string(),
                extra: Default::default(),
            }),
            update_calls: StdMutex::new(Vec::new()),
            run_calls: StdMutex::new(Vec::new()),
            install_calls: StdMutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
            fail_notebook: AtomicBool::new(false),
            fail_cells: AtomicBool::new(false),
            fail_rename: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            fail_run: AtomicBool::new(false),
            fail_status: AtomicBool::new(false),
            fail_install: AtomicBool::new(false),
            update_latency: StdMutex::new(None),
            run_latency: StdMutex::new(None),
            install_latency: StdMutex::new(None),
            next_cell_id: AtomicI64::new(1000),
        }
    }

    /// Seed a cell into the backend state.
    pub fn seed_cell(&self, id: i64, position: i64, code: &str) {
        let mut cell = Cell::empty(id, position);
        cell.code = code.to_string();
        self.cells.lock().unwrap().push(cell);
    }

    fn injected_failure(context: &str) -> ApiError {
        ApiError::Backend {
            status: 500,
            detail: Some(format!("injected {} failure", context)),
            error: None,
        }
    }

    fn not_found() -> ApiError {
        ApiError::Backend {
            status: 404,
            detail: Some("Not found.".to_string()),
            error: None,
        }
    }

    async fn maybe_sleep(latency: &StdMutex<Option<Duration>>) {
        let delay = *latency.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl NotebookApi for FakeApi {
    async fn get_notebook(&self, _id: &ResourceId) -> Result<Notebook, ApiError> {
        if self.fail_notebook.load(Ordering::Acquire) {
            return Err(Self::injected_failure("notebook"));
        }
        Ok(self.notebook.lock().unwrap().clone())
    }

    async fn list_cells(&self, _notebook_id: &ResourceId) -> Result<Vec<Cell>, ApiError> {
        if self.fail_cells.load(Ordering::Acquire) {
            return Err(Self::injected_failure("cells"));
        }
        Ok(self.cells.lock().unwrap().clone())
    }

    async fn update_notebook(
        &self,
        _id: &ResourceId,
        patch: &NotebookPatch,
    ) -> Result<Notebook, ApiError> {
        if self.fail_rename.load(Ordering::Acquire) {
            return Err(Self::injected_failure("rename"));
        }
        let mut notebook = self.notebook.lock().unwrap();
        if let Some(name) = &patch.name {
            notebook.name = name.clone();
        }
        notebook.updated_at = Some(Utc::now());
        Ok(notebook.clone())
    }

    async fn delete_notebook(&self, _id: &ResourceId) -> Result<(), ApiError> {
        if self.fail_delete.load(Ordering::Acquire) {
            return Err(Self::injected_failure("delete"));
        }
        self.cells.lock().unwrap().clear();
        Ok(())
    }

    async fn create_cell(
        &self,
        _notebook_id: &ResourceId,
        patch: &CellPatch,
    ) -> Result<Cell, ApiError> {
        if self.fail_create.load(Ordering::Acquire) {
            return Err(Self::injected_failure("create"));
        }
        let mut cells = self.cells.lock().unwrap();
        let position = cells.iter().map(|c| c.position + 1).max().unwrap_or(0);
        let id = self.next_cell_id.fetch_add(1, Ordering::Relaxed);
        let mut cell = Cell::empty(id, position);
        if let Some(code) = &patch.code {
            cell.code = code.clone();
        }
        cells.push(cell.clone());
        Ok(cell)
    }

    async fn update_cell(
        &self,
        cell_id: &ResourceId,
        patch: &CellPatch,
    ) -> Result<Cell, ApiError> {
        self.update_calls
            .lock()
            .unwrap()
            .push((cell_id.clone(), patch.clone()));
        Self::maybe_sleep(&self.update_latency).await;
        if self.fail_update.load(Ordering::Acquire) {
            return Err(Self::injected_failure("update"));
        }
        let mut cells = self.cells.lock().unwrap();
        let cell = cells
            .iter_mut()
            .find(|c| &c.id == cell_id)
            .ok_or_else(Self::not_found)?;
        if let Some(code) = &patch.code {
            cell.code = code.clone();
        }
        cell.updated_at = Some(Utc::now());
        Ok(cell.clone())
    }

    async fn run_cell(&self, cell_id: &ResourceId, code: &str) -> Result<Cell, ApiError> {
        self.run_calls
            .lock()
            .unwrap()
            .push((cell_id.clone(), code.to_string()));
        Self::maybe_sleep(&self.run_latency).await;
        if self.fail_run.load(Ordering::Acquire) {
            return Err(Self::injected_failure("run"));
        }
        let mut cells = self.cells.lock().unwrap();
        let cell = cells
            .iter_mut()
            .find(|c| &c.id == cell_id)
            .ok_or_else(Self::not_found)?;
        // The submitted code is executed but not persisted; the response
        // carries the stored row, so its `code` may be older than what the
        // caller just ran.
        cell.last_stdout = Some(format!("stdout::{}", code));
        cell.last_stderr = Some(String::new());
        cell.last_exit_code = Some(0);
        cell.last_duration_ms = Some(5);
        cell.last_executed_at = Some(Utc::now());
        cell.updated_at = Some(Utc::now());
        Ok(cell.clone())
    }

    async fn kernel_status(&self) -> Result<KernelStatus, ApiError> {
        self.status_calls.fetch_add(1, Ordering::AcqRel);
        if self.fail_status.load(Ordering::Acquire) {
            return Err(Self::injected_failure("status"));
        }
        Ok(self.status.lock().unwrap().clone())
    }

    async fn install_package(&self, package: &str) -> Result<InstallOutput, ApiError> {
        self.install_calls.lock().unwrap().push(package.to_string());
        Self::maybe_sleep(&self.install_latency).await;
        if self.fail_install.load(Ordering::Acquire) {
            return Err(Self::injected_failure("install"));
        }
        Ok(InstallOutput {
            stdout: format!("Successfully installed {}", package),
            stderr: String::new(),
            exit_code: Some(0),
            duration_ms: Some(120),
        })
    }
}
