//! In-memory cell collection for one open notebook.
//!
//! Holds the authoritative-as-known set of cells. Display order is always
//! derived by a stable sort on `position`, so colliding positions keep
//! insertion order. Server responses are merged field-by-field rather than
//! replacing whole records: a save owns `code`, a run owns the `last_*`
//! fields. Out-of-order responses therefore cannot clobber each other.
//!
//! Every id-keyed mutation is an idempotent no-op when the cell is no longer
//! present, which makes late responses for deleted cells safely discardable.

use std::sync::{Arc, Mutex as StdMutex};

use lab_api::{Cell, CellPatch, ResourceId};

/// Cell collection shared between the session and its background tasks.
///
/// Mutated only from short critical sections; never held across an await.
pub type SharedCellStore = Arc<StdMutex<CellStore>>;

#[derive(Default)]
pub struct CellStore {
    cells: Vec<Cell>,
}

impl CellStore {
    pub fn new() -> Self {
        CellStore { cells: Vec::new() }
    }

    pub fn shared() -> SharedCellStore {
        Arc::new(StdMutex::new(CellStore::new()))
    }

    /// Replace the entire set with whatever the server returned.
    ///
    /// No ordering is assumed from the server; [`ordered`](Self::ordered)
    /// derives display order on demand.
    pub fn load(&mut self, cells: Vec<Cell>) {
        self.cells = cells;
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, cell_id: &ResourceId) -> Option<&Cell> {
        self.find_index(cell_id).map(|i| &self.cells[i])
    }

    /// Cells in display order: stable sort by `position`, ties keep
    /// insertion order.
    pub fn ordered(&self) -> Vec<Cell> {
        let mut cells = self.cells.clone();
        cells.sort_by_key(|c| c.position);
        cells
    }

    fn find_index(&self, cell_id: &ResourceId) -> Option<usize> {
        self.cells.iter().position(|c| &c.id == cell_id)
    }

    /// Merge an optimistic local edit. Does not touch `position` or any
    /// server-owned field.
    pub fn apply_local(&mut self, cell_id: &ResourceId, patch: &CellPatch) -> bool {
        let Some(idx) = self.find_index(cell_id) else {
            return false;
        };
        if let Some(code) = &patch.code {
            self.cells[idx].code = code.clone();
        }
        true
    }

    /// Merge a save response. A save owns `code` and the row timestamp,
    /// nothing else; run output already on the cell is left alone.
    pub fn apply_save(&mut self, cell_id: &ResourceId, server: &Cell) -> bool {
        let Some(idx) = self.find_index(cell_id) else {
            return false;
        };
        let cell = &mut self.cells[idx];
        cell.code = server.code.clone();
        cell.updated_at = server.updated_at;
        true
    }

    /// Merge a run response. A run owns the `last_*` fields and the row
    /// timestamp; the response's `code` is the server's stored copy, which
    /// may be older than what the user has typed since, so it is ignored.
    pub fn apply_run(&mut self, cell_id: &ResourceId, server: &Cell) -> bool {
        let Some(idx) = self.find_index(cell_id) else {
            return false;
        };
        let cell = &mut self.cells[idx];
        cell.last_stdout = server.last_stdout.clone();
        cell.last_stderr = server.last_stderr.clone();
        cell.last_exit_code = server.last_exit_code;
        cell.last_duration_ms = server.last_duration_ms;
        cell.last_executed_at = server.last_executed_at;
        cell.updated_at = server.updated_at;
        true
    }

    /// Add a newly created cell with its server-assigned position.
    pub fn append(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    pub fn remove(&mut self, cell_id: &ResourceId) -> bool {
        match self.find_index(cell_id) {
            Some(idx) => {
                self.cells.remove(idx);
                true
            }
            None => false,
        }
    }
}
