//! Notebook editing session over a remote lab backend.
//!
//! One [`session::NotebookSession`] owns the client-side state for a single
//! open notebook: the cell collection, a per-cell debounced autosave
//! scheduler, a single-flight execution invoker, and the kernel status
//! monitor / package installer. All remote I/O goes through the
//! [`lab_api::NotebookApi`] trait; failures are reported on the session's
//! event channel rather than propagated, so one bad request never tears the
//! session down.

pub mod cell_store;
pub mod execution;
pub mod fake_api;
pub mod kernel;
pub mod save_scheduler;
pub mod session;

pub use cell_store::{CellStore, SharedCellStore};
pub use session::{NotebookSession, SessionConfig, SessionError, SessionEvent};
