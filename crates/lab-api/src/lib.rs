//! lab-api - Typed client for the lab notebook backend.
//!
//! The backend owns notebooks, their cells, and the shared interpreter
//! ("kernel") that runs cell code. This crate holds the wire types for that
//! REST API, a `reqwest`-based client, and the [`NotebookApi`] trait that
//! the session layer programs against so tests can substitute an in-memory
//! backend.

pub mod client;
pub mod protocol;

pub use client::{ApiClient, ApiError, NotebookApi};
pub use protocol::{
    Cell, CellListResponse, CellPatch, InstallOutput, KernelStatus, Notebook, NotebookPatch,
    ResourceId,
};
