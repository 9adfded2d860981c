//! Wire types for the lab notebook REST API.
//!
//! The backend serializes ids as either JSON numbers or strings depending on
//! the resource; [`ResourceId`] normalizes both to a string form so identity
//! comparison works across the boundary. All `last_*` fields on a cell are
//! nullable and only ever written by the server.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

/// Opaque server-assigned identifier.
///
/// Accepts JSON numbers and strings on deserialization; compares and hashes
/// by the normalized string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        ResourceId(s.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        ResourceId(s)
    }
}

impl From<i64> for ResourceId {
    fn from(n: i64) -> Self {
        ResourceId(n.to_string())
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = ResourceId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or integer id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ResourceId, E> {
                Ok(ResourceId(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ResourceId, E> {
                Ok(ResourceId(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ResourceId, E> {
                Ok(ResourceId(v.to_string()))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

/// A notebook as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notebook {
    pub id: ResourceId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A single executable cell.
///
/// `position` defines display and execution order; the server does not
/// guarantee contiguous values. The `last_*` fields describe the most recent
/// run and are populated only by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub id: ResourceId,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub last_stdout: Option<String>,
    #[serde(default)]
    pub last_stderr: Option<String>,
    #[serde(default)]
    pub last_exit_code: Option<i32>,
    #[serde(default)]
    pub last_duration_ms: Option<i64>,
    #[serde(default)]
    pub last_executed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Cell {
    /// A fresh empty cell, as the server would create one.
    pub fn empty(id: impl Into<ResourceId>, position: i64) -> Self {
        Cell {
            id: id.into(),
            position,
            code: String::new(),
            last_stdout: None,
            last_stderr: None,
            last_exit_code: None,
            last_duration_ms: None,
            last_executed_at: None,
            updated_at: None,
        }
    }
}

/// The two shapes the cell-list endpoint is known to return.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CellListResponse {
    Paginated { results: Vec<Cell> },
    Plain(Vec<Cell>),
}

impl CellListResponse {
    pub fn into_cells(self) -> Vec<Cell> {
        match self {
            CellListResponse::Paginated { results } => results,
            CellListResponse::Plain(cells) => cells,
        }
    }
}

/// Kernel status payload.
///
/// `status` is an open-ended server-defined string and is treated as opaque.
/// Extra fields (service name, interpreter version, limits) are preserved
/// for display but never interpreted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KernelStatus {
    #[serde(default = "KernelStatus::default_status")]
    pub status: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl KernelStatus {
    fn default_status() -> String {
        "unknown".to_string()
    }

    /// Initial status before the first fetch resolves.
    pub fn unknown() -> Self {
        KernelStatus {
            status: Self::default_status(),
            extra: BTreeMap::new(),
        }
    }

    /// Sentinel substituted when the status fetch itself fails, so a dead
    /// kernel never blocks the rest of the notebook.
    pub fn error_sentinel() -> Self {
        KernelStatus {
            status: "error".to_string(),
            extra: BTreeMap::new(),
        }
    }
}

/// Captured output of a package install.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InstallOutput {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
}

impl InstallOutput {
    /// The stream to show in the output pane: stderr when non-empty,
    /// stdout otherwise.
    pub fn display_stream(&self) -> &str {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Partial cell update. Only fields that are `Some` are sent.
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct CellPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl CellPatch {
    pub fn code(code: impl Into<String>) -> Self {
        CellPatch {
            code: Some(code.into()),
        }
    }
}

/// Partial notebook update.
#[derive(Debug, Clone, Serialize, Default)]
pub struct NotebookPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl NotebookPatch {
    pub fn name(name: impl Into<String>) -> Self {
        NotebookPatch {
            name: Some(name.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_from_string() {
        let id: ResourceId = serde_json::from_str(r#""abc-123""#).unwrap();
        assert_eq!(id.as_str(), "abc-123");
    }

    #[test]
    fn test_resource_id_from_number() {
        let id: ResourceId = serde_json::from_str("42").unwrap();
        assert_eq!(id.as_str(), "42");
    }

    #[test]
    fn test_resource_id_number_and_string_compare_equal() {
        let from_num: ResourceId = serde_json::from_str("7").unwrap();
        let from_str: ResourceId = serde_json::from_str(r#""7""#).unwrap();
        assert_eq!(from_num, from_str);
    }

    #[test]
    fn test_cell_parses_with_nulls_and_defaults() {
        let cell: Cell = serde_json::from_str(
            r#"{"id": 1, "position": 3, "code": "x = 1", "last_stdout": null}"#,
        )
        .unwrap();
        assert_eq!(cell.id, ResourceId::from(1));
        assert_eq!(cell.position, 3);
        assert_eq!(cell.code, "x = 1");
        assert!(cell.last_stdout.is_none());
        assert!(cell.last_exit_code.is_none());
    }

    #[test]
    fn test_cell_parses_minimal_object() {
        let cell: Cell = serde_json::from_str(r#"{"id": "c1"}"#).unwrap();
        assert_eq!(cell.position, 0);
        assert_eq!(cell.code, "");
    }

    #[test]
    fn test_cell_list_plain_array() {
        let list: CellListResponse =
            serde_json::from_str(r#"[{"id": 1}, {"id": 2}]"#).unwrap();
        assert_eq!(list.into_cells().len(), 2);
    }

    #[test]
    fn test_cell_list_paginated() {
        let list: CellListResponse =
            serde_json::from_str(r#"{"results": [{"id": 1}], "count": 1}"#).unwrap();
        let cells = list.into_cells();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].id, ResourceId::from(1));
    }

    #[test]
    fn test_kernel_status_keeps_extra_fields() {
        let status: KernelStatus = serde_json::from_str(
            r#"{"status": "ok", "service": "notebook-kernel", "timeout_seconds": 15}"#,
        )
        .unwrap();
        assert_eq!(status.status, "ok");
        assert_eq!(
            status.extra.get("service").and_then(|v| v.as_str()),
            Some("notebook-kernel")
        );
    }

    #[test]
    fn test_kernel_status_missing_status_defaults_to_unknown() {
        let status: KernelStatus = serde_json::from_str(r#"{"service": "x"}"#).unwrap();
        assert_eq!(status.status, "unknown");
    }

    #[test]
    fn test_install_output_prefers_stderr_for_display() {
        let out = InstallOutput {
            stdout: "collected".to_string(),
            stderr: "warning: pinned".to_string(),
            ..Default::default()
        };
        assert_eq!(out.display_stream(), "warning: pinned");

        let quiet = InstallOutput {
            stdout: "Successfully installed numpy".to_string(),
            ..Default::default()
        };
        assert_eq!(quiet.display_stream(), "Successfully installed numpy");
    }

    #[test]
    fn test_cell_patch_skips_unset_fields() {
        let json = serde_json::to_string(&CellPatch::default()).unwrap();
        assert_eq!(json, "{}");

        let json = serde_json::to_string(&CellPatch::code("print(1)")).unwrap();
        assert_eq!(json, r#"{"code":"print(1)"}"#);
    }

    #[test]
    fn test_notebook_patch_serializes_name() {
        let json = serde_json::to_string(&NotebookPatch::name("Experiments")).unwrap();
        assert_eq!(json, r#"{"name":"Experiments"}"#);
    }
}
