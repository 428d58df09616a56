//! Backend execution seam.
//!
//! The engine never talks to the analytics backend directly; it hands a
//! compiled command to a [`QueryExecutor`] and receives column-typed
//! tabular data back. No retries, no caching.

use crate::Result;
use async_trait::async_trait;
use serde_json::Value;

/// A typed result column. `column_type` carries the backend's own type
/// name (e.g. `System.Int64` or `Int64`).
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub column_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
        }
    }
}

/// One tabular result. A single executed command may return several
/// named tables (`hits`, `aggs`, `metadata`).
#[derive(Debug, Clone, Default)]
pub struct DataTable {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl DataTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn cell<'a>(&self, row: &'a [Value], name: &str) -> Option<&'a Value> {
        self.column_index(name).and_then(|i| row.get(i))
    }
}

/// Execution collaborator contract. Implementations block on the backend;
/// dropping the returned future cancels the inbound request's work.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a compiled KQL query, returning its result tables.
    async fn execute_query(&self, kql: &str) -> Result<Vec<DataTable>>;

    /// Run a control command (schema discovery, table listing).
    async fn execute_control_command(&self, command: &str) -> Result<Vec<DataTable>>;
}
