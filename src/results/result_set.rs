use std::collections::HashMap;
use std::sync::Arc;

use super::row::{Row, build_column_index};
use crate::types::RowValues;

/// Column descriptor returned by [`crate::connection::Connection::query_detail`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDesc {
    /// Column label as reported by the server
    pub name: String,
    /// Backend type name (e.g. `int4`, `text`)
    pub type_name: String,
    /// Backend type oid, when the driver reports one
    pub type_oid: Option<u32>,
}

impl ColumnDesc {
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            type_oid: None,
        }
    }

    #[must_use]
    pub fn with_oid(mut self, oid: u32) -> Self {
        self.type_oid = Some(oid);
        self
    }
}

/// A result set from a database query
///
/// Rows keep the column order of the statement.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<Row>,
    column_names: Option<Arc<Vec<String>>>,
    column_index: Option<Arc<HashMap<String, usize>>>,
}

impl ResultSet {
    /// Create a new result set with a known capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            column_names: None,
            column_index: None,
        }
    }

    /// Set the column names for this result set (to be shared by all rows)
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        self.column_index = Some(Arc::new(build_column_index(&column_names)));
        self.column_names = Some(column_names);
    }

    /// Get the column names for this result set
    #[must_use]
    pub fn get_column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// Add a row to the result set. Rows added before column names are set are dropped.
    pub fn add_row_values(&mut self, row_values: Vec<RowValues>) {
        if let (Some(names), Some(index)) = (&self.column_names, &self.column_index) {
            self.results
                .push(Row::with_index(Arc::clone(names), Arc::clone(index), row_values));
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.results.iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// Column descriptors plus rows.
#[derive(Debug, Clone, Default)]
pub struct QueryDetail {
    pub columns: Vec<ColumnDesc>,
    pub rows: ResultSet,
}
