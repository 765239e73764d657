use crate::{Error, Result, Value};
use std::{ops::Index, sync::Arc};

/// Shared reference-counted column name list, fixed once per query.
pub type ColumnNames = Arc<[String]>;
/// One raw result tuple, aligned by index with the query's column names.
pub type RawRow = Box<[Value]>;

/// Look up a value by column name within one labeled row slice.
pub fn get_column<'a>(labels: &[String], values: &'a [Value], name: &str) -> Option<&'a Value> {
    labels.iter().position(|v| v == name).map(|i| &values[i])
}

/// Like [`get_column`] but a missing column is a configuration error, which
/// is the contract entity decoding relies on.
pub fn require_column<'a>(labels: &[String], values: &'a [Value], name: &str) -> Result<&'a Value> {
    get_column(labels, values, name)
        .ok_or_else(|| Error::config(format!("Column `{name}` is missing from the result row")))
}

/// A named tuple: a fixed-arity value sequence whose elements are
/// addressable both by position and by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedRow {
    labels: ColumnNames,
    values: RawRow,
}

impl NamedRow {
    pub fn new(labels: ColumnNames, values: RawRow) -> Self {
        Self { labels, values }
    }
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
    pub fn values(&self) -> &[Value] {
        &self.values
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
    pub fn get(&self, name: &str) -> Option<&Value> {
        get_column(&self.labels, &self.values, name)
    }
}

impl Index<usize> for NamedRow {
    type Output = Value;
    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}
