// src/model/table.rs
use serde::{Deserialize, Serialize};

use super::measure::Measure;

/// A table in the semantic model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    /// Columns in declaration order
    pub columns: Vec<Column>,
    /// Measures attached to this table, in declaration order
    pub measures: Vec<Measure>,
    pub is_hidden: bool,
    pub description: String,
    /// Row count reported by the extraction tool; definition inputs carry none
    pub row_count: Option<u64>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            measures: Vec::new(),
            is_hidden: false,
            description: String::new(),
            row_count: None,
        }
    }

    /// Append a column, setting its owning table to this one.
    pub fn with_column(mut self, mut column: Column) -> Self {
        column.table = self.name.clone();
        self.columns.push(column);
        self
    }

    /// Append a measure, setting its owning table to this one.
    pub fn with_measure(mut self, mut measure: Measure) -> Self {
        measure.table = self.name.clone();
        self.measures.push(measure);
        self
    }

    pub fn hidden(mut self, is_hidden: bool) -> Self {
        self.is_hidden = is_hidden;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_row_count(mut self, row_count: Option<u64>) -> Self {
        self.row_count = row_count;
        self
    }

    pub fn row_count(&self) -> Option<u64> {
        self.row_count
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a measure by name.
    pub fn measure(&self, name: &str) -> Option<&Measure> {
        self.measures.iter().find(|m| m.name == name)
    }
}

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Owning table name
    pub table: String,
    /// Declared data type as reported by the source (e.g. `int64`, `string`)
    pub data_type: String,
    pub is_hidden: bool,
    pub description: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: String::new(),
            data_type: data_type.into(),
            is_hidden: false,
            description: String::new(),
        }
    }

    pub fn hidden(mut self, is_hidden: bool) -> Self {
        self.is_hidden = is_hidden;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
