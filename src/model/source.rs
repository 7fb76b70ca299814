//! Data-source expressions (Power Query / M).

use serde::{Deserialize, Serialize};

/// A named source query.
///
/// Table partitions carry the owning table; shared expressions have none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub name: String,
    /// Query text, verbatim
    pub expression: String,
    /// Owning table, when the query feeds one
    pub table: Option<String>,
}

impl DataSource {
    /// A shared expression not bound to a table.
    pub fn shared(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            table: None,
        }
    }

    /// A table partition query; the query takes the table's name.
    pub fn for_table(table: impl Into<String>, expression: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            name: table.clone(),
            expression: expression.into(),
            table: Some(table),
        }
    }
}
