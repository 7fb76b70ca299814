//! Fallback field lookup over loosely-typed tool records.
//!
//! The extractor is inconsistent about key casing between capabilities
//! (`TableName` in one, `tableName` or `table` in another). Each logical
//! field carries an ordered list of candidate keys; the first key present
//! with a non-null value wins.

use serde_json::{Map, Value};

use crate::error::{ParseError, ParseResult};

/// A logical field and the keys it may appear under, in priority order.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub keys: &'static [&'static str],
}

macro_rules! field {
    ($ident:ident, $name:literal, [$($key:literal),+ $(,)?]) => {
        pub const $ident: Field = Field {
            name: $name,
            keys: &[$($key),+],
        };
    };
}

// Tables
field!(TABLE_NAME, "table name", ["Name", "name", "TableName"]);
field!(DESCRIPTION, "description", ["Description", "description"]);
field!(ROW_COUNT, "row count", ["RowCount", "row_count", "rowCount"]);

// Columns
field!(COLUMN_NAME, "column name", ["ColumnName", "Name", "name", "columnName"]);
field!(COLUMN_TABLE, "column table", ["TableName", "table_name", "tableName"]);
field!(DATA_TYPE, "data type", ["DataType", "data_type", "dataType", "PandasDataType"]);
field!(HIDDEN, "hidden flag", ["IsHidden", "is_hidden", "isHidden"]);

// Measures
field!(MEASURE_NAME, "measure name", ["Name", "name", "MeasureName"]);
field!(MEASURE_TABLE, "measure table", ["TableName", "Table", "table", "tableName"]);
field!(EXPRESSION, "expression", ["Expression", "expression"]);
field!(FORMAT_STRING, "format string", ["FormatString", "format_string", "formatString"]);
field!(DISPLAY_FOLDER, "display folder", ["DisplayFolder", "display_folder", "displayFolder"]);

// Relationships
field!(FROM_TABLE, "from table", ["FromTableName", "from_table", "fromTable"]);
field!(FROM_COLUMN, "from column", ["FromColumnName", "from_column", "fromColumn"]);
field!(TO_TABLE, "to table", ["ToTableName", "to_table", "toTable"]);
field!(TO_COLUMN, "to column", ["ToColumnName", "to_column", "toColumn"]);
field!(IS_ACTIVE, "active flag", ["IsActive", "is_active", "isActive"]);
field!(CARDINALITY, "cardinality", ["Cardinality", "cardinality"]);
field!(FROM_CARDINALITY, "from cardinality", ["FromCardinality", "from_cardinality", "fromCardinality"]);
field!(TO_CARDINALITY, "to cardinality", ["ToCardinality", "to_cardinality", "toCardinality"]);
field!(
    CROSS_FILTER,
    "cross-filter direction",
    [
        "CrossFilteringBehavior",
        "CrossFilterDirection",
        "cross_filter_direction",
        "crossFilterDirection",
        "crossFilteringBehavior",
    ]
);

// Data sources
field!(QUERY_NAME, "query name", ["TableName", "Name", "name"]);

// Summary
field!(TABLES_COUNT, "table count", ["tables_count", "TablesCount", "tablesCount"]);
field!(MEASURES_COUNT, "measure count", ["measures_count", "MeasuresCount", "measuresCount"]);
field!(
    RELATIONSHIPS_COUNT,
    "relationship count",
    ["relationships_count", "RelationshipsCount", "relationshipsCount"]
);
field!(SIZE_BYTES, "file size", ["size_bytes", "SizeBytes", "sizeBytes"]);

/// A tool record with lookup helpers that report the record's context in
/// every error.
pub struct Record<'a> {
    map: &'a Map<String, Value>,
    context: String,
}

impl<'a> Record<'a> {
    pub fn new(map: &'a Map<String, Value>, context: impl Into<String>) -> Self {
        Self {
            map,
            context: context.into(),
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// First non-null value among the field's candidate keys.
    pub fn get(&self, field: Field) -> Option<&'a Value> {
        field
            .keys
            .iter()
            .find_map(|key| self.map.get(*key).filter(|v| !v.is_null()))
    }

    /// A required name: present, a scalar, and not blank.
    pub fn required_str(&self, field: Field) -> ParseResult<String> {
        match self.get(field).map(|v| self.scalar_text(field, v)).transpose()? {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(self.missing(field)),
        }
    }

    /// Required text that may legitimately be empty (e.g. a formula body).
    pub fn required_text(&self, field: Field) -> ParseResult<String> {
        match self.get(field) {
            Some(value) => self.text(field, value),
            None => Err(self.missing(field)),
        }
    }

    /// Optional text, empty when absent.
    pub fn opt_str(&self, field: Field) -> ParseResult<String> {
        match self.get(field) {
            Some(value) => self.text(field, value),
            None => Ok(String::new()),
        }
    }

    /// Optional flag. Accepts booleans, `0`/`1`, and common spellings.
    pub fn opt_bool(&self, field: Field, default: bool) -> ParseResult<bool> {
        let Some(value) = self.get(field) else {
            return Ok(default);
        };
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Number(n) => match n.as_f64() {
                Some(f) if f == 0.0 => Ok(false),
                Some(f) if f == 1.0 => Ok(true),
                _ => Err(self.invalid(field, format!("expected a boolean, got {n}"))),
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => Err(self.invalid(field, format!("expected a boolean, got '{s}'"))),
            },
            other => Err(self.invalid(field, format!("expected a boolean, got {other}"))),
        }
    }

    /// Optional non-negative integer.
    pub fn opt_u64(&self, field: Field) -> ParseResult<Option<u64>> {
        let Some(value) = self.get(field) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n.as_u64().or_else(|| {
                n.as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                    .map(|f| f as u64)
            }),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| self.invalid(field, format!("expected a non-negative integer, got {value}")))
    }

    /// Strings pass through; arrays of strings are joined line by line.
    fn text(&self, field: Field, value: &Value) -> ParseResult<String> {
        match value {
            Value::Array(lines) => lines
                .iter()
                .map(|line| match line {
                    Value::String(s) => Ok(s.as_str()),
                    other => Err(self.invalid(field, format!("expected a line of text, got {other}"))),
                })
                .collect::<ParseResult<Vec<_>>>()
                .map(|lines| lines.join("\n")),
            other => self.scalar_text(field, other),
        }
    }

    fn scalar_text(&self, field: Field, value: &Value) -> ParseResult<String> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(self.invalid(field, format!("expected text, got {other}"))),
        }
    }

    fn missing(&self, field: Field) -> ParseError {
        ParseError::missing(field.name, &self.context, field.keys)
    }

    fn invalid(&self, field: Field, message: String) -> ParseError {
        ParseError::invalid(field.name, &self.context, message)
    }
}
