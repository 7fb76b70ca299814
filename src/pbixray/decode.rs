//! Decoding of extractor tool results into typed model fragments.
//!
//! Every function here is pure: it takes the payload of one tool call and
//! returns typed records or a [`ParseError`] naming the tool, the record
//! index and the field at fault. Untyped JSON never leaves this module.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::fields::{self, Record};
use super::literal;
use crate::error::{ParseError, ParseResult};
use crate::mcp::CallToolResult;
use crate::model::{
    Cardinality, Column, CrossFilterDirection, DataSource, Measure, Relationship, RelationshipEnd,
    Table, UNKNOWN_DATA_TYPE,
};

/// Content of a tool result, classified once.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolPayload {
    /// The text content parsed as JSON (or structured content).
    Json(Value),
    /// Text that is not JSON.
    Text(String),
    /// No usable content.
    Empty,
}

impl ToolPayload {
    /// Classify a tool result: the first text block is tried as JSON, then
    /// kept as raw text; structured content is used when there is no text.
    pub fn from_result(result: &CallToolResult) -> Self {
        match result.first_text() {
            Some(text) => Self::from_text(text),
            None => match &result.structured_content {
                Some(value) => ToolPayload::Json(value.clone()),
                None => ToolPayload::Empty,
            },
        }
    }

    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return ToolPayload::Empty;
        }
        match serde_json::from_str(trimmed) {
            Ok(value) => ToolPayload::Json(value),
            Err(_) => ToolPayload::Text(text.to_string()),
        }
    }

    /// Short human-readable form for status messages.
    pub fn summary(&self) -> String {
        match self {
            ToolPayload::Json(Value::String(s)) => s.clone(),
            ToolPayload::Json(Value::Object(map)) => ["message", "status", "result"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
            ToolPayload::Json(other) => other.to_string(),
            ToolPayload::Text(text) => text.trim().to_string(),
            ToolPayload::Empty => String::new(),
        }
    }
}

/// Unwrap a payload into a list of items.
///
/// Accepts a bare array, an object wrapping the array under one of
/// `wrappers`, a JSON string holding either, or list-literal text.
fn items(payload: &ToolPayload, tool: &str, wrappers: &[&str]) -> ParseResult<Vec<Value>> {
    match payload {
        ToolPayload::Empty | ToolPayload::Json(Value::Null) => Ok(Vec::new()),
        ToolPayload::Json(Value::Array(items)) => Ok(items.clone()),
        ToolPayload::Json(Value::Object(map)) => wrappers
            .iter()
            .find_map(|key| map.get(*key))
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| {
                ParseError::invalid(
                    "result",
                    tool,
                    format!("expected a list or an object with one of: {}", wrappers.join(", ")),
                )
            }),
        ToolPayload::Json(Value::String(text)) => items(&ToolPayload::from_text(text), tool, wrappers),
        ToolPayload::Json(other) => Err(ParseError::invalid(
            "result",
            tool,
            format!("expected a list, got {other}"),
        )),
        ToolPayload::Text(raw) => {
            if !raw.contains('[') {
                return Err(ParseError::MalformedLiteral {
                    offset: 0,
                    message: format!("{tool} returned text without a list: {}", preview(raw)),
                });
            }
            match literal::parse_embedded_list(raw)?.into_json() {
                Value::Array(items) => Ok(items),
                _ => Err(ParseError::invalid("result", tool, "literal is not a list")),
            }
        }
    }
}

fn record_context(tool: &str, idx: usize) -> String {
    format!("{tool} record {}", idx + 1)
}

fn as_object<'a>(item: &'a Value, tool: &str, idx: usize) -> ParseResult<&'a Map<String, Value>> {
    item.as_object().ok_or_else(|| {
        ParseError::invalid("record", record_context(tool, idx), format!("expected an object, got {item}"))
    })
}

fn preview(text: &str) -> String {
    let line = text.trim().lines().next().unwrap_or_default();
    line.chars().take(80).collect()
}

// ============================================================================
// Capabilities
// ============================================================================

/// Decode list-tables. Items may be bare names or table records.
pub fn tables(payload: &ToolPayload, tool: &str) -> ParseResult<Vec<Table>> {
    items(payload, tool, &["tables"])?
        .iter()
        .enumerate()
        .map(|(idx, item)| match item {
            Value::String(name) if !name.trim().is_empty() => Ok(Table::new(name.clone())),
            Value::String(_) => Err(ParseError::missing(
                fields::TABLE_NAME.name,
                record_context(tool, idx),
                fields::TABLE_NAME.keys,
            )),
            Value::Object(map) => {
                let record = Record::new(map, record_context(tool, idx));
                Ok(Table::new(record.required_str(fields::TABLE_NAME)?)
                    .hidden(record.opt_bool(fields::HIDDEN, false)?)
                    .with_description(record.opt_str(fields::DESCRIPTION)?)
                    .with_row_count(record.opt_u64(fields::ROW_COUNT)?))
            }
            other => Err(ParseError::invalid(
                fields::TABLE_NAME.name,
                record_context(tool, idx),
                format!("expected a name or a record, got {other}"),
            )),
        })
        .collect()
}

/// Decode get-schema for one table.
///
/// Records naming a different table are skipped, in case the tool ignored
/// the table filter.
pub fn columns(payload: &ToolPayload, tool: &str, table: &str) -> ParseResult<Vec<Column>> {
    let mut columns = Vec::new();

    for (idx, item) in items(payload, tool, &["columns", "schema"])?.iter().enumerate() {
        let context = format!("{} (table '{table}')", record_context(tool, idx));
        let column = match item {
            Value::String(name) if !name.trim().is_empty() => {
                Column::new(name.clone(), UNKNOWN_DATA_TYPE)
            }
            Value::Object(map) => {
                let record = Record::new(map, context);
                let owner = record.opt_str(fields::COLUMN_TABLE)?;
                if !owner.is_empty() && owner != table {
                    debug!(tool, table, owner = %owner, "skipping column of another table");
                    continue;
                }
                let data_type = match record.opt_str(fields::DATA_TYPE)? {
                    t if t.is_empty() => UNKNOWN_DATA_TYPE.to_string(),
                    t => t,
                };
                Column::new(record.required_str(fields::COLUMN_NAME)?, data_type)
                    .hidden(record.opt_bool(fields::HIDDEN, false)?)
                    .with_description(record.opt_str(fields::DESCRIPTION)?)
            }
            _ => {
                return Err(ParseError::missing(
                    fields::COLUMN_NAME.name,
                    context,
                    fields::COLUMN_NAME.keys,
                ))
            }
        };
        columns.push(Column {
            table: table.to_string(),
            ..column
        });
    }

    Ok(columns)
}

/// Decode get-measures.
pub fn measures(payload: &ToolPayload, tool: &str) -> ParseResult<Vec<Measure>> {
    items(payload, tool, &["measures"])?
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let record = Record::new(as_object(item, tool, idx)?, record_context(tool, idx));
            Ok(Measure::new(
                record.required_str(fields::MEASURE_NAME)?,
                record.required_text(fields::EXPRESSION)?,
            )
            .in_table(record.required_str(fields::MEASURE_TABLE)?)
            .with_format_string(record.opt_str(fields::FORMAT_STRING)?)
            .hidden(record.opt_bool(fields::HIDDEN, false)?)
            .with_description(record.opt_str(fields::DESCRIPTION)?)
            .with_display_folder(record.opt_str(fields::DISPLAY_FOLDER)?))
        })
        .collect()
}

/// Decode get-relationships.
pub fn relationships(payload: &ToolPayload, tool: &str) -> ParseResult<Vec<Relationship>> {
    items(payload, tool, &["relationships"])?
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let record = Record::new(as_object(item, tool, idx)?, record_context(tool, idx));
            let relationship = Relationship::new(
                record.required_str(fields::FROM_TABLE)?,
                record.required_str(fields::FROM_COLUMN)?,
                record.required_str(fields::TO_TABLE)?,
                record.required_str(fields::TO_COLUMN)?,
            );
            let context = format!("{} ({})", record.context(), relationship.label());

            let cross_filter = match record.opt_str(fields::CROSS_FILTER)? {
                d if d.is_empty() => CrossFilterDirection::Single,
                d => CrossFilterDirection::parse(&d, &context)?,
            };

            Ok(relationship
                .with_cardinality(cardinality(&record, &context)?)
                .with_cross_filter(cross_filter)
                .active(record.opt_bool(fields::IS_ACTIVE, true)?))
        })
        .collect()
}

/// A single cardinality token, else a from/to pair (default many → one).
fn cardinality(record: &Record<'_>, context: &str) -> ParseResult<Cardinality> {
    let token = record.opt_str(fields::CARDINALITY)?;
    if !token.is_empty() {
        return Cardinality::parse(&token, context);
    }

    let from = record.opt_str(fields::FROM_CARDINALITY)?;
    let to = record.opt_str(fields::TO_CARDINALITY)?;
    let from = if from.is_empty() {
        RelationshipEnd::Many
    } else {
        RelationshipEnd::parse(&from, context)?
    };
    let to = if to.is_empty() {
        RelationshipEnd::One
    } else {
        RelationshipEnd::parse(&to, context)?
    };
    Ok(Cardinality::from_ends(from, to))
}

/// Decode get-data-sources into unbound expressions.
///
/// Accepts a list of `{TableName, Expression}` records, a wrapper object,
/// or a flat `{name: expression}` object.
pub fn data_sources(payload: &ToolPayload, tool: &str) -> ParseResult<Vec<DataSource>> {
    if let ToolPayload::Json(Value::Object(map)) = payload {
        if !["queries", "expressions"].iter().any(|k| map.contains_key(*k)) {
            return Ok(map
                .iter()
                .filter_map(|(name, expr)| {
                    expr.as_str()
                        .map(|expr| DataSource::shared(name.clone(), expr))
                })
                .collect());
        }
    }

    items(payload, tool, &["queries", "expressions"])?
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let record = Record::new(as_object(item, tool, idx)?, record_context(tool, idx));
            let name = match record.opt_str(fields::QUERY_NAME)? {
                n if n.trim().is_empty() => format!("Query_{idx}"),
                n => n,
            };
            Ok(DataSource::shared(name, record.opt_str(fields::EXPRESSION)?))
        })
        .collect()
}

/// Aggregate counts reported by get-summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelSummary {
    pub tables_count: Option<u64>,
    pub measures_count: Option<u64>,
    pub relationships_count: Option<u64>,
    pub size_bytes: Option<u64>,
}

/// Decode get-summary. A non-object payload yields an empty summary.
pub fn summary(payload: &ToolPayload, tool: &str) -> ParseResult<ModelSummary> {
    let ToolPayload::Json(Value::Object(map)) = payload else {
        warn!(tool, "summary is not an object, ignoring it");
        return Ok(ModelSummary::default());
    };
    let record = Record::new(map, tool);
    Ok(ModelSummary {
        tables_count: record.opt_u64(fields::TABLES_COUNT)?,
        measures_count: record.opt_u64(fields::MEASURES_COUNT)?,
        relationships_count: record.opt_u64(fields::RELATIONSHIPS_COUNT)?,
        size_bytes: record.opt_u64(fields::SIZE_BYTES)?,
    })
}
