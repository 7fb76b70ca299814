//! `model.bim` documents.
//!
//! The document is a Tabular Object Model serialization. Only the parts the
//! canonical model needs are deserialized; everything else is ignored.
//! Content is either at the top level or wrapped in `"model"`.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::{clean_expression, read_text, strip_meta};
use crate::error::{ParseError, ParseResult};
use crate::model::{
    Cardinality, Column, CrossFilterDirection, DataSource, Measure, ModelBuilder, ModelMetadata,
    Relationship, RelationshipEnd, Table, UNKNOWN_DATA_TYPE,
};

// ============================================================================
// Document shape
// ============================================================================

#[derive(Debug, Deserialize)]
struct BimDocument {
    model: Option<BimModel>,
    #[serde(flatten)]
    top_level: BimModel,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BimModel {
    #[serde(default)]
    tables: Vec<BimTable>,
    #[serde(default)]
    relationships: Vec<BimRelationship>,
    #[serde(default)]
    expressions: Vec<BimExpression>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BimTable {
    name: Option<String>,
    #[serde(default)]
    columns: Vec<BimColumn>,
    #[serde(default)]
    measures: Vec<BimMeasure>,
    #[serde(default)]
    partitions: Vec<BimPartition>,
    #[serde(default)]
    is_hidden: bool,
    description: Option<Text>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BimColumn {
    name: Option<String>,
    data_type: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    is_hidden: bool,
    description: Option<Text>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BimMeasure {
    name: Option<String>,
    expression: Option<Text>,
    format_string: Option<String>,
    #[serde(default)]
    is_hidden: bool,
    description: Option<Text>,
    display_folder: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BimPartition {
    source: Option<BimSource>,
}

#[derive(Debug, Deserialize)]
struct BimSource {
    #[serde(rename = "type")]
    kind: Option<String>,
    expression: Option<Text>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BimRelationship {
    name: Option<String>,
    from_table: Option<String>,
    from_column: Option<String>,
    to_table: Option<String>,
    to_column: Option<String>,
    from_cardinality: Option<String>,
    to_cardinality: Option<String>,
    cross_filtering_behavior: Option<String>,
    is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct BimExpression {
    name: Option<String>,
    kind: Option<String>,
    expression: Option<Text>,
}

/// Text that may be split into an array of lines.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Text {
    Single(String),
    Lines(Vec<String>),
}

impl Text {
    fn joined(&self) -> String {
        match self {
            Text::Single(text) => text.clone(),
            Text::Lines(lines) => lines.join("\n"),
        }
    }
}

fn text(value: &Option<Text>) -> String {
    value.as_ref().map(Text::joined).unwrap_or_default()
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a `model.bim` file into a model named `name`.
pub fn parse_file(path: &Path, name: &str) -> ParseResult<ModelMetadata> {
    let text = read_text(path)?;
    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let model = document(&label, &text, name)?.file_path(path).build()?;
    info!(
        path = %path.display(),
        tables = model.tables().len(),
        relationships = model.relationships().len(),
        "parsed BIM document"
    );
    Ok(model)
}

/// Parse document text. `file` labels errors.
pub fn parse_str(file: &str, text: &str, name: &str) -> ParseResult<ModelMetadata> {
    document(file, text, name)?.build()
}

fn document(file: &str, text: &str, name: &str) -> ParseResult<ModelBuilder> {
    let document: BimDocument =
        serde_json::from_str(text.trim_start_matches('\u{feff}')).map_err(|source| {
            ParseError::Json {
                file: file.to_string(),
                source,
            }
        })?;
    let model = document.model.unwrap_or(document.top_level);

    let mut tables = Vec::with_capacity(model.tables.len());
    let mut data_sources = Vec::new();
    for (idx, bim_table) in model.tables.iter().enumerate() {
        let (table, sources) = table(file, idx, bim_table)?;
        tables.push(table);
        data_sources.extend(sources);
    }

    let relationships = model
        .relationships
        .iter()
        .enumerate()
        .map(|(idx, r)| relationship(file, idx, r))
        .collect::<ParseResult<Vec<_>>>()?;

    for (idx, expression) in model.expressions.iter().enumerate() {
        if let Some(source) = shared_expression(file, idx, expression)? {
            data_sources.push(source);
        }
    }

    Ok(ModelBuilder::new(name)
        .tables(tables)
        .relationships(relationships)
        .data_sources(data_sources))
}

fn required<'a>(value: &'a Option<String>, field: &str, context: impl FnOnce() -> String) -> ParseResult<&'a str> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ParseError::missing(field, context(), &[field])),
    }
}

fn table(file: &str, idx: usize, bim: &BimTable) -> ParseResult<(Table, Vec<DataSource>)> {
    let name = required(&bim.name, "name", || format!("{file} tables[{idx}]"))?;

    let mut table = Table::new(name)
        .hidden(bim.is_hidden)
        .with_description(text(&bim.description));

    for (col_idx, column) in bim.columns.iter().enumerate() {
        if column.kind.as_deref() == Some("rowNumber") {
            continue;
        }
        let column_name = required(&column.name, "name", || {
            format!("{file} table '{name}' columns[{col_idx}]")
        })?;
        let data_type = column
            .data_type
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNKNOWN_DATA_TYPE.to_string());
        table = table.with_column(
            Column::new(column_name, data_type)
                .hidden(column.is_hidden)
                .with_description(text(&column.description)),
        );
    }

    for (m_idx, measure) in bim.measures.iter().enumerate() {
        let measure_name = required(&measure.name, "name", || {
            format!("{file} table '{name}' measures[{m_idx}]")
        })?;
        let expression = measure.expression.as_ref().ok_or_else(|| {
            ParseError::missing(
                "expression",
                format!("{file} measure '{measure_name}'"),
                &["expression"],
            )
        })?;
        table = table.with_measure(
            Measure::new(measure_name, clean_expression(&expression.joined()))
                .with_format_string(measure.format_string.clone().unwrap_or_default())
                .hidden(measure.is_hidden)
                .with_description(text(&measure.description))
                .with_display_folder(measure.display_folder.clone().unwrap_or_default()),
        );
    }

    let sources = bim
        .partitions
        .iter()
        .filter_map(|p| p.source.as_ref())
        .filter(|s| s.kind.as_deref().is_some_and(|k| k.eq_ignore_ascii_case("m")))
        .map(|s| clean_expression(&text(&s.expression)))
        .filter(|query| !query.is_empty())
        .map(|query| DataSource::for_table(name, query))
        .collect();

    Ok((table, sources))
}

fn relationship(file: &str, idx: usize, bim: &BimRelationship) -> ParseResult<Relationship> {
    let ctx = match &bim.name {
        Some(name) => format!("{file} relationship '{name}'"),
        None => format!("{file} relationships[{idx}]"),
    };

    let from_table = required(&bim.from_table, "fromTable", || ctx.clone())?;
    let from_column = required(&bim.from_column, "fromColumn", || ctx.clone())?;
    let to_table = required(&bim.to_table, "toTable", || ctx.clone())?;
    let to_column = required(&bim.to_column, "toColumn", || ctx.clone())?;

    let from_end = match &bim.from_cardinality {
        Some(value) => RelationshipEnd::parse(value, &ctx)?,
        None => RelationshipEnd::Many,
    };
    let to_end = match &bim.to_cardinality {
        Some(value) => RelationshipEnd::parse(value, &ctx)?,
        None => RelationshipEnd::One,
    };
    let cross_filter = match &bim.cross_filtering_behavior {
        Some(value) => CrossFilterDirection::parse(value, &ctx)?,
        None => CrossFilterDirection::Single,
    };

    Ok(Relationship::new(from_table, from_column, to_table, to_column)
        .with_cardinality(Cardinality::from_ends(from_end, to_end))
        .with_cross_filter(cross_filter)
        .active(bim.is_active.unwrap_or(true)))
}

fn shared_expression(file: &str, idx: usize, bim: &BimExpression) -> ParseResult<Option<DataSource>> {
    let name = required(&bim.name, "name", || format!("{file} expressions[{idx}]"))?;
    if bim.kind.as_deref().is_some_and(|k| !k.eq_ignore_ascii_case("m")) {
        return Ok(None);
    }
    let body = clean_expression(&strip_meta(&text(&bim.expression)));
    Ok((!body.is_empty()).then(|| DataSource::shared(name, body)))
}
