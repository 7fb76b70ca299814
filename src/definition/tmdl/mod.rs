//! TMDL definition folders.
//!
//! Layout:
//!
//! ```text
//! definition/
//!   model.tmdl           model properties and `ref table` order (optional)
//!   relationships.tmdl   one `relationship` block per relationship
//!   expressions.tmdl     shared Power Query expressions
//!   tables/
//!     Sales.tmdl         one `table` block with columns, measures, partitions
//! ```
//!
//! Every `.tmdl` file directly under `definition/` and `definition/tables/`
//! is read; objects are collected by keyword, so a table or relationship
//! declared in an unexpected file is still found.

pub mod syntax;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use self::syntax::{split_column_ref, unquote, Node, NodeKind};
use super::{clean_expression, read_text, strip_meta};
use crate::error::{ParseError, ParseResult};
use crate::model::{
    Cardinality, Column, CrossFilterDirection, DataSource, Measure, ModelBuilder, ModelMetadata,
    Relationship, RelationshipEnd, Table, UNKNOWN_DATA_TYPE,
};

/// Parse a `definition/` folder into a model named `name`.
pub fn parse_folder(definition: &Path, name: &str) -> ParseResult<ModelMetadata> {
    let mut collected = Collected::default();

    for file in tmdl_files(definition)? {
        let label = file_label(definition, &file);
        let text = read_text(&file)?;
        let nodes = syntax::parse(&label, &text)?;
        debug!(file = %label, nodes = nodes.len(), "parsed TMDL file");
        collected.absorb(&label, nodes);
    }

    let mut tables = Vec::with_capacity(collected.tables.len());
    let mut partitions = Vec::new();
    for (file, node) in &collected.tables {
        let (table, table_partitions) = table(file, node)?;
        tables.push(table);
        partitions.push(table_partitions);
    }

    // `ref table` order wins; unreferenced tables keep file order after it.
    let order = |name: &str| {
        collected
            .table_refs
            .iter()
            .position(|r| r == name)
            .unwrap_or(usize::MAX)
    };
    let mut indexed: Vec<(Table, Vec<DataSource>)> = tables.into_iter().zip(partitions).collect();
    indexed.sort_by_key(|(table, _)| order(&table.name));

    let mut data_sources = Vec::new();
    let mut ordered_tables = Vec::with_capacity(indexed.len());
    for (table, sources) in indexed {
        data_sources.extend(sources);
        ordered_tables.push(table);
    }

    let relationships = collected
        .relationships
        .iter()
        .map(|(file, node)| relationship(file, node))
        .collect::<ParseResult<Vec<_>>>()?;

    for (file, node) in &collected.expressions {
        if let Some(source) = expression(file, node)? {
            data_sources.push(source);
        }
    }

    info!(
        path = %definition.display(),
        tables = ordered_tables.len(),
        relationships = relationships.len(),
        "parsed TMDL folder"
    );

    ModelBuilder::new(name)
        .tables(ordered_tables)
        .relationships(relationships)
        .data_sources(data_sources)
        .file_path(definition)
        .build()
}

/// `.tmdl` files in `definition/` then `definition/tables/`, each sorted by name.
fn tmdl_files(definition: &Path) -> ParseResult<Vec<PathBuf>> {
    let mut files = list_tmdl(definition)?;
    let tables_dir = definition.join("tables");
    if tables_dir.is_dir() {
        files.extend(list_tmdl(&tables_dir)?);
    }
    Ok(files)
}

fn list_tmdl(dir: &Path) -> ParseResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| ParseError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ParseError::io(dir, e))?.path();
        let is_tmdl = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("tmdl"));
        if is_tmdl && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_label(definition: &Path, file: &Path) -> String {
    file.strip_prefix(definition)
        .unwrap_or(file)
        .display()
        .to_string()
}

/// Top-level objects gathered across files, each with its file label.
#[derive(Default)]
struct Collected {
    tables: Vec<(String, Node)>,
    relationships: Vec<(String, Node)>,
    expressions: Vec<(String, Node)>,
    table_refs: Vec<String>,
}

impl Collected {
    fn absorb(&mut self, file: &str, nodes: Vec<Node>) {
        for node in nodes {
            match node.keyword() {
                Some("table") => self.tables.push((file.to_string(), node)),
                Some("relationship") => self.relationships.push((file.to_string(), node)),
                Some("expression") => self.expressions.push((file.to_string(), node)),
                Some("ref") => {
                    if let Some(table) = node.name().and_then(|n| n.strip_prefix("table ")) {
                        self.table_refs.push(unquote(table));
                    }
                }
                // `model` and `database` wrap refs in some writers.
                Some("model") | Some("database") => {
                    let children = node.children;
                    self.absorb(file, children);
                }
                _ => {}
            }
        }
    }
}

fn context(file: &str, node: &Node) -> String {
    format!("{file} line {}", node.line)
}

fn table(file: &str, node: &Node) -> ParseResult<(Table, Vec<DataSource>)> {
    let name = node.name().unwrap_or_default();
    if name.trim().is_empty() {
        return Err(ParseError::missing("name", context(file, node), &["table"]));
    }

    let mut table = Table::new(name)
        .hidden(node.flag("isHidden"))
        .with_description(node.description.clone());

    require_named(file, node, "column")?;
    require_named(file, node, "measure")?;

    for column_node in node.objects("column") {
        let column_name = column_node.name().unwrap_or_default();
        let data_type = column_node
            .property("dataType")
            .map(unquote)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNKNOWN_DATA_TYPE.to_string());
        table = table.with_column(
            Column::new(column_name, data_type)
                .hidden(column_node.flag("isHidden"))
                .with_description(column_node.description.clone()),
        );
    }

    for measure_node in node.objects("measure") {
        let measure_name = measure_node.name().unwrap_or_default();
        let ctx = format!("measure '{measure_name}' ({})", context(file, measure_node));
        let expression = measure_node
            .value()
            .ok_or_else(|| ParseError::missing("expression", ctx, &["="]))?;
        table = table.with_measure(
            Measure::new(measure_name, clean_expression(expression))
                .with_format_string(measure_node.property("formatString").unwrap_or_default())
                .hidden(measure_node.flag("isHidden"))
                .with_description(measure_node.description.clone())
                .with_display_folder(
                    measure_node
                        .property("displayFolder")
                        .map(unquote)
                        .unwrap_or_default(),
                ),
        );
    }

    let mut sources = Vec::new();
    for partition in node.objects("partition") {
        let is_m = partition
            .value()
            .is_some_and(|kind| kind.trim().eq_ignore_ascii_case("m"));
        if !is_m {
            continue;
        }
        match partition.property("source").map(clean_expression) {
            Some(query) if !query.is_empty() => {
                sources.push(DataSource::for_table(table.name.clone(), query));
            }
            _ => debug!(table = %table.name, line = partition.line, "M partition without source"),
        }
    }

    Ok((table, sources))
}

/// A `column` or `measure` line with no name, e.g. a bare `column` or `column ''`.
fn require_named(file: &str, table: &Node, keyword: &str) -> ParseResult<()> {
    let unnamed = table.children.iter().find(|child| match &child.kind {
        NodeKind::Flag(word) => word == keyword,
        NodeKind::Property { key, .. } => key == keyword,
        NodeKind::Object { keyword: k, name, .. } => k == keyword && name.trim().is_empty(),
    });
    match unnamed {
        Some(child) => Err(ParseError::missing(
            "name",
            format!("{keyword} ({})", context(file, child)),
            &[keyword],
        )),
        None => Ok(()),
    }
}

fn relationship(file: &str, node: &Node) -> ParseResult<Relationship> {
    let ctx = format!(
        "relationship '{}' ({})",
        node.name().unwrap_or_default(),
        context(file, node)
    );

    let endpoint = |key: &str| -> ParseResult<(String, String)> {
        let raw = node
            .property(key)
            .ok_or_else(|| ParseError::missing(key, ctx.clone(), &[key]))?;
        split_column_ref(raw)
            .ok_or_else(|| ParseError::invalid(key, ctx.clone(), format!("expected Table.Column, got '{raw}'")))
    };
    let (from_table, from_column) = endpoint("fromColumn")?;
    let (to_table, to_column) = endpoint("toColumn")?;

    let from_end = match node.property("fromCardinality") {
        Some(value) => RelationshipEnd::parse(value, &ctx)?,
        None => RelationshipEnd::Many,
    };
    let to_end = match node.property("toCardinality") {
        Some(value) => RelationshipEnd::parse(value, &ctx)?,
        None => RelationshipEnd::One,
    };
    let cross_filter = match node.property("crossFilteringBehavior") {
        Some(value) => CrossFilterDirection::parse(value, &ctx)?,
        None => CrossFilterDirection::Single,
    };
    let is_active = match node.property("isActive") {
        Some(value) => parse_bool(value, "isActive", &ctx)?,
        None => true,
    };

    Ok(Relationship::new(from_table, from_column, to_table, to_column)
        .with_cardinality(Cardinality::from_ends(from_end, to_end))
        .with_cross_filter(cross_filter)
        .active(is_active))
}

fn parse_bool(value: &str, field: &str, ctx: &str) -> ParseResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ParseError::invalid(field, ctx, format!("expected true or false, got '{value}'"))),
    }
}

/// A shared expression; `None` when it has no body.
fn expression(file: &str, node: &Node) -> ParseResult<Option<DataSource>> {
    let name = node.name().unwrap_or_default();
    if name.trim().is_empty() {
        return Err(ParseError::missing("name", context(file, node), &["expression"]));
    }
    let body = clean_expression(&strip_meta(node.value().unwrap_or_default()));
    if body.is_empty() {
        debug!(expression = name, "skipping empty expression");
        return Ok(None);
    }
    Ok(Some(DataSource::shared(name, body)))
}
