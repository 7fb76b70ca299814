//! Referential checks applied once, when a model is built.

use std::collections::{HashMap, HashSet};

use crate::error::{ParseError, ParseResult};

use super::{DataSource, Relationship, Table};

/// Check the structural invariants of a model under construction.
///
/// - table names are non-empty and unique
/// - column and measure names are non-empty and unique within their table
/// - every column and measure names its owning table
/// - relationship endpoints name existing tables and, when given, columns
/// - table-bound data sources name existing tables
pub(crate) fn validate(
    tables: &[Table],
    relationships: &[Relationship],
    data_sources: &[DataSource],
) -> ParseResult<()> {
    let mut by_name: HashMap<&str, &Table> = HashMap::with_capacity(tables.len());

    for (idx, table) in tables.iter().enumerate() {
        if table.name.trim().is_empty() {
            return Err(ParseError::missing("name", format!("table #{}", idx + 1), &["name"]));
        }
        if by_name.insert(table.name.as_str(), table).is_some() {
            return Err(ParseError::Duplicate {
                kind: "table",
                name: table.name.clone(),
                scope: "model".to_string(),
            });
        }
        validate_table(table)?;
    }

    for relationship in relationships {
        let context = format!("relationship {}", relationship.label());
        check_endpoint(&by_name, &context, &relationship.from_table, &relationship.from_column)?;
        check_endpoint(&by_name, &context, &relationship.to_table, &relationship.to_column)?;
    }

    for source in data_sources {
        if let Some(table) = &source.table {
            if !by_name.contains_key(table.as_str()) {
                return Err(ParseError::undefined(
                    format!("data source '{}'", source.name),
                    table,
                ));
            }
        }
    }

    Ok(())
}

fn validate_table(table: &Table) -> ParseResult<()> {
    let scope = format!("table '{}'", table.name);

    let mut seen = HashSet::new();
    for column in &table.columns {
        if column.name.trim().is_empty() {
            return Err(ParseError::missing("name", format!("column of {scope}"), &["name"]));
        }
        if column.table != table.name {
            return Err(ParseError::undefined(
                format!("column '{}' of {scope}", column.name),
                &column.table,
            ));
        }
        if !seen.insert(column.name.as_str()) {
            return Err(ParseError::Duplicate {
                kind: "column",
                name: column.name.clone(),
                scope,
            });
        }
    }

    let mut seen = HashSet::new();
    for measure in &table.measures {
        if measure.name.trim().is_empty() {
            return Err(ParseError::missing("name", format!("measure of {scope}"), &["name"]));
        }
        if measure.table != table.name {
            return Err(ParseError::undefined(
                format!("measure '{}' of {scope}", measure.name),
                &measure.table,
            ));
        }
        if !seen.insert(measure.name.as_str()) {
            return Err(ParseError::Duplicate {
                kind: "measure",
                name: measure.name.clone(),
                scope,
            });
        }
    }

    Ok(())
}

fn check_endpoint(
    tables: &HashMap<&str, &Table>,
    context: &str,
    table: &str,
    column: &str,
) -> ParseResult<()> {
    let Some(owner) = tables.get(table) else {
        return Err(ParseError::undefined(context, table));
    };
    if !column.is_empty() && owner.column(column).is_none() {
        return Err(ParseError::undefined(context, format!("{table}.{column}")));
    }
    Ok(())
}
