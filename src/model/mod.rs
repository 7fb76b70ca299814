//! Canonical, source-independent semantic model.
//!
//! Both producers (the PBIXRay tool adapter and the definition parser) build a
//! [`ModelMetadata`] through [`ModelBuilder`], which applies the referential
//! checks in [`validation`] exactly once. A built model has no mutating API:
//! downstream consumers only get shared views of it.

pub mod measure;
pub mod relationship;
pub mod source;
pub mod table;
mod validation;

pub use measure::Measure;
pub use relationship::{Cardinality, CrossFilterDirection, Relationship, RelationshipEnd};
pub use source::DataSource;
pub use table::{Column, Table};

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{ParseError, ParseResult};

/// Data type recorded when a source does not declare one.
pub const UNKNOWN_DATA_TYPE: &str = "Unknown";

/// Root of the canonical model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelMetadata {
    name: String,
    tables: Vec<Table>,
    /// Denormalized view: every table's measures, in table order.
    measures: Vec<Measure>,
    relationships: Vec<Relationship>,
    data_sources: Vec<DataSource>,
    size_bytes: Option<u64>,
    /// The file or folder the model was read from.
    file_path: Option<PathBuf>,
}

impl ModelMetadata {
    /// Display name of the model.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// All measures across tables.
    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn data_sources(&self) -> &[DataSource] {
        &self.data_sources
    }

    /// File size reported by the extraction tool, when known.
    pub fn size_bytes(&self) -> Option<u64> {
        self.size_bytes
    }

    /// Path of the `.pbix` file, `model.bim` or `definition/` folder that was read.
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Iterate over every column of every table.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.tables.iter().flat_map(|t| t.columns.iter())
    }

    /// Relationships touching the given table on either side.
    pub fn relationships_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a Relationship> {
        self.relationships
            .iter()
            .filter(move |r| r.from_table == table || r.to_table == table)
    }
}

/// Assembles a [`ModelMetadata`] and validates it.
///
/// Measures may be attached to their tables up front ([`Table::with_measure`])
/// or supplied as a flat list ([`ModelBuilder::measure`]); flat measures are
/// appended to their owning table at build time.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    name: String,
    tables: Vec<Table>,
    loose_measures: Vec<Measure>,
    relationships: Vec<Relationship>,
    data_sources: Vec<DataSource>,
    size_bytes: Option<u64>,
    file_path: Option<PathBuf>,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Rename the model (used for caller-supplied display names).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    pub fn tables(mut self, tables: impl IntoIterator<Item = Table>) -> Self {
        self.tables.extend(tables);
        self
    }

    /// Add a measure whose `table` field names its owner.
    pub fn measure(mut self, measure: Measure) -> Self {
        self.loose_measures.push(measure);
        self
    }

    pub fn measures(mut self, measures: impl IntoIterator<Item = Measure>) -> Self {
        self.loose_measures.extend(measures);
        self
    }

    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn relationships(mut self, relationships: impl IntoIterator<Item = Relationship>) -> Self {
        self.relationships.extend(relationships);
        self
    }

    pub fn data_source(mut self, source: DataSource) -> Self {
        self.data_sources.push(source);
        self
    }

    pub fn data_sources(mut self, sources: impl IntoIterator<Item = DataSource>) -> Self {
        self.data_sources.extend(sources);
        self
    }

    pub fn size_bytes(mut self, size_bytes: Option<u64>) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Attach flat measures, validate, and freeze the model.
    pub fn build(self) -> ParseResult<ModelMetadata> {
        let ModelBuilder {
            name,
            mut tables,
            loose_measures,
            relationships,
            data_sources,
            size_bytes,
            file_path,
        } = self;

        for measure in loose_measures {
            let Some(owner) = tables.iter_mut().find(|t| t.name == measure.table) else {
                return Err(ParseError::undefined(
                    format!("measure '{}'", measure.name),
                    &measure.table,
                ));
            };
            owner.measures.push(measure);
        }

        validation::validate(&tables, &relationships, &data_sources)?;

        let measures = tables
            .iter()
            .flat_map(|t| t.measures.iter().cloned())
            .collect();

        Ok(ModelMetadata {
            name,
            tables,
            measures,
            relationships,
            data_sources,
            size_bytes,
            file_path,
        })
    }
}
