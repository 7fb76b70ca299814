//! MetadataSource trait and its PBIXRay implementation.
//!
//! A [`MetadataSource`] exposes one async method per extractor capability.
//! The default [`MetadataSource::extract_model`] orchestrates them into a
//! validated [`ModelMetadata`]; column schemas are fetched concurrently.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::decode::{self, ModelSummary, ToolPayload};
use crate::config::ToolNames;
use crate::error::{Error, ErrorKind, ParseError, Result};
use crate::mcp::ToolCaller;
use crate::model::{Column, DataSource, Measure, ModelBuilder, ModelMetadata, Relationship, Table};

/// Source of model metadata, one method per capability.
///
/// # Example
///
/// ```ignore
/// use pbimeta::pbixray::MetadataSource;
///
/// async fn example(source: &impl MetadataSource) -> pbimeta::Result<()> {
///     source.load_model(Path::new("Sales.pbix")).await?;
///     let tables = source.list_tables().await?;
///     let columns = source.get_columns(&tables[0].name).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait MetadataSource: Send + Sync {
    // =========================================================================
    // Capabilities
    // =========================================================================

    /// Load a model file into the extractor. Returns the tool's status text.
    async fn load_model(&self, path: &Path) -> Result<String>;

    /// List tables (without columns).
    async fn list_tables(&self) -> Result<Vec<Table>>;

    /// Get the column schema of one table.
    async fn get_columns(&self, table: &str) -> Result<Vec<Column>>;

    /// List every measure in the model.
    async fn list_measures(&self) -> Result<Vec<Measure>>;

    /// List every relationship in the model.
    async fn list_relationships(&self) -> Result<Vec<Relationship>>;

    /// List data-source expressions, not yet bound to tables.
    async fn list_data_sources(&self) -> Result<Vec<DataSource>>;

    /// Aggregate counts.
    async fn get_summary(&self) -> Result<ModelSummary>;

    // =========================================================================
    // Orchestration (default implementation)
    // =========================================================================

    /// Extract a complete model from `path`.
    ///
    /// The display name defaults to the file stem. A failing summary is
    /// logged and ignored; every other failure aborts extraction.
    async fn extract_model(&self, path: &Path, name: Option<&str>) -> Result<ModelMetadata> {
        let file_path = resolve_model_path(path)?;
        let status = self.load_model(&file_path).await?;
        info!(path = %file_path.display(), %status, "model loaded");

        let mut tables = self.list_tables().await?;
        info!(count = tables.len(), "extracted tables");

        let futures: Vec<_> = tables.iter().map(|t| self.get_columns(&t.name)).collect();
        let column_sets = futures::future::join_all(futures).await;
        for (table, columns) in tables.iter_mut().zip(column_sets) {
            let columns = columns?;
            debug!(table = %table.name, count = columns.len(), "extracted columns");
            table.columns = columns;
        }

        let measures = self.list_measures().await?;
        info!(count = measures.len(), "extracted measures");

        let relationships = self.list_relationships().await?;
        info!(count = relationships.len(), "extracted relationships");

        let data_sources = bind_data_sources(&tables, self.list_data_sources().await?);
        info!(count = data_sources.len(), "extracted data sources");

        let summary = match self.get_summary().await {
            Ok(summary) => Some(summary),
            Err(err) if matches!(err.kind(), ErrorKind::Tool | ErrorKind::Parse) => {
                warn!(error = %err, "model summary unavailable");
                None
            }
            Err(err) => return Err(err),
        };

        let name = name.map(str::to_string).unwrap_or_else(|| file_stem(path));
        let model = ModelBuilder::new(name)
            .tables(tables)
            .measures(measures)
            .relationships(relationships)
            .data_sources(data_sources)
            .size_bytes(summary.as_ref().and_then(|s| s.size_bytes))
            .file_path(file_path)
            .build()?;

        if let Some(summary) = &summary {
            cross_check(&model, summary);
        }
        info!(
            model = %model.name(),
            tables = model.tables().len(),
            measures = model.measures().len(),
            relationships = model.relationships().len(),
            "extraction complete"
        );
        Ok(model)
    }
}

/// Bind expressions named after a table to that table, and order them:
/// table queries in table order first, then the rest as received.
fn bind_data_sources(tables: &[Table], sources: Vec<DataSource>) -> Vec<DataSource> {
    let mut bound: Vec<(usize, DataSource)> = Vec::new();
    let mut shared = Vec::new();

    for source in sources {
        match tables.iter().position(|t| t.name == source.name) {
            Some(idx) => bound.push((idx, DataSource::for_table(source.name, source.expression))),
            None => shared.push(source),
        }
    }

    bound.sort_by_key(|(idx, _)| *idx);
    bound.into_iter().map(|(_, s)| s).chain(shared).collect()
}

fn cross_check(model: &ModelMetadata, summary: &ModelSummary) {
    let checks = [
        ("tables", summary.tables_count, model.tables().len()),
        ("measures", summary.measures_count, model.measures().len()),
        ("relationships", summary.relationships_count, model.relationships().len()),
    ];
    for (what, reported, extracted) in checks {
        if let Some(reported) = reported {
            if reported != extracted as u64 {
                warn!(what, reported, extracted, "summary count differs from extracted count");
            }
        }
    }
}

/// Absolute form of a model path, as handed to the tool server.
///
/// `std::path::absolute` keeps drive-letter paths on Windows, where
/// `canonicalize` would produce a `\\?\` verbatim path the server cannot open.
pub fn resolve_model_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    Ok(std::path::absolute(path).map_err(|e| ParseError::io(path, e))?)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ============================================================================
// PBIXRay implementation
// ============================================================================

/// [`MetadataSource`] backed by the PBIXRay tool server.
pub struct PbixRayProvider<C> {
    caller: C,
    tools: ToolNames,
}

impl<C: ToolCaller> PbixRayProvider<C> {
    /// Create a provider using the default tool names.
    pub fn new(caller: C) -> Self {
        Self::with_tools(caller, ToolNames::default())
    }

    pub fn with_tools(caller: C, tools: ToolNames) -> Self {
        Self { caller, tools }
    }

    pub fn tools(&self) -> &ToolNames {
        &self.tools
    }

    async fn call(&self, tool: &str, arguments: Value) -> Result<ToolPayload> {
        debug!(tool, %arguments, "calling tool");
        let result = self.caller.call_tool(tool, arguments).await?;
        Ok(ToolPayload::from_result(&result))
    }
}

#[async_trait]
impl<C: ToolCaller> MetadataSource for PbixRayProvider<C> {
    async fn load_model(&self, path: &Path) -> Result<String> {
        let path = resolve_model_path(path)?;

        let payload = self
            .call(&self.tools.load, json!({ "file_path": path.display().to_string() }))
            .await?;
        Ok(payload.summary())
    }

    async fn list_tables(&self) -> Result<Vec<Table>> {
        let payload = self.call(&self.tools.tables, json!({})).await?;
        Ok(decode::tables(&payload, &self.tools.tables)?)
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<Column>> {
        let payload = self
            .call(&self.tools.schema, json!({ "table_name": table }))
            .await?;
        Ok(decode::columns(&payload, &self.tools.schema, table)?)
    }

    async fn list_measures(&self) -> Result<Vec<Measure>> {
        let payload = self.call(&self.tools.measures, json!({})).await?;
        Ok(decode::measures(&payload, &self.tools.measures)?)
    }

    async fn list_relationships(&self) -> Result<Vec<Relationship>> {
        let payload = self.call(&self.tools.relationships, json!({})).await?;
        Ok(decode::relationships(&payload, &self.tools.relationships)?)
    }

    async fn list_data_sources(&self) -> Result<Vec<DataSource>> {
        let payload = self.call(&self.tools.data_sources, json!({})).await?;
        Ok(decode::data_sources(&payload, &self.tools.data_sources)?)
    }

    async fn get_summary(&self) -> Result<ModelSummary> {
        let payload = self.call(&self.tools.summary, json!({})).await?;
        Ok(decode::summary(&payload, &self.tools.summary)?)
    }
}
