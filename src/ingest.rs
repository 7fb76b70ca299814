//! Ingestion sessions.
//!
//! One call turns a user-supplied path into a [`ModelMetadata`] plus its
//! [`DependencyGraph`]:
//!
//! ```text
//! path ──detect_input──┬── .pbix ──► McpClient ──► PbixRayProvider ──┐
//!                      └── bim / tmdl ──► definition parser ─────────┴─► ModelMetadata
//!                                                                           │
//!                                                                DependencyGraph::build
//! ```
//!
//! The tool server is started only for `.pbix` inputs and is always shut
//! down before the session returns.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{info, warn};

use crate::config::Settings;
use crate::definition::{self, InputKind};
use crate::dependency::DependencyGraph;
use crate::error::Result;
use crate::mcp::{McpClient, ToolDescriptor};
use crate::model::ModelMetadata;
use crate::pbixray::{MetadataSource, PbixRayProvider};

/// Output of one ingestion session.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub input: InputKind,
    pub model: ModelMetadata,
    pub dependencies: DependencyGraph,
}

/// Ingest `path`, naming the model `name` (or the input's default name).
pub async fn ingest(path: &Path, name: Option<&str>, settings: &Settings) -> Result<Ingested> {
    let input = definition::detect_input(path)?;
    info!(input = %input, "ingesting model");

    let model = match &input {
        InputKind::Pbix(file) => extract_pbix(file, name, settings).await?,
        kind => definition::parse_definition(kind, name)?,
    };
    let dependencies = DependencyGraph::build(&model);

    Ok(Ingested {
        input,
        model,
        dependencies,
    })
}

/// Extract a `.pbix` file through the configured tool server.
pub async fn extract_pbix(
    path: &Path,
    name: Option<&str>,
    settings: &Settings,
) -> Result<ModelMetadata> {
    let command = settings.server.server_command()?;
    let options = settings.server.client_options()?;
    info!(%command, "starting tool server");

    let tools = settings.tools.clone();
    let path = path.to_path_buf();
    let name = name.map(str::to_string);

    McpClient::spawn(command, options)
        .scoped(move |client| {
            Box::pin(async move {
                let available = client.list_tools().await?;
                let names: BTreeSet<&str> = available.iter().map(|t| t.name.as_str()).collect();
                for tool in tools.all() {
                    if !names.contains(tool) {
                        warn!(tool, "configured tool not advertised by server");
                    }
                }

                let provider = PbixRayProvider::with_tools(client, tools);
                provider.extract_model(&path, name.as_deref()).await
            })
        })
        .await
}

/// Start the tool server only to list what it offers.
pub async fn list_server_tools(settings: &Settings) -> Result<Vec<ToolDescriptor>> {
    let command = settings.server.server_command()?;
    let options = settings.server.client_options()?;

    McpClient::spawn(command, options)
        .scoped(|client| Box::pin(async move { Ok(client.list_tools().await?) }))
        .await
}
