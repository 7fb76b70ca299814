//! # pbimeta
//!
//! Ingests Power BI semantic-model metadata into one canonical model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐        ┌──────────────────────────────┐
//! │  .pbix file              │        │  .pbip / model.bim /         │
//! │                          │        │  definition/*.tmdl           │
//! └────────────┬─────────────┘        └──────────────┬───────────────┘
//!              │                                     │
//!              ▼ [mcp]                               │
//! ┌──────────────────────────┐                       │
//! │  JSON-RPC stdio client   │                       │
//! │  (tool server process)   │                       │
//! └────────────┬─────────────┘                       │
//!              ▼ [pbixray]                           ▼ [definition]
//! ┌──────────────────────────┐        ┌──────────────────────────────┐
//! │  tool adapter            │        │  BIM / TMDL parser           │
//! └────────────┬─────────────┘        └──────────────┬───────────────┘
//!              └──────────────────┬──────────────────┘
//!                                 ▼ [model]
//!                  ┌──────────────────────────────┐
//!                  │  ModelMetadata (validated)   │
//!                  └──────────────┬───────────────┘
//!                                 ▼ [dependency]
//!                  ┌──────────────────────────────┐
//!                  │  measure dependency graph    │
//!                  └──────────────────────────────┘
//! ```
//!
//! [`ingest::ingest`] runs the whole pipeline for one path.

pub mod config;
pub mod definition;
pub mod dependency;
pub mod error;
pub mod ingest;
pub mod mcp;
pub mod model;
pub mod pbixray;
pub mod slug;

pub use error::{Error, ErrorKind, ParseError, ParseResult, Result};
pub use model::ModelMetadata;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::definition::{detect_input, load_definition, InputKind};
    pub use crate::dependency::DependencyGraph;
    pub use crate::error::{Error, ErrorKind, ParseError, Result};
    pub use crate::ingest::{ingest, Ingested};
    pub use crate::mcp::{McpClient, ServerCommand, ToolCaller};
    pub use crate::model::{
        Cardinality, Column, CrossFilterDirection, DataSource, Measure, ModelBuilder,
        ModelMetadata, Relationship, Table,
    };
    pub use crate::pbixray::{MetadataSource, PbixRayProvider};
    pub use crate::slug::slugify;
}
