//! Tool adapter for the PBIXRay extractor.
//!
//! Bridges the protocol client's untyped tool results into typed model
//! fragments:
//!
//! - [`fields`]: ordered candidate-key lookup for inconsistently-cased records
//! - [`literal`]: restricted parser for list-literal text payloads
//! - [`decode`]: one pure decoder per capability
//! - [`provider`]: the [`MetadataSource`] trait and [`PbixRayProvider`]

pub mod decode;
pub mod fields;
pub mod literal;
pub mod provider;

pub use decode::{ModelSummary, ToolPayload};
pub use literal::{parse_literal, parse_string_list, Literal};
pub use provider::{MetadataSource, PbixRayProvider};
