//! Declarative project-definition inputs.
//!
//! Two formats are parsed without any subprocess:
//!
//! - [`bim`]: a single `model.bim` JSON document
//! - [`tmdl`]: a `definition/` folder of indentation-based `.tmdl` files
//!
//! [`detect_input`] classifies a user-supplied path (including `.pbix` files,
//! which go through the tool adapter instead) and [`parse_definition`] runs
//! the matching parser. Both parsers produce identical models for
//! equivalent inputs: same ordering, same defaults, same expression cleanup.

pub mod bim;
pub mod tmdl;

use std::fmt;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{Error, ParseError, ParseResult, Result};
use crate::model::ModelMetadata;

/// File name of the single-document format.
pub const BIM_FILE: &str = "model.bim";
/// Folder name of the multi-file format.
pub const DEFINITION_DIR: &str = "definition";

const MODEL_DIR_SUFFIXES: &[&str] = &[".SemanticModel", ".Dataset"];

// ============================================================================
// Input detection
// ============================================================================

/// What a user-supplied path turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    /// A binary model file, read through the extraction tool.
    Pbix(PathBuf),
    /// A `model.bim` document inside `model_dir`.
    Bim { file: PathBuf, model_dir: PathBuf },
    /// A `definition/` folder inside `model_dir`.
    Tmdl { definition: PathBuf, model_dir: PathBuf },
}

impl InputKind {
    /// Short format label for logs and the CLI.
    pub fn format(&self) -> &'static str {
        match self {
            InputKind::Pbix(_) => "pbix",
            InputKind::Bim { .. } => "bim",
            InputKind::Tmdl { .. } => "tmdl",
        }
    }

    /// Default display name for the model this input describes.
    pub fn display_name(&self) -> String {
        match self {
            InputKind::Pbix(path) => file_stem(path),
            InputKind::Bim { model_dir, .. } | InputKind::Tmdl { model_dir, .. } => {
                display_name(model_dir)
            }
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::Pbix(path) => write!(f, "pbix file {}", path.display()),
            InputKind::Bim { file, .. } => write!(f, "bim document {}", file.display()),
            InputKind::Tmdl { definition, .. } => {
                write!(f, "tmdl folder {}", definition.display())
            }
        }
    }
}

/// Classify `path`.
///
/// Tried in order:
///
/// 1. `.pbix` file
/// 2. `.pbip` project file: its sibling semantic-model directory
/// 3. `model.bim` (or any `.bim` file) itself
/// 4. directory containing `model.bim`
/// 5. directory containing `definition/`
/// 6. a `definition/` directory itself
/// 7. directory containing a `*.SemanticModel` / `*.Dataset` directory
pub fn detect_input(path: &Path) -> Result<InputKind> {
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }

    if path.is_file() {
        return match extension(path).as_deref() {
            Some("pbix") => Ok(InputKind::Pbix(path.to_path_buf())),
            Some("pbip") => {
                let model_dir = project_model_dir(path).ok_or_else(|| unrecognized(path))?;
                debug!(project = %path.display(), model_dir = %model_dir.display(), "resolved project file");
                model_dir_input(&model_dir).ok_or_else(|| unrecognized(path))
            }
            Some("bim") => Ok(InputKind::Bim {
                file: path.to_path_buf(),
                model_dir: parent_dir(path),
            }),
            _ => Err(unrecognized(path)),
        };
    }

    if let Some(kind) = model_dir_input(path) {
        return Ok(kind);
    }

    let is_definition = path.file_name().is_some_and(|n| n == DEFINITION_DIR);
    if is_definition && has_tmdl_files(path) {
        return Ok(InputKind::Tmdl {
            definition: path.to_path_buf(),
            model_dir: parent_dir(path),
        });
    }

    if let Some(model_dir) = find_model_dir(path) {
        if let Some(kind) = model_dir_input(&model_dir) {
            return Ok(kind);
        }
    }

    Err(unrecognized(path))
}

/// `model.bim` wins over `definition/` when a directory has both.
fn model_dir_input(dir: &Path) -> Option<InputKind> {
    let bim = dir.join(BIM_FILE);
    if bim.is_file() {
        return Some(InputKind::Bim {
            file: bim,
            model_dir: dir.to_path_buf(),
        });
    }
    let definition = dir.join(DEFINITION_DIR);
    if definition.is_dir() {
        return Some(InputKind::Tmdl {
            definition,
            model_dir: dir.to_path_buf(),
        });
    }
    None
}

/// `Sales.pbip` → `Sales.SemanticModel`, else the first model directory beside it.
fn project_model_dir(project: &Path) -> Option<PathBuf> {
    let parent = parent_dir(project);
    let stem = project.file_stem()?.to_string_lossy();
    MODEL_DIR_SUFFIXES
        .iter()
        .map(|suffix| parent.join(format!("{stem}{suffix}")))
        .find(|dir| dir.is_dir())
        .or_else(|| find_model_dir(&parent))
}

fn find_model_dir(dir: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir() && model_dir_suffix(p).is_some())
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

fn model_dir_suffix(dir: &Path) -> Option<&'static str> {
    let name = dir.file_name()?.to_string_lossy();
    MODEL_DIR_SUFFIXES
        .iter()
        .copied()
        .find(|suffix| name.len() > suffix.len() && name.ends_with(suffix))
}

fn has_tmdl_files(dir: &Path) -> bool {
    let in_dir = |d: &Path| {
        std::fs::read_dir(d).is_ok_and(|entries| {
            entries
                .filter_map(|e| e.ok())
                .any(|e| extension(&e.path()).as_deref() == Some("tmdl"))
        })
    };
    in_dir(dir) || in_dir(&dir.join("tables"))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn unrecognized(path: &Path) -> Error {
    ParseError::UnrecognizedInput {
        path: path.to_path_buf(),
    }
    .into()
}

/// Display name for a semantic-model directory: its name without the
/// `.SemanticModel` / `.Dataset` suffix.
pub fn display_name(model_dir: &Path) -> String {
    let dir = if model_dir == Path::new(".") {
        model_dir.canonicalize().unwrap_or_else(|_| model_dir.to_path_buf())
    } else {
        model_dir.to_path_buf()
    };
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string());
    match model_dir_suffix(&dir) {
        Some(suffix) => name[..name.len() - suffix.len()].to_string(),
        None => name,
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Detect and parse a definition input. `.pbix` paths are rejected; use
/// [`crate::ingest`] for those.
pub fn load_definition(path: &Path, name: Option<&str>) -> Result<ModelMetadata> {
    match detect_input(path)? {
        InputKind::Pbix(_) => Err(unrecognized(path)),
        kind => Ok(parse_definition(&kind, name)?),
    }
}

/// Parse an already-detected definition input.
pub fn parse_definition(kind: &InputKind, name: Option<&str>) -> ParseResult<ModelMetadata> {
    let name = name
        .map(str::to_string)
        .unwrap_or_else(|| kind.display_name());
    match kind {
        InputKind::Bim { file, .. } => bim::parse_file(file, &name),
        InputKind::Tmdl { definition, .. } => tmdl::parse_folder(definition, &name),
        InputKind::Pbix(path) => Err(ParseError::UnrecognizedInput { path: path.clone() }),
    }
}

// ============================================================================
// Shared text helpers
// ============================================================================

/// Read a UTF-8 file, dropping a leading byte-order mark.
pub(crate) fn read_text(path: &Path) -> ParseResult<String> {
    let text = std::fs::read_to_string(path).map_err(|e| ParseError::io(path, e))?;
    Ok(match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    })
}

/// Normalize expression text so both formats agree: drop blank leading and
/// trailing lines, remove the indentation common to all non-blank lines,
/// and trim trailing whitespace from each line.
pub fn clean_expression(text: &str) -> String {
    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let Some(first) = lines.iter().position(|l| !l.is_empty()) else {
        return String::new();
    };
    let last = lines.iter().rposition(|l| !l.is_empty()).unwrap_or(first);
    let body = &lines[first..=last];

    let prefix = body
        .iter()
        .filter(|l| !l.is_empty())
        .map(|l| &l[..l.len() - l.trim_start().len()])
        .reduce(common_prefix)
        .unwrap_or("");

    body.iter()
        .map(|l| l.strip_prefix(prefix).unwrap_or(l))
        .collect::<Vec<_>>()
        .join("\n")
}

fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let len = a
        .char_indices()
        .zip(b.chars())
        .take_while(|((_, x), y)| x == y)
        .last()
        .map(|((idx, c), _)| idx + c.len_utf8())
        .unwrap_or(0);
    &a[..len]
}

static META_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^(.*?)\s+meta\s*\[.*\]\s*$").expect("valid regex"));

/// Drop a trailing `meta [...]` record from an M expression.
pub(crate) fn strip_meta(text: &str) -> String {
    match META_SUFFIX.captures(text) {
        Some(caps) => caps[1].to_string(),
        None => text.to_string(),
    }
}
