// src/model/measure.rs
use serde::{Deserialize, Serialize};

/// A named formula attached to a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    pub name: String,
    /// Owning table name
    pub table: String,
    /// Formula text, verbatim
    pub expression: String,
    /// Display format string; empty when not declared
    pub format_string: String,
    pub is_hidden: bool,
    pub description: String,
    pub display_folder: String,
}

impl Measure {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: String::new(),
            expression: expression.into(),
            format_string: String::new(),
            is_hidden: false,
            description: String::new(),
            display_folder: String::new(),
        }
    }

    /// Set the owning table (used when measures arrive as a flat list).
    pub fn in_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_format_string(mut self, format_string: impl Into<String>) -> Self {
        self.format_string = format_string.into();
        self
    }

    pub fn hidden(mut self, is_hidden: bool) -> Self {
        self.is_hidden = is_hidden;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_display_folder(mut self, display_folder: impl Into<String>) -> Self {
        self.display_folder = display_folder.into();
        self
    }
}
