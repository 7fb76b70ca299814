// src/model/relationship.rs
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// A declared join between two table/column pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub cardinality: Cardinality,
    pub cross_filter_direction: CrossFilterDirection,
    pub is_active: bool,
}

impl Relationship {
    /// A many-to-one, single-direction, active relationship.
    pub fn new(
        from_table: impl Into<String>,
        from_column: impl Into<String>,
        to_table: impl Into<String>,
        to_column: impl Into<String>,
    ) -> Self {
        Self {
            from_table: from_table.into(),
            from_column: from_column.into(),
            to_table: to_table.into(),
            to_column: to_column.into(),
            cardinality: Cardinality::ManyToOne,
            cross_filter_direction: CrossFilterDirection::Single,
            is_active: true,
        }
    }

    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    pub fn with_cross_filter(mut self, direction: CrossFilterDirection) -> Self {
        self.cross_filter_direction = direction;
        self
    }

    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    /// `Table.Column → Table.Column` label used in diagnostics.
    pub fn label(&self) -> String {
        format!(
            "{}.{} → {}.{}",
            self.from_table, self.from_column, self.to_table, self.to_column
        )
    }
}

/// One side of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipEnd {
    One,
    Many,
}

impl RelationshipEnd {
    /// Parse `one`/`many`, their short forms, or TOM numeric codes (1 = one, 2 = many).
    pub fn parse(value: &str, context: &str) -> ParseResult<Self> {
        match normalize(value).as_str() {
            "one" | "1" => Ok(RelationshipEnd::One),
            "many" | "m" | "n" | "*" | "2" => Ok(RelationshipEnd::Many),
            _ => Err(ParseError::UnknownEnumValue {
                kind: "relationship cardinality",
                value: value.to_string(),
                context: context.to_string(),
            }),
        }
    }
}

/// Multiplicity of a relationship's two sides, read from → to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Cardinality {
    /// Combine the two relationship ends.
    pub fn from_ends(from: RelationshipEnd, to: RelationshipEnd) -> Self {
        match (from, to) {
            (RelationshipEnd::One, RelationshipEnd::One) => Cardinality::OneToOne,
            (RelationshipEnd::One, RelationshipEnd::Many) => Cardinality::OneToMany,
            (RelationshipEnd::Many, RelationshipEnd::One) => Cardinality::ManyToOne,
            (RelationshipEnd::Many, RelationshipEnd::Many) => Cardinality::ManyToMany,
        }
    }

    /// Parse a single cardinality token such as `M:1`, `manyToOne` or `many-to-one`.
    pub fn parse(value: &str, context: &str) -> ParseResult<Self> {
        let token = normalize(value);
        if let Some((from, to)) = token.split_once(':') {
            let from = RelationshipEnd::parse(from, context)?;
            let to = RelationshipEnd::parse(to, context)?;
            return Ok(Self::from_ends(from, to));
        }
        match token.as_str() {
            "onetoone" => Ok(Cardinality::OneToOne),
            "onetomany" => Ok(Cardinality::OneToMany),
            "manytoone" => Ok(Cardinality::ManyToOne),
            "manytomany" => Ok(Cardinality::ManyToMany),
            _ => Err(ParseError::UnknownEnumValue {
                kind: "relationship cardinality",
                value: value.to_string(),
                context: context.to_string(),
            }),
        }
    }

    /// Swap the two sides.
    pub fn reverse(self) -> Self {
        match self {
            Cardinality::OneToMany => Cardinality::ManyToOne,
            Cardinality::ManyToOne => Cardinality::OneToMany,
            Cardinality::OneToOne => Cardinality::OneToOne,
            Cardinality::ManyToMany => Cardinality::ManyToMany,
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::OneToOne => write!(f, "one-to-one"),
            Cardinality::OneToMany => write!(f, "one-to-many"),
            Cardinality::ManyToOne => write!(f, "many-to-one"),
            Cardinality::ManyToMany => write!(f, "many-to-many"),
        }
    }
}

/// Whether filters propagate one way or both ways across a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrossFilterDirection {
    Single,
    Both,
}

impl CrossFilterDirection {
    /// Parse TMDL/TOM spellings and numeric codes.
    ///
    /// `automatic` (TOM code 3) resolves to single direction.
    pub fn parse(value: &str, context: &str) -> ParseResult<Self> {
        match normalize(value).as_str() {
            "single" | "one" | "onedirection" | "automatic" | "1" | "3" => {
                Ok(CrossFilterDirection::Single)
            }
            "both" | "bothdirections" | "2" => Ok(CrossFilterDirection::Both),
            _ => Err(ParseError::UnknownEnumValue {
                kind: "cross-filter direction",
                value: value.to_string(),
                context: context.to_string(),
            }),
        }
    }
}

impl fmt::Display for CrossFilterDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrossFilterDirection::Single => write!(f, "single"),
            CrossFilterDirection::Both => write!(f, "both"),
        }
    }
}

fn normalize(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}
