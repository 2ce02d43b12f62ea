//! Declarative statement shapes.
//!
//! A shape says which normalized statement prefix it recognizes, which entity
//! kind the statement writes, where each semantic field sits in the bound
//! parameters and where the row id comes from.

use std::sync::LazyLock;

use regex::Regex;
use todd_store::EntityKind;

use crate::error::{IndexError, Result};

/// Where a shape finds the id of the row it wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdRule {
    /// The generated row id reported by the execution result.
    InsertedRowId,
    /// A bound parameter at this position.
    Param(usize),
}

/// One recognizable mutating statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementShape {
    /// Normalized (lower-case, single spaced) statement prefix.
    pub prefix: &'static str,
    pub kind: EntityKind,
    /// Field name and parameter position.
    pub fields: &'static [(&'static str, usize)],
    pub id: IdRule,
}

const LOG_FIELDS: &[(&str, usize)] = &[("level", 0), ("message", 1), ("metadata", 2)];
const NODE_FIELDS: &[(&str, usize)] = &[("label", 0), ("properties", 1)];
const EDGE_FIELDS: &[(&str, usize)] = &[
    ("source_id", 0),
    ("target_id", 1),
    ("label", 2),
    ("properties", 3),
    ("directed", 4),
];

const STANDARD_SHAPES: &[StatementShape] = &[
    StatementShape {
        prefix: "insert into logs",
        kind: EntityKind::Log,
        fields: LOG_FIELDS,
        id: IdRule::InsertedRowId,
    },
    StatementShape {
        prefix: "update logs",
        kind: EntityKind::Log,
        fields: LOG_FIELDS,
        id: IdRule::Param(3),
    },
    StatementShape {
        prefix: "insert into nodes",
        kind: EntityKind::Node,
        fields: NODE_FIELDS,
        id: IdRule::InsertedRowId,
    },
    StatementShape {
        prefix: "update nodes",
        kind: EntityKind::Node,
        fields: NODE_FIELDS,
        id: IdRule::Param(2),
    },
    StatementShape {
        prefix: "insert into edges",
        kind: EntityKind::Edge,
        fields: EDGE_FIELDS,
        id: IdRule::InsertedRowId,
    },
    StatementShape {
        prefix: "update edges",
        kind: EntityKind::Edge,
        fields: EDGE_FIELDS,
        id: IdRule::Param(5),
    },
    StatementShape {
        prefix: "insert into kv",
        kind: EntityKind::KeyValue,
        fields: &[("key", 0), ("value", 1)],
        id: IdRule::Param(0),
    },
    StatementShape {
        prefix: "update kv",
        kind: EntityKind::KeyValue,
        fields: &[("value", 0), ("key", 1)],
        id: IdRule::Param(1),
    },
];

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\?(\d*)|\$(\d+)").expect("Invalid placeholder regex"));

impl StatementShape {
    /// Number of parameters the shape reads.
    pub fn arity(&self) -> usize {
        let id = match self.id {
            IdRule::Param(position) => position,
            IdRule::InsertedRowId => 0,
        };
        self.fields
            .iter()
            .map(|(_, position)| *position)
            .chain(std::iter::once(id))
            .max()
            .map_or(0, |highest| highest + 1)
    }

    /// Whether a normalized statement starts with this shape's prefix
    /// followed by a word boundary.
    pub fn matches(&self, normalized: &str) -> bool {
        normalized
            .strip_prefix(self.prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', '(']))
    }
}

/// The set of shapes the classifier recognizes.
#[derive(Debug, Clone)]
pub struct ShapeRegistry {
    shapes: Vec<StatementShape>,
}

impl Default for ShapeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ShapeRegistry {
    /// Shapes for the log, node, edge and kv tables.
    pub fn standard() -> Self {
        Self::new(STANDARD_SHAPES.to_vec())
    }

    pub fn new(shapes: Vec<StatementShape>) -> Self {
        Self { shapes }
    }

    pub fn shapes(&self) -> &[StatementShape] {
        &self.shapes
    }

    /// The shape recognizing a normalized statement, if any.
    pub fn find(&self, normalized: &str) -> Option<&StatementShape> {
        self.shapes.iter().find(|shape| shape.matches(normalized))
    }

    /// Check every statement against the registry.
    ///
    /// Each statement must match exactly one shape and bind exactly as many
    /// parameters as that shape reads.
    pub fn validate(&self, statements: &[&str]) -> Result<()> {
        for statement in statements {
            let normalized = crate::classifier::normalize_sql(statement);
            let matching: Vec<_> = self
                .shapes
                .iter()
                .filter(|shape| shape.matches(&normalized))
                .collect();

            let shape = match matching.as_slice() {
                [shape] => shape,
                [] => {
                    return Err(IndexError::Shape(format!(
                        "no shape recognizes statement: {}",
                        statement
                    )));
                }
                _ => {
                    return Err(IndexError::Shape(format!(
                        "{} shapes recognize statement: {}",
                        matching.len(),
                        statement
                    )));
                }
            };

            let bound = placeholder_count(statement);
            if bound != shape.arity() {
                return Err(IndexError::Shape(format!(
                    "shape '{}' reads {} parameters but statement binds {}: {}",
                    shape.prefix,
                    shape.arity(),
                    bound,
                    statement
                )));
            }
        }

        tracing::debug!(
            shapes = self.shapes.len(),
            statements = statements.len(),
            "Statement shapes validated"
        );
        Ok(())
    }
}

/// Number of parameters a statement binds, numbered the way SQLite numbers them.
///
/// A bare `?` takes the next index after the highest seen so far; `?N` and
/// `$N` use `N`.
pub fn placeholder_count(statement: &str) -> usize {
    let mut highest = 0;
    for caps in PLACEHOLDER.captures_iter(statement) {
        let explicit = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .filter(|digits| !digits.is_empty())
            .and_then(|digits| digits.parse::<usize>().ok());
        highest = match explicit {
            Some(index) => highest.max(index),
            None => highest + 1,
        };
    }
    highest
}
