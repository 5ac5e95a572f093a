//! Relational data model shared by the producer and consumer sides.
//!
//! `InferredType` forms a total order; merging two observations takes the
//! higher-ranked type, which makes column inference independent of row order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Maximum sanitized identifier length (MySQL identifier limit).
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Default VARCHAR length floor.
pub const VARCHAR_FLOOR: u32 = 255;

/// Column type derived from observed cell values.
///
/// The declaration order is the merge order: `join(a, b)` is simply the
/// greater of the two, so the derived `Ord` is load-bearing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum InferredType {
    Boolean,
    Date,
    Timestamp,
    Int,
    BigInt,
    Float,
    Varchar,
    Text,
}

impl InferredType {
    /// Least-upper-bound merge of two type observations.
    ///
    /// Commutative, associative, and idempotent.
    pub fn join(self, other: InferredType) -> InferredType {
        self.max(other)
    }

    /// All type values in merge order, for exhaustive property tests.
    pub fn all() -> [InferredType; 8] {
        [
            InferredType::Boolean,
            InferredType::Date,
            InferredType::Timestamp,
            InferredType::Int,
            InferredType::BigInt,
            InferredType::Float,
            InferredType::Varchar,
            InferredType::Text,
        ]
    }
}

/// A single column of an inferred schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Sanitized identifier
    pub name: String,

    /// Merged column type
    #[serde(rename = "type")]
    pub column_type: InferredType,

    /// Bounded string length, present only for VARCHAR columns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
}

impl ColumnSchema {
    /// A VARCHAR column with the given length bound.
    pub fn varchar(name: impl Into<String>, max_length: u32) -> Self {
        Self {
            name: name.into(),
            column_type: InferredType::Varchar,
            max_length: Some(max_length),
        }
    }

    /// A column of any non-VARCHAR type.
    pub fn typed(name: impl Into<String>, column_type: InferredType) -> Self {
        Self {
            name: name.into(),
            column_type,
            max_length: None,
        }
    }
}

/// Ordered column schemas for one extracted table.
///
/// Column order matches header order; names are unique within the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Columns in header order
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Create a schema from ordered columns.
    pub fn new(columns: Vec<ColumnSchema>) -> Self {
        Self { columns }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// A typed cell value.
///
/// Date/time values are carried as normalized strings; their storage
/// representation is decided by the sink's DDL mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// Whether this value is the null marker.
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

/// One typed row: column name -> typed value, one entry per schema column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TypedRow {
    /// Values keyed by sanitized column name
    pub values: BTreeMap<String, CellValue>,
}

impl TypedRow {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value for a column.
    pub fn insert(&mut self, column: impl Into<String>, value: CellValue) {
        self.values.insert(column.into(), value);
    }

    /// Get a value by column name.
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.values.get(column)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Sanitize a raw header into a storage identifier.
///
/// Lower-cases, collapses whitespace runs to a single underscore, strips
/// characters outside `[a-z0-9_]`, prefixes a leading digit with `col_`,
/// and truncates to [`MAX_IDENTIFIER_LEN`].
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_space = false;

    for ch in raw.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space && !out.is_empty() {
                out.push('_');
            }
            last_was_space = true;
            continue;
        }
        last_was_space = false;
        for lower in ch.to_lowercase() {
            if lower.is_ascii_lowercase() || lower.is_ascii_digit() || lower == '_' {
                out.push(lower);
            }
        }
    }

    // Collapsing may leave a trailing underscore when the tail was stripped
    while out.ends_with('_') {
        out.pop();
    }

    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert_str(0, "col_");
    }

    out.truncate(MAX_IDENTIFIER_LEN);
    out
}

/// Sanitize headers into unique identifiers, preserving order.
///
/// Empty results fall back to positional `column_<n>` names; collisions get
/// a numeric suffix so the schema invariant of unique names holds.
pub fn sanitize_headers(headers: &[String]) -> Vec<String> {
    let mut used: BTreeSet<String> = BTreeSet::new();
    let mut out = Vec::with_capacity(headers.len());

    for (idx, raw) in headers.iter().enumerate() {
        let mut name = sanitize_identifier(raw);
        if name.is_empty() {
            name = format!("column_{}", idx + 1);
        }

        // The suffix must survive the length cap, so the base is trimmed to
        // make room before appending it.
        let mut candidate = name.clone();
        let mut n = 1u32;
        while used.contains(&candidate) {
            n += 1;
            let suffix = format!("_{}", n);
            let mut base = name.clone();
            base.truncate(MAX_IDENTIFIER_LEN - suffix.len());
            candidate = format!("{}{}", base, suffix);
        }

        used.insert(candidate.clone());
        out.push(candidate);
    }

    out
}
