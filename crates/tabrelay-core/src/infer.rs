//! Type inference over extracted table text.
//!
//! Each non-null cell is classified independently; the column type is the
//! least upper bound of all observations under the [`InferredType`] order.
//! Because `join` is commutative, associative, and idempotent, the result
//! does not depend on the order rows are scanned in.

use crate::error::ParseError;
use crate::extract::ExtractedTable;
use crate::schema::{
    sanitize_headers, CellValue, ColumnSchema, InferredType, TableSchema, TypedRow, VARCHAR_FLOOR,
};
use regex::Regex;
use std::sync::LazyLock;

static INT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?\d+$").expect("static regex"));
static FLOAT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+\.\d+$").expect("static regex"));
static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static regex"));
static ISO_DATETIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(:\d{2})?$").expect("static regex")
});
static SLASH_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}[/-]\d{1,2}[/-]\d{2,4}$").expect("static regex"));

/// Values treated as NULL at conversion time.
pub fn is_null_sentinel(value: &str) -> bool {
    value.is_empty() || value == "-" || value.eq_ignore_ascii_case("n/a")
}

/// Grouping separators are removed only for numeric checks.
fn strip_grouping(value: &str) -> String {
    value.replace(',', "")
}

/// Classify one cleaned, non-null cell value.
pub fn classify(value: &str) -> InferredType {
    if value.eq_ignore_ascii_case("true")
        || value.eq_ignore_ascii_case("false")
        || value.eq_ignore_ascii_case("yes")
        || value.eq_ignore_ascii_case("no")
    {
        return InferredType::Boolean;
    }

    let numeric = strip_grouping(value);
    if INT_RE.is_match(&numeric) {
        // Digit runs too long for i64 fall through to the string types.
        if let Ok(n) = numeric.parse::<i64>() {
            return if i32::try_from(n).is_ok() {
                InferredType::Int
            } else {
                InferredType::BigInt
            };
        }
    } else if FLOAT_RE.is_match(&numeric) {
        return InferredType::Float;
    }

    if ISO_DATE_RE.is_match(value) || SLASH_DATE_RE.is_match(value) {
        return InferredType::Date;
    }
    if ISO_DATETIME_RE.is_match(value) {
        return InferredType::Timestamp;
    }

    if value.chars().count() > 255 {
        InferredType::Text
    } else {
        InferredType::Varchar
    }
}

/// Infer the merged type and observed max length for one column of values.
///
/// Returns `None` for a column with no non-null values.
fn infer_column<'a>(values: impl Iterator<Item = &'a str>) -> Option<(InferredType, u32)> {
    let mut merged: Option<InferredType> = None;
    let mut max_len: u32 = 0;

    for value in values {
        if is_null_sentinel(value) {
            continue;
        }
        let observed = classify(value);
        merged = Some(match merged {
            Some(current) => current.join(observed),
            None => observed,
        });
        max_len = max_len.max(value.chars().count() as u32);
    }

    merged.map(|t| (t, max_len))
}

/// Derive a typed schema from an extracted table.
///
/// Columns with no non-null values default to `VARCHAR(255)`; VARCHAR
/// lengths are the observed maximum, floored at 255.
pub fn infer_schema(table: &ExtractedTable) -> TableSchema {
    let names = sanitize_headers(&table.headers);

    let columns = names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let column_values = table
                .rows
                .iter()
                .map(move |row| row.get(idx).map_or("", String::as_str));
            match infer_column(column_values) {
                Some((InferredType::Varchar, max_len)) => {
                    ColumnSchema::varchar(name, max_len.max(VARCHAR_FLOOR))
                }
                Some((column_type, _)) => ColumnSchema::typed(name, column_type),
                None => ColumnSchema::varchar(name, VARCHAR_FLOOR),
            }
        })
        .collect();

    TableSchema::new(columns)
}

/// Convert one raw cell per the column's resolved type.
///
/// Reapplies the null-sentinel check first. Date/time and string types are
/// carried through as normalized strings; their storage representation is
/// sink-defined.
pub fn convert_value(raw: &str, column: &ColumnSchema) -> Result<CellValue, ParseError> {
    if is_null_sentinel(raw) {
        return Ok(CellValue::Null);
    }

    match column.column_type {
        InferredType::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" => Ok(CellValue::Bool(true)),
            "false" | "no" => Ok(CellValue::Bool(false)),
            other => Err(ParseError::Conversion {
                column: column.name.clone(),
                message: format!("not a boolean: '{}'", other),
            }),
        },
        InferredType::Int | InferredType::BigInt => strip_grouping(raw)
            .parse::<i64>()
            .map(CellValue::Int)
            .map_err(|e| ParseError::Conversion {
                column: column.name.clone(),
                message: format!("not an integer: '{}' ({})", raw, e),
            }),
        InferredType::Float => strip_grouping(raw)
            .parse::<f64>()
            .map(CellValue::Float)
            .map_err(|e| ParseError::Conversion {
                column: column.name.clone(),
                message: format!("not a float: '{}' ({})", raw, e),
            }),
        InferredType::Date
        | InferredType::Timestamp
        | InferredType::Varchar
        | InferredType::Text => Ok(CellValue::Text(raw.to_string())),
    }
}

/// Convert all extracted rows into typed rows under the inferred schema.
pub fn convert_rows(
    table: &ExtractedTable,
    schema: &TableSchema,
) -> Result<Vec<TypedRow>, ParseError> {
    table
        .rows
        .iter()
        .map(|raw_row| {
            let mut row = TypedRow::new();
            for (raw, column) in raw_row.iter().zip(&schema.columns) {
                row.insert(column.name.clone(), convert_value(raw, column)?);
            }
            Ok(row)
        })
        .collect()
}
