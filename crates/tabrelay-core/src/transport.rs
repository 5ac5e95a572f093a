//! The unit crossing the broker channel.
//!
//! Each unit carries a full schema snapshot alongside its row so a consumer
//! with no prior state can provision storage from the first unit it reads.

use crate::error::{Error, Result};
use crate::schema::{TableSchema, TypedRow};
use serde::{Deserialize, Serialize};

/// Serialized record traveling over the broker channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportUnit {
    /// Schema snapshot for consumer-side bootstrap
    pub schema: TableSchema,

    /// One typed row
    pub row: TypedRow,

    /// Emission time, epoch milliseconds
    pub emitted_at: i64,

    /// Source identifier
    pub provenance: String,
}

impl TransportUnit {
    /// Create a unit for one row.
    pub fn new(schema: TableSchema, row: TypedRow, emitted_at: i64, provenance: String) -> Self {
        Self {
            schema,
            row,
            emitted_at,
            provenance,
        }
    }

    /// Encode to the JSON wire form.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Error::from)
    }

    /// Decode from the JSON wire form.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CellValue, ColumnSchema, InferredType};

    fn sample_unit() -> TransportUnit {
        let schema = TableSchema::new(vec![
            ColumnSchema::varchar("name", 255),
            ColumnSchema::typed("age", InferredType::Int),
            ColumnSchema::typed("score", InferredType::Float),
        ]);
        let mut row = TypedRow::new();
        row.insert("name", CellValue::Text("John".into()));
        row.insert("age", CellValue::Int(30));
        row.insert("score", CellValue::Float(91.5));
        TransportUnit::new(schema, row, 1_700_000_000_000, "example-stats".into())
    }

    #[test]
    fn test_round_trip() {
        let unit = sample_unit();
        let bytes = unit.encode().unwrap();
        let back = TransportUnit::decode(&bytes).unwrap();
        assert_eq!(unit, back);
    }

    #[test]
    fn test_null_survives_wire() {
        let mut unit = sample_unit();
        unit.row.insert("age", CellValue::Null);
        let back = TransportUnit::decode(&unit.encode().unwrap()).unwrap();
        assert_eq!(back.row.get("age"), Some(&CellValue::Null));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(TransportUnit::decode(b"not json").is_err());
    }
}
