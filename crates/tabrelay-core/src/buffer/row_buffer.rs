//! In-memory ordered row buffer scoped to one consumer instance.

use crate::kafka::PartitionOffset;
use crate::schema::TypedRow;
use parking_lot::Mutex;

/// Buffered rows plus the broker positions they were consumed from.
///
/// Owned per consumer instance as explicit instance state; multiple
/// instances in one process never share a buffer.
pub struct RowBuffer {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    rows: Vec<TypedRow>,
    offsets: Vec<PartitionOffset>,
}

impl RowBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Append a row and its consumed position. Returns the new length.
    pub fn append(&self, row: TypedRow, position: PartitionOffset) -> usize {
        let mut inner = self.inner.lock();
        inner.rows.push(row);
        inner.offsets.push(position);
        inner.rows.len()
    }

    /// Take the whole buffer contents, leaving it empty.
    pub fn take(&self) -> (Vec<TypedRow>, Vec<PartitionOffset>) {
        let mut inner = self.inner.lock();
        (
            std::mem::take(&mut inner.rows),
            std::mem::take(&mut inner.offsets),
        )
    }

    /// Put taken contents back at the front of the buffer, ahead of anything
    /// appended since the take. Returns the new length.
    pub fn restore(&self, rows: Vec<TypedRow>, offsets: Vec<PartitionOffset>) -> usize {
        let mut inner = self.inner.lock();
        inner.rows.splice(0..0, rows);
        inner.offsets.splice(0..0, offsets);
        inner.rows.len()
    }

    /// Current row count.
    pub fn len(&self) -> usize {
        self.inner.lock().rows.len()
    }

    /// Whether the buffer holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RowBuffer {
    fn default() -> Self {
        Self::new()
    }
}
