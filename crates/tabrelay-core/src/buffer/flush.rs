//! Consumer flush state machine.
//!
//! States: `AwaitingSchema -> Buffering <-> Flushing`, with `Draining`
//! entered only on shutdown and terminating in `Stopped`.
//!
//! Two independent triggers request flushes: the size check evaluated
//! synchronously after each append, and a wall-clock interval timer running
//! on its own schedule. A single-flight guard (atomic compare-exchange)
//! ensures at most one flush executes per instance; a trigger firing while
//! a flush is in progress is dropped, and the now-larger buffer is captured
//! by the next invocation.

use crate::buffer::RowBuffer;
use crate::error::{Error, Result};
use crate::kafka::{OffsetAck, ReceivedUnit};
use crate::schema::TableSchema;
use crate::sink::RowSink;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle state of one consumer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// No unit observed yet in this session
    AwaitingSchema,
    /// Accepting units into the buffer
    Buffering,
    /// A flush is handing buffered rows to the sink
    Flushing,
    /// Shutdown requested; no new units accepted
    Draining,
    /// Resources released
    Stopped,
}

/// What requested a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// Buffer length reached the configured threshold
    Size,
    /// The periodic wall-clock timer fired
    Interval,
    /// A unit arrived with a schema differing from the session's
    SchemaDrift,
    /// Shutdown drain
    Drain,
}

/// Result of a flush request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Rows were written and their offsets acknowledged
    Flushed(usize),
    /// Nothing buffered; the sink was not invoked
    EmptyBuffer,
    /// Another flush was in progress; this trigger was dropped
    SkippedInFlight,
}

/// Buffering and flush orchestration for one consumer instance.
///
/// The buffer, cached schema, and state are instance fields, never global.
pub struct FlushController {
    sink: Arc<dyn RowSink>,
    ack: Arc<dyn OffsetAck>,
    batch_size: usize,
    buffer: RowBuffer,
    session_schema: Mutex<Option<TableSchema>>,
    state: Mutex<RelayState>,
    in_flight: AtomicBool,
}

impl FlushController {
    /// Create a controller in `AwaitingSchema`.
    pub fn new(sink: Arc<dyn RowSink>, ack: Arc<dyn OffsetAck>, batch_size: usize) -> Self {
        Self {
            sink,
            ack,
            batch_size,
            buffer: RowBuffer::new(),
            session_schema: Mutex::new(None),
            state: Mutex::new(RelayState::AwaitingSchema),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RelayState {
        *self.state.lock()
    }

    /// Rows currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Process one received unit.
    ///
    /// The first unit provisions the sink from its embedded schema; later
    /// units with a different schema start a new session (old buffer flushed
    /// first, sink re-provisioned). The size trigger is evaluated
    /// synchronously right after the append; its outcome, if any, is
    /// returned to the caller.
    pub async fn handle_unit(&self, received: ReceivedUnit) -> Result<Option<FlushOutcome>> {
        match self.state() {
            RelayState::Draining | RelayState::Stopped => return Err(Error::Shutdown),
            RelayState::AwaitingSchema => {
                self.sink.provision(&received.unit.schema).await?;
                *self.session_schema.lock() = Some(received.unit.schema.clone());
                *self.state.lock() = RelayState::Buffering;
                info!(
                    columns = received.unit.schema.len(),
                    provenance = %received.unit.provenance,
                    "Session schema provisioned"
                );
            }
            RelayState::Buffering | RelayState::Flushing => {
                let drifted = self
                    .session_schema
                    .lock()
                    .as_ref()
                    .is_some_and(|cached| *cached != received.unit.schema);
                if drifted {
                    self.start_new_session(&received.unit.schema).await?;
                }
            }
        }

        let len = self.buffer.append(received.unit.row, received.position);

        if len >= self.batch_size {
            let outcome = self.try_flush(FlushTrigger::Size).await?;
            return Ok(Some(outcome));
        }

        Ok(None)
    }

    /// Request a flush, dropping the trigger if one is already in flight.
    pub async fn try_flush(&self, trigger: FlushTrigger) -> Result<FlushOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            debug!(?trigger, "Flush already in flight, dropping trigger");
            return Ok(FlushOutcome::SkippedInFlight);
        }

        let result = self.flush_guarded(trigger).await;
        self.in_flight.store(false, Ordering::Release);
        result
    }

    /// Drain on shutdown: stop accepting units, flush whatever is buffered
    /// exactly once, and transition to `Stopped`.
    ///
    /// Waits out any in-flight flush instead of dropping the request; no
    /// buffered row may be silently lost.
    pub async fn drain(&self) -> Result<usize> {
        *self.state.lock() = RelayState::Draining;

        self.acquire_guard().await;
        let result = self.flush_guarded(FlushTrigger::Drain).await;
        self.in_flight.store(false, Ordering::Release);

        *self.state.lock() = RelayState::Stopped;

        match result? {
            FlushOutcome::Flushed(n) => {
                info!(rows = n, "Drain complete");
                Ok(n)
            }
            _ => {
                info!("Drain complete, buffer was empty");
                Ok(0)
            }
        }
    }

    /// Schema drift: flush the old session's rows, then provision the sink
    /// for the new schema.
    async fn start_new_session(&self, schema: &TableSchema) -> Result<()> {
        warn!("Schema drift detected, starting new session");

        self.acquire_guard().await;
        let flushed = self.flush_guarded(FlushTrigger::SchemaDrift).await;
        self.in_flight.store(false, Ordering::Release);
        flushed?;

        self.sink.provision(schema).await?;
        *self.session_schema.lock() = Some(schema.clone());
        Ok(())
    }

    /// Spin until the single-flight guard is acquired. Used by the paths
    /// that must flush (drain, drift) rather than drop on contention.
    async fn acquire_guard(&self) {
        while self
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// The flush body. Caller must hold the single-flight guard.
    async fn flush_guarded(&self, trigger: FlushTrigger) -> Result<FlushOutcome> {
        let (rows, offsets) = self.buffer.take();
        if rows.is_empty() {
            return Ok(FlushOutcome::EmptyBuffer);
        }

        {
            let mut state = self.state.lock();
            if *state == RelayState::Buffering {
                *state = RelayState::Flushing;
            }
        }

        let count = rows.len();
        let result = async {
            let written = self.sink.write_batch(&rows).await?;
            self.ack.ack(&offsets).await?;
            Ok::<u64, Error>(written)
        }
        .await;

        {
            let mut state = self.state.lock();
            if *state == RelayState::Flushing {
                *state = RelayState::Buffering;
            }
        }

        match result {
            Ok(written) => {
                info!(?trigger, rows = written, "Flush complete");
                Ok(FlushOutcome::Flushed(count))
            }
            Err(e) => {
                // Terminal for this flush only: the rows return to the front
                // of the buffer for the next flush attempt, and their offsets
                // stay uncommitted.
                self.buffer.restore(rows, offsets);
                warn!(?trigger, error = %e, "Flush failed, rows returned to buffer");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::PartitionOffset;
    use crate::schema::{CellValue, ColumnSchema, InferredType, TypedRow};
    use crate::transport::TransportUnit;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct MockSink {
        batches: Mutex<Vec<Vec<TypedRow>>>,
        provisions: AtomicUsize,
        fail_writes: AtomicBool,
    }

    impl MockSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(Vec::new()),
                provisions: AtomicUsize::new(0),
                fail_writes: AtomicBool::new(false),
            })
        }

        fn total_rows(&self) -> usize {
            self.batches.lock().iter().map(Vec::len).sum()
        }
    }

    #[async_trait]
    impl RowSink for MockSink {
        async fn provision(&self, _schema: &TableSchema) -> Result<()> {
            self.provisions.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn write_batch(&self, rows: &[TypedRow]) -> Result<u64> {
            assert!(!rows.is_empty(), "sink must never see zero rows");
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::Storage(crate::error::StorageError::WriteFailed {
                    table: "t".into(),
                    message: "injected".into(),
                }));
            }
            self.batches.lock().push(rows.to_vec());
            Ok(rows.len() as u64)
        }
    }

    struct MockAck {
        acked: Mutex<Vec<PartitionOffset>>,
    }

    impl MockAck {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                acked: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl OffsetAck for MockAck {
        async fn ack(&self, offsets: &[PartitionOffset]) -> Result<()> {
            self.acked.lock().extend_from_slice(offsets);
            Ok(())
        }
    }

    fn schema() -> TableSchema {
        TableSchema::new(vec![ColumnSchema::typed("n", InferredType::Int)])
    }

    fn other_schema() -> TableSchema {
        TableSchema::new(vec![ColumnSchema::varchar("s", 255)])
    }

    fn unit(n: i64, offset: i64, schema: TableSchema) -> ReceivedUnit {
        let mut row = TypedRow::new();
        row.insert("n", CellValue::Int(n));
        ReceivedUnit {
            unit: TransportUnit::new(schema, row, 1_700_000_000_000, "test".into()),
            position: PartitionOffset::new("topic", 0, offset),
        }
    }

    fn controller(
        sink: Arc<MockSink>,
        ack: Arc<MockAck>,
        batch_size: usize,
    ) -> FlushController {
        FlushController::new(sink, ack, batch_size)
    }

    #[tokio::test]
    async fn test_first_unit_provisions_and_buffers() {
        let (sink, ack) = (MockSink::new(), MockAck::new());
        let ctl = controller(sink.clone(), ack, 100);
        assert_eq!(ctl.state(), RelayState::AwaitingSchema);

        ctl.handle_unit(unit(1, 0, schema())).await.unwrap();

        assert_eq!(ctl.state(), RelayState::Buffering);
        assert_eq!(ctl.buffered(), 1);
        assert_eq!(sink.provisions.load(Ordering::SeqCst), 1);
        assert!(sink.batches.lock().is_empty());
    }

    #[tokio::test]
    async fn test_size_trigger_fires_at_threshold() {
        let (sink, ack) = (MockSink::new(), MockAck::new());
        let ctl = controller(sink.clone(), ack.clone(), 3);

        for i in 0..3 {
            ctl.handle_unit(unit(i, i, schema())).await.unwrap();
        }

        assert_eq!(sink.batches.lock().len(), 1);
        assert_eq!(sink.total_rows(), 3);
        assert_eq!(ctl.buffered(), 0);
        assert_eq!(ack.acked.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_below_threshold_only_interval_flushes() {
        let (sink, ack) = (MockSink::new(), MockAck::new());
        let ctl = controller(sink.clone(), ack, 100);

        for i in 0..5 {
            ctl.handle_unit(unit(i, i, schema())).await.unwrap();
        }
        // Size trigger never fired
        assert!(sink.batches.lock().is_empty());

        let outcome = ctl.try_flush(FlushTrigger::Interval).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Flushed(5));
        assert_eq!(sink.total_rows(), 5);
    }

    #[tokio::test]
    async fn test_empty_flush_is_noop() {
        let (sink, ack) = (MockSink::new(), MockAck::new());
        let ctl = controller(sink.clone(), ack, 100);

        let outcome = ctl.try_flush(FlushTrigger::Interval).await.unwrap();
        assert_eq!(outcome, FlushOutcome::EmptyBuffer);
        assert!(sink.batches.lock().is_empty());
    }

    #[tokio::test]
    async fn test_contending_trigger_is_dropped() {
        let (sink, ack) = (MockSink::new(), MockAck::new());
        let ctl = controller(sink.clone(), ack, 100);
        ctl.handle_unit(unit(1, 0, schema())).await.unwrap();

        // Simulate a flush already in progress
        ctl.in_flight.store(true, Ordering::SeqCst);
        let outcome = ctl.try_flush(FlushTrigger::Interval).await.unwrap();
        assert_eq!(outcome, FlushOutcome::SkippedInFlight);
        assert!(sink.batches.lock().is_empty());

        // Once released, the next invocation captures the buffer
        ctl.in_flight.store(false, Ordering::SeqCst);
        let outcome = ctl.try_flush(FlushTrigger::Interval).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Flushed(1));
    }

    #[tokio::test]
    async fn test_drain_flushes_remainder_once() {
        let (sink, ack) = (MockSink::new(), MockAck::new());
        let ctl = controller(sink.clone(), ack, 100);

        for i in 0..37 {
            ctl.handle_unit(unit(i, i, schema())).await.unwrap();
        }

        let drained = ctl.drain().await.unwrap();
        assert_eq!(drained, 37);
        assert_eq!(sink.batches.lock().len(), 1);
        assert_eq!(sink.batches.lock()[0].len(), 37);
        assert_eq!(ctl.state(), RelayState::Stopped);

        // No new units after drain
        let err = ctl.handle_unit(unit(99, 99, schema())).await.unwrap_err();
        assert!(matches!(err, Error::Shutdown));
    }

    #[tokio::test]
    async fn test_drain_with_empty_buffer() {
        let (sink, ack) = (MockSink::new(), MockAck::new());
        let ctl = controller(sink.clone(), ack, 100);
        ctl.handle_unit(unit(1, 0, schema())).await.unwrap();
        ctl.try_flush(FlushTrigger::Interval).await.unwrap();

        let drained = ctl.drain().await.unwrap();
        assert_eq!(drained, 0);
        assert_eq!(sink.batches.lock().len(), 1);
        assert_eq!(ctl.state(), RelayState::Stopped);
    }

    #[tokio::test]
    async fn test_schema_drift_starts_new_session() {
        let (sink, ack) = (MockSink::new(), MockAck::new());
        let ctl = controller(sink.clone(), ack, 100);

        ctl.handle_unit(unit(1, 0, schema())).await.unwrap();
        ctl.handle_unit(unit(2, 1, schema())).await.unwrap();

        // Drifted unit: old rows flushed first, sink re-provisioned
        let mut row = TypedRow::new();
        row.insert("s", CellValue::Text("x".into()));
        let drifted = ReceivedUnit {
            unit: TransportUnit::new(other_schema(), row, 1, "test".into()),
            position: PartitionOffset::new("topic", 0, 2),
        };
        ctl.handle_unit(drifted).await.unwrap();

        assert_eq!(sink.provisions.load(Ordering::SeqCst), 2);
        assert_eq!(sink.batches.lock().len(), 1);
        assert_eq!(sink.batches.lock()[0].len(), 2);
        assert_eq!(ctl.buffered(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_propagates_and_skips_ack() {
        let (sink, ack) = (MockSink::new(), MockAck::new());
        let ctl = controller(sink.clone(), ack.clone(), 100);
        ctl.handle_unit(unit(1, 0, schema())).await.unwrap();

        sink.fail_writes.store(true, Ordering::SeqCst);
        let err = ctl.try_flush(FlushTrigger::Interval).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(ack.acked.lock().is_empty());
        // Rows stay buffered and the guard is released despite the failure
        assert_eq!(ctl.buffered(), 1);
        assert!(!ctl.in_flight.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failed_flush_rows_survive_until_next_flush() {
        let (sink, ack) = (MockSink::new(), MockAck::new());
        let ctl = controller(sink.clone(), ack.clone(), 100);
        ctl.handle_unit(unit(1, 0, schema())).await.unwrap();
        ctl.handle_unit(unit(2, 1, schema())).await.unwrap();

        sink.fail_writes.store(true, Ordering::SeqCst);
        ctl.try_flush(FlushTrigger::Interval).await.unwrap_err();
        assert_eq!(ctl.buffered(), 2);
        assert!(ack.acked.lock().is_empty());

        // A later unit plus a healthy sink: everything flushes in order, so
        // the eventual commit never skips past unwritten rows.
        sink.fail_writes.store(false, Ordering::SeqCst);
        ctl.handle_unit(unit(3, 2, schema())).await.unwrap();
        let outcome = ctl.try_flush(FlushTrigger::Interval).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Flushed(3));

        assert_eq!(sink.total_rows(), 3);
        let batch = &sink.batches.lock()[0];
        assert_eq!(batch[0].get("n"), Some(&CellValue::Int(1)));
        assert_eq!(batch[2].get("n"), Some(&CellValue::Int(3)));

        let acked = ack.acked.lock();
        assert_eq!(acked.len(), 3);
        assert_eq!(acked[0], PartitionOffset::new("topic", 0, 0));
        assert_eq!(acked[2], PartitionOffset::new("topic", 0, 2));
    }

    #[tokio::test]
    async fn test_offsets_acked_after_successful_flush() {
        let (sink, ack) = (MockSink::new(), MockAck::new());
        let ctl = controller(sink, ack.clone(), 2);

        ctl.handle_unit(unit(1, 10, schema())).await.unwrap();
        ctl.handle_unit(unit(2, 11, schema())).await.unwrap();

        let acked = ack.acked.lock();
        assert_eq!(acked.len(), 2);
        assert_eq!(acked[1], PartitionOffset::new("topic", 0, 11));
    }
}
