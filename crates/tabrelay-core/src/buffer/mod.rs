//! Consumer-side buffering and the flush state machine.

pub mod flush;
pub mod row_buffer;

pub use flush::{FlushController, FlushOutcome, FlushTrigger, RelayState};
pub use row_buffer::RowBuffer;
