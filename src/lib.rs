//! flightrec is a low-overhead execution-event recorder. An instrumented host
//! feeds fixed-size trace events (method entry/exit, exception raise) into a
//! [`Recorder`], which buffers them in a mutex-guarded ring buffer and flushes
//! them to a writable sink from a background thread. Under overload the
//! recorder drops the oldest unflushed events rather than blocking the
//! producer; under sink failure it retries on the next flush tick.
//!
//! The producer path ([`Recorder::record`]) never performs I/O, never
//! allocates, and never fails visibly, so it is safe to call from any thread
//! that triggers an instrumented event.

pub mod config;
pub mod error;
pub mod event;
mod flush;
pub mod hook;
pub mod recorder;
pub mod ring;

pub use config::RecorderConfig;
pub use error::Error;
pub use event::{EventKind, EventKindSet, EventRecord, RECORD_SIZE};
pub use hook::{NullProbe, Probe, RecordSink};
pub use recorder::{Recorder, StatsSnapshot};
pub use ring::{RingBuffer, RingStats};
