use std::sync::Arc;

use anyhow::Result;

use crate::event::{EventKindSet, EventRecord};

/// Callback the host invokes with each extracted record.
///
/// The host is responsible for turning its opaque trace context into a
/// complete [`EventRecord`] (kind, timestamp, location, class, method, thread
/// identity); the recorder depends only on that extraction contract, not on
/// the host's object model.
pub type RecordSink = Arc<dyn Fn(EventRecord) + Send + Sync>;

/// Seam to the host instrumentation subsystem.
///
/// `attach` registers interest in a set of event kinds and hands over the
/// record callback; the host invokes the callback synchronously on whatever
/// thread triggers a matching event. The recorder attaches on enable and
/// detaches on disable so capture tracks its own lifecycle exactly.
pub trait Probe: Send + Sync {
    /// Begin delivering events of the given kinds to `sink`.
    fn attach(&mut self, kinds: EventKindSet, sink: RecordSink) -> Result<()>;

    /// Stop delivering events. No callback invocations may occur after this
    /// returns.
    fn detach(&mut self) -> Result<()>;
}

/// Probe for hosts that deliver records straight to [`crate::Recorder::record`],
/// and for tests. Attach and detach always succeed and register nothing.
#[derive(Debug, Default)]
pub struct NullProbe;

impl Probe for NullProbe {
    fn attach(&mut self, _kinds: EventKindSet, _sink: RecordSink) -> Result<()> {
        Ok(())
    }

    fn detach(&mut self) -> Result<()> {
        Ok(())
    }
}
