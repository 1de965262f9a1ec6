use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info};

use crate::config::RecorderConfig;
use crate::error::Error;
use crate::event::{EventKindSet, EventRecord};
use crate::flush::{FlushSignal, FlushThread, SharedSink};
use crate::hook::{Probe, RecordSink};
use crate::ring::{RingBuffer, RingStats};

/// Lock-free counters fed by the producer path and the flush thread.
pub struct RecorderStats {
    events_recorded: AtomicU64,
    events_lost: AtomicU64,
    bytes_flushed: AtomicU64,
    drain_errors: AtomicU64,
}

/// Point-in-time copy of the recorder counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    /// Events accepted into the ring buffer.
    pub events_recorded: u64,
    /// Events dropped by the overload policy before they could be flushed.
    pub events_lost: u64,
    /// Bytes successfully written to the sink.
    pub bytes_flushed: u64,
    /// Transient sink failures observed by the flush thread.
    pub drain_errors: u64,
}

impl RecorderStats {
    pub(crate) fn new() -> Self {
        Self {
            events_recorded: AtomicU64::new(0),
            events_lost: AtomicU64::new(0),
            bytes_flushed: AtomicU64::new(0),
            drain_errors: AtomicU64::new(0),
        }
    }

    pub(crate) fn add_bytes_flushed(&self, n: u64) {
        self.bytes_flushed.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn incr_drain_errors(&self) {
        self.drain_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_recorded: self.events_recorded.load(Ordering::Relaxed),
            events_lost: self.events_lost.load(Ordering::Relaxed),
            bytes_flushed: self.bytes_flushed.load(Ordering::Relaxed),
            drain_errors: self.drain_errors.load(Ordering::Relaxed),
        }
    }
}

/// The producer path shared by [`Recorder::record`] and the probe callback.
///
/// Infallible by contract: a disabled recorder drops the event, an overloaded
/// buffer drops old data, and neither is reported to the producer.
fn record_event(
    ring: &RingBuffer,
    enabled: &AtomicBool,
    stats: &RecorderStats,
    record: &EventRecord,
) {
    if !enabled.load(Ordering::Acquire) {
        return;
    }

    let lost = ring.write(record);
    stats.events_recorded.fetch_add(1, Ordering::Relaxed);
    if lost > 0 {
        stats.events_lost.fetch_add(lost as u64, Ordering::Relaxed);
    }
}

/// Owns the ring buffer, the output sink, and the flush thread's lifecycle,
/// and mediates between the host instrumentation probe (producer side) and
/// the flush thread (consumer side).
///
/// Created disabled. `enable`/`disable` are idempotent; `record` may be
/// called from any number of threads concurrently and never blocks on I/O.
/// Dropping an enabled recorder forces a disable first so no producer can
/// touch the buffer after its memory is released.
pub struct Recorder {
    ring: Arc<RingBuffer>,
    sink: SharedSink,
    probe: Box<dyn Probe>,
    kinds: EventKindSet,
    flush_interval: Duration,
    enabled: Arc<AtomicBool>,
    signal: Arc<FlushSignal>,
    stats: Arc<RecorderStats>,
    flush: Option<FlushThread>,
}

impl Recorder {
    /// Create a disabled recorder writing to `sink`.
    ///
    /// The sink must already be open; the recorder never opens or closes it.
    pub fn new(
        sink: Box<dyn Write + Send>,
        probe: Box<dyn Probe>,
        config: RecorderConfig,
    ) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            ring: Arc::new(RingBuffer::new(config.buffer_capacity)?),
            sink: Arc::new(Mutex::new(sink)),
            probe,
            kinds: config.kind_set(),
            flush_interval: config.flush_interval,
            enabled: Arc::new(AtomicBool::new(false)),
            signal: Arc::new(FlushSignal::new()),
            stats: Arc::new(RecorderStats::new()),
            flush: None,
        })
    }

    /// Create a recorder writing to a duplicate of `file`'s descriptor, so
    /// the original owner closing its handle does not invalidate the sink.
    pub fn from_file(
        file: &File,
        probe: Box<dyn Probe>,
        config: RecorderConfig,
    ) -> Result<Self, Error> {
        let dup = file.try_clone().map_err(Error::Sink)?;
        Self::new(Box::new(dup), probe, config)
    }

    /// Begin capture: spawn the flush thread, then attach the probe.
    ///
    /// No-op when already enabled. On failure the recorder is left disabled
    /// with no background thread running.
    pub fn enable(&mut self) -> Result<(), Error> {
        if self.enabled.load(Ordering::Acquire) {
            return Ok(());
        }

        self.enabled.store(true, Ordering::Release);

        let thread = match FlushThread::spawn(
            Arc::clone(&self.ring),
            Arc::clone(&self.sink),
            Arc::clone(&self.enabled),
            Arc::clone(&self.signal),
            Arc::clone(&self.stats),
            self.flush_interval,
        ) {
            Ok(thread) => thread,
            Err(e) => {
                self.enabled.store(false, Ordering::Release);
                return Err(e);
            }
        };
        self.flush = Some(thread);

        let ring = Arc::clone(&self.ring);
        let enabled = Arc::clone(&self.enabled);
        let stats = Arc::clone(&self.stats);
        let sink: RecordSink = Arc::new(move |record| {
            record_event(&ring, &enabled, &stats, &record);
        });

        if let Err(e) = self.probe.attach(self.kinds, sink) {
            // Unwind: stop the thread we just started before reporting.
            self.enabled.store(false, Ordering::Release);
            self.signal.notify();
            if let Some(thread) = self.flush.take() {
                thread.join()?;
            }
            return Err(Error::Probe(e));
        }

        info!(
            capacity_bytes = self.ring.capacity(),
            flush_interval_ms = self.flush_interval.as_millis() as u64,
            "recording enabled",
        );

        Ok(())
    }

    /// Stop capture: flip the flag, wake and join the flush thread (which
    /// performs a final drain), then detach the probe.
    ///
    /// No-op when already disabled. After this returns, no further bytes
    /// reach the sink and no event can be recorded.
    pub fn disable(&mut self) -> Result<(), Error> {
        if !self.enabled.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        self.signal.notify();
        if let Some(thread) = self.flush.take() {
            thread.join()?;
        }

        self.probe.detach().map_err(Error::Probe)?;

        info!("recording disabled");

        Ok(())
    }

    /// Whether capture is currently enabled. Lock-free; safe to call
    /// concurrently with `enable`/`disable`.
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Accept one event from a producer thread.
    ///
    /// Bounded to a mutex acquisition plus a fixed-size copy; never blocks on
    /// I/O, never allocates, never fails. Dropped silently when disabled.
    pub fn record(&self, record: &EventRecord) {
        record_event(&self.ring, &self.enabled, &self.stats, record);
    }

    /// Current counter values.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Current ring buffer usage.
    pub fn ring_stats(&self) -> RingStats {
        self.ring.stats()
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Err(e) = self.disable() {
            error!(error = %e, "failed to disable recorder during drop");
        }
    }
}
