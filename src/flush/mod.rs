use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::Error;
use crate::recorder::RecorderStats;
use crate::ring::RingBuffer;

/// Shared boxed sink. The flush thread is the only writer while recording is
/// enabled; the mutex exists so the recorder can hand the sink to successive
/// flush threads across enable/disable cycles.
pub(crate) type SharedSink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Wakes the flush thread out of its timed wait.
///
/// `disable()` notifies this so shutdown does not pay the full interval
/// latency. The wake is latched under the mutex: a notify that lands before
/// the consumer reaches its wait is consumed by that wait rather than lost.
/// Spurious wakeups only cause an extra harmless drain.
pub(crate) struct FlushSignal {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl FlushSignal {
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn notify(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.cond.notify_all();
    }

    fn wait_timeout(&self, timeout: Duration) {
        let mut pending = self.pending.lock();
        if !*pending {
            self.cond.wait_for(&mut pending, timeout);
        }
        *pending = false;
    }
}

/// Handle to the background flush thread, spawned at enable and joined at
/// disable.
pub(crate) struct FlushThread {
    handle: JoinHandle<()>,
}

impl FlushThread {
    /// Spawn the flush loop. A spawn failure is surfaced to the caller so the
    /// recorder can stay disabled instead of buffering with no consumer.
    pub(crate) fn spawn(
        ring: Arc<RingBuffer>,
        sink: SharedSink,
        enabled: Arc<AtomicBool>,
        signal: Arc<FlushSignal>,
        stats: Arc<RecorderStats>,
        interval: Duration,
    ) -> Result<Self, Error> {
        let handle = std::thread::Builder::new()
            .name("flightrec-flush".to_string())
            .spawn(move || run(&ring, &sink, &enabled, &signal, &stats, interval))
            .map_err(Error::Spawn)?;

        Ok(Self { handle })
    }

    /// Block until the thread has exited, including its final drain.
    pub(crate) fn join(self) -> Result<(), Error> {
        self.handle.join().map_err(|_| Error::FlushThreadPanicked)
    }
}

/// The flush loop: drain, check the enabled flag, wait for a tick or a wake,
/// repeat. After the flag drops, one last drain runs so nothing written
/// before disable is stranded.
fn run(
    ring: &RingBuffer,
    sink: &SharedSink,
    enabled: &AtomicBool,
    signal: &FlushSignal,
    stats: &RecorderStats,
    interval: Duration,
) {
    debug!(interval_ms = interval.as_millis() as u64, "flush loop started");

    loop {
        drain_once(ring, sink, stats);

        if !enabled.load(Ordering::Acquire) {
            break;
        }

        signal.wait_timeout(interval);
    }

    // Final drain: flush whatever arrived before the flag dropped.
    drain_once(ring, sink, stats);
    debug!("flush loop stopped");
}

/// One drain attempt. A sink failure is transient: it is logged and counted,
/// the cursors stay put, and the same bytes are retried on the next tick.
fn drain_once(ring: &RingBuffer, sink: &SharedSink, stats: &RecorderStats) {
    let mut sink = sink.lock();
    match ring.drain(sink.as_mut()) {
        Ok(n) => {
            if n > 0 {
                stats.add_bytes_flushed(n as u64);
            }
        }
        Err(e) => {
            stats.incr_drain_errors();
            warn!(error = %e, "drain failed, will retry on next tick");
        }
    }
}
