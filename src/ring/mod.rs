use std::io::Write;

use parking_lot::Mutex;

use crate::error::Error;
use crate::event::{EventRecord, RECORD_SIZE};

/// Ring buffer usage statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct RingStats {
    /// Bytes written but not yet drained to the sink.
    pub used_bytes: usize,
    /// Total capacity in bytes.
    pub capacity_bytes: usize,
}

/// Cursor state and backing storage, only ever touched under the mutex.
struct RingState {
    buf: Box<[u8]>,
    /// Next write position.
    write_pos: usize,
    /// Start of the unflushed region.
    flush_pos: usize,
    /// Bytes in the unflushed region. Disambiguates empty from full when
    /// `flush_pos == write_pos`.
    unflushed: usize,
    /// Bumped on every overload reset, so a drain whose sink write ran
    /// outside the lock can tell its snapshot was invalidated.
    resets: u64,
}

/// Fixed-capacity circular byte store for whole event records.
///
/// One mutex guards the cursors and backing bytes; the producer-side
/// critical section is a bounded memcopy with no I/O and no allocation.
/// `drain` copies the outgoing segment aside and releases that mutex before
/// touching the sink, so a slow or hung sink stalls only the consumer. A
/// second, consumer-side mutex serializes concurrent drains.
///
/// Overload policy: when a write would overwrite unflushed bytes, the entire
/// unflushed region is declared lost before the record is copied in. Newest
/// data always wins; the producer never sees an error.
pub struct RingBuffer {
    state: Mutex<RingState>,
    /// Consumer-side lock: serializes drains and holds the segment copy so
    /// sink I/O happens with the cursor mutex released.
    scratch: Mutex<Vec<u8>>,
    capacity: usize,
}

impl RingBuffer {
    /// Allocate a buffer of `capacity` bytes.
    ///
    /// Rejects capacities that are zero or not a multiple of the record size,
    /// so wrap-around can never split a record.
    pub fn new(capacity: usize) -> Result<Self, Error> {
        if capacity == 0 || capacity % RECORD_SIZE != 0 {
            return Err(Error::InvalidConfig(format!(
                "ring capacity must be a positive multiple of {RECORD_SIZE}, got {capacity}",
            )));
        }

        Ok(Self {
            state: Mutex::new(RingState {
                buf: vec![0u8; capacity].into_boxed_slice(),
                write_pos: 0,
                flush_pos: 0,
                unflushed: 0,
                resets: 0,
            }),
            scratch: Mutex::new(Vec::new()),
            capacity,
        })
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy one record into the buffer.
    ///
    /// Returns the number of records declared lost to make room (0 in the
    /// common case). Never blocks on I/O and never fails.
    pub fn write(&self, record: &EventRecord) -> usize {
        let bytes = record.encode();
        let mut s = self.state.lock();

        let mut lost = 0;
        if s.unflushed + RECORD_SIZE > self.capacity {
            // The consumer has fallen behind; drop the whole backlog rather
            // than overwrite it silently.
            lost = s.unflushed / RECORD_SIZE;
            let wp = s.write_pos;
            s.flush_pos = wp;
            s.unflushed = 0;
            s.resets += 1;
        }

        let pos = s.write_pos;
        s.buf[pos..pos + RECORD_SIZE].copy_from_slice(&bytes);
        s.write_pos = (pos + RECORD_SIZE) % self.capacity;
        s.unflushed += RECORD_SIZE;

        lost
    }

    /// Write the unflushed region out to `sink`, at most one contiguous
    /// segment per call.
    ///
    /// When the region wraps past the end of the buffer only the tail is
    /// written; the head is picked up by the next call. On sink failure the
    /// cursors are left untouched so the same bytes are retried later.
    ///
    /// The segment is copied aside and the cursor mutex released before the
    /// sink call, so producers are never blocked on I/O. If an overload
    /// reset lands while the sink call is in flight, the cursors are left
    /// where the reset put them (the drained bytes were already declared
    /// lost). Returns the number of bytes written.
    pub fn drain(&self, sink: &mut dyn Write) -> std::io::Result<usize> {
        let mut scratch = self.scratch.lock();

        let (start, len, resets) = {
            let s = self.state.lock();
            if s.unflushed == 0 {
                return Ok(0);
            }

            let start = s.flush_pos;
            let len = s.unflushed.min(self.capacity - start);
            scratch.clear();
            scratch.extend_from_slice(&s.buf[start..start + len]);
            (start, len, s.resets)
        };

        sink.write_all(&scratch)?;

        let mut s = self.state.lock();
        if s.resets == resets {
            s.flush_pos = (start + len) % self.capacity;
            s.unflushed -= len;
        }

        Ok(len)
    }

    /// Current usage snapshot.
    pub fn stats(&self) -> RingStats {
        let s = self.state.lock();
        RingStats {
            used_bytes: s.unflushed,
            capacity_bytes: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn record(method_id: u32) -> EventRecord {
        EventRecord {
            kind: EventKind::Call,
            timestamp_ns: 1_000,
            thread_id: 7,
            path_id: 1,
            line: 10,
            class_id: 2,
            method_id,
        }
    }

    fn decode_all(bytes: &[u8]) -> Vec<EventRecord> {
        assert_eq!(bytes.len() % RECORD_SIZE, 0, "partial record in sink");
        bytes
            .chunks(RECORD_SIZE)
            .map(|c| EventRecord::decode(c).expect("valid record"))
            .collect()
    }

    #[test]
    fn test_new_rejects_misaligned_capacity() {
        assert!(RingBuffer::new(0).is_err());
        assert!(RingBuffer::new(RECORD_SIZE + 1).is_err());
        assert!(RingBuffer::new(RECORD_SIZE * 4).is_ok());
    }

    #[test]
    fn test_write_then_drain() {
        let ring = RingBuffer::new(RECORD_SIZE * 8).expect("valid capacity");

        for i in 0..3 {
            assert_eq!(ring.write(&record(i)), 0);
        }
        assert_eq!(ring.stats().used_bytes, 3 * RECORD_SIZE);

        let mut sink = Vec::new();
        let n = ring.drain(&mut sink).expect("drain succeeds");
        assert_eq!(n, 3 * RECORD_SIZE);

        let records = decode_all(&sink);
        assert_eq!(records.len(), 3);
        for (i, r) in records.iter().enumerate() {
            assert_eq!(r.method_id, i as u32);
        }
    }

    #[test]
    fn test_drain_idempotent_without_new_writes() {
        let ring = RingBuffer::new(RECORD_SIZE * 4).expect("valid capacity");
        ring.write(&record(1));

        let mut sink = Vec::new();
        assert!(ring.drain(&mut sink).expect("drain") > 0);
        assert_eq!(ring.drain(&mut sink).expect("drain"), 0);
        assert_eq!(ring.drain(&mut sink).expect("drain"), 0);
        assert_eq!(sink.len(), RECORD_SIZE);
    }

    #[test]
    fn test_wrapped_region_drains_in_two_segments() {
        let capacity = RECORD_SIZE * 4;
        let ring = RingBuffer::new(capacity).expect("valid capacity");

        // Fill three, drain, then write three more so the region wraps:
        // flush_pos = 3 * RECORD_SIZE, write_pos = 2 * RECORD_SIZE.
        for i in 0..3 {
            ring.write(&record(i));
        }
        let mut sink = Vec::new();
        ring.drain(&mut sink).expect("drain");
        sink.clear();

        for i in 3..6 {
            assert_eq!(ring.write(&record(i)), 0);
        }

        // First drain services only the contiguous tail.
        let n1 = ring.drain(&mut sink).expect("drain");
        assert_eq!(n1, RECORD_SIZE);
        assert!(n1 <= capacity);

        // Second drain picks up the head.
        let n2 = ring.drain(&mut sink).expect("drain");
        assert_eq!(n2, 2 * RECORD_SIZE);

        let records = decode_all(&sink);
        let ids: Vec<u32> = records.iter().map(|r| r.method_id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[test]
    fn test_overwrite_drops_oldest_backlog() {
        let ring = RingBuffer::new(RECORD_SIZE * 4).expect("valid capacity");

        // Fill the buffer, then keep writing with no drain.
        for i in 0..4 {
            assert_eq!(ring.write(&record(i)), 0);
        }
        assert_eq!(ring.write(&record(4)), 4); // whole backlog declared lost
        assert_eq!(ring.write(&record(5)), 0);

        let mut sink = Vec::new();
        while ring.drain(&mut sink).expect("drain") > 0 {}

        let ids: Vec<u32> = decode_all(&sink).iter().map(|r| r.method_id).collect();
        assert_eq!(ids, vec![4, 5], "only records after the reset survive");
    }

    #[test]
    fn test_failed_drain_retries_same_bytes() {
        struct FailingSink {
            failures_left: u32,
            out: Vec<u8>,
        }

        impl Write for FailingSink {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                if self.failures_left > 0 {
                    self.failures_left -= 1;
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "sink down",
                    ));
                }
                self.out.extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let ring = RingBuffer::new(RECORD_SIZE * 4).expect("valid capacity");
        ring.write(&record(9));

        let mut sink = FailingSink {
            failures_left: 2,
            out: Vec::new(),
        };

        assert!(ring.drain(&mut sink).is_err());
        assert!(ring.drain(&mut sink).is_err());
        assert_eq!(ring.stats().used_bytes, RECORD_SIZE, "cursor not advanced");

        let n = ring.drain(&mut sink).expect("third attempt succeeds");
        assert_eq!(n, RECORD_SIZE);
        assert_eq!(decode_all(&sink.out)[0].method_id, 9);
    }

    /// Sink that parks inside `write` until the test opens its gate, and
    /// reports entry so the test knows the consumer is mid-I/O.
    struct GatedSink {
        entered: std::sync::mpsc::Sender<()>,
        gate: std::sync::mpsc::Receiver<()>,
        out: Vec<u8>,
    }

    impl Write for GatedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.entered.send(()).expect("test alive");
            self.gate.recv().expect("gate opened");
            self.out.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_proceeds_while_drain_blocked_on_sink() {
        use std::sync::mpsc;
        use std::sync::Arc;

        let ring = Arc::new(RingBuffer::new(RECORD_SIZE * 4).expect("valid capacity"));
        ring.write(&record(0));

        let (entered_tx, entered_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel();
        let drain_ring = Arc::clone(&ring);
        let consumer = std::thread::spawn(move || {
            let mut sink = GatedSink {
                entered: entered_tx,
                gate: gate_rx,
                out: Vec::new(),
            };
            let n = drain_ring.drain(&mut sink).expect("drain");
            (n, sink.out)
        });

        // Wait until the consumer is parked inside the sink write. The
        // producer must then complete without waiting for the sink; if it
        // shared the I/O critical section this write would hang here.
        entered_rx.recv().expect("consumer entered sink");
        assert_eq!(ring.write(&record(1)), 0);
        assert_eq!(ring.stats().used_bytes, 2 * RECORD_SIZE);

        gate_tx.send(()).expect("consumer alive");
        let (n, out) = consumer.join().expect("consumer");
        assert_eq!(n, RECORD_SIZE);
        assert_eq!(decode_all(&out)[0].method_id, 0);

        // The record written mid-drain is still pending.
        let mut sink = Vec::new();
        ring.drain(&mut sink).expect("drain");
        assert_eq!(decode_all(&sink)[0].method_id, 1);
    }

    #[test]
    fn test_overload_reset_during_inflight_drain_keeps_cursors_consistent() {
        use std::sync::mpsc;
        use std::sync::Arc;

        let ring = Arc::new(RingBuffer::new(RECORD_SIZE * 4).expect("valid capacity"));
        ring.write(&record(0));

        let (entered_tx, entered_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel();
        let drain_ring = Arc::clone(&ring);
        let consumer = std::thread::spawn(move || {
            let mut sink = GatedSink {
                entered: entered_tx,
                gate: gate_rx,
                out: Vec::new(),
            };
            let n = drain_ring.drain(&mut sink).expect("drain");
            (n, sink.out)
        });
        entered_rx.recv().expect("consumer entered sink");

        // Overfill while the consumer is mid-I/O, forcing an overload reset
        // that invalidates the in-flight snapshot.
        for i in 1..=3 {
            assert_eq!(ring.write(&record(i)), 0);
        }
        assert_eq!(ring.write(&record(4)), 4);
        assert_eq!(ring.write(&record(5)), 0);

        gate_tx.send(()).expect("consumer alive");
        let (n, out) = consumer.join().expect("consumer");

        // The snapshot was delivered, but the reset already repositioned the
        // cursors; the drain must not rewind them.
        assert_eq!(n, RECORD_SIZE);
        assert_eq!(decode_all(&out)[0].method_id, 0);

        let mut sink = Vec::new();
        while ring.drain(&mut sink).expect("drain") > 0 {}
        let ids: Vec<u32> = decode_all(&sink).iter().map(|r| r.method_id).collect();
        assert_eq!(ids, vec![4, 5]);
        assert_eq!(ring.stats().used_bytes, 0);
    }

    #[test]
    fn test_stats_track_usage() {
        let ring = RingBuffer::new(RECORD_SIZE * 2).expect("valid capacity");
        assert_eq!(ring.stats().used_bytes, 0);
        assert_eq!(ring.stats().capacity_bytes, RECORD_SIZE * 2);

        ring.write(&record(0));
        assert_eq!(ring.stats().used_bytes, RECORD_SIZE);

        let mut sink = Vec::new();
        ring.drain(&mut sink).expect("drain");
        assert_eq!(ring.stats().used_bytes, 0);
    }
}
