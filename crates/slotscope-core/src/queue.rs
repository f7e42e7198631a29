//! Bounded FIFO queue of capture records.
//!
//! Producers are the session's request/websocket handlers (driven by
//! the proxy engine's tasks); the single consumer is the drain loop.
//! One mutex guards all length accounting so the capacity invariant
//! holds under concurrent access.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::event::ResponseEvent;
use crate::record::CaptureRecord;

/// Outcome of attempting to correlate a response with the queue tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The response was attached to the most recently enqueued record.
    Attached,
    /// The queue held no records; the response is an orphan.
    QueueEmpty,
    /// The most recent record already carries a response.
    AlreadyPaired,
}

/// Bounded ordered queue of [`CaptureRecord`]s.
///
/// On overflow the oldest record is evicted; the eviction is counted
/// and logged, never silent.
pub struct CaptureQueue {
    records: Mutex<VecDeque<CaptureRecord>>,
    capacity: usize,
    evictions: AtomicU64,
}

impl CaptureQueue {
    /// Creates a queue holding at most `capacity` records.
    ///
    /// Panics if `capacity` is zero; the session validates the
    /// configured depth before constructing the queue.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            evictions: AtomicU64::new(0),
        }
    }

    /// Enqueues a record, evicting and returning the oldest one if the
    /// queue is full.
    pub fn push(&self, record: CaptureRecord) -> Option<CaptureRecord> {
        let mut records = self.records.lock();
        let evicted = if records.len() == self.capacity {
            records.pop_front()
        } else {
            None
        };
        records.push_back(record);
        drop(records);

        if let Some(old) = &evicted {
            let total = self.evictions.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(
                session_id = %old.session_id,
                timestamp = %old.timestamp,
                total_evictions = total,
                "capture queue full, evicted oldest record"
            );
        }
        evicted
    }

    /// Attaches a response to the most recently enqueued record.
    ///
    /// Responses pair with the latest in-flight request. This
    /// misattributes when requests are pipelined concurrently; see
    /// DESIGN.md.
    pub fn attach_response(&self, response: ResponseEvent) -> AttachOutcome {
        let mut records = self.records.lock();
        match records.back_mut() {
            None => AttachOutcome::QueueEmpty,
            Some(record) => {
                if record.attach_response(response) {
                    AttachOutcome::Attached
                } else {
                    AttachOutcome::AlreadyPaired
                }
            }
        }
    }

    /// Removes and returns the oldest record.
    pub fn pop(&self) -> Option<CaptureRecord> {
        self.records.lock().pop_front()
    }

    /// Number of records currently queued.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// True when no records are queued.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Total records evicted due to overflow since creation.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}
