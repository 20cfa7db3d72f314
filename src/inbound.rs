use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::warn;

/// Default number of records held before the oldest are discarded.
pub const INBOUND_CAPACITY: usize = 4096;

#[derive(Debug)]
struct Inner {
    records: VecDeque<String>,
    dropped: u64,
    overflowing: bool,
}

/// Hand-off queue between the radio reader thread and the UI.
///
/// The reader appends formatted lines; the relay step takes them in insertion
/// order. Bounded: when full, the oldest record is discarded and counted.
#[derive(Debug, Clone)]
pub struct InboundQueue {
    inner: Arc<Mutex<Inner>>,
    capacity: usize,
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::with_capacity(INBOUND_CAPACITY)
    }
}

impl InboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                records: VecDeque::with_capacity(capacity.min(INBOUND_CAPACITY)),
                dropped: 0,
                overflowing: false,
            })),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, record: String) {
        let mut inner = self.lock();
        if inner.records.len() >= self.capacity {
            inner.records.pop_front();
            inner.dropped += 1;
            if !inner.overflowing {
                warn!("inbound queue full ({} records), dropping oldest", self.capacity);
                inner.overflowing = true;
            }
        }
        inner.records.push_back(record);
    }

    /// Take every record present right now, oldest first.
    pub fn drain(&self) -> Vec<String> {
        let mut inner = self.lock();
        inner.overflowing = false;
        inner.records.drain(..).collect()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.records.clear();
        inner.overflowing = false;
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Records discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_drain_preserves_insertion_order() {
        let q = InboundQueue::new();
        q.push("A".into());
        q.push("B".into());
        q.push("C".into());
        assert_eq!(q.drain(), vec!["A", "B", "C"]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let q = InboundQueue::with_capacity(2);
        q.push("1".into());
        q.push("2".into());
        q.push("3".into());
        assert_eq!(q.len(), 2);
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.drain(), vec!["2", "3"]);
    }

    #[test]
    fn test_clear_keeps_drop_count() {
        let q = InboundQueue::with_capacity(1);
        q.push("a".into());
        q.push("b".into());
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.dropped(), 1);
    }

    #[test]
    fn test_push_from_another_thread() {
        let q = InboundQueue::new();
        let producer = q.clone();
        let handle = thread::spawn(move || {
            for i in 0..100 {
                producer.push(format!("msg {i}"));
            }
        });
        handle.join().unwrap();
        let records = q.drain();
        assert_eq!(records.len(), 100);
        assert_eq!(records[0], "msg 0");
        assert_eq!(records[99], "msg 99");
    }
}
