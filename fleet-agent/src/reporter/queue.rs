//! In-memory event queue.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_api::Event;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{Ack, EventSnapshot, Reporter};

/// Default maximum number of pending events.
pub const DEFAULT_QUEUE_THRESHOLD: usize = 1000;

#[derive(Debug)]
struct QueuedEvent {
    seq: u64,
    event: Event,
}

#[derive(Debug, Default)]
struct Queue {
    entries: VecDeque<QueuedEvent>,
    next_seq: u64,
    dropped: u64,
    last_ack: Option<DateTime<Utc>>,
}

impl Queue {
    /// Remove every entry up to and including `last_seq`.
    fn remove_through(&mut self, last_seq: u64) -> usize {
        let mut removed = 0;
        while self
            .entries
            .front()
            .is_some_and(|entry| entry.seq <= last_seq)
        {
            self.entries.pop_front();
            removed += 1;
        }
        removed
    }
}

/// Bounded FIFO of events waiting for the next check-in.
///
/// When the queue is full the oldest events are dropped to make room. Every
/// event gets a sequence number; an ack removes the entries whose number is at
/// most the highest one in its snapshot. Since entries are only ever appended
/// with increasing numbers, those are exactly the snapshotted events still queued.
#[derive(Debug, Clone)]
pub struct QueueReporter {
    queue: Arc<Mutex<Queue>>,
    threshold: usize,
}

impl Default for QueueReporter {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_THRESHOLD)
    }
}

impl QueueReporter {
    pub fn new(threshold: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(Queue::default())),
            threshold: threshold.max(1),
        }
    }

    /// Queue an event for the next check-in.
    pub fn report(&self, event: Event) {
        let mut queue = self.queue.lock();

        if queue.entries.len() >= self.threshold {
            let overflow = queue.entries.len() + 1 - self.threshold;
            for _ in 0..overflow {
                queue.entries.pop_front();
            }
            queue.dropped += overflow as u64;
            warn!(
                "Event queue reached {} events, dropped {} oldest events",
                self.threshold, overflow
            );
        }

        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.entries.push_back(QueuedEvent { seq, event });
    }

    /// Copy of the pending events, oldest first.
    pub fn pending(&self) -> Vec<Event> {
        self.queue
            .lock()
            .entries
            .iter()
            .map(|entry| entry.event.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().entries.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Number of events dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.queue.lock().dropped
    }

    /// When a snapshot was last acknowledged.
    pub fn last_ack(&self) -> Option<DateTime<Utc>> {
        self.queue.lock().last_ack
    }

    fn snapshot(&self) -> EventSnapshot {
        let queue = self.queue.lock();
        let events: Vec<Event> = queue.entries.iter().map(|e| e.event.clone()).collect();
        let last_seq = queue.entries.back().map(|entry| entry.seq);
        drop(queue);

        let shared = self.queue.clone();
        let ack = Ack::new(move || {
            let mut queue = shared.lock();
            let removed = match last_seq {
                Some(last_seq) => queue.remove_through(last_seq),
                None => 0,
            };
            queue.last_ack = Some(Utc::now());
            debug!("Acknowledged {} events", removed);
            removed
        });

        EventSnapshot::new(events, ack)
    }
}

#[async_trait]
impl Reporter for QueueReporter {
    async fn events(&self) -> EventSnapshot {
        self.snapshot()
    }
}
