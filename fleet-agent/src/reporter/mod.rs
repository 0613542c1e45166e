//! Pending events waiting to be sent on the next check-in.
//!
//! The reporter is the only writer of its queue. Readers take a point-in-time
//! [`EventSnapshot`] and later commit its removal through the attached [`Ack`],
//! which must happen only after the control plane confirmed receipt.

mod queue;

use std::fmt;

use async_trait::async_trait;
use fleet_api::Event;

pub use queue::{DEFAULT_QUEUE_THRESHOLD, QueueReporter};

/// Commits the removal of one snapshot's events. Can only be called once.
///
/// Dropping an `Ack` without calling it leaves the events pending.
pub struct Ack {
    commit: Box<dyn FnOnce() -> usize + Send>,
}

impl Ack {
    /// `commit` removes the snapshot's events and returns how many it removed.
    pub fn new(commit: impl FnOnce() -> usize + Send + 'static) -> Self {
        Self {
            commit: Box::new(commit),
        }
    }

    /// Commit the removal. Returns the number of events actually removed, which
    /// is lower than the snapshot size if some were dropped in the meantime.
    pub fn ack(self) -> usize {
        (self.commit)()
    }
}

impl fmt::Debug for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Ack")
    }
}

/// Events pending at one point in time, with the means to acknowledge them.
#[derive(Debug)]
pub struct EventSnapshot {
    pub events: Vec<Event>,
    pub ack: Ack,
}

impl EventSnapshot {
    pub fn new(events: Vec<Event>, ack: Ack) -> Self {
        Self { events, ack }
    }

    pub fn into_parts(self) -> (Vec<Event>, Ack) {
        (self.events, self.ack)
    }
}

/// Supplies the events not yet acknowledged by the control plane.
#[async_trait]
pub trait Reporter: Send + Sync + 'static {
    /// Snapshot the pending events.
    ///
    /// Acknowledging the snapshot removes exactly its events, never events
    /// reported after the snapshot was taken.
    async fn events(&self) -> EventSnapshot;
}
