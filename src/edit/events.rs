//! Edit system notifications
//!
//! Observers subscribe for a crossbeam receiver; every emitted event is
//! fanned out to all live subscribers. Dropped receivers are pruned on
//! the next emit.

use std::collections::HashSet;

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::graph::Difference;
use crate::types::EntityId;

/// A notification from the edit system
#[derive(Debug, Clone)]
pub enum EditEvent {
    /// The staging graph changed; carries the staging diff
    StagingChanged(Difference),

    /// The stable graph changed; carries the stable diff
    StableChanged(Difference),

    /// The stable index moved, or work in progress was discarded
    HistoryJumped {
        /// Stable index before the jump
        prev_index: usize,
        /// Stable index after the jump
        new_index: usize,
    },

    /// Remote data was merged into the base layer; carries the ids the
    /// caller reported as seen
    Merged(HashSet<EntityId>),

    /// A backup was restored into the live history
    Restored,

    /// Backup write health changed; `false` means the last write failed
    BackupStatus(bool),
}

/// Multi-subscriber event fan-out over crossbeam channels
#[derive(Debug, Default)]
pub struct EventBus {
    senders: Mutex<Vec<Sender<EditEvent>>>,
}

impl EventBus {
    /// An event bus with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Receiver<EditEvent> {
        let (tx, rx) = unbounded();
        self.senders.lock().push(tx);
        rx
    }

    /// Send `event` to every live subscriber
    pub fn emit(&self, event: EditEvent) {
        self.senders
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fans_out_to_all_subscribers() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.emit(EditEvent::Restored);
        assert!(matches!(a.try_recv(), Ok(EditEvent::Restored)));
        assert!(matches!(b.try_recv(), Ok(EditEvent::Restored)));
    }

    #[test]
    fn prunes_dropped_subscribers() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        drop(bus.subscribe());
        bus.emit(EditEvent::BackupStatus(true));
        assert!(matches!(a.try_recv(), Ok(EditEvent::BackupStatus(true))));
        assert_eq!(bus.senders.lock().len(), 1);
    }
}
