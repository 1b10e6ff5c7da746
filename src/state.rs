//! # Observable State Surface
//!
//! Read-only projection of the session core for presentation code.
//! The session manager is the only writer; everything handed out here is a
//! clone, so readers cannot reach the core's internals.

use crate::connection::ConnectionState;
use crate::gatt::{PeripheralRef, ServiceNode};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub scanning: bool,
    pub devices: Vec<PeripheralRef>,
    pub connection: ConnectionState,
    pub connected_peripheral: Option<PeripheralRef>,
    pub services: Vec<ServiceNode>,
    /// Count of Event Log appends so far; changes whenever the log does
    pub log_revision: u64,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            scanning: false,
            devices: Vec::new(),
            connection: ConnectionState::Disconnected,
            connected_peripheral: None,
            services: Vec::new(),
            log_revision: 0,
        }
    }
}

#[derive(Default)]
struct Shared {
    current: RwLock<SessionSnapshot>,
    subscribers: Mutex<Vec<Sender<SessionSnapshot>>>,
}

/// Writer half, held by the session manager
pub(crate) struct StatePublisher {
    shared: Arc<Shared>,
}

impl StatePublisher {
    pub(crate) fn new() -> (Self, StateView) {
        let shared = Arc::new(Shared::default());
        let view = StateView {
            shared: Arc::clone(&shared),
        };
        (Self { shared }, view)
    }

    /// Stores `snapshot` and pushes it to subscribers if anything changed
    pub(crate) fn publish(&self, snapshot: SessionSnapshot) {
        {
            let mut current = self.shared.current.write().unwrap_or_else(PoisonError::into_inner);
            if *current == snapshot {
                return;
            }
            *current = snapshot.clone();
        }

        let mut subscribers = self
            .shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
    }
}

/// Cloneable read handle for presentation code
#[derive(Clone)]
pub struct StateView {
    shared: Arc<Shared>,
}

impl StateView {
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Receives the current snapshot immediately, then one per change.
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<SessionSnapshot> {
        let (tx, rx) = unbounded();
        let mut subscribers = self
            .shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let _ = tx.send(self.snapshot());
        subscribers.push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_publish() {
        let (publisher, view) = StatePublisher::new();
        assert!(!view.snapshot().scanning);

        publisher.publish(SessionSnapshot {
            scanning: true,
            ..SessionSnapshot::default()
        });
        assert!(view.snapshot().scanning);
    }

    #[test]
    fn test_subscribers_only_see_changes() {
        let (publisher, view) = StatePublisher::new();
        let rx = view.subscribe();
        assert_eq!(rx.try_recv().unwrap(), SessionSnapshot::default());

        publisher.publish(SessionSnapshot::default());
        assert!(rx.try_recv().is_err());

        let scanning = SessionSnapshot {
            scanning: true,
            ..SessionSnapshot::default()
        };
        publisher.publish(scanning.clone());
        assert_eq!(rx.try_recv().unwrap(), scanning);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let (publisher, view) = StatePublisher::new();
        drop(view.subscribe());
        publisher.publish(SessionSnapshot {
            scanning: true,
            ..SessionSnapshot::default()
        });
        assert!(publisher.shared.subscribers.lock().unwrap().is_empty());
    }
}
