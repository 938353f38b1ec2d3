//! Replication events and observer broadcast.
//!
//! Every applied operation raises one [`Event`], delivered synchronously to
//! all observers in registration order:
//!
//! | Operation | Event |
//! |---|---|
//! | download | [`EventType::LocalUpdate`] |
//! | upload | [`EventType::RemoteUpdate`] |
//! | delete local | [`EventType::LocalDelete`] |
//! | delete remote | [`EventType::RemoteDelete`] |
//!
//! Observer failures, whether returned errors or panics, are logged and
//! swallowed; they never abort a run.

use parking_lot::RwLock;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Kind of decision applied by the replicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A remote file was written into the notes directory.
    LocalUpdate,
    /// A local file was removed.
    LocalDelete,
    /// A local file was copied to the remote folder.
    RemoteUpdate,
    /// A remote file was removed.
    RemoteDelete,
}

impl EventType {
    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            EventType::LocalUpdate => "Local update",
            EventType::LocalDelete => "Local delete",
            EventType::RemoteUpdate => "Remote update",
            EventType::RemoteDelete => "Remote delete",
        }
    }
}

/// A single decision notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// What happened.
    pub event_type: EventType,
    /// Path of the affected file.
    pub path: String,
}

impl Event {
    /// Creates an event.
    pub fn new(event_type: EventType, path: impl Into<String>) -> Self {
        Self {
            event_type,
            path: path.into(),
        }
    }

    /// Label and path, e.g. `"Local update: /notes/a.txt"`.
    pub fn message(&self) -> String {
        format!("{}: {}", self.event_type.label(), self.path)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.event_type.label(), self.path)
    }
}

/// Error type observers may return.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Result of delivering one event to an observer.
pub type ObserverResult = Result<(), ObserverError>;

/// Receives replication events.
pub trait ReplicatorObserver: Send + Sync {
    /// Called once per applied operation, on the replicator's thread.
    fn update(&self, event: &Event) -> ObserverResult;
}

impl<F> ReplicatorObserver for F
where
    F: Fn(&Event) -> ObserverResult + Send + Sync,
{
    fn update(&self, event: &Event) -> ObserverResult {
        self(event)
    }
}

/// Observer that forwards events into a channel.
///
/// A disconnected receiver is reported as an observer error, which the
/// broadcast logs and ignores.
pub struct ChannelObserver {
    sender: parking_lot::Mutex<Sender<Event>>,
}

impl ChannelObserver {
    /// Creates the observer and the receiving end of its channel.
    pub fn new() -> (Self, Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                sender: parking_lot::Mutex::new(tx),
            },
            rx,
        )
    }
}

impl ReplicatorObserver for ChannelObserver {
    fn update(&self, event: &Event) -> ObserverResult {
        self.sender.lock().send(event.clone())?;
        Ok(())
    }
}

/// Ordered list of observers. There is no removal.
#[derive(Default)]
pub struct ObserverList {
    observers: RwLock<Vec<Arc<dyn ReplicatorObserver>>>,
}

impl ObserverList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an observer.
    pub fn add(&self, observer: Arc<dyn ReplicatorObserver>) {
        self.observers.write().push(observer);
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// True if nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Delivers `event` to every observer in registration order.
    pub fn broadcast(&self, event: &Event) {
        // Snapshot so an observer may register another without deadlocking.
        let observers: Vec<_> = self.observers.read().iter().cloned().collect();

        for (index, observer) in observers.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| observer.update(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(observer = index, error = %e, "observer failed: {}", event);
                }
                Err(_) => {
                    tracing::warn!(observer = index, "observer panicked: {}", event);
                }
            }
        }
    }
}
