//! Listeners and events shared by the event channel tests.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::dispatch::{Guard, release_with};
use crate::error::BoxError;
use crate::event::EventListener;

/// Event fired when an injectable is bound.
#[derive(Debug)]
pub(crate) struct Bound(pub &'static str);

/// Ordered, thread-safe log of what listeners did.
#[derive(Debug, Clone, Default)]
pub(crate) struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Plain,
    Guarded,
    Rejecting,
    Failing,
    Panicking,
}

/// Listener that records `<name>-acquired`, `<name>-released` and
/// `<name>-notified` into a [`Trace`].
#[derive(Debug)]
pub(crate) struct Recorder {
    name: &'static str,
    trace: Trace,
    behavior: Behavior,
}

impl Recorder {
    fn new(name: &'static str, trace: &Trace, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name,
            trace: trace.clone(),
            behavior,
        })
    }

    /// No guard; records notifications.
    pub fn plain(name: &'static str, trace: &Trace) -> Arc<Self> {
        Self::new(name, trace, Behavior::Plain)
    }

    /// Returns a guard recording acquire and release.
    pub fn guarded(name: &'static str, trace: &Trace) -> Arc<Self> {
        Self::new(name, trace, Behavior::Guarded)
    }

    /// Fails in `on_prevent`.
    pub fn rejecting(name: &'static str, trace: &Trace) -> Arc<Self> {
        Self::new(name, trace, Behavior::Rejecting)
    }

    /// Records the notification, then fails in `on_event`.
    pub fn failing(name: &'static str, trace: &Trace) -> Arc<Self> {
        Self::new(name, trace, Behavior::Failing)
    }

    /// Records the notification, then panics in `on_event`.
    pub fn panicking(name: &'static str, trace: &Trace) -> Arc<Self> {
        Self::new(name, trace, Behavior::Panicking)
    }
}

impl EventListener<Bound> for Recorder {
    fn on_prevent(&self, _event: &Bound) -> Result<Option<Guard>, BoxError> {
        match self.behavior {
            Behavior::Guarded => {
                self.trace.push(format!("{}-acquired", self.name));
                let trace = self.trace.clone();
                let name = self.name;
                Ok(Some(release_with(move || trace.push(format!("{name}-released")))))
            }
            Behavior::Rejecting => Err(format!("{} rejected", self.name).into()),
            Behavior::Plain | Behavior::Failing | Behavior::Panicking => Ok(None),
        }
    }

    fn on_event(&self, _event: &Bound) -> Result<(), BoxError> {
        self.trace.push(format!("{}-notified", self.name));
        match self.behavior {
            Behavior::Failing => Err(format!("{} failed", self.name).into()),
            Behavior::Panicking => panic!("{} crashed", self.name),
            _ => Ok(()),
        }
    }
}
