//! # EventChannel — weak-listener broadcast hub
//!
//! Listeners implement [`EventListener`] and are registered by `Arc`. The
//! channel only keeps a [`Weak`] reference: a listener dropped elsewhere
//! silently leaves the channel. Dead entries are pruned whenever membership
//! changes and whenever a dispatch takes its snapshot.
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use injection_core::error::BoxError;
//! use injection_core::event::{EventChannel, EventListener};
//!
//! struct Bound(&'static str);
//!
//! #[derive(Default)]
//! struct Counter(AtomicUsize);
//!
//! impl EventListener<Bound> for Counter {
//!     fn on_event(&self, _event: &Bound) -> Result<(), BoxError> {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         Ok(())
//!     }
//! }
//!
//! let counter = Arc::new(Counter::default());
//! let channel = EventChannel::new();
//! channel.add_listener(&counter);
//!
//! let dispatch = channel.dispatch(&Bound("database")).unwrap();
//! // ... protected work ...
//! dispatch.complete().unwrap();
//!
//! assert_eq!(counter.0.load(Ordering::SeqCst), 1);
//! ```

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use injection_support::rendering::shorten_type_name;
use parking_lot::RwLock;
use tracing::{debug, instrument, trace};

use crate::dispatch::{Dispatch, Guard};
use crate::error::{BoxError, InjectionError, Result};
use crate::settings::{ChannelSettings, NotifyPolicy};

/// Observer of events of type `E`.
///
/// # Phases
/// 1. [`on_prevent`](EventListener::on_prevent) runs before the protected
///    work. Return a [`Guard`] to hold something for its duration, or an
///    error to abort the dispatch.
/// 2. [`on_event`](EventListener::on_event) runs after the protected work
///    succeeded and every guard was released.
pub trait EventListener<E: ?Sized>: Send + Sync {
    /// Called in the guard phase. Defaults to no guard.
    fn on_prevent(&self, event: &E) -> std::result::Result<Option<Guard>, BoxError> {
        let _ = event;
        Ok(None)
    }

    /// Called in the notify phase.
    fn on_event(&self, event: &E) -> std::result::Result<(), BoxError>;

    /// Human-readable name for logs and error messages.
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }
}

/// Builds an [`EventChannel`] with non-default [`ChannelSettings`].
pub struct EventChannelBuilder<E: ?Sized> {
    settings: ChannelSettings,
    _event: PhantomData<fn(&E)>,
}

impl<E: ?Sized> EventChannelBuilder<E> {
    fn new() -> Self {
        Self {
            settings: ChannelSettings::default(),
            _event: PhantomData,
        }
    }

    /// Sets what the notify phase does when a listener fails.
    pub fn notify_policy(mut self, policy: NotifyPolicy) -> Self {
        self.settings.notify_policy = policy;
        self
    }

    /// Replaces all settings at once.
    pub fn settings(mut self, settings: ChannelSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> EventChannel<E> {
        EventChannel {
            listeners: RwLock::new(Vec::new()),
            settings: self.settings,
        }
    }
}

/// Broadcast hub holding weak references to its listeners.
///
/// All methods take `&self`; membership is guarded by an internal lock that
/// is never held while listener code runs, so listeners may add or remove
/// listeners from inside their own callbacks.
pub struct EventChannel<E: ?Sized> {
    listeners: RwLock<Vec<Weak<dyn EventListener<E>>>>,
    settings: ChannelSettings,
}

impl<E: ?Sized + 'static> EventChannel<E> {
    /// Creates an empty channel with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> EventChannelBuilder<E> {
        EventChannelBuilder::new()
    }

    pub fn settings(&self) -> ChannelSettings {
        self.settings
    }

    /// Registers `listener`. Adding a listener twice has no extra effect.
    ///
    /// The channel does not keep the listener alive.
    pub fn add_listener<L>(&self, listener: &Arc<L>) -> &Self
    where
        L: EventListener<E> + 'static,
    {
        let listener: Arc<dyn EventListener<E>> = listener.clone();
        self.add_dyn_listener(&listener)
    }

    /// Registers a listener already behind a trait object.
    ///
    /// Same semantics as [`add_listener`](EventChannel::add_listener).
    pub fn add_dyn_listener(&self, listener: &Arc<dyn EventListener<E>>) -> &Self {
        let address = Arc::as_ptr(listener).cast::<()>();
        let mut listeners = self.listeners.write();
        prune_dropped(&mut listeners);

        if listeners.iter().any(|weak| weak.as_ptr().cast::<()>() == address) {
            trace!(listener = %shorten_type_name(listener.name()), "Listener already registered");
            return self;
        }

        listeners.push(Arc::downgrade(listener));
        debug!(
            listener = %shorten_type_name(listener.name()),
            total = listeners.len(),
            "Listener added"
        );
        self
    }

    /// Unregisters `listener`. Does nothing if it was not registered.
    pub fn remove_listener<L>(&self, listener: &Arc<L>) -> &Self
    where
        L: EventListener<E> + ?Sized,
    {
        let address = Arc::as_ptr(listener).cast::<()>();
        let mut listeners = self.listeners.write();
        let before = listeners.len();

        listeners.retain(|weak| {
            weak.strong_count() > 0 && weak.as_ptr().cast::<()>() != address
        });

        if listeners.len() < before {
            debug!(listener = %shorten_type_name(listener.name()), "Listener removed");
        }
        self
    }

    /// Number of registered listeners that are still alive.
    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts a dispatch of `event`.
    ///
    /// Takes a snapshot of the live listeners and runs the guard phase. The
    /// returned [`Dispatch`] is the protected region: call
    /// [`complete()`](Dispatch::complete) when the work succeeded, or drop it
    /// to abort.
    ///
    /// # Errors
    /// [`InjectionError::Prevented`] if a listener's `on_prevent` failed.
    /// Guards acquired before it have already been released.
    #[instrument(skip_all, name = "event_dispatch", fields(event = %shorten_type_name(type_name::<E>())))]
    pub fn dispatch<'e>(&self, event: &'e E) -> Result<Dispatch<'e, E>> {
        let snapshot = self.snapshot();
        trace!(listeners = snapshot.len(), "Snapshot taken");
        Dispatch::begin(event, snapshot, self.settings.notify_policy)
    }

    /// Dispatches `event` around `work`.
    ///
    /// `work` runs as the protected region. On `Ok` the dispatch completes and
    /// the value is returned; on `Err` the dispatch is aborted.
    ///
    /// # Errors
    /// - [`InjectionError::Prevented`] — `work` never ran
    /// - [`InjectionError::ProtectedRegionFailed`] — `work` failed, nobody was notified
    /// - [`InjectionError::NotifyFailed`] — `work` succeeded but listeners failed
    pub fn dispatch_with<R, Er>(
        &self,
        event: &E,
        work: impl FnOnce() -> std::result::Result<R, Er>,
    ) -> Result<R>
    where
        Er: Into<BoxError>,
    {
        let dispatch = self.dispatch(event)?;

        match work() {
            Ok(value) => {
                dispatch.complete()?;
                Ok(value)
            }
            Err(err) => {
                dispatch.abort();
                Err(InjectionError::ProtectedRegionFailed { source: err.into() })
            }
        }
    }

    /// Upgrades every live listener, pruning the dead ones.
    fn snapshot(&self) -> Vec<Arc<dyn EventListener<E>>> {
        let (live, dead) = {
            let listeners = self.listeners.read();
            let live: Vec<_> = listeners.iter().filter_map(Weak::upgrade).collect();
            let dead = listeners.len() - live.len();
            (live, dead)
        };

        if dead > 0 {
            prune_dropped(&mut self.listeners.write());
        }
        live
    }
}

/// Drops entries whose listener no longer exists.
fn prune_dropped<E: ?Sized>(listeners: &mut Vec<Weak<dyn EventListener<E>>>) {
    let before = listeners.len();
    listeners.retain(|weak| weak.strong_count() > 0);

    let pruned = before - listeners.len();
    if pruned > 0 {
        trace!(pruned, "Dropped listeners pruned");
    }
}

impl<E: ?Sized + 'static> Default for EventChannel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ?Sized> fmt::Debug for EventChannel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("event", &type_name::<E>())
            .field("listeners", &self.listeners.read().len())
            .field("notify_policy", &self.settings.notify_policy)
            .finish()
    }
}
