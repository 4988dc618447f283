//! # Dispatch — the two-phase event protocol
//!
//! A [`Dispatch`] is the scoped context returned by
//! [`EventChannel::dispatch()`](crate::event::EventChannel::dispatch).
//!
//! ```text
//! Snapshotting ──> AcquiringGuards ──> InProtectedRegion ──> ReleasingGuards ──┬──> Notifying
//!                         │                                                    │
//!                         └── on_prevent failed ──> ReleasingGuards ──> Aborted <┘ (dropped / abort())
//! ```
//!
//! While the context is alive the caller runs its protected work. Calling
//! [`complete()`](Dispatch::complete) releases the guards in reverse
//! acquisition order and then notifies every snapshot listener. Dropping the
//! context without completing it (early return, `?`, panic, an abandoned
//! future) releases the guards the same way and notifies nobody.

use std::any::type_name;
use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use injection_support::rendering::shorten_type_name;
use tracing::{debug, trace, warn};

use crate::error::{BoxError, InjectionError, ListenerFailure, NotifyFailedError, Result};
use crate::event::EventListener;
use crate::settings::NotifyPolicy;

/// Anything held for the duration of a protected region.
///
/// Releasing a guard means dropping it, so any RAII value works: a lock
/// guard, a transaction handle, or a closure wrapped by [`release_with`].
pub trait ScopedGuard {}

impl<T: ?Sized> ScopedGuard for T {}

/// Guard returned by [`EventListener::on_prevent`].
pub type Guard = Box<dyn ScopedGuard>;

/// Builds a guard that runs `release` when the protected region ends.
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use injection_core::dispatch::release_with;
///
/// let released = Rc::new(Cell::new(false));
/// let guard = release_with({
///     let released = released.clone();
///     move || released.set(true)
/// });
///
/// assert!(!released.get());
/// drop(guard);
/// assert!(released.get());
/// ```
pub fn release_with<F>(release: F) -> Guard
where
    F: FnOnce() + 'static,
{
    Box::new(ReleaseFn(Some(release)))
}

struct ReleaseFn<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Drop for ReleaseFn<F> {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

/// Calls `on_event`, turning a panic into an error.
fn notify<E: ?Sized>(
    listener: &dyn EventListener<E>,
    event: &E,
) -> std::result::Result<(), BoxError> {
    catch_unwind(AssertUnwindSafe(|| listener.on_event(event)))
        .unwrap_or_else(|payload| Err(panic_message(payload).into()))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|msg| (*msg).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());

    match detail {
        Some(detail) => format!("listener panicked: {detail}"),
        None => "listener panicked".to_string(),
    }
}

/// An in-flight event dispatch.
///
/// Holds the listener snapshot and every guard acquired in the guard phase.
#[must_use = "dropping a Dispatch aborts it; call complete() once the protected work succeeds"]
pub struct Dispatch<'e, E: ?Sized> {
    event: &'e E,
    listeners: Vec<Arc<dyn EventListener<E>>>,
    guards: Vec<Guard>,
    policy: NotifyPolicy,
    finished: bool,
}

impl<'e, E: ?Sized> Dispatch<'e, E> {
    /// Runs the guard phase over `listeners`.
    ///
    /// If a listener's `on_prevent` fails, the guards acquired so far are
    /// released (LIFO) before the error is returned.
    pub(crate) fn begin(
        event: &'e E,
        listeners: Vec<Arc<dyn EventListener<E>>>,
        policy: NotifyPolicy,
    ) -> Result<Self> {
        let mut dispatch = Self {
            event,
            listeners,
            guards: Vec::new(),
            policy,
            finished: false,
        };

        for listener in &dispatch.listeners {
            match listener.on_prevent(event) {
                Ok(Some(guard)) => {
                    trace!(listener = %shorten_type_name(listener.name()), "Guard acquired");
                    dispatch.guards.push(guard);
                }
                Ok(None) => {}
                Err(source) => {
                    warn!(
                        listener = %shorten_type_name(listener.name()),
                        error = %source,
                        "Dispatch prevented"
                    );
                    return Err(InjectionError::Prevented {
                        listener: listener.name(),
                        source,
                    });
                }
            }
        }

        debug!(
            event = %shorten_type_name(type_name::<E>()),
            listeners = dispatch.listeners.len(),
            guards = dispatch.guards.len(),
            "Entering protected region"
        );
        Ok(dispatch)
    }

    /// The event being dispatched.
    #[inline]
    pub fn event(&self) -> &'e E {
        self.event
    }

    /// Number of listeners in this dispatch's snapshot.
    #[inline]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Number of guards currently held.
    #[inline]
    pub fn guard_count(&self) -> usize {
        self.guards.len()
    }

    /// Ends the protected region successfully.
    ///
    /// Releases every guard in reverse acquisition order, then calls
    /// `on_event` on each snapshot listener in snapshot order.
    ///
    /// A listener that panics counts as failed, like one that returns `Err`.
    ///
    /// # Errors
    /// [`InjectionError::NotifyFailed`] if any listener failed. Under
    /// [`NotifyPolicy::BestEffort`] all listeners were still notified.
    pub fn complete(mut self) -> Result<()> {
        self.finished = true;
        self.release_guards();

        let listeners = std::mem::take(&mut self.listeners);
        let total = listeners.len();
        let mut failures = Vec::new();
        let mut skipped = 0;

        for (index, listener) in listeners.iter().enumerate() {
            if let Err(error) = notify(listener.as_ref(), self.event) {
                warn!(
                    listener = %shorten_type_name(listener.name()),
                    error = %error,
                    policy = %self.policy,
                    "Listener failed to handle event"
                );
                failures.push(ListenerFailure {
                    listener: listener.name(),
                    error,
                });

                if self.policy.stops_on_failure() {
                    skipped = total - index - 1;
                    break;
                }
            }
        }

        trace!(notified = total - skipped, failed = failures.len(), "Notify phase done");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(InjectionError::NotifyFailed(NotifyFailedError { failures, skipped }))
        }
    }

    /// Ends the protected region as failed.
    ///
    /// Same as dropping the dispatch: guards are released, nobody is notified.
    pub fn abort(self) {}

    fn release_guards(&mut self) {
        let held = self.guards.len();
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
        if held > 0 {
            trace!(released = held, "Guards released");
        }
    }
}

impl<E: ?Sized> Drop for Dispatch<'_, E> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                event = %shorten_type_name(type_name::<E>()),
                guards = self.guards.len(),
                "Dispatch aborted, listeners will not be notified"
            );
        }
        self.release_guards();
    }
}

impl<E: ?Sized> fmt::Debug for Dispatch<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("event", &type_name::<E>())
            .field("listeners", &self.listeners.len())
            .field("guards", &self.guards.len())
            .field("policy", &self.policy)
            .finish()
    }
}
