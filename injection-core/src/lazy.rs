//! # LazyCell — single-flight deferred values
//!
//! A [`LazyCell`] holds a factory and runs it on the first
//! [`force()`](LazyCell::force). Every later call, from any thread,
//! returns the same value.
//!
//! # State machine
//! ```text
//! Unset ──force()──> Computing ──Ok──> Set
//!                        │
//!                        └──Err / panic──> Poisoned
//! ```
//!
//! Threads that call `force()` while another thread is `Computing` block
//! on an internal lock until the computation ends, then observe its outcome.
//! A poisoned cell never runs its factory again.
//!
//! # Examples
//! ```rust
//! use injection_core::lazy::LazyCell;
//!
//! let cell = LazyCell::new(|| vec![1, 2, 3]);
//! assert!(!cell.is_set());
//!
//! assert_eq!(cell.force().unwrap(), &vec![1, 2, 3]);
//! assert!(cell.is_set());
//! ```

use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use injection_support::rendering::shorten_type_name;
use once_cell::sync::OnceCell;
use parking_lot::ReentrantMutex;
use tracing::{debug, trace, warn};

use crate::error::{BoxError, InjectionError, Result, SharedError};

const UNSET: u8 = 0;
const COMPUTING: u8 = 1;
const SET: u8 = 2;
const POISONED: u8 = 3;

type Factory<T> = Box<dyn FnOnce() -> std::result::Result<T, BoxError> + Send>;

/// Observable lifecycle state of a [`LazyCell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LazyState {
    /// The factory has not been called yet.
    Unset,
    /// The factory is running.
    Computing,
    /// The value is available.
    Set,
    /// The factory failed; the cell will not retry.
    Poisoned,
}

impl LazyState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            UNSET => LazyState::Unset,
            COMPUTING => LazyState::Computing,
            SET => LazyState::Set,
            _ => LazyState::Poisoned,
        }
    }
}

impl fmt::Display for LazyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LazyState::Unset => write!(f, "Unset"),
            LazyState::Computing => write!(f, "Computing"),
            LazyState::Set => write!(f, "Set"),
            LazyState::Poisoned => write!(f, "Poisoned"),
        }
    }
}

/// A value computed once, on first access, and cached for the cell's lifetime.
///
/// `LazyCell<T>` is `Send + Sync` when `T` is, so a single cell can be shared
/// (by reference or through an `Arc`) between threads racing to first use it.
/// Only one of them runs the factory.
pub struct LazyCell<T> {
    state: AtomicU8,
    value: OnceCell<T>,
    /// Held for the whole computation. Reentrant so that a factory reading its
    /// own cell gets an error instead of a deadlock.
    factory: ReentrantMutex<RefCell<Option<Factory<T>>>>,
    failure: OnceCell<SharedError>,
}

impl<T> LazyCell<T> {
    /// Creates a cell that will compute its value with `factory`.
    ///
    /// The factory is not called here.
    pub fn new<F>(factory: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
        T: 'static,
    {
        Self::from_factory(Box::new(move || Ok(factory())))
    }

    /// Creates a cell whose factory may fail.
    ///
    /// If the factory returns `Err`, the cell is poisoned and every
    /// [`force()`](LazyCell::force) returns [`InjectionError::InitializationFailed`].
    ///
    /// ```rust
    /// use injection_core::lazy::LazyCell;
    ///
    /// let cell: LazyCell<u16> = LazyCell::try_new(|| "80".parse::<u16>());
    /// assert_eq!(*cell.force().unwrap(), 80);
    /// ```
    pub fn try_new<F, E>(factory: F) -> Self
    where
        F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
        E: Into<BoxError>,
        T: 'static,
    {
        Self::from_factory(Box::new(move || factory().map_err(Into::into)))
    }

    /// Creates a cell that already holds `value`.
    pub fn from_value(value: T) -> Self {
        Self {
            state: AtomicU8::new(SET),
            value: OnceCell::with_value(value),
            factory: ReentrantMutex::new(RefCell::new(None)),
            failure: OnceCell::new(),
        }
    }

    fn from_factory(factory: Factory<T>) -> Self {
        Self {
            state: AtomicU8::new(UNSET),
            value: OnceCell::new(),
            factory: ReentrantMutex::new(RefCell::new(Some(factory))),
            failure: OnceCell::new(),
        }
    }

    /// Returns the value, computing it on the first call.
    ///
    /// Concurrent callers block until the single computation finishes.
    ///
    /// # Errors
    /// - [`InjectionError::InitializationFailed`] — the factory failed now or
    ///   on an earlier call
    /// - [`InjectionError::RecursiveInitialization`] — called from inside
    ///   this cell's own factory
    pub fn force(&self) -> Result<&T> {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }
        self.initialize()
    }

    /// Returns the value if it has been computed, without forcing it.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.value.get()
    }

    /// Returns `true` once computation has started.
    ///
    /// Flips at the start of the factory call, not at its end, so a caller
    /// can tell that construction is already underway without forcing it.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.state.load(Ordering::Acquire) != UNSET
    }

    /// Returns the current lifecycle state.
    #[inline]
    pub fn state(&self) -> LazyState {
        LazyState::from_raw(self.state.load(Ordering::Acquire))
    }

    #[cold]
    fn initialize(&self) -> Result<&T> {
        let slot = self.factory.lock();

        // Another thread may have finished while we waited on the lock.
        if let Some(value) = self.value.get() {
            trace!(ty = %self.short_name(), "Lazy value computed by another caller");
            return Ok(value);
        }

        if let Some(source) = self.failure.get() {
            return Err(self.failed(source.clone()));
        }

        // Lock held, nothing stored: only this thread's running factory can
        // have taken it.
        let Some(factory) = slot.borrow_mut().take() else {
            warn!(ty = %self.short_name(), "Recursive lazy initialization");
            return Err(InjectionError::RecursiveInitialization {
                type_name: type_name::<T>(),
            });
        };

        self.state.store(COMPUTING, Ordering::Release);
        debug!(ty = %self.short_name(), "Computing lazy value");

        let mut poison = PoisonOnUnwind { cell: self, armed: true };
        let outcome = factory();
        poison.armed = false;

        match outcome {
            Ok(value) => {
                let value = self.value.get_or_init(move || value);
                self.state.store(SET, Ordering::Release);
                debug!(ty = %self.short_name(), "Lazy value ready");
                Ok(value)
            }
            Err(err) => {
                let source: SharedError = Arc::from(err);
                self.poison(source.clone());
                Err(self.failed(source))
            }
        }
    }

    fn poison(&self, source: SharedError) {
        warn!(ty = %self.short_name(), error = %source, "Lazy factory failed, cell poisoned");
        let _ = self.failure.set(source);
        self.state.store(POISONED, Ordering::Release);
    }

    fn failed(&self, source: SharedError) -> InjectionError {
        InjectionError::InitializationFailed {
            type_name: type_name::<T>(),
            source,
        }
    }

    fn short_name(&self) -> String {
        shorten_type_name(type_name::<T>())
    }
}

/// Poisons the cell if the factory unwinds.
struct PoisonOnUnwind<'a, T> {
    cell: &'a LazyCell<T>,
    armed: bool,
}

impl<T> Drop for PoisonOnUnwind<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.cell.poison(Arc::from(BoxError::from("factory panicked")));
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for LazyCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("LazyCell");
        debug.field("state", &self.state());
        match self.value.get() {
            Some(value) => debug.field("value", value).finish(),
            None => debug.finish_non_exhaustive(),
        }
    }
}
