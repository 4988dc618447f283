//! Error types for lazy initialization and event dispatch.
//!
//! Every message names the type or listener involved and, where it helps,
//! ends with a `Hint:` line.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use injection_support::rendering::{count_noun, render_list, shorten_type_name};

/// Boxed cause returned by fallible factories and listeners.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Shared cause kept by a poisoned [`LazyCell`](crate::lazy::LazyCell).
pub type SharedError = Arc<dyn StdError + Send + Sync>;

/// Main error type for all injection primitives.
#[derive(Debug, thiserror::Error)]
pub enum InjectionError {
    /// The factory of a lazy cell failed (returned an error or panicked).
    ///
    /// Returned by the failing `force()` and by every later one: the cell
    /// stays poisoned and the factory is never run again.
    #[error(
        "Failed to initialize lazy {}: {source}\n  Hint: the cell is poisoned, the factory will not be retried",
        shorten_type_name(.type_name)
    )]
    InitializationFailed {
        type_name: &'static str,
        #[source]
        source: SharedError,
    },

    /// `force()` was called from inside the cell's own factory.
    #[error(
        "Recursive initialization of lazy {}\n  Hint: the factory reads the value it is building; check is_set() before forcing",
        shorten_type_name(.type_name)
    )]
    RecursiveInitialization { type_name: &'static str },

    /// A listener's `on_prevent` failed; the dispatch was aborted.
    #[error("Event dispatch prevented by {}: {source}", shorten_type_name(.listener))]
    Prevented {
        listener: &'static str,
        #[source]
        source: BoxError,
    },

    /// The protected region of a dispatch failed; no listener was notified.
    #[error("Protected region failed, listeners were not notified: {source}")]
    ProtectedRegionFailed {
        #[source]
        source: BoxError,
    },

    /// One or more `on_event` calls failed during the notify phase.
    #[error("{}", .0)]
    NotifyFailed(NotifyFailedError),
}

/// A single listener failure recorded during the notify phase.
#[derive(Debug)]
pub struct ListenerFailure {
    /// Type name of the failing listener
    pub listener: &'static str,
    pub error: BoxError,
}

impl fmt::Display for ListenerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", shorten_type_name(self.listener), self.error)
    }
}

/// Error when listeners failed while being notified.
///
/// Under [`NotifyPolicy::BestEffort`](crate::settings::NotifyPolicy::BestEffort)
/// every listener was still called; `failures` lists the ones that failed,
/// in notification order.
#[derive(Debug)]
pub struct NotifyFailedError {
    pub failures: Vec<ListenerFailure>,
    /// How many snapshot listeners were never called
    pub skipped: usize,
}

impl fmt::Display for NotifyFailedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event notification failed for {}:",
            count_noun(self.failures.len(), "listener")
        )?;

        let rendered: Vec<String> = self.failures.iter().map(ToString::to_string).collect();
        write!(f, "{}", render_list(&rendered))?;

        if self.skipped > 0 {
            write!(f, "\n  {} not notified", count_noun(self.skipped, "listener"))?;
        }
        Ok(())
    }
}

/// Convenient Result type for injection operations.
pub type Result<T> = std::result::Result<T, InjectionError>;
