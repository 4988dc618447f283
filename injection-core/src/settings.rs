//! Event channel settings.
//!
//! [`NotifyPolicy`] decides what the notify phase does when a listener's
//! `on_event` fails:
//! - [`NotifyPolicy::BestEffort`] — keep notifying, report every failure after
//! - [`NotifyPolicy::StopOnFailure`] — stop at the first failure
use std::fmt;

/// Behavior of the notify phase when a listener fails.
///
/// # Examples
/// ```
/// use injection_core::event::EventChannel;
/// use injection_core::settings::NotifyPolicy;
///
/// struct Bound;
///
/// let channel: EventChannel<Bound> = EventChannel::builder()
///     .notify_policy(NotifyPolicy::StopOnFailure)
///     .build();
/// assert_eq!(channel.settings().notify_policy, NotifyPolicy::StopOnFailure);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NotifyPolicy {
    /// Every snapshot listener is notified even if earlier ones fail.
    ///
    /// Failures are collected and returned together once the phase ends.
    /// A listener that panics is recorded as a failure too.
    #[default]
    BestEffort,

    /// The notify phase ends at the first failing listener.
    ///
    /// Listeners after it in snapshot order are not called.
    StopOnFailure,
}

impl NotifyPolicy {
    /// Returns `true` if a failure should end the notify phase.
    #[inline]
    pub fn stops_on_failure(&self) -> bool {
        matches!(self, NotifyPolicy::StopOnFailure)
    }
}

impl fmt::Display for NotifyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyPolicy::BestEffort => write!(f, "BestEffort"),
            NotifyPolicy::StopOnFailure => write!(f, "StopOnFailure"),
        }
    }
}

/// Settings shared by every dispatch of an [`EventChannel`](crate::event::EventChannel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelSettings {
    pub notify_policy: NotifyPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_best_effort() {
        assert_eq!(NotifyPolicy::default(), NotifyPolicy::BestEffort);
        assert_eq!(ChannelSettings::default().notify_policy, NotifyPolicy::BestEffort);
    }

    #[test]
    fn stops_on_failure() {
        assert!(NotifyPolicy::StopOnFailure.stops_on_failure());
        assert!(!NotifyPolicy::BestEffort.stops_on_failure());
    }

    #[test]
    fn policy_display() {
        assert_eq!(format!("{}", NotifyPolicy::BestEffort), "BestEffort");
        assert_eq!(format!("{}", NotifyPolicy::StopOnFailure), "StopOnFailure");
    }
}
