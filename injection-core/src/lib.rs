//! Concurrency and lifecycle primitives for the injection crates.
//!
//! - [`LazyCell`] / [`LazyMapping`] — values built once, on first access
//! - [`EventChannel`] — weak-listener events with guard and notify phases

pub mod dispatch;
pub mod error;
pub mod event;
pub mod lazy;
pub mod mapping;
pub mod settings;

#[cfg(test)]
mod test_support;

pub use dispatch::{Dispatch, Guard, release_with};
pub use error::{BoxError, InjectionError, Result};
pub use event::{EventChannel, EventListener};
pub use lazy::{LazyCell, LazyState};
pub use mapping::LazyMapping;
pub use settings::{ChannelSettings, NotifyPolicy};

pub mod prelude {
    pub use crate::dispatch::{Dispatch, Guard, release_with};
    pub use crate::error::{BoxError, InjectionError, Result};
    pub use crate::event::{EventChannel, EventListener};
    pub use crate::lazy::LazyCell;
    pub use crate::mapping::LazyMapping;
    pub use crate::settings::NotifyPolicy;
}
