//! # Injection — lazy singletons and binding events
//!
//! The primitives a dependency-injection container is built on:
//! single-flight lazy values and a weak-listener event channel.

pub use injection_core::*;
pub use injection_support::*;
