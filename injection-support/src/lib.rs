//! # Injection Support
//!
//! Shared utilities for the injection crates.
//!
//! This crate provides:
//! - Text rendering for error messages
//! - Type-name shortening used when reporting lazy initialization failures

pub mod rendering;
