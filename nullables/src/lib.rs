//! Nullable infrastructure for deterministic testing.
//!
//! External dependencies are abstracted behind traits. This crate provides
//! test-friendly implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Never touch the system clock
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;

pub use clock::NullClock;
