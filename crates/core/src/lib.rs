//! Rượu Làng Core - Shared types library.
//!
//! This crate provides common types used across all Rượu Làng components:
//! - `cart` - Client-side cart synchronization subsystem
//! - `integration-tests` - End-to-end tests against a stub backend
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no timers.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs and VND prices

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
