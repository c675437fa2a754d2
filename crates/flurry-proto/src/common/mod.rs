//! Shared types and error definitions for the flurry daemon.
//!
//! This module provides the common interfaces used by every front end (TCP,
//! HTTP and 9P).
//!
//! ## Structure
//!
//! - [`error`] - Unified error type and `Result` alias.
//! - [`types`] - The canonical ID type, generator alias and size constants.

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;
