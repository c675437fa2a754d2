//! Server-side components of the `flurryd` daemon.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/environment configuration and its validation.
//! - [`fs`] - The synthetic file tree exported over 9P.
//! - [`ninep`] - Per-connection 9P sessions and the accept loop.
//! - [`service`] - The shared generator handle plus the TCP and HTTP front
//!   ends.
//! - [`stats`] - Request and ID counters.
//! - [`telemetry`] - Console logging setup.

pub mod config;
pub mod fs;
pub mod ninep;
pub mod service;
pub mod stats;
pub mod telemetry;
