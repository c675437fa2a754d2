#![doc = include_str!("../README.md")]

pub mod batch;
mod common;
pub mod ninep;

pub use common::*;
// Public re-export so downstream crates can access `flurry` via
// `flurry_proto::flurry`
pub use flurry;
