//! # Common Snowflake ID Types and Constants
//!
//! The ID layout, clock and generator are fixed at compile time so that every
//! front end of one daemon hands out IDs from the same state and encodes them
//! the same way.
//!
//! ## Type Aliases
//!
//! - [`SnowflakeId`] - The packed 64-bit ID (5-bit datacenter, 5-bit worker)
//! - [`Clock`] - The wall clock used for timestamp embedding
//! - [`Generator`] - The process-wide, lock-serialized generator
//!
//! ## Constants
//!
//! - [`SNOWFLAKE_ID_SIZE`] - Size (in bytes) of a big-endian encoded ID
//! - [`HEX_RECORD_SIZE`] - Size (in bytes) of a hex text record

use flurry::{LockSnowflakeGenerator, SystemClock};

pub use flurry::{HEX_RECORD_SIZE, SnowflakeId};

/// The number of bytes required to serialize a single [`SnowflakeId`] in
/// big-endian format.
pub const SNOWFLAKE_ID_SIZE: usize = flurry::ID_SIZE;

/// The system clock used by the generator for timestamp encoding.
pub type Clock = SystemClock;

/// The generator shared by every front end.
pub type Generator = LockSnowflakeGenerator<Clock>;
