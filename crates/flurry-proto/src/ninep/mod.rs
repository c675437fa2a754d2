//! A 9P2000 codec covering the messages a synthetic, read-mostly file tree
//! needs to answer.
//!
//! Frames are `size[4] type[1] tag[2] body`, little-endian, with strings
//! encoded as `len[2] utf8`. [`ServerCodec`] decodes T-messages and encodes
//! R-messages; [`ClientCodec`] does the reverse and is what tests and tools
//! use to talk to a server.

mod codec;
mod types;

pub use codec::*;
pub use types::*;
