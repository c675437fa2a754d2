//! Error types for the ID generation service.
//!
//! This module defines the central `Error` enum, which captures every
//! request-local failure a front end can report. None of them is fatal to the
//! process: each is confined to the request or connection that caused it.
//!
//! ## Error Cases
//! - `IdGeneration`: The generator observed a clock rewind.
//! - `InvalidBatchSize`: A control-file write was not a usable decimal count.
//! - `InsufficientBuffer`: A read asked for fewer bytes than a name needs.
//! - `ResourceCreation`: A synthetic file could not be inserted into the tree.
//! - `NotFound`, `PermissionDenied`, `Unsupported`: Filesystem-surface
//!   failures reported back to 9P clients.
//! - `UnknownFid`, `FidInUse`: 9P session bookkeeping failures.
//! - `Codec`: A malformed 9P frame.
//! - `Io`: The connection failed underneath a front end.

use crate::ninep::CodecError;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the ID generation service.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Underlying Snowflake ID generation failed.
    #[error("{0}")]
    IdGeneration(#[from] flurry::Error),

    /// The requested batch size could not be parsed or is out of bounds.
    #[error("invalid batch size: {reason}")]
    InvalidBatchSize { reason: String },

    /// The caller's read buffer cannot hold the result.
    #[error("not enough buffer space for result: need {needed} bytes, have {available}")]
    InsufficientBuffer { needed: usize, available: usize },

    /// A synthetic file or directory could not be created.
    #[error("cannot create {name}: {reason}")]
    ResourceCreation { name: String, reason: String },

    /// The named file does not exist.
    #[error("file not found")]
    NotFound,

    /// The operation is not permitted on this file.
    #[error("permission denied")]
    PermissionDenied,

    /// The request is valid 9P but the tree does not implement it.
    #[error("{0} not supported")]
    Unsupported(&'static str),

    /// The fid was never attached or walked to.
    #[error("unknown fid {0}")]
    UnknownFid(u32),

    /// The fid is already bound to a file.
    #[error("fid {0} already in use")]
    FidInUse(u32),

    /// The frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The transport failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` for failures a client can fix by waiting and retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::IdGeneration(_))
    }

    /// Returns `true` when the peer simply went away.
    pub fn is_disconnect(&self) -> bool {
        let io = match self {
            Self::Io(err) | Self::Codec(CodecError::Io(err)) => err,
            _ => return false,
        };
        matches!(
            io.kind(),
            std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
        )
    }
}
