use core::fmt;

/// A result type carrying a generator [`Error`] by default.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants that `flurry` can emit.
///
/// Generation is infallible except for a wall clock that steps backwards.
/// Sequence exhaustion within a millisecond is not an error: the generator
/// spins until the next millisecond instead.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Error {
    /// The clock reported a time earlier than the last timestamp an ID was
    /// issued at.
    ///
    /// Callers may retry once their clock has caught up with
    /// `last_timestamp`. The generator state is left untouched.
    ClockRewind {
        /// The millisecond timestamp (Unix epoch) that must be passed before
        /// the generator can issue IDs again.
        last_timestamp: u64,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ClockRewind { last_timestamp } => write!(
                fmt,
                "time is moving backwards, waiting until {last_timestamp}"
            ),
        }
    }
}

impl core::error::Error for Error {}
