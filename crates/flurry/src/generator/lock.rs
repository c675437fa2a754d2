use parking_lot::Mutex;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    error::{Error, Result},
    id::SnowflakeId,
    time::{TWITTER_EPOCH, TimeSource},
};

/// Mutable generator state, only ever touched while the mutex is held.
#[derive(Debug, Default)]
struct State {
    /// Highest Unix-millisecond timestamp an ID was issued at.
    last_timestamp: u64,
    /// IDs already issued within `last_timestamp`, minus one.
    sequence: u64,
}

/// A lock-based Snowflake ID generator suitable for multi-threaded
/// environments.
///
/// The whole generation step, including the wait for the next millisecond
/// when the 12-bit sequence is exhausted, runs under a single
/// [`parking_lot::Mutex`]. Other callers block rather than interleave, which
/// gives every generator instance a total order over the IDs it issues.
///
/// Cloning a generator is cheap and yields a handle to the same state.
///
/// ## Guarantees
/// - IDs issued by one generator are unique.
/// - An ID issued after another call has returned is strictly greater.
/// - At most 4096 IDs are issued per millisecond; the next caller spins
///   (without yielding the lock) until the clock advances.
/// - A clock that steps backwards surfaces as [`Error::ClockRewind`] and
///   leaves the state untouched.
pub struct LockSnowflakeGenerator<T>
where
    T: TimeSource,
{
    state: Arc<Mutex<State>>,
    time: T,
    epoch: u64,
    datacenter_id: u64,
    worker_id: u64,
}

impl<T> Clone for LockSnowflakeGenerator<T>
where
    T: TimeSource + Clone,
{
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            time: self.time.clone(),
            epoch: self.epoch,
            datacenter_id: self.datacenter_id,
            worker_id: self.worker_id,
        }
    }
}

impl<T> LockSnowflakeGenerator<T>
where
    T: TimeSource,
{
    /// Creates a new generator for the given datacenter and worker, anchored
    /// at [`TWITTER_EPOCH`], with an empty timestamp watermark.
    ///
    /// # Parameters
    ///
    /// - `datacenter_id`: 0..=31, encoded into every generated ID.
    /// - `worker_id`: 0..=31, encoded into every generated ID.
    /// - `time`: A [`TimeSource`] implementation (e.g., [`SystemClock`]) that
    ///   determines how timestamps are read.
    ///
    /// # Example
    /// ```
    /// use flurry::{LockSnowflakeGenerator, SystemClock};
    ///
    /// let generator = LockSnowflakeGenerator::new(3, 5, SystemClock);
    /// let id = generator.try_next_id().unwrap();
    /// assert_eq!(id.datacenter_id(), 3);
    /// assert_eq!(id.worker_id(), 5);
    /// ```
    ///
    /// [`SystemClock`]: crate::time::SystemClock
    pub fn new(datacenter_id: u64, worker_id: u64, time: T) -> Self {
        Self::from_components(0, datacenter_id, worker_id, 0, time)
    }

    /// Creates a new generator from explicit component values.
    ///
    /// This is primarily useful for seeding the timestamp watermark from an
    /// operator-provided value, so that a restarted process refuses to issue
    /// IDs until its clock has passed the last timestamp used before the
    /// restart.
    ///
    /// # Parameters
    /// - `last_timestamp`: Unix milliseconds of the last issued ID
    /// - `datacenter_id`, `worker_id`: the 5-bit node identifiers
    /// - `sequence`: The sequence already consumed within `last_timestamp`
    /// - `time`: A [`TimeSource`] implementation used to fetch the current
    ///   time
    pub fn from_components(
        last_timestamp: u64,
        datacenter_id: u64,
        worker_id: u64,
        sequence: u64,
        time: T,
    ) -> Self {
        debug_assert!(
            datacenter_id <= SnowflakeId::max_datacenter_id(),
            "datacenter_id overflow"
        );
        debug_assert!(worker_id <= SnowflakeId::max_worker_id(), "worker_id overflow");
        debug_assert!(sequence <= SnowflakeId::max_sequence(), "sequence overflow");
        Self {
            state: Arc::new(Mutex::new(State {
                last_timestamp,
                sequence: sequence & SnowflakeId::SEQUENCE_MASK,
            })),
            time,
            epoch: TWITTER_EPOCH.as_millis() as u64,
            datacenter_id: datacenter_id & SnowflakeId::DATACENTER_ID_MASK,
            worker_id: worker_id & SnowflakeId::WORKER_ID_MASK,
        }
    }

    /// The datacenter ID stamped into every ID.
    pub fn datacenter_id(&self) -> u64 {
        self.datacenter_id
    }

    /// The worker ID stamped into every ID.
    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }

    /// Unix milliseconds of the most recently issued ID (or the seeded
    /// watermark if nothing was issued yet).
    pub fn last_timestamp(&self) -> u64 {
        self.state.lock().last_timestamp
    }

    /// Generates the next ID.
    ///
    /// If the 4096 sequence values of the current millisecond are used up,
    /// this call busy-waits until the clock reports a later millisecond. The
    /// wait is expected to be well below a millisecond and keeps the lock, so
    /// concurrent callers queue up behind it instead of racing for the next
    /// tick.
    ///
    /// # Errors
    /// - [`Error::ClockRewind`] if the clock reads earlier than the last
    ///   issued timestamp. Nothing is updated; retry once the clock has
    ///   passed `last_timestamp`.
    ///
    /// # Example
    /// ```
    /// use flurry::{LockSnowflakeGenerator, SystemClock};
    ///
    /// let generator = LockSnowflakeGenerator::new(0, 0, SystemClock);
    /// let a = generator.try_next_id().unwrap();
    /// let b = generator.try_next_id().unwrap();
    /// assert!(a < b);
    /// ```
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn try_next_id(&self) -> Result<SnowflakeId> {
        let mut state = self.state.lock();

        // The clock is read under the lock: a reading taken before acquiring
        // it may already be behind a timestamp another caller just issued.
        let mut now = self.time.current_millis();

        let sequence = if now == state.last_timestamp {
            let sequence = (state.sequence + 1) & SnowflakeId::SEQUENCE_MASK;
            if sequence == 0 {
                now = self.wait_next_millis(state.last_timestamp);
            }
            sequence
        } else {
            0
        };

        if now < state.last_timestamp {
            return Err(Self::cold_clock_behind(state.last_timestamp));
        }

        state.last_timestamp = now;
        state.sequence = sequence;

        Ok(SnowflakeId::from_components(
            now.saturating_sub(self.epoch),
            self.datacenter_id,
            self.worker_id,
            sequence,
        ))
    }

    /// Polls the clock until it passes `last_timestamp`.
    fn wait_next_millis(&self, last_timestamp: u64) -> u64 {
        let mut now = self.time.current_millis();
        while now <= last_timestamp {
            core::hint::spin_loop();
            now = self.time.current_millis();
        }
        now
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(last_timestamp: u64) -> Error {
        Error::ClockRewind { last_timestamp }
    }
}
