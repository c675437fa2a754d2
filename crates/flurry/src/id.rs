use core::fmt;

/// Number of bytes in the big-endian binary encoding of a [`SnowflakeId`].
pub const ID_SIZE: usize = core::mem::size_of::<u64>();

/// Number of bytes in the textual record encoding of a [`SnowflakeId`]: 16
/// lowercase hex digits followed by a newline.
pub const HEX_RECORD_SIZE: usize = 17;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// A 64-bit Snowflake ID with a split 5-bit datacenter and 5-bit worker field.
///
/// - 1 bit reserved
/// - 41 bits timestamp (ms since the generator's epoch)
/// - 5 bits datacenter ID
/// - 5 bits worker ID
/// - 12 bits sequence
///
/// ```text
///  Bit Index:  63     63 62            22 21        17 16        12 11             0
///              +--------+----------------+------------+------------+---------------+
///  Field:      | rsvd(1)| timestamp (41) | datacenter | worker (5) | sequence (12) |
///              |        |                |    (5)     |            |               |
///              +--------+----------------+------------+------------+---------------+
///              |<----------------- MSB ------ 64 bits ------ LSB ----------------->|
/// ```
///
/// The datacenter and worker fields together occupy the same ten bits the
/// Twitter layout calls the machine ID, so [`SnowflakeId::machine_id`] is
/// `datacenter_id << 5 | worker_id`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SnowflakeId {
    id: u64,
}

impl SnowflakeId {
    /// Bitmask for extracting the 41-bit timestamp field. Occupies bits 22
    /// through 62.
    pub const TIMESTAMP_MASK: u64 = (1 << 41) - 1;

    /// Bitmask for extracting the 5-bit datacenter field. Occupies bits 17
    /// through 21.
    pub const DATACENTER_ID_MASK: u64 = (1 << 5) - 1;

    /// Bitmask for extracting the 5-bit worker field. Occupies bits 12
    /// through 16.
    pub const WORKER_ID_MASK: u64 = (1 << 5) - 1;

    /// Bitmask for extracting the 12-bit sequence field. Occupies bits 0
    /// through 11.
    pub const SEQUENCE_MASK: u64 = (1 << 12) - 1;

    /// Number of bits to shift the timestamp to its correct position (22).
    pub const TIMESTAMP_SHIFT: u64 = 22;

    /// Number of bits to shift the datacenter ID to its correct position
    /// (17).
    pub const DATACENTER_ID_SHIFT: u64 = 17;

    /// Number of bits to shift the worker ID to its correct position (12).
    pub const WORKER_ID_SHIFT: u64 = 12;

    /// Number of bits to shift the sequence to its correct position (0).
    pub const SEQUENCE_SHIFT: u64 = 0;

    /// Packs the four components into an ID. Each component is masked to its
    /// field width.
    pub const fn from_components(
        timestamp: u64,
        datacenter_id: u64,
        worker_id: u64,
        sequence: u64,
    ) -> Self {
        let timestamp = (timestamp & Self::TIMESTAMP_MASK) << Self::TIMESTAMP_SHIFT;
        let datacenter_id =
            (datacenter_id & Self::DATACENTER_ID_MASK) << Self::DATACENTER_ID_SHIFT;
        let worker_id = (worker_id & Self::WORKER_ID_MASK) << Self::WORKER_ID_SHIFT;
        let sequence = (sequence & Self::SEQUENCE_MASK) << Self::SEQUENCE_SHIFT;
        Self {
            id: timestamp | datacenter_id | worker_id | sequence,
        }
    }

    /// Wraps a raw 64-bit value without checking the reserved bit.
    pub const fn from_raw(raw: u64) -> Self {
        Self { id: raw }
    }

    /// Returns the packed 64-bit value.
    pub const fn to_raw(&self) -> u64 {
        self.id
    }

    /// Extracts the timestamp (ms since epoch) from the packed ID.
    pub const fn timestamp(&self) -> u64 {
        (self.id >> Self::TIMESTAMP_SHIFT) & Self::TIMESTAMP_MASK
    }

    /// Extracts the datacenter ID from the packed ID.
    pub const fn datacenter_id(&self) -> u64 {
        (self.id >> Self::DATACENTER_ID_SHIFT) & Self::DATACENTER_ID_MASK
    }

    /// Extracts the worker ID from the packed ID.
    pub const fn worker_id(&self) -> u64 {
        (self.id >> Self::WORKER_ID_SHIFT) & Self::WORKER_ID_MASK
    }

    /// The combined 10-bit datacenter and worker field.
    pub const fn machine_id(&self) -> u64 {
        (self.datacenter_id() << 5) | self.worker_id()
    }

    /// Extracts the per-millisecond sequence from the packed ID.
    pub const fn sequence(&self) -> u64 {
        (self.id >> Self::SEQUENCE_SHIFT) & Self::SEQUENCE_MASK
    }

    /// Returns the maximum representable datacenter ID.
    pub const fn max_datacenter_id() -> u64 {
        Self::DATACENTER_ID_MASK
    }

    /// Returns the maximum representable worker ID.
    pub const fn max_worker_id() -> u64 {
        Self::WORKER_ID_MASK
    }

    /// Returns the maximum sequence value before the generator has to wait
    /// for the next millisecond.
    pub const fn max_sequence() -> u64 {
        Self::SEQUENCE_MASK
    }

    /// Big-endian binary encoding used by the batch protocol.
    pub const fn to_be_bytes(&self) -> [u8; ID_SIZE] {
        self.id.to_be_bytes()
    }

    /// Textual record encoding: 16 lowercase hex digits and a trailing
    /// newline.
    pub fn to_hex_record(&self) -> [u8; HEX_RECORD_SIZE] {
        let mut record = [b'\n'; HEX_RECORD_SIZE];
        for (i, byte) in self.to_be_bytes().iter().enumerate() {
            record[i * 2] = HEX_DIGITS[(byte >> 4) as usize];
            record[i * 2 + 1] = HEX_DIGITS[(byte & 0x0f) as usize];
        }
        record
    }
}

impl From<SnowflakeId> for u64 {
    fn from(id: SnowflakeId) -> Self {
        id.to_raw()
    }
}

impl fmt::Display for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::Debug for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeId")
            .field("raw", &format_args!("0x{:016x}", self.id))
            .field("timestamp", &self.timestamp())
            .field("datacenter_id", &self.datacenter_id())
            .field("worker_id", &self.worker_id())
            .field("sequence", &self.sequence())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_id_fields_and_bounds() {
        let ts = SnowflakeId::TIMESTAMP_MASK;
        let dc = SnowflakeId::max_datacenter_id();
        let worker = SnowflakeId::max_worker_id();
        let seq = SnowflakeId::max_sequence();

        let id = SnowflakeId::from_components(ts, dc, worker, seq);
        assert_eq!(id.timestamp(), ts);
        assert_eq!(id.datacenter_id(), dc);
        assert_eq!(id.worker_id(), worker);
        assert_eq!(id.sequence(), seq);
        // the reserved sign bit stays clear
        assert_eq!(id.to_raw() >> 63, 0);
    }

    #[test]
    fn test_snowflake_id_layout_shifts() {
        let ts = 1_234_567_890;
        let id = SnowflakeId::from_components(ts, 3, 5, 7);

        let raw = id.to_raw();
        assert_eq!(raw >> 22, ts);
        assert_eq!((raw >> 17) & 0x1f, 3);
        assert_eq!((raw >> 12) & 0x1f, 5);
        assert_eq!(raw & 0xfff, 7);
        assert_eq!(id.machine_id(), (3 << 5) | 5);
        assert_eq!(SnowflakeId::from_raw(raw), id);
    }

    #[test]
    fn test_snowflake_id_masks_oversized_components() {
        let id = SnowflakeId::from_components(0, 32, 33, 4096);
        assert_eq!(id.datacenter_id(), 0);
        assert_eq!(id.worker_id(), 1);
        assert_eq!(id.sequence(), 0);
    }

    #[test]
    fn test_hex_record_matches_format() {
        let id = SnowflakeId::from_raw(0x0123_4567_89ab_cdef);
        assert_eq!(&id.to_hex_record(), b"0123456789abcdef\n");
        assert_eq!(&SnowflakeId::from_raw(0).to_hex_record(), b"0000000000000000\n");
        assert_eq!(
            id.to_be_bytes(),
            [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef]
        );
    }

    #[test]
    fn test_ordering_follows_timestamp_then_sequence() {
        let a = SnowflakeId::from_components(10, 31, 31, 4095);
        let b = SnowflakeId::from_components(11, 0, 0, 0);
        let c = SnowflakeId::from_components(11, 0, 0, 1);
        assert!(a < b && b < c);
    }
}
