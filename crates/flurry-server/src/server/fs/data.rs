use bytes::{Bytes, BytesMut};
use flurry_proto::{HEX_RECORD_SIZE, SnowflakeId};

const RECORD: u64 = HEX_RECORD_SIZE as u64;

/// Length in bytes of a data file holding `records` IDs.
pub(super) fn length(records: usize) -> u64 {
    records as u64 * RECORD
}

/// Reads `count` bytes at `offset` from the hex rendering of `ids`.
///
/// Records are rendered on demand: byte `offset` lives in record
/// `offset / 17` at position `offset % 17`.
pub(super) fn read(ids: &[SnowflakeId], offset: u64, count: u32) -> Bytes {
    let length = length(ids.len());
    if offset >= length {
        return Bytes::new();
    }
    let end = length.min(offset.saturating_add(u64::from(count)));

    let mut out = BytesMut::with_capacity((end - offset) as usize);
    let mut pos = offset;
    while pos < end {
        let index = (pos / RECORD) as usize;
        let within = (pos % RECORD) as usize;
        let take = (RECORD - within as u64).min(end - pos) as usize;
        out.extend_from_slice(&ids[index].to_hex_record()[within..within + take]);
        pos += take as u64;
    }
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> Vec<SnowflakeId> {
        [0x0123_4567_89ab_cdef, 1, 0x7fff_ffff_ffff_ffff]
            .into_iter()
            .map(SnowflakeId::from_raw)
            .collect()
    }

    #[test]
    fn full_read() {
        let out = read(&ids(), 0, 1024);
        assert_eq!(
            out,
            &b"0123456789abcdef\n0000000000000001\n7fffffffffffffff\n"[..]
        );
        assert_eq!(out.len() as u64, length(3));
    }

    #[test]
    fn reads_across_record_boundaries() {
        let ids = ids();
        assert_eq!(read(&ids, 12, 10), &b"cdef\n000000"[..10]);
        assert_eq!(read(&ids, 16, 1), &b"\n"[..]);
        assert_eq!(read(&ids, 33, 5), &b"\n7fff"[..]);
    }

    #[test]
    fn reads_are_clamped_to_the_length() {
        let ids = ids();
        assert_eq!(read(&ids, 48, 100), &b"ff\n"[..]);
        assert!(read(&ids, 51, 100).is_empty());
        assert!(read(&ids, u64::MAX, u32::MAX).is_empty());
        assert!(read(&[], 0, 100).is_empty());
    }
}
