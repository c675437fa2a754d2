use super::Namespace;
use bytes::Bytes;
use flurry_proto::{Error, Result};
use portable_atomic::Ordering;

/// Creates a new session directory and returns its name.
///
/// Only a read at offset 0 does anything; later offsets see end-of-file so a
/// client reading until EOF creates exactly one session.
pub(super) fn read(ns: &Namespace, offset: u64, count: u32) -> Result<Bytes> {
    if offset > 0 {
        return Ok(Bytes::new());
    }

    let id = ns.clones.fetch_add(1, Ordering::AcqRel) + 1;
    ns.create_session(id)?;

    let name = id.to_string();
    if (count as usize) < name.len() {
        ns.remove_session(id);
        return Err(Error::InsufficientBuffer {
            needed: name.len(),
            available: count as usize,
        });
    }

    tracing::debug!(session = id, "session created");
    Ok(Bytes::from(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::fs::{Node, tests::namespace};

    #[test]
    fn sequential_names() {
        let ns = namespace();
        assert_eq!(read(&ns, 0, 16).unwrap(), "1");
        assert_eq!(read(&ns, 0, 16).unwrap(), "2");
        assert_eq!(read(&ns, 0, 16).unwrap(), "3");
        assert!(ns.walk(&Node::Root, "3").is_ok());
    }

    #[test]
    fn later_offsets_are_eof() {
        let ns = namespace();
        assert!(read(&ns, 1, 16).unwrap().is_empty());
        assert!(matches!(ns.walk(&Node::Root, "1"), Err(Error::NotFound)));
    }

    #[test]
    fn short_buffer_rolls_the_session_back() {
        let ns = namespace();
        for _ in 0..9 {
            read(&ns, 0, 16).unwrap();
        }

        // "10" does not fit in one byte.
        let err = read(&ns, 0, 1).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientBuffer {
                needed: 2,
                available: 1
            }
        ));
        assert!(matches!(ns.walk(&Node::Root, "10"), Err(Error::NotFound)));

        // The number is consumed, not reused.
        assert_eq!(read(&ns, 0, 16).unwrap(), "11");
    }
}
