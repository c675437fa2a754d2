use super::{Namespace, slice};
use bytes::Bytes;
use chrono::{Datelike, Timelike};
use flurry_proto::{Error, Result};

/// Returns the name of the data file produced by the last write.
pub(super) fn read(ns: &Namespace, session: u64, offset: u64, count: u32) -> Result<Bytes> {
    if offset > 0 {
        return Ok(Bytes::new());
    }
    ns.with_session(session, |s| slice(s.control.as_bytes(), 0, count))
}

/// Materializes a batch of `count` IDs into a new data file.
///
/// A count of zero or less is accepted and ignored. The data file is created
/// empty before generation starts and stays behind, empty, if the generator
/// fails.
pub(super) fn write<T>(ns: &Namespace, session: u64, data: &[u8], now: T) -> Result<()>
where
    T: Datelike + Timelike,
{
    let count = parse_count(data)?;
    if count <= 0 {
        return Ok(());
    }
    let count = count as u64;
    if count > ns.max_batch {
        return Err(Error::InvalidBatchSize {
            reason: format!("{count} exceeds the limit of {}", ns.max_batch),
        });
    }

    let name = data_file_name(&now);
    ns.create_data_file(session, &name)?;

    let ids = ns.service.generate(count as usize).inspect_err(|e| {
        tracing::error!(session, "failed to generate {count} IDs: {e}");
    })?;

    ns.with_session_mut(session, |s| {
        if let Some(file) = s.data.get_mut(&name) {
            file.ids = ids;
        }
        s.control = name;
    })?;
    ns.service.stats().record_ids(count);
    tracing::debug!(session, count, "batch materialized");
    Ok(())
}

fn parse_count(data: &[u8]) -> Result<i64> {
    let text = std::str::from_utf8(data).map_err(|_| Error::InvalidBatchSize {
        reason: "not utf-8 text".into(),
    })?;
    // The payload is not echoed back; it can be as large as the message.
    text.trim().parse().map_err(|e| Error::InvalidBatchSize {
        reason: format!("expected a decimal count: {e}"),
    })
}

/// Local time as year, month, day, hour, minute and second, concatenated
/// without padding.
fn data_file_name<T: Datelike + Timelike>(now: &T) -> String {
    format!(
        "{}{}{}{}{}{}",
        now.year(),
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::fs::{Layout, Node, tests::namespace};
    use crate::server::service::{
        IdService,
        tests::{rewound_service, test_service},
    };
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .unwrap()
    }

    fn with_session(service: IdService) -> Namespace {
        let ns = Namespace::new(service, Layout::Full, "glenda".into(), 100);
        ns.read(&Node::Clone, 0, 16).unwrap();
        ns
    }

    #[test]
    fn names_are_unpadded() {
        assert_eq!(data_file_name(&at(9, 5, 3)), "202437953");
        assert_eq!(data_file_name(&at(23, 59, 59)), "202437235959");
    }

    #[test]
    fn write_then_read_back_the_name() {
        let ns = namespace();
        ns.read(&Node::Clone, 0, 16).unwrap();

        write(&ns, 1, b"3\n", at(9, 5, 3)).unwrap();
        assert_eq!(read(&ns, 1, 0, 64).unwrap(), "202437953");
        assert!(read(&ns, 1, 1, 64).unwrap().is_empty());
        assert_eq!(read(&ns, 1, 0, 4).unwrap(), "2024");

        let data = ns.walk(&Node::Session(1), "202437953").unwrap();
        assert_eq!(ns.stat(&data).unwrap().length, 51);
    }

    #[test]
    fn non_positive_counts_are_ignored() {
        let ns = namespace();
        ns.read(&Node::Clone, 0, 16).unwrap();

        write(&ns, 1, b"0", at(1, 1, 1)).unwrap();
        write(&ns, 1, b"-4", at(1, 1, 2)).unwrap();
        assert!(read(&ns, 1, 0, 64).unwrap().is_empty());
        assert_eq!(ns.service.stats().snapshot().ids, 0);
    }

    #[test]
    fn rejects_garbage_and_oversized_batches() {
        let ns = with_session(test_service());
        for bad in [&b"five"[..], b"", b"1.5", b"\xff"] {
            assert!(matches!(
                write(&ns, 1, bad, at(1, 1, 1)),
                Err(Error::InvalidBatchSize { .. })
            ));
        }
        assert!(matches!(
            write(&ns, 1, b"101", at(1, 1, 1)),
            Err(Error::InvalidBatchSize { .. })
        ));
        assert!(write(&ns, 1, b"100", at(1, 1, 1)).is_ok());
    }

    #[test]
    fn parse_errors_do_not_echo_the_payload() {
        let ns = with_session(test_service());
        let payload = vec![b'x'; 4000];
        let err = write(&ns, 1, &payload, at(1, 1, 1)).unwrap_err();
        assert!(matches!(err, Error::InvalidBatchSize { .. }));
        assert!(err.to_string().len() < 128);
    }

    #[test]
    fn same_second_collides() {
        let ns = namespace();
        ns.read(&Node::Clone, 0, 16).unwrap();

        write(&ns, 1, b"1", at(4, 4, 4)).unwrap();
        assert!(matches!(
            write(&ns, 1, b"1", at(4, 4, 4)),
            Err(Error::ResourceCreation { .. })
        ));
        write(&ns, 1, b"1", at(4, 4, 5)).unwrap();
    }

    #[test]
    fn generator_failure_leaves_an_empty_data_file() {
        let ns = with_session(rewound_service());

        let err = write(&ns, 1, b"2", at(6, 6, 6)).unwrap_err();
        assert!(err.is_transient());

        let name = data_file_name(&at(6, 6, 6));
        let data = ns.walk(&Node::Session(1), &name).unwrap();
        assert_eq!(ns.stat(&data).unwrap().length, 0);
        assert!(read(&ns, 1, 0, 64).unwrap().is_empty());
    }

    #[test]
    fn unknown_session() {
        let ns = namespace();
        assert!(matches!(
            write(&ns, 42, b"1", at(1, 1, 1)),
            Err(Error::NotFound)
        ));
        assert!(matches!(read(&ns, 42, 0, 8), Err(Error::NotFound)));
    }
}
