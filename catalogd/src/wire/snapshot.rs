use shared::protocol::{RECORD_TRAILER_SLACK, SNAPSHOT_HEADER_LEN};
use shared::types::ServerRecord;
use super::cursor::ByteCursor;
use super::error::DecodeError;
use super::record::{decode_record, RecordOutcome};
use super::tables::Catalog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completeness {
    Complete,
    /// Decoding stopped early; the records before the failure are still valid.
    Partial(DecodeError),
}

/// Everything one snapshot payload yielded.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSnapshot {
    pub records: Vec<ServerRecord>,
    /// Ids of accepted records in encounter order, duplicates included
    pub seen_ids: Vec<String>,
    pub rejected: usize,
    pub completeness: Completeness,
}

impl DecodedSnapshot {
    pub fn is_complete(&self) -> bool {
        self.completeness == Completeness::Complete
    }
}

/// Decode a full snapshot payload, header included.
pub fn decode_snapshot(payload: &[u8], catalog: &Catalog) -> DecodedSnapshot {
    let mut cursor = ByteCursor::new(payload);
    let mut snapshot = DecodedSnapshot {
        records: Vec::new(),
        seen_ids: Vec::new(),
        rejected: 0,
        completeness: Completeness::Complete,
    };

    if let Err(e) = cursor.take_bytes(SNAPSHOT_HEADER_LEN) {
        snapshot.completeness = Completeness::Partial(e);
        return snapshot;
    }

    while cursor.remaining() > RECORD_TRAILER_SLACK {
        let start = cursor.position();
        match decode_record(&mut cursor, catalog) {
            Ok(RecordOutcome::Accepted(record)) => {
                snapshot.seen_ids.push(record.id());
                snapshot.records.push(record);
            }
            Ok(RecordOutcome::Rejected { raw_ip }) => {
                tracing::debug!(ip = %raw_ip, offset = start, "Dropping record with invalid address");
                snapshot.rejected += 1;
            }
            Err(e) => {
                tracing::warn!(offset = start, "Snapshot decode stopped early: {}", e);
                snapshot.completeness = Completeness::Partial(e);
                break;
            }
        }
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::testing::{snapshot_payload, RecordBuilder};

    #[test]
    fn test_empty_snapshot_is_complete() {
        let snapshot = decode_snapshot(&snapshot_payload(&[]), &Catalog::standard());
        assert!(snapshot.is_complete());
        assert!(snapshot.records.is_empty());
    }

    #[test]
    fn test_short_payload_is_partial() {
        let snapshot = decode_snapshot(&[0u8; 40], &Catalog::standard());
        assert_eq!(
            snapshot.completeness,
            Completeness::Partial(DecodeError::TruncatedInput {
                needed: SNAPSHOT_HEADER_LEN,
                remaining: 40,
            })
        );
    }

    #[test]
    fn test_multiple_records() {
        let payload = snapshot_payload(&[
            RecordBuilder::new("1.1.1.1", 9600).encode(),
            RecordBuilder::new("2.2.2.2", 9700).track("spa").encode(),
        ]);

        let snapshot = decode_snapshot(&payload, &Catalog::standard());
        assert!(snapshot.is_complete());
        assert_eq!(snapshot.seen_ids, vec!["1.1.1.1:9600", "2.2.2.2:9700"]);
        assert_eq!(snapshot.records[1].track.name, "Spa-Francorchamps");
    }

    #[test]
    fn test_invalid_address_skipped_stream_aligned() {
        let payload = snapshot_payload(&[
            RecordBuilder::new("300.1.2.3", 9600)
                .name("bogus")
                .sessions(&[(0x00, 10), (0x0a, 25)])
                .encode(),
            RecordBuilder::new("5.6.7.8", 9601).name("real").encode(),
        ]);

        let snapshot = decode_snapshot(&payload, &Catalog::standard());
        assert!(snapshot.is_complete());
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.records[0].name, "real");
        assert_eq!(snapshot.seen_ids, vec!["5.6.7.8:9601"]);
    }

    #[test]
    fn test_truncated_record_keeps_earlier_records() {
        let second = RecordBuilder::new("2.2.2.2", 9700).encode();
        let payload = snapshot_payload(&[
            RecordBuilder::new("1.1.1.1", 9600).encode(),
            second[..second.len() / 2].to_vec(),
        ]);

        let snapshot = decode_snapshot(&payload, &Catalog::standard());
        assert!(!snapshot.is_complete());
        assert!(matches!(
            snapshot.completeness,
            Completeness::Partial(DecodeError::TruncatedInput { .. })
        ));
        assert_eq!(snapshot.seen_ids, vec!["1.1.1.1:9600"]);
    }

    #[test]
    fn test_trailing_slack_ignored() {
        let payload = snapshot_payload(&[
            RecordBuilder::new("1.1.1.1", 9600).encode(),
            vec![0x00, 0x00, 0x00],
        ]);

        let snapshot = decode_snapshot(&payload, &Catalog::standard());
        assert!(snapshot.is_complete());
        assert_eq!(snapshot.records.len(), 1);
    }

    #[test]
    fn test_invalid_utf8_aborts_snapshot() {
        let builder = RecordBuilder::new("1.1.1.1", 9600).name("xx");
        let mut bad = builder.encode();
        // The two name bytes sit directly before the metadata block
        let name_at = bad.len() - builder.metadata_len() - 2;
        bad[name_at] = 0xff;

        let payload = snapshot_payload(&[bad]);
        let snapshot = decode_snapshot(&payload, &Catalog::standard());
        assert!(matches!(
            snapshot.completeness,
            Completeness::Partial(DecodeError::InvalidUtf8 { .. })
        ));
        assert!(snapshot.records.is_empty());
    }
}
