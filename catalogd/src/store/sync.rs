use std::collections::HashSet;
use std::net::Ipv4Addr;
use anyhow::Result;
use crate::store::db::CatalogDb;
use crate::wire::DecodedSnapshot;

/// What one synchronization pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub upserted: usize,
    /// `None` when the snapshot was partial and pruning was skipped
    pub pruned: Option<u64>,
    /// Stored servers that still have no country code
    pub needs_enrichment: Vec<(String, Ipv4Addr)>,
}

/// Reconcile the store against one decoded snapshot.
///
/// All upserts happen before the prune. A partial snapshot keeps its upserts
/// but never prunes, since its id set is incomplete.
pub fn apply(db: &CatalogDb, snapshot: &DecodedSnapshot) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    let mut pending = HashSet::new();

    for record in &snapshot.records {
        let stored = db.upsert_server(record)?;
        report.upserted += 1;
        if stored.country_code.is_none() && pending.insert(stored.id.clone()) {
            report.needs_enrichment.push((stored.id, stored.record.ip));
        }
    }

    if snapshot.is_complete() {
        let keep: HashSet<String> = snapshot.seen_ids.iter().cloned().collect();
        report.pruned = Some(db.delete_where_id_not_in(&keep)?);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::testing::{snapshot_payload, RecordBuilder};
    use crate::wire::{decode_snapshot, Catalog};

    fn snapshot(records: &[RecordBuilder]) -> DecodedSnapshot {
        let encoded: Vec<Vec<u8>> = records.iter().map(RecordBuilder::encode).collect();
        decode_snapshot(&snapshot_payload(&encoded), &Catalog::standard())
    }

    fn stored_ids(db: &CatalogDb) -> Vec<String> {
        db.get_all_servers().unwrap().into_iter().map(|s| s.id).collect()
    }

    #[test]
    fn test_idempotent_sync() {
        let db = CatalogDb::open(":memory:").unwrap();
        let snap = snapshot(&[
            RecordBuilder::new("1.1.1.1", 9600).name("one"),
            RecordBuilder::new("2.2.2.2", 9600).name("two"),
        ]);

        apply(&db, &snap).unwrap();
        let once: Vec<_> = db.get_all_servers().unwrap().into_iter().map(|s| s.record).collect();

        let report = apply(&db, &snap).unwrap();
        let twice: Vec<_> = db.get_all_servers().unwrap().into_iter().map(|s| s.record).collect();

        assert_eq!(once, twice);
        assert_eq!(report.upserted, 2);
        assert_eq!(report.pruned, Some(0));
    }

    #[test]
    fn test_prune_keeps_exactly_latest_ids() {
        let db = CatalogDb::open(":memory:").unwrap();
        apply(&db, &snapshot(&[
            RecordBuilder::new("1.1.1.1", 9600),
            RecordBuilder::new("2.2.2.2", 9600).drivers(24, 3),
        ]))
        .unwrap();

        let report = apply(&db, &snapshot(&[
            RecordBuilder::new("2.2.2.2", 9600).drivers(24, 17),
            RecordBuilder::new("3.3.3.3", 9600),
        ]))
        .unwrap();

        assert_eq!(report.pruned, Some(1));
        assert_eq!(stored_ids(&db), vec!["2.2.2.2:9600", "3.3.3.3:9600"]);
        let updated = db.get_server("2.2.2.2:9600").unwrap().unwrap();
        assert_eq!(updated.record.connected_drivers, 17);
    }

    #[test]
    fn test_partial_snapshot_upserts_without_prune() {
        let db = CatalogDb::open(":memory:").unwrap();
        apply(&db, &snapshot(&[RecordBuilder::new("1.1.1.1", 9600)])).unwrap();

        let cut = RecordBuilder::new("3.3.3.3", 9600).encode();
        let payload = snapshot_payload(&[
            RecordBuilder::new("2.2.2.2", 9600).encode(),
            cut[..20].to_vec(),
        ]);
        let partial = decode_snapshot(&payload, &Catalog::standard());
        assert!(!partial.is_complete());

        let report = apply(&db, &partial).unwrap();
        assert_eq!(report.upserted, 1);
        assert_eq!(report.pruned, None);
        assert_eq!(stored_ids(&db), vec!["1.1.1.1:9600", "2.2.2.2:9600"]);
    }

    #[test]
    fn test_rejected_address_does_not_shield_stale_entry() {
        let db = CatalogDb::open(":memory:").unwrap();
        apply(&db, &snapshot(&[RecordBuilder::new("1.1.1.1", 9600)])).unwrap();

        apply(&db, &snapshot(&[
            RecordBuilder::new("1.1.1.01", 9600),
            RecordBuilder::new("4.4.4.4", 9600),
        ]))
        .unwrap();

        assert_eq!(stored_ids(&db), vec!["4.4.4.4:9600"]);
    }

    #[test]
    fn test_duplicate_id_last_write_wins() {
        let db = CatalogDb::open(":memory:").unwrap();
        let report = apply(&db, &snapshot(&[
            RecordBuilder::new("1.1.1.1", 9600).name("first"),
            RecordBuilder::new("1.1.1.1", 9600).name("second"),
        ]))
        .unwrap();

        assert_eq!(report.upserted, 2);
        assert_eq!(report.needs_enrichment.len(), 1);
        let stored = db.get_server("1.1.1.1:9600").unwrap().unwrap();
        assert_eq!(stored.record.name, "second");
    }

    #[test]
    fn test_enrichment_requested_until_country_known() {
        let db = CatalogDb::open(":memory:").unwrap();
        let snap = snapshot(&[
            RecordBuilder::new("1.1.1.1", 9600),
            RecordBuilder::new("2.2.2.2", 9600),
        ]);

        let report = apply(&db, &snap).unwrap();
        assert_eq!(
            report.needs_enrichment,
            vec![
                ("1.1.1.1:9600".to_string(), Ipv4Addr::new(1, 1, 1, 1)),
                ("2.2.2.2:9600".to_string(), Ipv4Addr::new(2, 2, 2, 2)),
            ]
        );

        db.set_country_code("1.1.1.1:9600", "au").unwrap();
        let report = apply(&db, &snap).unwrap();
        assert_eq!(
            report.needs_enrichment,
            vec![("2.2.2.2:9600".to_string(), Ipv4Addr::new(2, 2, 2, 2))]
        );
    }
}
