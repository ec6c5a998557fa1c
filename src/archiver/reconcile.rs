use crate::archiver::normalize::{
    COL_CHANNEL, COL_CREATED_AT, COL_DELETED_AT, COL_ENDED_AT, COL_ID, COL_MESSAGE_COUNT,
    COL_TAGS, NormalizedRecord,
};
use crate::sheets::{RowCells, SheetStore};
use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::{info, warn};

/// Header written to a sheet that has none yet.
pub const DEFAULT_HEADER: [&str; 7] = [
    COL_ID,
    COL_CHANNEL,
    COL_MESSAGE_COUNT,
    COL_CREATED_AT,
    COL_ENDED_AT,
    COL_TAGS,
    COL_DELETED_AT,
];

/// Ids that were written to the sheet and then seen again in a fresh read.
/// Only the reconciler can produce one, and deletion accepts nothing else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifiedIds(Vec<String>);

impl VerifiedIds {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn for_tests(ids: &[&str]) -> Self {
        Self(ids.iter().map(|id| id.to_string()).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPlan {
    pub header: Vec<String>,
    pub added: Vec<String>,
    pub changed: bool,
}

/// Grow `existing` (or the default header) with every column the batch uses,
/// appended in first-seen order. Existing entries never move.
pub fn plan_header(existing: Option<Vec<String>>, records: &[NormalizedRecord]) -> HeaderPlan {
    let (mut header, mut changed) = match existing {
        Some(header) if !header.is_empty() => (header, false),
        _ => (DEFAULT_HEADER.iter().map(|c| c.to_string()).collect(), true),
    };
    let mut known = header.iter().cloned().collect::<HashSet<_>>();
    let mut added = Vec::new();

    for record in records {
        for column in record.columns() {
            if known.insert(column.clone()) {
                header.push(column.clone());
                added.push(column.clone());
                changed = true;
            }
        }
    }

    HeaderPlan {
        header,
        added,
        changed,
    }
}

/// Records whose id is not in `existing`, in batch order. A repeated id in
/// the batch counts once.
pub fn new_records<'a>(
    records: &'a [NormalizedRecord],
    existing: &HashSet<&str>,
) -> Vec<&'a NormalizedRecord> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|record| !existing.contains(record.id()) && seen.insert(record.id()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct ReconcilePlan {
    pub header: HeaderPlan,
    pub existing_ids: Vec<String>,
    pub new_ids: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub fetched_ids: Vec<String>,
    pub verified: VerifiedIds,
    /// Every id in the sheet after the insert, in row order.
    pub current_ids: Vec<String>,
    /// Header as persisted.
    pub header: Vec<String>,
    pub verification_passed: bool,
    pub fail_count: usize,
}

fn fetched_ids(records: &[NormalizedRecord]) -> Vec<String> {
    records.iter().map(|r| r.id().to_string()).collect()
}

/// Read-only half of reconciliation: header growth and the id diff.
pub fn plan(store: &dyn SheetStore, records: &[NormalizedRecord]) -> Result<ReconcilePlan> {
    let existing_header = store.load_header().context("failed to read sheet header")?;
    let header = plan_header(existing_header, records);
    let existing_ids = store
        .row_ids(&header.header)
        .context("failed to read existing sheet rows")?;
    let existing = existing_ids.iter().map(String::as_str).collect::<HashSet<_>>();
    let new_ids = new_records(records, &existing)
        .into_iter()
        .map(|r| r.id().to_string())
        .collect();
    Ok(ReconcilePlan {
        header,
        existing_ids,
        new_ids,
    })
}

/// Append the records the sheet does not have yet and verify them with a
/// fresh read. An empty batch touches nothing.
pub fn reconcile(store: &dyn SheetStore, records: &[NormalizedRecord]) -> Result<ReconcileOutcome> {
    if records.is_empty() {
        info!(stage = "reconcile", "no candidate records");
        return Ok(ReconcileOutcome {
            verification_passed: true,
            ..ReconcileOutcome::default()
        });
    }

    let plan = plan(store, records)?;
    if plan.header.changed {
        store
            .set_header(&plan.header.header)
            .context("failed to write sheet header")?;
        info!(
            stage = "reconcile",
            added = %plan.header.added.join(","),
            "sheet header extended"
        );
    }

    let wanted = plan.new_ids.iter().map(String::as_str).collect::<HashSet<_>>();
    let mut seen = HashSet::new();
    let fresh = records
        .iter()
        .filter(|r| wanted.contains(r.id()) && seen.insert(r.id()))
        .collect::<Vec<_>>();

    if fresh.is_empty() {
        info!(
            stage = "reconcile",
            existing = plan.existing_ids.len(),
            "every fetched record is already archived"
        );
        return Ok(ReconcileOutcome {
            fetched_ids: fetched_ids(records),
            verified: VerifiedIds::default(),
            current_ids: plan.existing_ids,
            header: plan.header.header,
            verification_passed: true,
            fail_count: 0,
        });
    }

    let rows = fresh.iter().map(|r| r.cells()).collect::<Vec<&RowCells>>();
    store
        .append_rows(&plan.header.header, &rows)
        .context("failed to append rows to sheet")?;
    info!(stage = "reconcile", count = rows.len(), "rows appended");

    let current_ids = store
        .row_ids(&plan.header.header)
        .context("failed to re-read sheet rows for verification")?;
    let present = current_ids.iter().map(String::as_str).collect::<HashSet<_>>();

    let mut verified = Vec::new();
    let mut fail_count = 0;
    for record in fresh {
        if present.contains(record.id()) {
            verified.push(record.id().to_string());
        } else {
            warn!(id = record.id(), "row missing after append");
            fail_count += 1;
        }
    }

    Ok(ReconcileOutcome {
        fetched_ids: fetched_ids(records),
        verified: VerifiedIds(verified),
        current_ids,
        header: plan.header.header,
        verification_passed: fail_count == 0,
        fail_count,
    })
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_HEADER, new_records, plan, plan_header, reconcile};
    use crate::archiver::normalize::NormalizedRecord;
    use crate::archiver::testing::FakeSheet;
    use crate::sheets::CellValue;
    use std::collections::HashSet;

    fn record(id: &str, extra: &[&str]) -> NormalizedRecord {
        let mut record = NormalizedRecord::new(id);
        record.set("channel", CellValue::from("chat"));
        for column in extra {
            record.set(column, CellValue::Bool(true));
        }
        record
    }

    #[test]
    fn missing_header_is_seeded_with_defaults() {
        let plan = plan_header(None, &[record("c1", &[])]);
        assert!(plan.changed);
        assert_eq!(plan.header, DEFAULT_HEADER.map(String::from).to_vec());
        assert!(plan.added.is_empty());
    }

    #[test]
    fn new_columns_append_in_first_seen_order() {
        let existing = vec!["id".to_string(), "channel".to_string()];
        let records = [record("c1", &["vip", "refund"]), record("c2", &["alpha", "vip"])];
        let plan = plan_header(Some(existing), &records);
        assert_eq!(plan.header, ["id", "channel", "vip", "refund", "alpha"]);
        assert_eq!(plan.added, ["vip", "refund", "alpha"]);
    }

    #[test]
    fn header_growth_is_idempotent() {
        let records = [record("c1", &["vip"])];
        let first = plan_header(None, &records);
        let second = plan_header(Some(first.header.clone()), &records);
        assert!(!second.changed);
        assert_eq!(second.header, first.header);
    }

    #[test]
    fn set_diff_collapses_duplicates() {
        let records = [record("a", &[]), record("b", &[]), record("a", &[]), record("c", &[])];
        let existing = HashSet::from(["b", "z"]);
        let ids = new_records(&records, &existing)
            .iter()
            .map(|r| r.id())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "c"]);

        let incoming = records.iter().map(|r| r.id()).collect::<HashSet<_>>();
        assert_eq!(ids.len(), incoming.difference(&existing).count());
    }

    #[test]
    fn empty_batch_touches_nothing() {
        let sheet = FakeSheet::default();
        let outcome = reconcile(&sheet, &[]).expect("reconcile");
        assert!(outcome.verification_passed);
        assert!(outcome.verified.is_empty());
        assert_eq!(sheet.total_calls(), 0);
    }

    #[test]
    fn inserts_only_new_rows_and_verifies_them() {
        let sheet = FakeSheet::with_rows(&["old"]);
        let records = [record("old", &[]), record("n1", &["vip"]), record("n2", &[])];
        let outcome = reconcile(&sheet, &records).expect("reconcile");

        assert_eq!(outcome.fetched_ids, ["old", "n1", "n2"]);
        assert_eq!(outcome.verified.as_slice(), ["n1", "n2"]);
        assert_eq!(outcome.current_ids, ["old", "n1", "n2"]);
        assert!(outcome.verification_passed);
        assert_eq!(sheet.calls("append_rows"), 1);
        assert_eq!(sheet.calls("set_header"), 1);
        assert!(outcome.header.iter().any(|c| c == "vip"));
    }

    #[test]
    fn nothing_new_skips_the_insert() {
        let sheet = FakeSheet::with_rows(&["c1"]);
        let outcome = reconcile(&sheet, &[record("c1", &[])]).expect("reconcile");
        assert!(outcome.verified.is_empty());
        assert!(outcome.verification_passed);
        assert_eq!(sheet.calls("append_rows"), 0);
        assert_eq!(sheet.calls("set_header"), 0);
    }

    #[test]
    fn rows_lost_by_the_store_fail_verification() {
        let sheet = FakeSheet::default().losing(&["n2"]);
        let records = [record("n1", &[]), record("n2", &[]), record("n3", &[])];
        let outcome = reconcile(&sheet, &records).expect("reconcile");

        assert_eq!(outcome.verified.as_slice(), ["n1", "n3"]);
        assert_eq!(outcome.fail_count, 1);
        assert!(!outcome.verification_passed);
    }

    #[test]
    fn plan_never_writes() {
        let sheet = FakeSheet::with_rows(&["c1"]);
        let planned = plan(&sheet, &[record("c1", &[]), record("c2", &["vip"])]).expect("plan");
        assert_eq!(planned.new_ids, ["c2"]);
        assert!(planned.header.changed);
        assert_eq!(sheet.calls("set_header"), 0);
        assert_eq!(sheet.calls("append_rows"), 0);
    }
}
