use crate::archiver::audit::{AuditLog, EventStatus};
use crate::archiver::delete::delete_and_confirm;
use crate::archiver::mark::mark_deleted;
use crate::archiver::normalize::normalize_batch;
use crate::archiver::reconcile::{self, reconcile};
use crate::archiver::tags::resolve_tags;
use crate::archiver::util::now_sheet_time;
use crate::error::ArchiverError;
use crate::helpdesk::ConversationSource;
use crate::sheets::SheetStore;
use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub dry_run: bool,
    pub fetched: usize,
    pub normalized: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub planned_inserts: usize,
    pub inserted: usize,
    pub not_saved: usize,
    pub to_delete: usize,
    pub confirmed_deleted: usize,
    pub marked: usize,
    pub ok: bool,
    pub error: Option<String>,
}

impl RunSummary {
    pub fn discrepancy(&self) -> usize {
        self.to_delete.saturating_sub(self.confirmed_deleted)
    }

    fn describe(&self) -> String {
        let mut out = format!(
            "fetched={} normalized={} skipped={} inserted={} not_saved={} to_delete={} \
             confirmed_deleted={} marked={}",
            self.fetched,
            self.normalized,
            self.skipped,
            self.inserted,
            self.not_saved,
            self.to_delete,
            self.confirmed_deleted,
            self.marked,
        );
        if self.dry_run {
            out.push_str(" dry_run=true");
        }
        if let Some(error) = &self.error {
            out.push_str(&format!(" error=\"{error}\""));
        }
        out
    }
}

/// Run every stage in order, then write the summary entry and flush the
/// audit log whether or not a stage failed. A stage error is returned after
/// the flush.
pub fn execute(
    source: &dyn ConversationSource,
    store: &dyn SheetStore,
    mut audit: AuditLog,
    opts: RunOptions,
) -> Result<RunSummary> {
    let mut summary = RunSummary {
        dry_run: opts.dry_run,
        ..RunSummary::default()
    };

    let result = run_stages(source, store, &mut audit, opts, &mut summary);

    if let Err(err) = &result {
        error!("run aborted: {err:#}");
        summary.error = Some(format!("{err:#}"));
    }
    summary.ok = result.is_ok() && summary.not_saved == 0 && summary.discrepancy() == 0;
    let status = if summary.ok {
        EventStatus::Success
    } else {
        EventStatus::Fail
    };
    audit.record(status, "run", "summary", &summary.describe());

    if let Err(err) = audit.flush() {
        if result.is_ok() {
            return Err(err.context("failed to flush audit log"));
        }
        error!("audit log flush failed: {err:#}");
    }

    result?;
    info!(stage = "run", ok = summary.ok, "{}", summary.describe());
    Ok(summary)
}

fn run_stages(
    source: &dyn ConversationSource,
    store: &dyn SheetStore,
    audit: &mut AuditLog,
    opts: RunOptions,
    summary: &mut RunSummary,
) -> Result<()> {
    let lookup = resolve_tags(source)
        .inspect_err(|err| audit.fail("tags", "resolve", &err.to_string()))?;
    audit.success("tags", "resolve", &format!("{} tags", lookup.len()));

    let raws = source
        .search()
        .map_err(|err| ArchiverError::fetch("conversations", err))
        .inspect_err(|err| audit.fail("conversations", "search", &err.to_string()))?;
    summary.fetched = raws.len();
    info!(stage = "search", count = raws.len(), "conversations fetched");

    let batch = normalize_batch(&raws, &lookup);
    summary.normalized = batch.records.len();
    summary.skipped = batch.skipped.len();
    summary.duplicates = batch.duplicates;
    for err in &batch.skipped {
        audit.fail("conversation", "normalize", &err.to_string());
    }
    if batch.records.is_empty() {
        info!(stage = "search", "no candidate records this run");
        audit.success("conversations", "search", "no candidate records");
    }

    if opts.dry_run {
        if batch.records.is_empty() {
            return Ok(());
        }
        let plan = reconcile::plan(store, &batch.records)?;
        summary.planned_inserts = plan.new_ids.len();
        audit.success(
            "sheet",
            "dry-run",
            &format!(
                "would insert {} row(s), add column(s) [{}]",
                plan.new_ids.len(),
                plan.header.added.join(",")
            ),
        );
        return Ok(());
    }

    let outcome = reconcile(store, &batch.records)
        .inspect_err(|err| audit.fail("sheet", "reconcile", &format!("{err:#}")))?;
    summary.inserted = outcome.verified.len();
    summary.not_saved = outcome.fail_count;

    if !outcome.verification_passed {
        let mismatch = ArchiverError::VerificationMismatch {
            missing: outcome.fail_count,
        };
        warn!(
            stage = "verify",
            verified = outcome.verified.len(),
            "{mismatch}; only verified rows will be deleted"
        );
        audit.fail("sheet", "verify", &mismatch.to_string());
    }
    if outcome.verified.is_empty() {
        if outcome.verification_passed {
            audit.success("sheet", "reconcile", "no new rows");
        }
        return Ok(());
    }
    audit.success(
        "sheet",
        "reconcile",
        &format!("{} row(s) archived and verified", outcome.verified.len()),
    );

    summary.to_delete = outcome.verified.len();
    let deletion = delete_and_confirm(source, &outcome.verified);
    summary.confirmed_deleted = deletion.confirmed.len();
    if deletion.discrepancy() > 0 {
        let discrepancy = ArchiverError::DeletionDiscrepancy {
            requested: deletion.requested,
            confirmed: deletion.confirmed.len(),
        };
        warn!(
            stage = "delete",
            unconfirmed = %deletion.unconfirmed.join(","),
            "{discrepancy}; check these conversations by hand"
        );
        audit.fail("conversation", "delete", &discrepancy.to_string());
    } else {
        audit.success(
            "conversation",
            "delete",
            &format!("{} deletion(s) confirmed", deletion.confirmed.len()),
        );
    }

    let stamp = now_sheet_time();
    summary.marked = mark_deleted(
        store,
        &outcome.header,
        &outcome.current_ids,
        &deletion.confirmed,
        &stamp,
    )
    .inspect_err(|err| audit.fail("sheet", "mark-deleted", &format!("{err:#}")))
    .context("deletions confirmed but sheet rows not stamped")?;
    if summary.marked > 0 {
        audit.success(
            "sheet",
            "mark-deleted",
            &format!("{} row(s) stamped {stamp}", summary.marked),
        );
    }
    Ok(())
}
