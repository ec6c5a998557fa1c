use anyhow::Result;
use tracing::{debug, error, info};

use crate::archiver::audit::{AuditLog, JsonlAuditSink};
use crate::archiver::config::ArchiverConfig;
use crate::archiver::lock;
use crate::archiver::pipeline::{self, RunOptions, RunSummary};
use crate::commands::CommandReport;
use crate::helpdesk::client::HelpdeskClient;
use crate::sheets::client::SheetsClient;

#[derive(Debug, Clone, Default)]
pub struct RunCommandOptions {
    pub dry_run: bool,
}

pub fn run(cfg: &ArchiverConfig, opts: &RunCommandOptions) -> Result<CommandReport> {
    let log_dir = cfg.log_dir()?;
    let run_lock = lock::acquire(&log_dir)?;
    debug!(lock = %run_lock.path().display(), "run lock held");
    let sink = JsonlAuditSink::in_dir(&log_dir);
    let audit_path = sink.path().to_path_buf();
    let mut audit = AuditLog::new(&cfg.environment, Box::new(sink));

    let clients = HelpdeskClient::new(&cfg.helpdesk).and_then(|source| {
        let store = SheetsClient::connect(&cfg.sheet, cfg.helpdesk.request_timeout_secs)?;
        Ok((source, store))
    });
    let (source, store) = match clients {
        Ok(pair) => pair,
        Err(err) => {
            audit.fail("run", "connect", &format!("{err:#}"));
            if let Err(flush_err) = audit.flush() {
                error!("audit log flush failed: {flush_err:#}");
            }
            return Err(err);
        }
    };

    info!(
        environment = %cfg.environment,
        dry_run = opts.dry_run,
        "archive run starting"
    );
    let summary = pipeline::execute(
        &source,
        &store,
        audit,
        RunOptions {
            dry_run: opts.dry_run,
        },
    )?;

    let mut report = report_from(&summary);
    report.detail(format!("audit_log={}", audit_path.display()));
    Ok(report)
}

fn report_from(summary: &RunSummary) -> CommandReport {
    let mut report = CommandReport::new("run");
    if summary.dry_run {
        report.detail("mode=dry-run");
    }
    report.detail(format!("fetched={}", summary.fetched));
    report.detail(format!("normalized={}", summary.normalized));
    if summary.skipped > 0 {
        report.detail(format!("skipped_malformed={}", summary.skipped));
    }
    if summary.duplicates > 0 {
        report.detail(format!("duplicate_ids={}", summary.duplicates));
    }
    if summary.dry_run {
        report.detail(format!("planned_inserts={}", summary.planned_inserts));
        return report;
    }
    report.detail(format!("inserted={}", summary.inserted));
    report.detail(format!("to_delete={}", summary.to_delete));
    report.detail(format!("confirmed_deleted={}", summary.confirmed_deleted));
    report.detail(format!("marked_deleted={}", summary.marked));

    if summary.not_saved > 0 {
        report.issue(format!(
            "{} row(s) not found in the sheet after insert; left in the helpdesk",
            summary.not_saved
        ));
    }
    if summary.discrepancy() > 0 {
        report.issue(format!(
            "{} of {} deletion(s) not confirmed; check those conversations by hand",
            summary.discrepancy(),
            summary.to_delete
        ));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::report_from;
    use crate::archiver::pipeline::RunSummary;

    #[test]
    fn unsaved_rows_and_unconfirmed_deletes_become_issues() {
        let summary = RunSummary {
            fetched: 3,
            normalized: 3,
            inserted: 3,
            to_delete: 3,
            confirmed_deleted: 2,
            marked: 2,
            ..RunSummary::default()
        };
        let report = report_from(&summary);
        assert!(!report.ok);
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].contains("1 of 3"));
        assert!(report.details.contains(&"marked_deleted=2".to_string()));
    }

    #[test]
    fn dry_run_reports_planned_inserts_only() {
        let summary = RunSummary {
            dry_run: true,
            fetched: 2,
            normalized: 2,
            planned_inserts: 1,
            ..RunSummary::default()
        };
        let report = report_from(&summary);
        assert!(report.ok);
        assert!(report.details.contains(&"planned_inserts=1".to_string()));
        assert!(!report.details.iter().any(|d| d.starts_with("inserted=")));
    }
}
