use crate::archiver::util::now_rfc3339;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventLogEntry {
    pub environment: String,
    pub at: String,
    pub status: EventStatus,
    pub resource: String,
    pub action: String,
    pub detail: String,
}

/// Destination for a run's buffered audit entries.
pub trait AuditSink {
    fn write_entries(&mut self, entries: &[EventLogEntry]) -> Result<()>;
}

/// Appends entries as JSON lines to `audit.log`.
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join("audit.log"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn write_entries(&mut self, entries: &[EventLogEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut out = String::new();
        for entry in entries {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(out.as_bytes())
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// Per-run audit buffer. Entries accumulate in memory and reach the sink
/// exactly once: through [`AuditLog::flush`], or on drop if the run unwound
/// before getting there.
pub struct AuditLog {
    environment: String,
    entries: Vec<EventLogEntry>,
    sink: Box<dyn AuditSink>,
    flushed: bool,
}

impl AuditLog {
    pub fn new(environment: &str, sink: Box<dyn AuditSink>) -> Self {
        Self {
            environment: environment.to_string(),
            entries: Vec::new(),
            sink,
            flushed: false,
        }
    }

    pub fn record(&mut self, status: EventStatus, resource: &str, action: &str, detail: &str) {
        self.entries.push(EventLogEntry {
            environment: self.environment.clone(),
            at: now_rfc3339(),
            status,
            resource: resource.to_string(),
            action: action.to_string(),
            detail: detail.to_string(),
        });
    }

    pub fn success(&mut self, resource: &str, action: &str, detail: &str) {
        self.record(EventStatus::Success, resource, action, detail);
    }

    pub fn fail(&mut self, resource: &str, action: &str, detail: &str) {
        self.record(EventStatus::Fail, resource, action, detail);
    }

    pub fn entries(&self) -> &[EventLogEntry] {
        &self.entries
    }

    pub fn flush(mut self) -> Result<usize> {
        self.flush_inner()
    }

    fn flush_inner(&mut self) -> Result<usize> {
        if self.flushed {
            return Ok(0);
        }
        self.flushed = true;
        let entries = std::mem::take(&mut self.entries);
        self.sink.write_entries(&entries)?;
        Ok(entries.len())
    }
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        if self.flushed {
            return;
        }
        if let Err(err) = self.flush_inner() {
            error!("audit log flush on drop failed: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AuditLog, AuditSink, EventStatus, JsonlAuditSink};
    use crate::archiver::testing::MemorySink;
    use tempfile::tempdir;

    #[test]
    fn flush_writes_every_entry_once() {
        let sink = MemorySink::default();
        let mut audit = AuditLog::new("prod", Box::new(sink.clone()));
        audit.success("tags", "resolve", "3 tags");
        audit.fail("sheet", "append", "boom");
        assert_eq!(audit.entries().len(), 2);

        assert_eq!(audit.flush().expect("flush"), 2);
        let written = sink.entries();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].environment, "prod");
        assert_eq!(written[1].status, EventStatus::Fail);
        assert_eq!(sink.flushes(), 1);
    }

    #[test]
    fn dropping_without_flush_still_reaches_the_sink() {
        let sink = MemorySink::default();
        {
            let mut audit = AuditLog::new("dev", Box::new(sink.clone()));
            audit.success("run", "summary", "ok");
        }
        assert_eq!(sink.entries().len(), 1);
        assert_eq!(sink.flushes(), 1);
    }

    #[test]
    fn jsonl_sink_appends_lines() {
        let tmp = tempdir().expect("tempdir");
        let mut sink = JsonlAuditSink::in_dir(&tmp.path().join("logs"));
        let mut audit = AuditLog::new("dev", Box::new(NullSink));
        audit.success("run", "summary", "first");
        sink.write_entries(audit.entries()).expect("write");
        sink.write_entries(audit.entries()).expect("write again");

        let raw = std::fs::read_to_string(sink.path()).expect("read");
        let lines = raw.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(parsed["status"], "success");
        assert_eq!(parsed["detail"], "first");
    }

    struct NullSink;

    impl AuditSink for NullSink {
        fn write_entries(&mut self, _entries: &[super::EventLogEntry]) -> anyhow::Result<()> {
            Ok(())
        }
    }
}
