//! In-memory stand-ins for the helpdesk API, the archive sheet and the audit
//! sink, shared by the unit tests.

use crate::archiver::audit::{AuditSink, EventLogEntry};
use crate::archiver::reconcile::DEFAULT_HEADER;
use crate::helpdesk::{ConversationSource, Lookup, Tag};
use crate::sheets::{CellAddress, CellValue, RowCells, SheetStore};
use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

pub fn conversation(id: &str) -> Value {
    json!({
        "id": id,
        "attributes": {
            "channels": ["chat"],
            "messageCount": 3,
            "createdAt": "2022-05-21T06:57:10.123Z",
            "endedAt": "2022-05-21T07:10:00.000Z",
            "tags": [],
            "custom": { "deviceStr": "iPhone" }
        }
    })
}

fn id_set(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

/// Fake helpdesk. `calls` records only per-id traffic (`delete:<id>`,
/// `get:<id>`) so tests can assert ordering.
#[derive(Default)]
pub struct FakeSource {
    conversations: Vec<Value>,
    tags: Vec<Tag>,
    fail_tags: bool,
    fail_search: bool,
    stubborn: HashSet<String>,
    delete_errors: HashSet<String>,
    lookup_errors: HashSet<String>,
    deleted: RefCell<HashSet<String>>,
    calls: RefCell<Vec<String>>,
}

impl FakeSource {
    pub fn with_conversations(conversations: Vec<Value>) -> Self {
        Self {
            conversations,
            ..Self::default()
        }
    }

    pub fn with_ids(ids: &[&str]) -> Self {
        Self::with_conversations(ids.iter().map(|id| conversation(id)).collect())
    }

    pub fn failing_tags(mut self) -> Self {
        self.fail_tags = true;
        self
    }

    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    /// Deletes of these ids report success but leave the record in place.
    pub fn stubborn(mut self, ids: &[&str]) -> Self {
        self.stubborn = id_set(ids);
        self
    }

    /// Deletes of these ids fail and leave the record in place.
    pub fn delete_errors(mut self, ids: &[&str]) -> Self {
        self.delete_errors = id_set(ids);
        self
    }

    pub fn lookup_errors(mut self, ids: &[&str]) -> Self {
        self.lookup_errors = id_set(ids);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn exists(&self, id: &str) -> bool {
        !self.deleted.borrow().contains(id)
            && self
                .conversations
                .iter()
                .any(|c| c.get("id").and_then(Value::as_str) == Some(id))
    }
}

impl ConversationSource for FakeSource {
    fn search(&self) -> Result<Vec<Value>> {
        if self.fail_search {
            return Err(anyhow!("search returned 503"));
        }
        Ok(self
            .conversations
            .iter()
            .filter(|c| {
                c.get("id")
                    .and_then(Value::as_str)
                    .is_none_or(|id| !self.deleted.borrow().contains(id))
            })
            .cloned()
            .collect())
    }

    fn tags(&self) -> Result<Vec<Tag>> {
        if self.fail_tags {
            return Err(anyhow!("tags returned 500"));
        }
        Ok(self.tags.clone())
    }

    fn get_by_id(&self, id: &str) -> Result<Lookup> {
        self.calls.borrow_mut().push(format!("get:{id}"));
        if self.lookup_errors.contains(id) {
            return Err(anyhow!("lookup of {id} timed out"));
        }
        if self.exists(id) {
            Ok(Lookup::Found(json!({ "id": id })))
        } else {
            Ok(Lookup::NotFound)
        }
    }

    fn delete_by_id(&self, id: &str) -> Result<()> {
        self.calls.borrow_mut().push(format!("delete:{id}"));
        if self.delete_errors.contains(id) {
            return Err(anyhow!("delete of {id} returned 500"));
        }
        if !self.stubborn.contains(id) {
            self.deleted.borrow_mut().insert(id.to_string());
        }
        Ok(())
    }
}

/// Fake archive sheet keeping rows as column-name maps.
#[derive(Default)]
pub struct FakeSheet {
    header: RefCell<Option<Vec<String>>>,
    rows: RefCell<Vec<RowCells>>,
    lose_on_append: HashSet<String>,
    calls: RefCell<Vec<&'static str>>,
}

impl FakeSheet {
    pub fn with_header(header: &[&str], ids: &[&str]) -> Self {
        let rows = ids
            .iter()
            .map(|id| RowCells::from([("id".to_string(), CellValue::from(*id))]))
            .collect();
        Self {
            header: RefCell::new(Some(header.iter().map(|c| c.to_string()).collect())),
            rows: RefCell::new(rows),
            ..Self::default()
        }
    }

    pub fn with_rows(ids: &[&str]) -> Self {
        Self::with_header(&DEFAULT_HEADER, ids)
    }

    /// Appends of these ids are acknowledged but never stored.
    pub fn losing(mut self, ids: &[&str]) -> Self {
        self.lose_on_append = id_set(ids);
        self
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls.borrow().iter().filter(|c| **c == name).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn header_now(&self) -> Vec<String> {
        self.header.borrow().clone().unwrap_or_default()
    }

    pub fn ids(&self) -> Vec<String> {
        self.rows.borrow().iter().map(row_id).collect()
    }

    /// Cell at 1-based sheet `row` (row 2 is the first data row).
    pub fn cell(&self, row: usize, column: &str) -> Option<CellValue> {
        let rows = self.rows.borrow();
        rows.get(row.checked_sub(2)?)?.get(column).cloned()
    }
}

fn row_id(row: &RowCells) -> String {
    match row.get("id") {
        Some(CellValue::Text(id)) => id.clone(),
        _ => String::new(),
    }
}

impl SheetStore for FakeSheet {
    fn load_header(&self) -> Result<Option<Vec<String>>> {
        self.calls.borrow_mut().push("load_header");
        Ok(self.header.borrow().clone())
    }

    fn set_header(&self, header: &[String]) -> Result<()> {
        self.calls.borrow_mut().push("set_header");
        *self.header.borrow_mut() = Some(header.to_vec());
        Ok(())
    }

    fn row_ids(&self, _header: &[String]) -> Result<Vec<String>> {
        self.calls.borrow_mut().push("row_ids");
        Ok(self.ids())
    }

    fn append_rows(&self, _header: &[String], rows: &[&RowCells]) -> Result<()> {
        self.calls.borrow_mut().push("append_rows");
        let mut stored = self.rows.borrow_mut();
        for row in rows {
            if !self.lose_on_append.contains(&row_id(row)) {
                stored.push((*row).clone());
            }
        }
        Ok(())
    }

    fn update_cells(&self, cells: &BTreeMap<CellAddress, CellValue>) -> Result<()> {
        self.calls.borrow_mut().push("update_cells");
        let header = self.header_now();
        let mut rows = self.rows.borrow_mut();
        for (addr, value) in cells {
            let column = header
                .get(addr.column)
                .ok_or_else(|| anyhow!("no column at {addr}"))?;
            let row = rows
                .get_mut(addr.row - 2)
                .ok_or_else(|| anyhow!("no row at {addr}"))?;
            row.insert(column.clone(), value.clone());
        }
        Ok(())
    }
}

/// Audit sink sharing its buffer with the test that created it.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Rc<RefCell<Vec<EventLogEntry>>>,
    flushes: Rc<RefCell<usize>>,
}

impl MemorySink {
    pub fn entries(&self) -> Vec<EventLogEntry> {
        self.entries.borrow().clone()
    }

    pub fn flushes(&self) -> usize {
        *self.flushes.borrow()
    }
}

impl AuditSink for MemorySink {
    fn write_entries(&mut self, entries: &[EventLogEntry]) -> Result<()> {
        *self.flushes.borrow_mut() += 1;
        self.entries.borrow_mut().extend_from_slice(entries);
        Ok(())
    }
}
