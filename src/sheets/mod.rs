pub mod auth;
pub mod client;

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Scalar stored in one spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(u64),
    Bool(bool),
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// One cell in the archive sheet. `column` is the 0-based header index and
/// `row` the 1-based sheet row (row 1 is the header).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellAddress {
    pub column: usize,
    pub row: usize,
}

impl CellAddress {
    pub fn to_a1(self) -> String {
        format!("{}{}", column_letter(self.column), self.row)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// Bijective base-26 column name: 0 → `A`, 25 → `Z`, 26 → `AA`.
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Row data keyed by column name, as handed to [`SheetStore::append_rows`].
pub type RowCells = BTreeMap<String, CellValue>;

/// Backing store for the archive sheet.
pub trait SheetStore {
    /// Header row, or `None` when the sheet has none yet.
    fn load_header(&self) -> Result<Option<Vec<String>>>;
    fn set_header(&self, header: &[String]) -> Result<()>;
    /// Value of the `id` column for every data row, in sheet order. Blank
    /// rows keep their position as empty strings.
    fn row_ids(&self, header: &[String]) -> Result<Vec<String>>;
    /// Append rows in one bulk write, laid out in `header` order.
    fn append_rows(&self, header: &[String], rows: &[&RowCells]) -> Result<()>;
    fn update_cells(&self, cells: &BTreeMap<CellAddress, CellValue>) -> Result<()>;
}
