use crate::archiver::normalize::COL_DELETED_AT;
use crate::sheets::{CellAddress, CellValue, SheetStore};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashSet};
use tracing::info;

/// Sheet row holding the first id: one header row, 1-based numbering.
pub const FIRST_DATA_ROW: usize = 2;

pub fn row_for_index(index: usize) -> usize {
    index + FIRST_DATA_ROW
}

/// Cells to stamp for every row whose id was confirmed deleted. Row position
/// in `current_ids` decides the sheet row.
pub fn deletion_marks(
    current_ids: &[String],
    confirmed: &[String],
    column: usize,
    stamp: &str,
) -> BTreeMap<CellAddress, CellValue> {
    let confirmed = confirmed.iter().map(String::as_str).collect::<HashSet<_>>();
    current_ids
        .iter()
        .enumerate()
        .filter(|(_, id)| confirmed.contains(id.as_str()))
        .map(|(index, _)| {
            (
                CellAddress {
                    column,
                    row: row_for_index(index),
                },
                CellValue::from(stamp),
            )
        })
        .collect()
}

/// Write `stamp` into the deleted-at column of every confirmed row. Adds the
/// column to the header first when it is missing. Issues no write at all
/// when there is nothing to mark.
pub fn mark_deleted(
    store: &dyn SheetStore,
    header: &[String],
    current_ids: &[String],
    confirmed: &[String],
    stamp: &str,
) -> Result<usize> {
    if confirmed.is_empty() {
        return Ok(0);
    }

    let column = match header.iter().position(|c| c == COL_DELETED_AT) {
        Some(column) => column,
        None => {
            let mut grown = header.to_vec();
            grown.push(COL_DELETED_AT.to_string());
            store
                .set_header(&grown)
                .context("failed to add deleted-at column")?;
            grown.len() - 1
        }
    };

    let cells = deletion_marks(current_ids, confirmed, column, stamp);
    if cells.is_empty() {
        info!(stage = "mark-deleted", "no sheet rows match confirmed deletions");
        return Ok(0);
    }

    store
        .update_cells(&cells)
        .context("failed to write deletion timestamps")?;
    info!(stage = "mark-deleted", count = cells.len(), "deletion timestamps written");
    Ok(cells.len())
}
