use crate::archiver::config::SheetConfig;
use crate::archiver::normalize::COL_ID;
use crate::sheets::{CellAddress, CellValue, RowCells, SheetStore, auth};
use anyhow::{Context, Result, anyhow};
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
struct WriteRange<'a> {
    range: String,
    values: Vec<Vec<&'a CellValue>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdate<'a> {
    value_input_option: &'static str,
    data: Vec<WriteRange<'a>>,
}

/// Spreadsheet values API bound to one tab of one spreadsheet.
pub struct SheetsClient {
    base: Url,
    sheet: String,
    token: String,
    http: Client,
}

/// Quote a tab name for use in an A1 range: `My Tab` → `'My Tab'`.
pub fn quote_sheet_name(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn header_from(range: ValueRange) -> Option<Vec<String>> {
    let first = range.values.into_iter().next()?;
    let header = first.iter().map(cell_text).collect::<Vec<_>>();
    if header.iter().all(String::is_empty) {
        None
    } else {
        Some(header)
    }
}

fn project_ids(range: &ValueRange, id_column: usize) -> Vec<String> {
    range
        .values
        .iter()
        .map(|row| row.get(id_column).map(cell_text).unwrap_or_default())
        .collect()
}

fn layout_row<'a>(
    header: &[String],
    row: &'a RowCells,
    blank: &'a CellValue,
) -> Vec<&'a CellValue> {
    header
        .iter()
        .map(|column| row.get(column).unwrap_or(blank))
        .collect()
}

fn ensure_success(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    anyhow::bail!("sheet {what} failed with status {status}: {}", body.trim())
}

impl SheetsClient {
    pub fn connect(cfg: &SheetConfig, timeout_secs: u64) -> Result<Self> {
        let mut base = Url::parse(&cfg.api_base_url)
            .with_context(|| format!("invalid spreadsheet api url `{}`", cfg.api_base_url))?;
        base.path_segments_mut()
            .map_err(|_| anyhow!("spreadsheet api url cannot carry a path"))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", cfg.spreadsheet_id.as_str()]);
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        let token = auth::access_token(&http, cfg)?;
        Ok(Self {
            base,
            sheet: quote_sheet_name(&cfg.sheet_name),
            token,
            http,
        })
    }

    fn values_url(&self, range: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.extend(["values", range]);
        }
        url
    }

    fn send(&self, req: RequestBuilder, what: &str) -> Result<Response> {
        let response = req
            .bearer_auth(&self.token)
            .send()
            .with_context(|| format!("sheet {what} request failed"))?;
        ensure_success(response, what)
    }

    fn read_range(&self, range: &str, what: &str) -> Result<ValueRange> {
        let response = self.send(self.http.get(self.values_url(range)), what)?;
        response
            .json()
            .with_context(|| format!("sheet {what} returned invalid JSON"))
    }
}

impl SheetStore for SheetsClient {
    fn load_header(&self) -> Result<Option<Vec<String>>> {
        let range = self.read_range(&format!("{}!1:1", self.sheet), "header read")?;
        Ok(header_from(range))
    }

    fn set_header(&self, header: &[String]) -> Result<()> {
        let range = format!("{}!1:1", self.sheet);
        let mut url = self.values_url(&range);
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let body = serde_json::json!({ "range": range, "values": [header] });
        self.send(self.http.put(url).json(&body), "header write")?;
        debug!(columns = header.len(), "sheet header written");
        Ok(())
    }

    fn row_ids(&self, header: &[String]) -> Result<Vec<String>> {
        let id_column = header
            .iter()
            .position(|c| c == COL_ID)
            .ok_or_else(|| anyhow!("sheet header has no `{COL_ID}` column"))?;
        let range = self.read_range(&format!("{}!A2:ZZ", self.sheet), "row read")?;
        Ok(project_ids(&range, id_column))
    }

    fn append_rows(&self, header: &[String], rows: &[&RowCells]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let blank = CellValue::from("");
        let values = rows
            .iter()
            .map(|row| layout_row(header, row, &blank))
            .collect::<Vec<_>>();
        let mut url = self.values_url(&format!("{}!A1:append", self.sheet));
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        let body = serde_json::json!({ "values": values });
        self.send(self.http.post(url).json(&body), "append")?;
        debug!(rows = rows.len(), "sheet rows appended");
        Ok(())
    }

    fn update_cells(&self, cells: &BTreeMap<CellAddress, CellValue>) -> Result<()> {
        if cells.is_empty() {
            return Ok(());
        }
        let body = BatchUpdate {
            value_input_option: "RAW",
            data: cells
                .iter()
                .map(|(addr, value)| WriteRange {
                    range: format!("{}!{}", self.sheet, addr.to_a1()),
                    values: vec![vec![value]],
                })
                .collect(),
        };
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push("values:batchUpdate");
        }
        self.send(self.http.post(url).json(&body), "cell update")?;
        debug!(cells = cells.len(), "sheet cells updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ValueRange, header_from, layout_row, project_ids, quote_sheet_name};
    use crate::sheets::{CellValue, RowCells};
    use serde_json::json;

    fn range(raw: serde_json::Value) -> ValueRange {
        serde_json::from_value(raw).expect("value range")
    }

    #[test]
    fn sheet_names_are_quoted_for_a1_ranges() {
        assert_eq!(quote_sheet_name("Archive"), "'Archive'");
        assert_eq!(quote_sheet_name("Bob's tab"), "'Bob''s tab'");
    }

    #[test]
    fn empty_header_row_reads_as_none() {
        assert_eq!(header_from(range(json!({"range": "A1:Z1"}))), None);
        assert_eq!(header_from(range(json!({"values": [["", " "]]}))), None);
        assert_eq!(
            header_from(range(json!({"values": [["id", "channel"]]}))),
            Some(vec!["id".to_string(), "channel".to_string()])
        );
    }

    #[test]
    fn row_ids_keep_blank_rows_in_place() {
        let rows = range(json!({"values": [
            ["chat", "c1"],
            [],
            ["email"],
            ["sms", 42]
        ]}));
        assert_eq!(project_ids(&rows, 1), ["c1", "", "", "42"]);
    }

    #[test]
    fn rows_follow_header_order_with_blanks_for_gaps() {
        let header = ["id", "device", "tags"].map(str::to_string);
        let row = RowCells::from([
            ("tags".to_string(), CellValue::from("vip")),
            ("id".to_string(), CellValue::from("c1")),
        ]);
        let blank = CellValue::from("");
        let laid = layout_row(&header, &row, &blank);
        assert_eq!(
            serde_json::to_value(&laid).expect("json"),
            json!(["c1", "", "vip"])
        );
    }
}
