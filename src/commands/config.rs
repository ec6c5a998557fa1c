use anyhow::Result;
use std::env;

use crate::archiver::config::{ArchiverConfig, unknown_env_keys, validate};
use crate::commands::CommandReport;

pub fn run(cfg: &ArchiverConfig) -> Result<CommandReport> {
    let mut report = CommandReport::new("config");
    let shown = cfg.redacted();

    report.detail(format!("environment={}", shown.environment));
    report.detail(format!("debug={}", shown.debug));
    report.detail(format!("log_dir={}", cfg.log_dir()?.display()));
    report.detail(format!("helpdesk.base_url={}", shown.helpdesk.base_url));
    report.detail(format!("helpdesk.api_key={}", shown.helpdesk.api_key));
    report.detail(format!(
        "helpdesk.auth={}",
        if cfg.uses_cookie_auth() { "session-cookie" } else { "bearer" }
    ));
    report.detail(format!("helpdesk.search_id={}", shown.helpdesk.search_id));
    report.detail(format!(
        "helpdesk.page_sizes=search:{} tags:{} max_tag_pages:{}",
        shown.helpdesk.search_page_size, shown.helpdesk.tag_page_size, shown.helpdesk.max_tag_pages
    ));
    report.detail(format!("sheet.api_base_url={}", shown.sheet.api_base_url));
    report.detail(format!("sheet.spreadsheet_id={}", shown.sheet.spreadsheet_id));
    report.detail(format!("sheet.sheet_name={}", shown.sheet.sheet_name));
    if let Some(path) = &shown.sheet.credentials_path {
        report.detail(format!("sheet.credentials_path={path}"));
    }
    if let Some(token) = &shown.sheet.access_token {
        report.detail(format!("sheet.access_token={token}"));
    }

    if let Err(err) = validate(cfg) {
        report.issue(err.to_string());
    }
    for key in unknown_env_keys(env::vars().map(|(key, _)| key)) {
        report.issue(format!("unknown environment variable {key}; check for a typo"));
    }

    Ok(report)
}
