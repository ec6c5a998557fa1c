use crate::error::ArchiverError;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

include!(concat!(env!("OUT_DIR"), "/archiver_env_allowlist.rs"));

const REDACTED: &str = "<redacted>";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HelpdeskConfig {
    pub base_url: String,
    pub api_key: String,
    pub csrf_header_token: Option<String>,
    pub csrf_cookie_token: Option<String>,
    pub search_id: String,
    pub search_page_size: u32,
    pub tag_page_size: u32,
    pub max_tag_pages: u32,
    pub request_timeout_secs: u64,
}

impl Default for HelpdeskConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.kustomerapp.com".to_string(),
            api_key: String::new(),
            csrf_header_token: None,
            csrf_cookie_token: None,
            search_id: String::new(),
            search_page_size: 30,
            tag_page_size: 50,
            max_tag_pages: 20,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    pub api_base_url: String,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub credentials_path: Option<String>,
    pub access_token: Option<String>,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://sheets.googleapis.com".to_string(),
            spreadsheet_id: String::new(),
            sheet_name: "Archive".to_string(),
            credentials_path: None,
            access_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuditConfig {
    pub log_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiverConfig {
    pub environment: String,
    pub debug: bool,
    pub helpdesk: HelpdeskConfig,
    pub sheet: SheetConfig,
    pub audit: AuditConfig,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            environment: "dev".to_string(),
            debug: false,
            helpdesk: HelpdeskConfig::default(),
            sheet: SheetConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl ArchiverConfig {
    /// Directory holding `audit.log` and the run lock.
    pub fn log_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = self.audit.log_dir.as_deref().filter(|d| !d.trim().is_empty()) {
            return Ok(PathBuf::from(dir.trim()));
        }
        if let Some(home) = env_non_empty("ARCHIVER_HOME") {
            return Ok(PathBuf::from(home).join("logs"));
        }
        let home = dirs::home_dir().ok_or_else(|| anyhow!("HOME directory could not be resolved"))?;
        Ok(home.join(".convo-archiver").join("logs"))
    }

    pub fn uses_cookie_auth(&self) -> bool {
        self.helpdesk.csrf_header_token.is_some() && self.helpdesk.csrf_cookie_token.is_some()
    }

    /// Copy safe to print: every credential replaced by a marker.
    pub fn redacted(&self) -> Self {
        let mut out = self.clone();
        if !out.helpdesk.api_key.is_empty() {
            out.helpdesk.api_key = REDACTED.to_string();
        }
        for token in [
            &mut out.helpdesk.csrf_header_token,
            &mut out.helpdesk.csrf_cookie_token,
            &mut out.sheet.access_token,
        ] {
            if token.is_some() {
                *token = Some(REDACTED.to_string());
            }
        }
        out
    }
}

fn env_non_empty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn env_or_u32(var: &str, fallback: u32) -> u32 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u32>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    env_non_empty(var).unwrap_or_else(|| fallback.to_string())
}

fn env_or_optional(var: &str, fallback: Option<String>) -> Option<String> {
    env_non_empty(var).or(fallback.filter(|v| !v.trim().is_empty()))
}

pub fn validate(cfg: &ArchiverConfig) -> Result<(), ArchiverError> {
    fn invalid(msg: &str) -> Result<(), ArchiverError> {
        Err(ArchiverError::InvalidConfig(msg.to_string()))
    }

    if cfg.environment.trim().is_empty() {
        return invalid("environment name cannot be empty");
    }
    if cfg.helpdesk.api_key.trim().is_empty() {
        return invalid("helpdesk api key is required (ARCHIVER_HELPDESK_API_KEY)");
    }
    if cfg.helpdesk.search_id.trim().is_empty() {
        return invalid("helpdesk saved search id is required (ARCHIVER_SEARCH_ID)");
    }
    if cfg.helpdesk.search_page_size == 0 || cfg.helpdesk.tag_page_size == 0 {
        return invalid("page sizes must be >= 1");
    }
    if cfg.helpdesk.max_tag_pages == 0 {
        return invalid("max tag pages must be >= 1");
    }
    if cfg.helpdesk.request_timeout_secs == 0 {
        return invalid("request timeout must be >= 1 second");
    }
    if cfg.sheet.spreadsheet_id.trim().is_empty() {
        return invalid("spreadsheet id is required (ARCHIVER_SPREADSHEET_ID)");
    }
    if cfg.sheet.sheet_name.trim().is_empty() {
        return invalid("sheet name cannot be empty");
    }
    if cfg.sheet.credentials_path.is_none() && cfg.sheet.access_token.is_none() {
        return invalid(
            "spreadsheet auth requires ARCHIVER_SHEETS_CREDENTIALS or ARCHIVER_SHEETS_ACCESS_TOKEN",
        );
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Some(custom) = env_non_empty("ARCHIVER_CONFIG_PATH") {
        return Some(PathBuf::from(custom));
    }

    let home = dirs::home_dir()?;
    Some(home.join(".config").join("convo-archiver").join("config.toml"))
}

fn merge_file_config(base: &mut ArchiverConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    *base = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse archiver config {}: {err}", path.display()))?;
    Ok(())
}

fn apply_env_overrides(cfg: &mut ArchiverConfig) {
    cfg.environment = env_or_string("ARCHIVER_ENVIRONMENT", &cfg.environment);
    cfg.debug = env_or_bool("ARCHIVER_DEBUG", cfg.debug);

    let helpdesk = &mut cfg.helpdesk;
    helpdesk.base_url = env_or_string("ARCHIVER_HELPDESK_BASE_URL", &helpdesk.base_url);
    helpdesk.api_key = env_or_string("ARCHIVER_HELPDESK_API_KEY", &helpdesk.api_key);
    helpdesk.csrf_header_token =
        env_or_optional("ARCHIVER_HELPDESK_CSRF_HEADER", helpdesk.csrf_header_token.take());
    helpdesk.csrf_cookie_token =
        env_or_optional("ARCHIVER_HELPDESK_CSRF_COOKIE", helpdesk.csrf_cookie_token.take());
    helpdesk.search_id = env_or_string("ARCHIVER_SEARCH_ID", &helpdesk.search_id);
    helpdesk.search_page_size = env_or_u32("ARCHIVER_SEARCH_PAGE_SIZE", helpdesk.search_page_size);
    helpdesk.tag_page_size = env_or_u32("ARCHIVER_TAG_PAGE_SIZE", helpdesk.tag_page_size);
    helpdesk.max_tag_pages = env_or_u32("ARCHIVER_MAX_TAG_PAGES", helpdesk.max_tag_pages);
    helpdesk.request_timeout_secs =
        env_or_u64("ARCHIVER_REQUEST_TIMEOUT_SECS", helpdesk.request_timeout_secs);

    let sheet = &mut cfg.sheet;
    sheet.api_base_url = env_or_string("ARCHIVER_SHEETS_BASE_URL", &sheet.api_base_url);
    sheet.spreadsheet_id = env_or_string("ARCHIVER_SPREADSHEET_ID", &sheet.spreadsheet_id);
    sheet.sheet_name = env_or_string("ARCHIVER_SHEET_NAME", &sheet.sheet_name);
    sheet.credentials_path =
        env_or_optional("ARCHIVER_SHEETS_CREDENTIALS", sheet.credentials_path.take());
    sheet.access_token = env_or_optional("ARCHIVER_SHEETS_ACCESS_TOKEN", sheet.access_token.take());

    cfg.audit.log_dir = env_or_optional("ARCHIVER_LOG_DIR", cfg.audit.log_dir.take());
}

/// Defaults, then the TOML file, then environment overrides. Not validated.
pub fn load_effective_config() -> Result<ArchiverConfig> {
    let mut cfg = ArchiverConfig::default();
    merge_file_config(&mut cfg)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

pub fn load_config() -> Result<ArchiverConfig> {
    let cfg = load_effective_config()?;
    validate(&cfg)?;
    Ok(cfg)
}

/// `ARCHIVER_*` variable names present in `vars` that nothing in the crate reads.
pub fn unknown_env_keys<I>(vars: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out = vars
        .into_iter()
        .filter(|key| key.starts_with("ARCHIVER_"))
        .filter(|key| !GENERATED_ARCHIVER_ENV_ALLOWLIST.contains(&key.as_str()))
        .collect::<Vec<_>>();
    out.sort();
    out.dedup();
    out
}
