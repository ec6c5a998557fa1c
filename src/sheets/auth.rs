//! Access tokens for the spreadsheet API.
//!
//! A static bearer token from config wins. Otherwise the service-account key
//! file is used to sign an RS256 grant which is exchanged at the key's token
//! endpoint.

use crate::archiver::config::SheetConfig;
use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const GRANT_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl ServiceAccountKey {
    pub fn token_uri(&self) -> &str {
        self.token_uri
            .as_deref()
            .filter(|uri| !uri.trim().is_empty())
            .unwrap_or(DEFAULT_TOKEN_URI)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct GrantClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub fn load_service_account(path: &Path) -> Result<ServiceAccountKey> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read service account key {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid service account key {}", path.display()))
}

fn grant_claims(key: &ServiceAccountKey, issued_at: i64) -> GrantClaims {
    GrantClaims {
        iss: key.client_email.clone(),
        scope: SCOPE.to_string(),
        aud: key.token_uri().to_string(),
        iat: issued_at,
        exp: issued_at + GRANT_LIFETIME_SECS,
    }
}

fn signed_assertion(key: &ServiceAccountKey, issued_at: i64) -> Result<String> {
    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .context("service account private key is not a valid RSA PEM")?;
    jsonwebtoken::encode(
        &Header::new(Algorithm::RS256),
        &grant_claims(key, issued_at),
        &signing_key,
    )
    .context("failed to sign service account grant")
}

pub fn access_token(http: &Client, cfg: &SheetConfig) -> Result<String> {
    if let Some(token) = cfg.access_token.as_deref() {
        return Ok(token.to_string());
    }
    let Some(path) = cfg.credentials_path.as_deref() else {
        anyhow::bail!("no spreadsheet credentials configured");
    };

    let key = load_service_account(Path::new(path))?;
    let assertion = signed_assertion(&key, Utc::now().timestamp())?;
    let response = http
        .post(key.token_uri())
        .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
        .send()
        .context("token exchange request failed")?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        anyhow::bail!("token exchange failed with status {status}: {}", body.trim());
    }
    let token: TokenResponse = response
        .json()
        .context("token exchange returned invalid JSON")?;
    debug!(account = %key.client_email, "spreadsheet access token issued");
    Ok(token.access_token)
}
