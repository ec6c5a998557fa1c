use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiverError {
    #[error("malformed conversation record {id}: {reason}")]
    MalformedRecord { id: String, reason: String },
    #[error("fetch failed for {resource}: {detail}")]
    TransientFetch { resource: String, detail: String },
    #[error("{missing} inserted row(s) missing from the verification read")]
    VerificationMismatch { missing: usize },
    #[error("deletion discrepancy: requested {requested}, confirmed {confirmed}")]
    DeletionDiscrepancy { requested: usize, confirmed: usize },
    #[error("config invalid: {0}")]
    InvalidConfig(String),
}

impl ArchiverError {
    pub fn malformed(id: &str, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            id: if id.is_empty() {
                "<missing id>".to_string()
            } else {
                id.to_string()
            },
            reason: reason.into(),
        }
    }

    pub fn fetch(resource: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::TransientFetch {
            resource: resource.into(),
            detail: format!("{detail:#}"),
        }
    }
}
