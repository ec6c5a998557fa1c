use crate::error::ArchiverError;
use crate::helpdesk::{ConversationSource, Tag};
use std::collections::HashMap;
use tracing::info;

/// Tag id → display name for one run. Tags without a name map to `""`.
#[derive(Debug, Clone, Default)]
pub struct TagLookup {
    names: HashMap<String, String>,
}

impl TagLookup {
    pub fn from_tags(tags: impl IntoIterator<Item = Tag>) -> Self {
        let names = tags
            .into_iter()
            .map(|tag| (tag.id, tag.name.unwrap_or_default()))
            .collect();
        Self { names }
    }

    pub fn name(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

/// Fetch every active tag and build the lookup. A failed fetch is returned
/// as-is; no partial lookup is ever produced.
pub fn resolve_tags(source: &dyn ConversationSource) -> Result<TagLookup, ArchiverError> {
    let tags = source
        .tags()
        .map_err(|err| ArchiverError::fetch("tags", err))?;
    let lookup = TagLookup::from_tags(tags);
    info!(stage = "tags", count = lookup.len(), "tag lookup built");
    Ok(lookup)
}

#[cfg(test)]
mod tests {
    use super::{TagLookup, resolve_tags};
    use crate::archiver::testing::FakeSource;
    use crate::error::ArchiverError;
    use crate::helpdesk::Tag;

    #[test]
    fn missing_names_resolve_to_empty_string() {
        let lookup = TagLookup::from_tags(vec![
            Tag {
                id: "t1".to_string(),
                name: Some("vip".to_string()),
            },
            Tag {
                id: "t2".to_string(),
                name: None,
            },
        ]);
        assert_eq!(lookup.name("t1"), Some("vip"));
        assert_eq!(lookup.name("t2"), Some(""));
        assert_eq!(lookup.name("t3"), None);
    }

    #[test]
    fn fetch_failure_propagates() {
        let source = FakeSource::default().failing_tags();
        let err = resolve_tags(&source).expect_err("tag fetch should fail");
        assert!(matches!(err, ArchiverError::TransientFetch { ref resource, .. } if resource == "tags"));
    }
}
