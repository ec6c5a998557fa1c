pub mod client;

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;

/// Tag as listed by the helpdesk API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: String,
    pub name: Option<String>,
}

/// Result of looking a conversation up by id.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Value),
    NotFound,
}

/// Conversation record as returned by the search endpoint. Parsed per record
/// so one malformed entry cannot fail the whole batch.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConversation {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attributes: RawAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAttributes {
    #[serde(default)]
    pub channels: Option<Vec<String>>,
    pub message_count: Option<u64>,
    pub created_at: Option<String>,
    pub ended_at: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub custom: Option<CustomFields>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFields {
    pub device_str: Option<String>,
    pub reason_for_support_str: Option<String>,
    pub from_which_chain_str: Option<String>,
    pub which_assets_str: Option<String>,
    #[serde(rename = "poolOrParingStr", alias = "poolOrPairingStr")]
    pub pool_or_pairing_str: Option<String>,
}

/// Source of record for conversations.
pub trait ConversationSource {
    /// Run the configured saved search. Records are returned unparsed.
    fn search(&self) -> Result<Vec<Value>>;
    /// Every active tag, all pages merged.
    fn tags(&self) -> Result<Vec<Tag>>;
    fn get_by_id(&self, id: &str) -> Result<Lookup>;
    fn delete_by_id(&self, id: &str) -> Result<()>;
}
