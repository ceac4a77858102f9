use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted state of one tracked word.
///
/// Field names follow the extension storage schema (`queryTimes`,
/// `deleteTimes`, `isDeleted`) so collections written by either side stay
/// readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordRecord {
    pub word: String,
    pub query_times: u32,
    pub delete_times: u32,
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

impl WordRecord {
    pub fn new(word: &str) -> Self {
        Self {
            word: canonical_word(word),
            query_times: 1,
            delete_times: 0,
            is_deleted: false,
            definition: None,
            example: None,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }
}

/// Canonical word → record. Always read and written whole.
pub type WordCollection = BTreeMap<String, WordRecord>;

/// Lowercased, trimmed key form of a word.
pub fn canonical_word(word: &str) -> String {
    word.trim().to_lowercase()
}
