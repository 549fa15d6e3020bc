use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// What the user was doing when they submitted the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntryIntent {
    Ask,
    Journal,
    FollowUp,
    Mixed,
    LogOnly,
}

/// How much of the submission the user asked us to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    Transient,
    SaveJournal,
    SaveFactorsOnly,
}

impl EntryIntent {
    pub const ALL: [EntryIntent; 5] = [
        EntryIntent::Ask,
        EntryIntent::Journal,
        EntryIntent::FollowUp,
        EntryIntent::Mixed,
        EntryIntent::LogOnly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntryIntent::Ask => "ask",
            EntryIntent::Journal => "journal",
            EntryIntent::FollowUp => "follow_up",
            EntryIntent::Mixed => "mixed",
            EntryIntent::LogOnly => "log_only",
        }
    }

    pub fn parse(value: &str) -> Option<EntryIntent> {
        EntryIntent::ALL.into_iter().find(|i| i.as_str() == value)
    }
}

impl SaveMode {
    pub const ALL: [SaveMode; 3] = [SaveMode::Transient, SaveMode::SaveJournal, SaveMode::SaveFactorsOnly];

    pub fn as_str(self) -> &'static str {
        match self {
            SaveMode::Transient => "transient",
            SaveMode::SaveJournal => "save_journal",
            SaveMode::SaveFactorsOnly => "save_factors_only",
        }
    }

    pub fn parse(value: &str) -> Option<SaveMode> {
        SaveMode::ALL.into_iter().find(|m| m.as_str() == value)
    }
}

/// Metadata about how an entry was created. Not the entry itself, but context about it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EntryMetadata {
    /// How the entry was created: "cli", "api", "app"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Which agent created this, when submitted on the user's behalf
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Client-generated idempotency key for deduplication
    pub idempotency_key: String,
}

/// A single user submission. Entries are immutable — once written, never changed.
/// One entry per submission; follow-up answers link back via `parent_entry_id`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Entry {
    /// Unique entry ID (UUIDv7 — time-sortable)
    pub id: Uuid,
    /// Owner of this entry
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Links a follow-up answer to the entry whose question it answers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_entry_id: Option<Uuid>,
    pub intent: EntryIntent,
    pub save_mode: SaveMode,
    /// The submitted free text. Absent for transient entries the user chose
    /// not to keep verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    pub metadata: EntryMetadata,
}

/// Request to submit a new entry
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateEntryRequest {
    /// The free text the user typed
    pub text: String,
    pub intent: EntryIntent,
    #[serde(default = "default_save_mode")]
    pub save_mode: SaveMode,
    /// Set when this entry answers a pending follow-up question
    #[serde(default)]
    pub parent_entry_id: Option<Uuid>,
    /// A risk screen upstream of the API flagged this submission
    #[serde(default)]
    pub upstream_risk_flag: bool,
    pub metadata: EntryMetadata,
}

fn default_save_mode() -> SaveMode {
    SaveMode::SaveJournal
}

/// Cursor-based pagination
#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T: Serialize> {
    pub data: Vec<T>,
    /// Cursor for the next page. None if this is the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    /// Whether there are more results after this page
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_mode_defaults_to_journal() {
        let req: CreateEntryRequest = serde_json::from_value(serde_json::json!({
            "text": "slept badly again",
            "intent": "journal",
            "metadata": {"idempotency_key": "k-1"}
        }))
        .unwrap();
        assert_eq!(req.save_mode, SaveMode::SaveJournal);
        assert!(req.parent_entry_id.is_none());
    }

    #[test]
    fn intent_wire_format() {
        assert_eq!(
            serde_json::to_string(&EntryIntent::LogOnly).unwrap(),
            "\"log_only\""
        );
        assert_eq!(
            serde_json::to_string(&SaveMode::SaveFactorsOnly).unwrap(),
            "\"save_factors_only\""
        );
    }
}
