use clap::Subcommand;
use compass_core::entries::{EntryIntent, SaveMode};
use serde_json::json;
use uuid::Uuid;

use crate::util::{api_request, exit_error, resolve_token};

/// Validate intent/save-mode client-side so typos fail before the network.
fn validate_enums(intent: &str, save_mode: &str) {
    if EntryIntent::parse(intent).is_none() {
        exit_error(
            &format!("unknown intent '{intent}'"),
            Some("Valid intents: ask, journal, follow_up, mixed, log_only"),
        );
    }
    if SaveMode::parse(save_mode).is_none() {
        exit_error(
            &format!("unknown save mode '{save_mode}'"),
            Some("Valid save modes: transient, save_journal, save_factors_only"),
        );
    }
}

#[derive(Subcommand)]
pub enum EntryCommands {
    /// Submit an entry and run the full pipeline
    Submit {
        /// The text to submit, as the user typed it
        #[arg(long)]
        text: String,
        /// Intent: ask, journal, follow_up, mixed, log_only
        #[arg(long, default_value = "journal")]
        intent: String,
        /// Save mode: transient, save_journal, save_factors_only
        #[arg(long, default_value = "save_journal")]
        save_mode: String,
        /// Entry this one answers, when replying to a follow-up question
        #[arg(long)]
        parent_entry_id: Option<String>,
        /// Idempotency key (auto-generated if omitted)
        #[arg(long)]
        idempotency_key: Option<String>,
        /// Source identifier (defaults to "cli")
        #[arg(long, default_value = "cli")]
        source: String,
        /// Agent identifier
        #[arg(long)]
        agent: Option<String>,
    },
    /// Dry-run the pipeline without persisting anything
    Simulate {
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "journal")]
        intent: String,
        #[arg(long, default_value = "save_journal")]
        save_mode: String,
    },
    /// List entries with optional filters
    List {
        /// Filter by intent
        #[arg(long)]
        intent: Option<String>,
        /// Only entries after this timestamp (RFC3339)
        #[arg(long)]
        since: Option<String>,
        /// Only entries before this timestamp (RFC3339)
        #[arg(long)]
        until: Option<String>,
        /// Maximum number of entries to return
        #[arg(long)]
        limit: Option<u32>,
        /// Pagination cursor from previous response
        #[arg(long)]
        cursor: Option<String>,
    },
}

pub async fn run(api_url: &str, command: EntryCommands) -> i32 {
    let token = match resolve_token(api_url).await {
        Ok(t) => t,
        Err(e) => exit_error(&e.to_string(), None),
    };

    match command {
        EntryCommands::Submit {
            text,
            intent,
            save_mode,
            parent_entry_id,
            idempotency_key,
            source,
            agent,
        } => {
            validate_enums(&intent, &save_mode);
            let key = idempotency_key.unwrap_or_else(|| Uuid::now_v7().to_string());
            let mut body = json!({
                "text": text,
                "intent": intent,
                "save_mode": save_mode,
                "metadata": {
                    "source": source,
                    "idempotency_key": key
                }
            });
            if let Some(agent) = agent {
                body["metadata"]["agent"] = json!(agent);
            }
            if let Some(parent) = parent_entry_id {
                body["parent_entry_id"] = json!(parent);
            }
            api_request(
                api_url,
                reqwest::Method::POST,
                "/v1/entries",
                Some(&token),
                Some(body),
                &[],
            )
            .await
        }
        EntryCommands::Simulate {
            text,
            intent,
            save_mode,
        } => {
            validate_enums(&intent, &save_mode);
            let body = json!({
                "text": text,
                "intent": intent,
                "save_mode": save_mode,
                "metadata": {
                    "source": "cli",
                    "idempotency_key": Uuid::now_v7().to_string()
                }
            });
            api_request(
                api_url,
                reqwest::Method::POST,
                "/v1/entries/simulate",
                Some(&token),
                Some(body),
                &[],
            )
            .await
        }
        EntryCommands::List {
            intent,
            since,
            until,
            limit,
            cursor,
        } => {
            let mut query: Vec<(String, String)> = Vec::new();
            if let Some(intent) = intent {
                query.push(("intent".to_string(), intent));
            }
            if let Some(since) = since {
                query.push(("since".to_string(), since));
            }
            if let Some(until) = until {
                query.push(("until".to_string(), until));
            }
            if let Some(limit) = limit {
                query.push(("limit".to_string(), limit.to_string()));
            }
            if let Some(cursor) = cursor {
                query.push(("cursor".to_string(), cursor));
            }
            api_request(
                api_url,
                reqwest::Method::GET,
                "/v1/entries",
                Some(&token),
                None,
                &query,
            )
            .await
        }
    }
}
