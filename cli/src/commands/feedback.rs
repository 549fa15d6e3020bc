use clap::Subcommand;
use serde_json::json;

use crate::util::{api_request, exit_error, resolve_token};

#[derive(Subcommand)]
pub enum FeedbackCommands {
    /// Record whether a response was helpful
    Send {
        /// The entry whose response this feedback is about
        #[arg(long)]
        entry_id: String,
        /// Was the response helpful?
        #[arg(long)]
        helpful: bool,
        /// Optional free-text note
        #[arg(long)]
        note: Option<String>,
    },
}

pub async fn run(api_url: &str, command: FeedbackCommands) -> i32 {
    let token = match resolve_token(api_url).await {
        Ok(t) => t,
        Err(e) => exit_error(&e.to_string(), None),
    };

    match command {
        FeedbackCommands::Send {
            entry_id,
            helpful,
            note,
        } => {
            let mut body = json!({
                "entry_id": entry_id,
                "helpful": helpful
            });
            if let Some(note) = note {
                body["note"] = json!(note);
            }
            api_request(
                api_url,
                reqwest::Method::POST,
                "/v1/feedback",
                Some(&token),
                Some(body),
                &[],
            )
            .await
        }
    }
}
