use clap::Subcommand;

use crate::util::{api_request, exit_error, resolve_token};

#[derive(Subcommand)]
pub enum InsightCommands {
    /// List visible insights (pass --all for the audit view)
    List {
        #[arg(long)]
        all: bool,
    },
    /// Recompute insights from recent entries
    Recompute,
    /// Dismiss an insight
    Dismiss {
        /// Insight ID
        id: String,
    },
    /// Bookmark an insight
    Bookmark {
        /// Insight ID
        id: String,
    },
}

pub async fn run(api_url: &str, command: InsightCommands) -> i32 {
    let token = match resolve_token(api_url).await {
        Ok(t) => t,
        Err(e) => exit_error(&e.to_string(), None),
    };

    match command {
        InsightCommands::List { all } => {
            let query = if all {
                vec![("all".to_string(), "true".to_string())]
            } else {
                Vec::new()
            };
            api_request(
                api_url,
                reqwest::Method::GET,
                "/v1/insights",
                Some(&token),
                None,
                &query,
            )
            .await
        }
        InsightCommands::Recompute => {
            api_request(
                api_url,
                reqwest::Method::POST,
                "/v1/insights/recompute",
                Some(&token),
                None,
                &[],
            )
            .await
        }
        InsightCommands::Dismiss { id } => {
            api_request(
                api_url,
                reqwest::Method::POST,
                &format!("/v1/insights/{id}/dismiss"),
                Some(&token),
                None,
                &[],
            )
            .await
        }
        InsightCommands::Bookmark { id } => {
            api_request(
                api_url,
                reqwest::Method::POST,
                &format!("/v1/insights/{id}/bookmark"),
                Some(&token),
                None,
                &[],
            )
            .await
        }
    }
}
