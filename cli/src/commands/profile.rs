use clap::Subcommand;

use crate::util::{api_request, exit_error, resolve_token};

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Get the current complexity profile
    Get,
    /// Replay the factor log and verify it matches the incremental profile
    Rebuild,
}

pub async fn run(api_url: &str, command: ProfileCommands) -> i32 {
    let token = match resolve_token(api_url).await {
        Ok(t) => t,
        Err(e) => exit_error(&e.to_string(), None),
    };

    match command {
        ProfileCommands::Get => {
            api_request(
                api_url,
                reqwest::Method::GET,
                "/v1/profile",
                Some(&token),
                None,
                &[],
            )
            .await
        }
        ProfileCommands::Rebuild => {
            api_request(
                api_url,
                reqwest::Method::POST,
                "/v1/profile/rebuild",
                Some(&token),
                None,
                &[],
            )
            .await
        }
    }
}
