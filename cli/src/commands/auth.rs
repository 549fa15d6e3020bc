use chrono::Utc;
use clap::Subcommand;
use serde_json::json;

use crate::util::{
    StoredCredentials, TokenResponse, api_request, client, exit_error, save_credentials,
};

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Register a new account. Prints an API key exactly once.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        display_name: Option<String>,
    },
    /// Sign in and store tokens in the CLI config
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

pub async fn run(api_url: &str, command: AuthCommands) -> i32 {
    match command {
        AuthCommands::Register {
            email,
            password,
            display_name,
        } => {
            let mut body = json!({
                "email": email,
                "password": password
            });
            if let Some(name) = display_name {
                body["display_name"] = json!(name);
            }
            api_request(
                api_url,
                reqwest::Method::POST,
                "/v1/auth/register",
                None,
                Some(body),
                &[],
            )
            .await
        }
        AuthCommands::Login { email, password } => login(api_url, &email, &password).await,
    }
}

async fn login(api_url: &str, email: &str, password: &str) -> i32 {
    let resp = match client()
        .post(format!("{api_url}/v1/auth/token"))
        .json(&json!({
            "grant_type": "password",
            "email": email,
            "password": password
        }))
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => exit_error(
            &format!("Connection failed: {e}"),
            Some("Is the API server running? Check COMPASS_API_URL."),
        ),
    };

    if !resp.status().is_success() {
        let body: serde_json::Value = resp.json().await.unwrap_or_default();
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap());
        return 1;
    }

    let tokens: TokenResponse = match resp.json().await {
        Ok(t) => t,
        Err(e) => exit_error(&format!("Malformed token response: {e}"), None),
    };

    let creds = StoredCredentials {
        api_url: api_url.to_string(),
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_at: Utc::now() + chrono::Duration::seconds(tokens.expires_in),
    };

    if let Err(e) = save_credentials(&creds) {
        exit_error(&format!("Failed to store credentials: {e}"), None);
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "signed_in": true,
            "expires_at": creds.expires_at
        }))
        .unwrap()
    );
    0
}
