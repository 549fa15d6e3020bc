use clap::{Parser, Subcommand};

mod commands;
mod util;

#[derive(Parser)]
#[command(
    name = "compass",
    version,
    about = "Compass CLI — submit wellbeing entries, read your complexity profile and insights"
)]
struct Cli {
    /// API base URL
    #[arg(long, env = "COMPASS_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API health
    Health,
    /// Entry operations
    Entry {
        #[command(subcommand)]
        command: commands::entry::EntryCommands,
    },
    /// Complexity profile operations
    Profile {
        #[command(subcommand)]
        command: commands::profile::ProfileCommands,
    },
    /// Pattern insight operations
    Insights {
        #[command(subcommand)]
        command: commands::insights::InsightCommands,
    },
    /// Send feedback on a response
    Feedback {
        #[command(subcommand)]
        command: commands::feedback::FeedbackCommands,
    },
    /// Account registration and sign-in
    Auth {
        #[command(subcommand)]
        command: commands::auth::AuthCommands,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Health => commands::health::run(&cli.api_url).await,
        Commands::Entry { command } => commands::entry::run(&cli.api_url, command).await,
        Commands::Profile { command } => commands::profile::run(&cli.api_url, command).await,
        Commands::Insights { command } => commands::insights::run(&cli.api_url, command).await,
        Commands::Feedback { command } => commands::feedback::run(&cli.api_url, command).await,
        Commands::Auth { command } => commands::auth::run(&cli.api_url, command).await,
    };

    std::process::exit(exit_code);
}
