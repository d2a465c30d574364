use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "focusflow", version, about = "FocusFlow focus session tracker")]
struct Cli {
    /// User whose sessions are acted on
    #[arg(long, global = true, env = "FOCUSFLOW_USER", default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Session management and lifecycle
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Apply a JSON-encoded session event, e.g. '{"type":"start","session_id":1}'
    Event {
        /// Event JSON
        json: String,
    },
    /// Per-session focus time for each day in a range
    Progress {
        /// First day (YYYY-MM-DD); defaults to six days before --to
        #[arg(long)]
        from: Option<chrono::NaiveDate>,
        /// Last day (YYYY-MM-DD); defaults to today
        #[arg(long)]
        to: Option<chrono::NaiveDate>,
    },
    /// Daily goal summary for one day
    Summary {
        /// Day (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<chrono::NaiveDate>,
    },
    /// Consecutive days on which the daily goal was met
    Streak,
    /// Import sessions from a legacy JSON export
    Import {
        /// Path to the export file
        file: std::path::PathBuf,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("FOCUSFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let user = cli.user.as_str();
    let result = match cli.command {
        Commands::Session { action } => commands::session::run(user, action).await,
        Commands::Event { json } => commands::event::run(user, &json).await,
        Commands::Progress { from, to } => commands::progress::progress(user, from, to).await,
        Commands::Summary { date } => commands::progress::summary(user, date).await,
        Commands::Streak => commands::progress::streak(user).await,
        Commands::Import { file } => commands::import::run(user, &file).await,
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
