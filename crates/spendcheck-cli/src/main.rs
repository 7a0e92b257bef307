//! SpendCheck CLI - Personal finance backend
//!
//! Usage:
//!   spendcheck serve --port 8080       Start the API server
//!   spendcheck jobs budget-limits      Run a notification job once
//!   spendcheck extract --text "..."    Pre-fill a transaction from text
//!   spendcheck status                  Show provider configuration

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG, then --verbose, then info
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Serve {
            port,
            host,
            no_auth,
        } => commands::cmd_serve(&cli.db, &host, port, no_auth, cli.no_encrypt).await,
        Commands::Jobs { job, user } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_jobs(db, &job, user.as_deref()).await
        }
        Commands::Extract {
            text,
            url,
            file_type,
        } => {
            let input = match (text, url) {
                (Some(text), _) => commands::ExtractInput::Text(text),
                (None, Some(url)) => commands::ExtractInput::Url { url, file_type },
                (None, None) => anyhow::bail!("Provide --text or --url"),
            };
            commands::cmd_extract(input).await
        }
        Commands::Prompts { action } => match action {
            None | Some(PromptsAction::List) => commands::cmd_prompts_list(),
            Some(PromptsAction::Show { prompt_id }) => commands::cmd_prompts_show(&prompt_id),
            Some(PromptsAction::Path) => commands::cmd_prompts_path(),
        },
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt).await,
    }
}
