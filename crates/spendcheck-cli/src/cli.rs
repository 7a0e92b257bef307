//! Command-line arguments
//!
//! The command implementations live in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// SpendCheck - Track spending, budgets and receipts
#[derive(Parser)]
#[command(name = "spendcheck")]
#[command(about = "Personal finance backend: API server, notification jobs and receipt extraction", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Local store path (used when SPENDCHECK_STORE is unset or `local`)
    #[arg(long, default_value = "spendcheck.db", global = true)]
    pub db: PathBuf,

    /// Debug-level logs (RUST_LOG wins when set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable local store encryption (not recommended for production)
    ///
    /// By default the local store is encrypted using SQLCipher.
    /// Set SPENDCHECK_DB_KEY with your passphrase.
    /// Plaintext stores are meant for local experiments.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// TCP port
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable token verification (for local development only)
        ///
        /// Anyone who can reach the port can then read and write every user.
        /// By default every route requires a Firebase ID token.
        #[arg(long)]
        no_auth: bool,
    },

    /// Run a notification job once
    Jobs {
        /// Job: budget-limits, spending-change, income-vs-expense, forecast, all
        #[arg(default_value = "all")]
        job: String,

        /// Only evaluate this user
        #[arg(long)]
        user: Option<String>,
    },

    /// Extract transaction details from text or a receipt URL
    Extract {
        /// Receipt or dictated text
        #[arg(long, conflicts_with = "url")]
        text: Option<String>,

        /// Publicly reachable receipt URL (OCR'd first)
        #[arg(long)]
        url: Option<String>,

        /// Receipt file type: image, pdf, png, jpg
        #[arg(long, requires = "url")]
        file_type: Option<String>,
    },

    /// Manage model prompts
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },

    /// Show store and provider configuration
    Status,
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// Table of prompts with version, task and source
    List,

    /// Print one prompt's template
    Show {
        /// Prompt ID (e.g., detect_transaction_type, budget_tip)
        prompt_id: String,
    },

    /// Print the override directory
    Path,
}
