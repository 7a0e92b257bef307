//! Server command implementation

use std::path::Path;

use anyhow::Result;
use spendcheck_server::{JobScheduleConfig, ServerConfig};

use super::open_db;

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;
    let config = ServerConfig::from_env(!no_auth);

    println!("🚀 Starting SpendCheck server...");
    println!("   Store: {}", db.store().describe());
    println!("   Listening: http://{}:{}", host, port);

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else {
        match &config.verifier {
            Some(verifier) => println!("   🔐 Authentication: {}", verifier.describe()),
            None => {
                println!("   ❌ Authentication: no verifier configured");
                println!("      Set FIREBASE_PROJECT_ID (or SPENDCHECK_DEV_TOKEN_SECRET for local use)");
            }
        }
    }
    if !config.api_keys.is_empty() {
        println!(
            "   🔑 Admin API keys: {} configured (SPENDCHECK_API_KEYS)",
            config.api_keys.len()
        );
    }
    if let Some(schedule) = JobScheduleConfig::from_env() {
        let names: Vec<&str> = schedule.jobs.iter().map(|j| j.as_str()).collect();
        if schedule.interval_hours == 0 {
            println!("   ⏰ Jobs: {} (once at startup)", names.join(", "));
        } else {
            println!(
                "   ⏰ Jobs: {} every {}h",
                names.join(", "),
                schedule.interval_hours
            );
        }
    }
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    spendcheck_server::serve(db, host, port, config).await
}
