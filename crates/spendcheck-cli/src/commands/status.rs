//! Status command: store, provider and scheduler configuration

use std::path::Path;

use anyhow::Result;
use spendcheck_core::store::DB_KEY_ENV;
use spendcheck_core::{AIBackend, AIClient, OcrClient, PushClient, StorageClient};
use spendcheck_server::{JobScheduleConfig, TokenVerifier};

use super::open_db;

pub async fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!();
    println!("📊 SpendCheck Status");
    println!("   ─────────────────────────────────────────────────────────────");

    let store_kind = std::env::var("SPENDCHECK_STORE").unwrap_or_else(|_| "local".to_string());
    let is_local = store_kind.eq_ignore_ascii_case("local") || store_kind.is_empty();
    if is_local {
        print_local_store(db_path, no_encrypt);
    }

    // Opening a missing local store would create it
    if !is_local || db_path.exists() {
        match open_db(db_path, no_encrypt) {
            Ok(db) => println!("   Store: {}", db.store().describe()),
            Err(e) => println!("   ❌ Store: {:#}", e),
        }
    }

    println!();
    match AIClient::from_env() {
        Some(ai) => {
            let info = ai.router_info();
            let health = if ai.health_check().await {
                "✅ reachable"
            } else {
                "⚠️  not responding"
            };
            println!("   AI: {} at {} ({})", ai.backend_name(), ai.host(), health);
            println!(
                "       default model: {}, fallback: {}",
                info.default_model,
                info.fallback_model.as_deref().unwrap_or("none")
            );
            for (task, model) in &info.task_models {
                println!("       {}: {}", task, model);
            }
        }
        None => println!("   AI: not configured (set GEMINI_API_KEY or AI_BACKEND)"),
    }

    match OcrClient::from_env() {
        Some(ocr) => println!("   OCR: {}", ocr.describe()),
        None => println!("   OCR: not configured (set OCR_SPACE_API_KEY)"),
    }

    println!("   Push: {}", PushClient::from_env().describe());

    match StorageClient::from_env() {
        Some(storage) => println!("   Storage: {}", storage.describe()),
        None => println!("   Storage: not configured"),
    }

    println!();
    match TokenVerifier::from_env() {
        Some(verifier) => println!("   Auth: {}", verifier.describe()),
        None => println!("   Auth: no verifier (set FIREBASE_PROJECT_ID)"),
    }
    match JobScheduleConfig::from_env() {
        Some(schedule) => {
            let names: Vec<&str> = schedule.jobs.iter().map(|j| j.as_str()).collect();
            println!(
                "   Jobs: {} (interval: {})",
                names.join(", "),
                if schedule.interval_hours == 0 {
                    "once".to_string()
                } else {
                    format!("{}h", schedule.interval_hours)
                }
            );
        }
        None => println!("   Jobs: not scheduled (set SPENDCHECK_JOBS)"),
    }

    println!();
    Ok(())
}

fn print_local_store(db_path: &Path, no_encrypt: bool) {
    println!("   Local store: {}", db_path.display());

    match std::fs::metadata(db_path) {
        Ok(metadata) => {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
        Err(_) => println!("   Size: (not created yet)"),
    }

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }
}
