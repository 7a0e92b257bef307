//! Prompt library commands

use anyhow::Result;
use spendcheck_core::prompts::{default_prompts_dir, PromptId, PromptLibrary};

fn overrides_dir_label() -> String {
    default_prompts_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(no data directory on this system)".to_string())
}

/// Table of prompts, marking the ones replaced by a local override
pub fn cmd_prompts_list() -> Result<()> {
    let mut library = PromptLibrary::new();

    println!();
    println!("📝 Prompts");
    println!("   {:<26} {:>3}  {:<15} {}", "ID", "V", "TASK", "SOURCE");
    for info in library.list() {
        let source = match &info.override_path {
            Some(path) if info.has_override => format!("override ({})", path.display()),
            _ => "embedded".to_string(),
        };
        println!(
            "   {:<26} {:>3}  {:<15} {}",
            info.id, info.version, info.task_type, source
        );
    }

    println!();
    println!("   Overrides: {}", overrides_dir_label());
    println!("   Place <id>.md there with the same frontmatter; the server reads it on next start.");
    Ok(())
}

/// Print one prompt's metadata and template body
pub fn cmd_prompts_show(prompt_id: &str) -> Result<()> {
    let Some(id) = PromptId::parse(prompt_id) else {
        let known: Vec<&str> = PromptId::all().iter().map(|id| id.as_str()).collect();
        eprintln!("Unknown prompt '{}'. Known prompts: {}", prompt_id, known.join(", "));
        return Ok(());
    };

    let mut library = PromptLibrary::new();
    let prompt = library.get(id)?;
    let origin = match (&prompt.override_path, prompt.is_override) {
        (Some(path), true) => format!("override at {}", path.display()),
        _ => "embedded default".to_string(),
    };

    println!(
        "{} v{} [{}] - {}",
        prompt.metadata.id, prompt.metadata.version, prompt.metadata.task_type, origin
    );
    println!();
    println!("{}", prompt.content);
    Ok(())
}

/// Print the override directory
pub fn cmd_prompts_path() -> Result<()> {
    println!("{}", overrides_dir_label());
    if let Some(path) = default_prompts_dir().filter(|p| !p.exists()) {
        eprintln!("({} does not exist yet)", path.display());
    }
    Ok(())
}
