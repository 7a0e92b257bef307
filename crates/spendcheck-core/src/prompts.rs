//! Prompt templates for the language-model backends
//!
//! Every prompt ships compiled into the binary. A file named `<id>.md` in the
//! override directory (by default `~/.local/share/spendcheck/prompts/overrides/`)
//! replaces the embedded copy.
//!
//! Prompt files open with a YAML frontmatter block (`id`, `version`,
//! `task_type`) and carry `# System` and `# User` sections. Templates
//! substitute `{{var}}` and keep `{{#if var}}...{{/if}}` only when `var` is set.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Known prompt IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Income or Expense from receipt/voice text
    DetectTransactionType,
    /// Total amount from receipt text
    ExtractTotal,
    /// One of the fixed expense categories
    CategorizeExpense,
    /// Short tip when a category budget is nearly spent
    BudgetTip,
    /// Advice when expenses approach income
    SpendingAdvice,
    /// Month-end projection advice
    ForecastAdvice,
}

const ALL_PROMPTS: [PromptId; 6] = [
    PromptId::DetectTransactionType,
    PromptId::ExtractTotal,
    PromptId::CategorizeExpense,
    PromptId::BudgetTip,
    PromptId::SpendingAdvice,
    PromptId::ForecastAdvice,
];

impl PromptId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DetectTransactionType => "detect_transaction_type",
            Self::ExtractTotal => "extract_total",
            Self::CategorizeExpense => "categorize_expense",
            Self::BudgetTip => "budget_tip",
            Self::SpendingAdvice => "spending_advice",
            Self::ForecastAdvice => "forecast_advice",
        }
    }

    pub fn all() -> &'static [PromptId] {
        &ALL_PROMPTS
    }

    /// Look up an id by its string name
    pub fn parse(name: &str) -> Option<PromptId> {
        ALL_PROMPTS.into_iter().find(|id| id.as_str() == name)
    }

    fn file_name(&self) -> String {
        format!("{}.md", self.as_str())
    }

    fn embedded(&self) -> &'static str {
        match self {
            Self::DetectTransactionType => {
                include_str!("../../../prompts/detect_transaction_type.md")
            }
            Self::ExtractTotal => include_str!("../../../prompts/extract_total.md"),
            Self::CategorizeExpense => include_str!("../../../prompts/categorize_expense.md"),
            Self::BudgetTip => include_str!("../../../prompts/budget_tip.md"),
            Self::SpendingAdvice => include_str!("../../../prompts/spending_advice.md"),
            Self::ForecastAdvice => include_str!("../../../prompts/forecast_advice.md"),
        }
    }
}

/// Prompt frontmatter metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    pub version: u32,
    /// Model router task (classification, extraction, recommendation, forecast)
    pub task_type: String,
}

/// A loaded prompt with metadata and content
#[derive(Debug, Clone)]
pub struct Prompt {
    pub metadata: PromptMetadata,
    /// Body after the frontmatter (system + user sections)
    pub content: String,
    pub is_override: bool,
    pub override_path: Option<PathBuf>,
}

impl Prompt {
    fn parse(source: &str, override_path: Option<PathBuf>) -> Result<Self> {
        let (metadata, content) = split_frontmatter(source)?;
        Ok(Self {
            metadata,
            content,
            is_override: override_path.is_some(),
            override_path,
        })
    }

    pub fn system_section(&self) -> Option<&str> {
        section(&self.content, "System")
    }

    pub fn user_section(&self) -> Option<&str> {
        section(&self.content, "User")
    }

    /// Render the whole body with template variables replaced
    pub fn render(&self, vars: &HashMap<&str, &str>) -> String {
        render_template(&self.content, vars)
    }

    /// Render just the user section; prompts without sections render whole
    pub fn render_user(&self, vars: &HashMap<&str, &str>) -> String {
        render_template(self.user_section().unwrap_or(&self.content), vars)
    }
}

/// A rendered prompt ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub system: Option<String>,
    pub user: String,
    pub task_type: String,
}

/// Information about a prompt for listing
#[derive(Debug, Clone)]
pub struct PromptInfo {
    pub id: String,
    pub version: u32,
    pub task_type: String,
    pub has_override: bool,
    pub override_path: Option<PathBuf>,
}

/// Loads prompts on first use and keeps them until `clear_cache`
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
    cache: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    fn with_dir(override_dir: Option<PathBuf>) -> Self {
        Self {
            override_dir,
            cache: HashMap::new(),
        }
    }

    /// Library with the default override directory
    pub fn new() -> Self {
        Self::with_dir(default_prompts_dir())
    }

    pub fn with_override_dir(path: PathBuf) -> Self {
        Self::with_dir(Some(path))
    }

    /// Embedded prompts only
    pub fn embedded_only() -> Self {
        Self::with_dir(None)
    }

    pub fn override_dir(&self) -> Option<&PathBuf> {
        self.override_dir.as_ref()
    }

    pub fn has_override(&self, id: PromptId) -> bool {
        override_file(self.override_dir.as_deref(), id).is_some()
    }

    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        let prompt = match self.cache.entry(id) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => slot.insert(load(self.override_dir.as_deref(), id)?),
        };
        Ok(&*prompt)
    }

    /// Render the system and user sections of a prompt
    pub fn render(&mut self, id: PromptId, vars: &HashMap<&str, &str>) -> Result<RenderedPrompt> {
        let prompt = self.get(id)?;
        let system = prompt
            .system_section()
            .filter(|s| !s.is_empty())
            .map(|s| render_template(s, vars));
        Ok(RenderedPrompt {
            system,
            user: prompt.render_user(vars),
            task_type: prompt.metadata.task_type.clone(),
        })
    }

    /// Every known prompt; ones that fail to parse list as version 0
    pub fn list(&mut self) -> Vec<PromptInfo> {
        let mut infos = Vec::with_capacity(ALL_PROMPTS.len());
        for id in ALL_PROMPTS {
            let override_path = override_file(self.override_dir.as_deref(), id);
            let (version, task_type) = match self.get(id) {
                Ok(p) => (p.metadata.version, p.metadata.task_type.clone()),
                Err(e) => {
                    tracing::warn!(prompt = id.as_str(), error = %e, "Prompt failed to load");
                    (0, String::new())
                }
            };
            infos.push(PromptInfo {
                id: id.as_str().to_string(),
                version,
                task_type,
                has_override: override_path.is_some(),
                override_path,
            });
        }
        infos
    }

    /// Forget cached prompts so edited overrides are picked up
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("spendcheck").join("prompts").join("overrides"))
}

fn override_file(dir: Option<&Path>, id: PromptId) -> Option<PathBuf> {
    dir.map(|d| d.join(id.file_name())).filter(|p| p.is_file())
}

fn load(override_dir: Option<&Path>, id: PromptId) -> Result<Prompt> {
    match override_file(override_dir, id) {
        Some(path) => {
            let source = fs::read_to_string(&path).map_err(|e| {
                Error::InvalidData(format!("Cannot read {}: {}", path.display(), e))
            })?;
            tracing::debug!(prompt = id.as_str(), path = %path.display(), "Using prompt override");
            Prompt::parse(&source, Some(path))
        }
        None => Prompt::parse(id.embedded(), None),
    }
}

/// `---` fenced YAML on its own lines, then the body
fn split_frontmatter(source: &str) -> Result<(PromptMetadata, String)> {
    let mut lines = source.trim().lines();
    if lines.next().map(str::trim_end) != Some("---") {
        return Err(Error::InvalidData(
            "Prompt must open with a --- frontmatter fence".into(),
        ));
    }

    let mut yaml = String::new();
    loop {
        match lines.next() {
            Some(line) if line.trim_end() == "---" => break,
            Some(line) => {
                yaml.push_str(line);
                yaml.push('\n');
            }
            None => {
                return Err(Error::InvalidData(
                    "Prompt frontmatter has no closing --- fence".into(),
                ))
            }
        }
    }

    let metadata = serde_yaml::from_str(&yaml)
        .map_err(|e| Error::InvalidData(format!("Bad prompt frontmatter: {}", e)))?;
    let body = lines.collect::<Vec<_>>().join("\n");
    Ok((metadata, body.trim().to_string()))
}

/// Text under `# {name}` up to the next top-level heading
fn section<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    let mut offset = 0;
    let mut start = None;
    for line in body.split_inclusive('\n') {
        let heading = line.trim_end().strip_prefix("# ");
        match (start, heading) {
            (None, Some(h)) if h.trim() == name => start = Some(offset + line.len()),
            (Some(from), Some(_)) => return Some(body[from..offset].trim()),
            _ => {}
        }
        offset += line.len();
    }
    start.map(|from| body[from..].trim())
}

/// Single pass over the template so substituted values are never re-expanded.
/// Unknown `{{var}}` tags are left as written.
fn render_template(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut open_blocks: Vec<bool> = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        let emitting = open_blocks.iter().all(|&keep| keep);
        if emitting {
            out.push_str(&rest[..open]);
        }
        let tag_start = &rest[open + 2..];
        let Some(close) = tag_start.find("}}") else {
            rest = &rest[open..];
            break;
        };
        let raw = &tag_start[..close];
        rest = &tag_start[close + 2..];

        let tag = raw.trim();
        if let Some(var) = tag.strip_prefix("#if ") {
            open_blocks.push(vars.get(var.trim()).is_some_and(|v| !v.is_empty()));
        } else if tag == "/if" {
            open_blocks.pop();
        } else if emitting {
            match vars.get(tag) {
                Some(value) => out.push_str(value),
                None => {
                    out.push_str("{{");
                    out.push_str(raw);
                    out.push_str("}}");
                }
            }
        }
    }

    if open_blocks.iter().all(|&keep| keep) {
        out.push_str(rest);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars<'a>(pairs: &[(&'a str, &'a str)]) -> HashMap<&'a str, &'a str> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_frontmatter_and_body() {
        let source = "---\nid: test_prompt\nversion: 2\ntask_type: classification\n---\n\n# System\nBe terse.\n\n# User\nClassify {{text}}.\n";

        let (metadata, body) = split_frontmatter(source).unwrap();
        assert_eq!(metadata.id, "test_prompt");
        assert_eq!(metadata.version, 2);
        assert_eq!(metadata.task_type, "classification");
        assert!(body.starts_with("# System"));
    }

    #[test]
    fn test_frontmatter_fences_required() {
        assert!(split_frontmatter("# User\nhello").is_err());
        assert!(split_frontmatter("---\nid: x\n# User").is_err());
        assert!(split_frontmatter("---\nversion: [\n---\nbody").is_err());
    }

    #[test]
    fn test_sections() {
        let body = "# System\nSystem content here.\n\n# User\nUser content here.";
        assert_eq!(section(body, "System"), Some("System content here."));
        assert_eq!(section(body, "User"), Some("User content here."));
        assert_eq!(section(body, "Other"), None);

        // Second-level headings stay inside the section
        let nested = "# User\nLine one\n## Detail\nLine two";
        assert_eq!(section(nested, "User"), Some("Line one\n## Detail\nLine two"));
    }

    #[test]
    fn test_conditional_blocks() {
        let template = "Start{{#if notes}}\nNotes: {{notes}}{{/if}}\nEnd";
        assert_eq!(
            render_template(template, &vars(&[("notes", "lunch")])),
            "Start\nNotes: lunch\nEnd"
        );
        assert_eq!(render_template(template, &vars(&[])), "Start\nEnd");
        assert_eq!(render_template(template, &vars(&[("notes", "")])), "Start\nEnd");
    }

    #[test]
    fn test_substituted_values_are_not_reinterpreted() {
        let rendered = render_template("T: {{text}}", &vars(&[("text", "{{#if x}}raw{{/if}}")]));
        assert_eq!(rendered, "T: {{#if x}}raw{{/if}}");
    }

    #[test]
    fn test_unknown_and_unclosed_tags_kept() {
        assert_eq!(render_template("a {{ missing }} b", &vars(&[])), "a {{ missing }} b");
        assert_eq!(render_template("a {{oops", &vars(&[])), "a {{oops");
    }

    #[test]
    fn test_embedded_prompts_load_and_match_ids() {
        let mut lib = PromptLibrary::embedded_only();
        for id in PromptId::all() {
            let prompt = lib.get(*id).unwrap();
            assert_eq!(prompt.metadata.id, id.as_str());
            assert!(!prompt.is_override);
            assert!(prompt.user_section().is_some(), "{} has no user section", id.as_str());
        }
    }

    #[test]
    fn test_render_budget_tip() {
        let mut lib = PromptLibrary::embedded_only();
        let rendered = lib
            .render(
                PromptId::BudgetTip,
                &vars(&[("category", "Food & Dining"), ("spent", "4600"), ("limit", "5000")]),
            )
            .unwrap();
        assert!(rendered
            .user
            .contains("The user has spent 4600 out of their 5000 budget in the Food & Dining category."));
        assert_eq!(rendered.task_type, "recommendation");
        assert!(!rendered.user.contains("{{"));
    }

    #[test]
    fn test_override_dir_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("budget_tip.md"),
            "---\nid: budget_tip\nversion: 9\ntask_type: recommendation\n---\n# User\nCustom {{category}}",
        )
        .unwrap();

        let mut lib = PromptLibrary::with_override_dir(dir.path().to_path_buf());
        assert!(lib.has_override(PromptId::BudgetTip));
        assert!(!lib.has_override(PromptId::ExtractTotal));

        let rendered = lib
            .render(PromptId::BudgetTip, &vars(&[("category", "Travel")]))
            .unwrap();
        assert_eq!(rendered.user, "Custom Travel");
        assert_eq!(rendered.system, None);

        let listed = lib.list();
        let tip = listed.iter().find(|p| p.id == "budget_tip").unwrap();
        assert!(tip.has_override);
        assert_eq!(tip.version, 9);
    }

    #[test]
    fn test_clear_cache_picks_up_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extract_total.md");
        std::fs::write(&path, "---\nid: extract_total\nversion: 1\ntask_type: extraction\n---\n# User\nv1").unwrap();

        let mut lib = PromptLibrary::with_override_dir(dir.path().to_path_buf());
        assert_eq!(lib.get(PromptId::ExtractTotal).unwrap().metadata.version, 1);

        std::fs::write(&path, "---\nid: extract_total\nversion: 2\ntask_type: extraction\n---\n# User\nv2").unwrap();
        assert_eq!(lib.get(PromptId::ExtractTotal).unwrap().metadata.version, 1);
        lib.clear_cache();
        assert_eq!(lib.get(PromptId::ExtractTotal).unwrap().metadata.version, 2);
    }

    #[test]
    fn test_prompt_id_parse() {
        assert_eq!(PromptId::parse("extract_total"), Some(PromptId::ExtractTotal));
        assert_eq!(PromptId::parse("nope"), None);
        assert_eq!(PromptId::all().len(), 6);
    }
}
