//! Task-based model selection
//!
//! Each language-model call belongs to a task (classification, extraction,
//! recommendation, forecast). A task may name its own model, timeout and
//! retry budget in `config/models.toml`; anything it leaves out comes from
//! `[defaults]`. A model that fails `failure_threshold` times in a row is
//! skipped for `recovery_wait`, and selection falls through to the default
//! model and then to `fallback_model`.
//!
//! The embedded file can be replaced by
//! `<data_local_dir>/spendcheck/config/models.toml`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

const EMBEDDED_MODELS_TOML: &str = include_str!("../../../config/models.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    /// Income/Expense detection, expense categorisation
    Classification,
    /// Total amount from receipt text
    Extraction,
    /// Budget tips and spending advice
    Recommendation,
    /// Month-end projection advice
    Forecast,
}

impl TaskType {
    const ALL: [TaskType; 4] = [
        TaskType::Classification,
        TaskType::Extraction,
        TaskType::Recommendation,
        TaskType::Forecast,
    ];

    /// Key under `[models.*]` and in prompt frontmatter
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Classification => "classification",
            TaskType::Extraction => "extraction",
            TaskType::Recommendation => "recommendation",
            TaskType::Forecast => "forecast",
        }
    }

    pub fn all() -> &'static [TaskType] {
        &Self::ALL
    }

    pub fn parse(name: &str) -> Option<TaskType> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

/// Settings for one task, with defaults already applied
#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// `None` means the default model
    pub model: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub default_model: String,
    pub default_timeout: Duration,
    pub default_retries: u32,
    pub fallback_model: Option<String>,
    pub tasks: HashMap<TaskType, TaskConfig>,
    /// Consecutive failures that take a model out of rotation
    pub failure_threshold: u32,
    pub recovery_wait: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_model: "gemini-1.5-flash".to_string(),
            default_timeout: Duration::from_secs(30),
            default_retries: 2,
            fallback_model: None,
            tasks: HashMap::new(),
            failure_threshold: 3,
            recovery_wait: Duration::from_secs(300),
        }
    }
}

impl RouterConfig {
    /// Parse a `models.toml` document
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: ModelsFile = toml::from_str(content)
            .map_err(|e| Error::InvalidData(format!("Invalid models.toml: {}", e)))?;
        Ok(file.into_config())
    }

    /// Read `path` if it exists, else the embedded defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path.filter(|p| p.is_file()) {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                Self::from_toml(&content)
            }
            None => Self::from_toml(EMBEDDED_MODELS_TOML),
        }
    }

    fn task(&self, task: TaskType) -> Option<&TaskConfig> {
        self.tasks.get(&task)
    }
}

// `models.toml` layout; every key is optional

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModelsFile {
    defaults: DefaultsSection,
    models: HashMap<String, TaskSection>,
    health: HealthSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DefaultsSection {
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    fallback_model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TaskSection {
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HealthSection {
    failure_threshold: Option<u32>,
    recovery_wait_secs: Option<u64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ModelsFile {
    fn into_config(self) -> RouterConfig {
        let base = RouterConfig::default();
        let default_timeout = self
            .defaults
            .timeout_secs
            .map_or(base.default_timeout, Duration::from_secs);
        let default_retries = self.defaults.max_retries.unwrap_or(base.default_retries);

        let mut tasks = HashMap::new();
        for (name, section) in self.models {
            match TaskType::parse(&name) {
                Some(task) => {
                    tasks.insert(
                        task,
                        TaskConfig {
                            model: non_empty(section.model),
                            timeout: section
                                .timeout_secs
                                .map_or(default_timeout, Duration::from_secs),
                            max_retries: section.max_retries.unwrap_or(default_retries),
                        },
                    );
                }
                None => warn!(task = %name, "Ignoring unknown task in models.toml"),
            }
        }

        RouterConfig {
            default_model: non_empty(self.defaults.model).unwrap_or(base.default_model),
            default_timeout,
            default_retries,
            fallback_model: non_empty(self.defaults.fallback_model),
            tasks,
            failure_threshold: self
                .health
                .failure_threshold
                .unwrap_or(base.failure_threshold),
            recovery_wait: self
                .health
                .recovery_wait_secs
                .map_or(base.recovery_wait, Duration::from_secs),
        }
    }
}

#[derive(Debug, Default)]
struct Health {
    consecutive_failures: u32,
    /// Set when the failure threshold is crossed
    benched_at: Option<Instant>,
}

pub struct ModelRouter {
    config: RouterConfig,
    health: HashMap<String, Health>,
}

impl ModelRouter {
    /// Router over the override file, or the embedded config
    pub fn new() -> Result<Self> {
        let config = RouterConfig::load(default_config_path().as_deref())?;
        Ok(Self::with_config(config))
    }

    pub fn with_config(config: RouterConfig) -> Self {
        Self {
            config,
            health: HashMap::new(),
        }
    }

    /// Replace the default model (backend configured with an explicit model)
    pub fn set_default_model(&mut self, model: &str) {
        self.config.default_model = model.to_string();
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// First healthy model among the task's own, the default and the
    /// fallback; the default when none is healthy
    pub fn model_for_task(&self, task: TaskType) -> &str {
        let task_model = self.config.task(task).and_then(|t| t.model.as_deref());
        [
            task_model,
            Some(self.config.default_model.as_str()),
            self.config.fallback_model.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find(|model| self.is_healthy(model))
        .unwrap_or(&self.config.default_model)
    }

    pub fn timeout_for_task(&self, task: TaskType) -> Duration {
        self.config
            .task(task)
            .map_or(self.config.default_timeout, |t| t.timeout)
    }

    pub fn retries_for_task(&self, task: TaskType) -> u32 {
        self.config
            .task(task)
            .map_or(self.config.default_retries, |t| t.max_retries)
    }

    pub fn record_success(&mut self, model: &str) {
        self.health.remove(model);
    }

    /// Count a failed call; true once the model is out of rotation
    pub fn record_failure(&mut self, model: &str) -> bool {
        let threshold = self.config.failure_threshold;
        let health = self.health.entry(model.to_string()).or_default();
        health.consecutive_failures += 1;

        let benched = health.consecutive_failures >= threshold;
        if benched {
            health.benched_at.get_or_insert_with(Instant::now);
        }
        benched
    }

    /// Healthy unless benched less than `recovery_wait` ago
    pub fn is_healthy(&self, model: &str) -> bool {
        self.health
            .get(model)
            .and_then(|h| h.benched_at)
            .map_or(true, |at| at.elapsed() >= self.config.recovery_wait)
    }
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::new().unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to built-in model routing");
            Self::with_config(RouterConfig::default())
        })
    }
}

/// Location of the `models.toml` override
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("spendcheck").join("config").join("models.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_config() {
        let config = RouterConfig::from_toml(EMBEDDED_MODELS_TOML).unwrap();
        assert_eq!(config.default_model, "gemini-1.5-flash");
        assert_eq!(config.fallback_model.as_deref(), Some("gemini-1.5-flash-8b"));
        assert_eq!(config.tasks.len(), TaskType::all().len());
        assert!(
            config.tasks[&TaskType::Forecast].timeout
                > config.tasks[&TaskType::Classification].timeout
        );
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = RouterConfig::from_toml(
            r#"
            [defaults]
            max_retries = 5

            [models.forecast]
            model = "gemini-1.5-pro"

            [models.vision]
            model = "ignored"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_model, "gemini-1.5-flash");
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.tasks.len(), 1);
        let forecast = &config.tasks[&TaskType::Forecast];
        assert_eq!(forecast.model.as_deref(), Some("gemini-1.5-pro"));
        assert_eq!(forecast.max_retries, 5);
        assert_eq!(forecast.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_task_names_round_trip() {
        for task in TaskType::all() {
            assert_eq!(TaskType::parse(task.as_str()), Some(*task));
        }
        assert_eq!(TaskType::parse("vision"), None);
    }

    #[test]
    fn test_task_routing() {
        let config = RouterConfig::from_toml(
            r#"
            [models.forecast]
            model = "gemini-1.5-pro"
            timeout_secs = 90
            max_retries = 0
            "#,
        )
        .unwrap();
        let router = ModelRouter::with_config(config);

        assert_eq!(router.model_for_task(TaskType::Classification), "gemini-1.5-flash");
        assert_eq!(router.model_for_task(TaskType::Forecast), "gemini-1.5-pro");
        assert_eq!(router.retries_for_task(TaskType::Forecast), 0);
        assert_eq!(router.timeout_for_task(TaskType::Forecast), Duration::from_secs(90));
        assert_eq!(router.timeout_for_task(TaskType::Extraction), Duration::from_secs(30));
    }

    #[test]
    fn test_failures_bench_then_success_restores() {
        let mut router = ModelRouter::with_config(RouterConfig {
            failure_threshold: 2,
            ..Default::default()
        });

        assert!(!router.record_failure("m"));
        assert!(router.is_healthy("m"));
        assert!(router.record_failure("m"));
        assert!(!router.is_healthy("m"));
        router.record_success("m");
        assert!(router.is_healthy("m"));
    }

    #[test]
    fn test_unhealthy_default_uses_fallback() {
        let mut router = ModelRouter::with_config(RouterConfig {
            default_model: "primary".to_string(),
            fallback_model: Some("fallback".to_string()),
            failure_threshold: 1,
            ..Default::default()
        });

        assert_eq!(router.model_for_task(TaskType::Recommendation), "primary");
        router.record_failure("primary");
        assert_eq!(router.model_for_task(TaskType::Recommendation), "fallback");

        // Nothing healthy left: stay on the default
        router.record_failure("fallback");
        assert_eq!(router.model_for_task(TaskType::Recommendation), "primary");
    }

    #[test]
    fn test_benched_model_recovers_after_wait() {
        let mut router = ModelRouter::with_config(RouterConfig {
            failure_threshold: 1,
            recovery_wait: Duration::ZERO,
            ..Default::default()
        });
        router.record_failure("m");
        assert!(router.is_healthy("m"));
    }

    #[test]
    fn test_explicit_default_model() {
        let mut router = ModelRouter::with_config(RouterConfig::default());
        router.set_default_model("gemma-3-12b-it");
        assert_eq!(router.model_for_task(TaskType::Extraction), "gemma-3-12b-it");
    }

    #[test]
    fn test_invalid_toml() {
        assert!(RouterConfig::from_toml("defaults = [").is_err());
    }
}
