// config.rs — Project layout and settings for the guardrail CLI.
//
// Everything lives under `<project>/.guardrail/`:
//   config.toml          settings (optional; defaults apply when absent)
//   handles/             one JSON handle per <environment>/<name>
//   notices.jsonl        escalation notices (log channel)
//   dead-letter.jsonl    event lines the router could not evaluate

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use gr_reconciler::{
    GuardrailApi, HttpGuardrailApi, InMemoryGuardrailApi, Reconciler, ReconcilerConfig,
};
use gr_router::{
    LogChannel, NotificationChannel, Router, TopicChannel, DEFAULT_CONFIDENCE_THRESHOLD,
};

/// Which remote control plane the reconciler talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// In-process control plane. Nothing survives the command; useful for
    /// validating descriptors end to end.
    #[default]
    Memory,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default)]
    pub backend: Backend,

    /// Base URL of the control plane (required for the http backend).
    pub endpoint: Option<String>,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,

    /// Overall deadline for one lifecycle call. Exceeding it reports the
    /// call as unknown and marks the handle failed.
    pub deadline_secs: Option<u64>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            endpoint: None,
            timeout_secs: default_request_timeout_secs(),
            deadline_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSettings {
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Publish notices to this URL instead of the local notices log.
    pub topic_url: Option<String>,

    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            topic_url: None,
            publish_timeout_secs: default_publish_timeout_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_publish_timeout_secs() -> u64 {
    10
}

/// Contents of `.guardrail/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub router: RouterSettings,
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Load settings, falling back to defaults when the file doesn't exist.
    /// A file that exists but doesn't parse is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

#[derive(Debug, Clone)]
pub struct GuardrailConfig {
    pub config_file: PathBuf,
    pub handles_dir: PathBuf,
    pub notices_log: PathBuf,
    pub dead_letter_log: PathBuf,
    pub settings: Settings,
}

impl GuardrailConfig {
    /// Standard `.guardrail/` layout for a project, with default settings.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        let root = project_root.as_ref().to_path_buf();
        let dir = root.join(".guardrail");
        Self {
            config_file: dir.join("config.toml"),
            handles_dir: dir.join("handles"),
            notices_log: dir.join("notices.jsonl"),
            dead_letter_log: dir.join("dead-letter.jsonl"),
            settings: Settings::default(),
        }
    }

    /// Layout plus settings from `config.toml`.
    pub fn load(project_root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut config = Self::for_project(project_root);
        config.settings = Settings::load_or_default(&config.config_file)?;
        Ok(config)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.settings.api.deadline_secs.map(Duration::from_secs)
    }

    pub fn build_api(&self) -> anyhow::Result<Arc<dyn GuardrailApi>> {
        let api = &self.settings.api;
        match api.backend {
            Backend::Memory => {
                tracing::warn!("memory backend: remote state is discarded when the command exits");
                Ok(Arc::new(InMemoryGuardrailApi::new()))
            }
            Backend::Http => {
                let Some(endpoint) = api.endpoint.as_deref() else {
                    bail!(
                        "[api] backend = \"http\" requires an endpoint in {}",
                        self.config_file.display()
                    );
                };
                let client = HttpGuardrailApi::new(endpoint, Duration::from_secs(api.timeout_secs))?;
                Ok(Arc::new(client))
            }
        }
    }

    pub fn build_reconciler(&self) -> anyhow::Result<Reconciler> {
        Ok(Reconciler::new(self.build_api()?).with_config(self.settings.reconciler.clone()))
    }

    pub fn build_router(&self) -> anyhow::Result<Router> {
        Ok(Router::with_threshold(self.settings.router.threshold)?)
    }

    pub fn build_channel(&self) -> anyhow::Result<Box<dyn NotificationChannel>> {
        let router = &self.settings.router;
        match router.topic_url.as_deref() {
            Some(url) => Ok(Box::new(TopicChannel::new(
                url,
                Duration::from_secs(router.publish_timeout_secs),
            )?)),
            None => Ok(Box::new(LogChannel::new(&self.notices_log))),
        }
    }
}
