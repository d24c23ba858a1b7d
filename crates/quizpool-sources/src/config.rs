//! Configuration loading and the source factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use quizpool_core::engine::Dispatcher;
use quizpool_core::expander::ExpansionConfig;
use quizpool_core::gate::Gate;
use quizpool_core::monitor::MonitorThresholds;
use quizpool_core::oracle::{Oracle, OracleConfig};
use quizpool_core::service::QuestionService;
use quizpool_core::storage::{
    BlobConsumedTracker, BlobStore, FileBlobStore, GeneratedQuestionStore, MemoryBlobStore,
};
use quizpool_core::traits::{GeneratorRegistry, QuestionSource};

use crate::http::HttpStaticSource;
use crate::on_demand::OnDemandSource;
use crate::prepopulated::PrePopulatedSource;
use crate::static_dir::StaticDirSource;

/// Where static question files come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StaticSourceConfig {
    Dir {
        #[serde(default = "default_static_dir")]
        path: PathBuf,
    },
    Http {
        base_url: String,
    },
    None,
}

impl Default for StaticSourceConfig {
    fn default() -> Self {
        StaticSourceConfig::Dir {
            path: default_static_dir(),
        }
    }
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("./questions")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// On-demand attempts allowed per desired question.
    pub attempt_multiplier: usize,
    /// Fill the pre-populated table at startup.
    pub prepopulate: bool,
    /// Questions generated per key when pre-populating.
    pub prepopulate_per_key: usize,
    /// Rough per-question memory cost used in pre-population stats.
    pub bytes_per_question_estimate: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            attempt_multiplier: 3,
            prepopulate: false,
            prepopulate_per_key: 25,
            bytes_per_question_estimate: 2048,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for persisted blobs. In-memory when unset.
    pub dir: Option<PathBuf>,
    /// Stale invalid entries older than this are cleaned up.
    pub cleanup_horizon_days: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: None,
            cleanup_horizon_days: 7,
        }
    }
}

/// Top-level quizpool configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizpoolConfig {
    pub static_source: StaticSourceConfig,
    pub generation: GenerationConfig,
    pub oracle: OracleConfig,
    pub expansion: ExpansionConfig,
    pub monitor: MonitorThresholds,
    pub storage: StorageConfig,
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn resolve_path(path: &Path) -> PathBuf {
    PathBuf::from(resolve_env_vars(&path.to_string_lossy()))
}

/// Resolve env vars in every string-valued setting.
fn resolve_config(config: &mut QuizpoolConfig) {
    config.static_source = match &config.static_source {
        StaticSourceConfig::Dir { path } => StaticSourceConfig::Dir {
            path: resolve_path(path),
        },
        StaticSourceConfig::Http { base_url } => StaticSourceConfig::Http {
            base_url: resolve_env_vars(base_url),
        },
        StaticSourceConfig::None => StaticSourceConfig::None,
    };
    config.storage.dir = config.storage.dir.as_deref().map(resolve_path);
}

/// Apply `QUIZPOOL_*` overrides. `QUIZPOOL_STATIC_URL` wins over
/// `QUIZPOOL_STATIC_DIR` when both are set.
fn apply_env_overrides(config: &mut QuizpoolConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(dir) = var("QUIZPOOL_STATIC_DIR") {
        config.static_source = StaticSourceConfig::Dir {
            path: PathBuf::from(dir),
        };
    }
    if let Some(base_url) = var("QUIZPOOL_STATIC_URL") {
        config.static_source = StaticSourceConfig::Http { base_url };
    }
    if let Some(dir) = var("QUIZPOOL_STORAGE_DIR") {
        config.storage.dir = Some(PathBuf::from(dir));
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `quizpool.toml` in the current directory
/// 2. `~/.config/quizpool/config.toml`
///
/// Environment variable overrides: `QUIZPOOL_STATIC_DIR`, `QUIZPOOL_STATIC_URL`,
/// `QUIZPOOL_STORAGE_DIR`.
pub fn load_config() -> Result<QuizpoolConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<QuizpoolConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("quizpool.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<QuizpoolConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => QuizpoolConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    resolve_config(&mut config);

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("quizpool"))
}

/// Build the priority-ordered source list: static, then pre-populated (when
/// enabled), then on-demand.
///
/// The pre-populated table is filled before this returns.
pub async fn build_sources(
    config: &QuizpoolConfig,
    registry: GeneratorRegistry,
) -> Result<Vec<Arc<dyn QuestionSource>>> {
    let gate = Gate::new(Oracle::new(config.oracle.clone()));
    let mut sources: Vec<Arc<dyn QuestionSource>> = Vec::new();

    match &config.static_source {
        StaticSourceConfig::Dir { path } => {
            sources.push(Arc::new(StaticDirSource::new(path.clone())));
        }
        StaticSourceConfig::Http { base_url } => {
            let source = HttpStaticSource::new(base_url)
                .with_context(|| format!("failed to set up static source at {base_url}"))?;
            sources.push(Arc::new(source));
        }
        StaticSourceConfig::None => {}
    }

    if config.generation.prepopulate {
        let prepopulated = PrePopulatedSource::new(
            registry.clone(),
            gate.clone(),
            config.generation.prepopulate_per_key,
        )
        .with_bytes_per_question(config.generation.bytes_per_question_estimate);
        prepopulated.initialize().await;
        sources.push(Arc::new(prepopulated));
    }

    sources.push(Arc::new(OnDemandSource::new(
        registry,
        gate,
        config.generation.attempt_multiplier,
    )));
    Ok(sources)
}

/// Wire a full [`QuestionService`] from configuration, restoring any
/// persisted generated questions.
pub async fn build_service(
    config: &QuizpoolConfig,
    registry: GeneratorRegistry,
) -> Result<QuestionService> {
    let sources = build_sources(config, registry).await?;
    let blob: Arc<dyn BlobStore> = match &config.storage.dir {
        Some(dir) => Arc::new(FileBlobStore::new(dir.clone())),
        None => Arc::new(MemoryBlobStore::new()),
    };

    let gate = Gate::new(Oracle::new(config.oracle.clone()));
    let store = GeneratedQuestionStore::new(Arc::clone(&blob));
    let dispatcher = Dispatcher::new(sources, gate, Some(store));

    let service = QuestionService::new(dispatcher)
        .with_expansion(config.expansion.clone())
        .with_thresholds(config.monitor.clone())
        .with_tracker(Arc::new(BlobConsumedTracker::new(blob)))
        .with_cleanup_horizon(chrono::Duration::days(config.storage.cleanup_horizon_days));
    service.restore().await;
    Ok(service)
}
