//! Static question files on local disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::instrument;

use quizpool_core::error::SourceError;
use quizpool_core::model::{Question, QuestionKey};
use quizpool_core::traits::QuestionSource;

use crate::manifest::{Manifest, MANIFEST_FILE};

/// Reads `<dir>/<grade>_<difficulty>_<subject>.json`.
///
/// When `<dir>/manifest.json` exists it is read once and keys it does not
/// list are skipped without touching the disk.
pub struct StaticDirSource {
    dir: PathBuf,
    manifest: OnceCell<Option<Manifest>>,
}

impl StaticDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            manifest: OnceCell::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The manifest, if one is published and readable.
    pub async fn manifest(&self) -> Option<&Manifest> {
        self.manifest
            .get_or_init(|| async {
                let path = self.dir.join(MANIFEST_FILE);
                match read_json::<Manifest>(&path).await {
                    Ok(manifest) => {
                        tracing::debug!(
                            combinations = manifest.total_combinations,
                            questions = manifest.total_questions,
                            "loaded static manifest"
                        );
                        Some(manifest)
                    }
                    Err(SourceError::NotFound(_)) => None,
                    Err(e) => {
                        tracing::warn!(error = %e, "ignoring unreadable manifest");
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    /// Read every question published for `key`.
    pub async fn load(&self, key: &QuestionKey) -> Result<Vec<Question>, SourceError> {
        read_json(&self.dir.join(key.file_name())).await
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, SourceError> {
    let body = match tokio::fs::read_to_string(path).await {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SourceError::NotFound(path.display().to_string()));
        }
        Err(e) => {
            return Err(SourceError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            });
        }
    };
    serde_json::from_str(&body).map_err(|e| SourceError::Parse {
        origin: path.display().to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl QuestionSource for StaticDirSource {
    fn name(&self) -> &str {
        "static-dir"
    }

    /// Static files are authoritative, so the whole file is returned
    /// regardless of `desired`.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    async fn try_fetch(
        &self,
        key: &QuestionKey,
        desired: usize,
    ) -> Result<Vec<Question>, SourceError> {
        if let Some(manifest) = self.manifest().await {
            if !manifest.has(key) {
                return Err(SourceError::NotFound(key.to_string()));
            }
        }
        let questions = self.load(key).await?;
        tracing::debug!(count = questions.len(), "read static questions");
        Ok(questions)
    }
}
