//! Static question files served over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::instrument;

use quizpool_core::error::SourceError;
use quizpool_core::model::{Question, QuestionKey};
use quizpool_core::traits::QuestionSource;

use crate::manifest::{Manifest, MANIFEST_FILE};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Fetches `<base_url>/questions/<key>.json`, consulting
/// `<base_url>/questions/manifest.json` first when the server publishes one.
pub struct HttpStaticSource {
    base_url: String,
    client: reqwest::Client,
    manifest: OnceCell<Option<Manifest>>,
}

impl HttpStaticSource {
    pub fn new(base_url: &str) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            manifest: OnceCell::new(),
        })
    }

    fn url(&self, file: &str) -> String {
        format!("{}/questions/{file}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| SourceError::Parse {
            origin: url.to_string(),
            message: e.to_string(),
        })
    }

    /// The published manifest, fetched once.
    pub async fn manifest(&self) -> Option<&Manifest> {
        self.manifest
            .get_or_init(|| async {
                match self.get_json::<Manifest>(&self.url(MANIFEST_FILE)).await {
                    Ok(manifest) => Some(manifest),
                    Err(SourceError::NotFound(_)) => None,
                    Err(e) => {
                        tracing::warn!(error = %e, "ignoring unavailable manifest");
                        None
                    }
                }
            })
            .await
            .as_ref()
    }
}

#[async_trait]
impl QuestionSource for HttpStaticSource {
    fn name(&self) -> &str {
        "static-http"
    }

    #[instrument(skip(self), fields(base_url = %self.base_url))]
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
        self.get_json(&self.url(&key.file_name())).await
    }
}
