//! Questions generated eagerly at startup and served from memory.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::RwLock;

use quizpool_core::error::SourceError;
use quizpool_core::gate::Gate;
use quizpool_core::model::{Question, QuestionKey};
use quizpool_core::traits::{GeneratorRegistry, QuestionSource};

/// Estimated footprint of the pre-populated table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub combinations: usize,
    pub total_questions: usize,
    pub estimated_mb: f64,
}

/// In-memory table filled by [`initialize`](PrePopulatedSource::initialize).
///
/// Reads before initialization return nothing and log a warning.
pub struct PrePopulatedSource {
    registry: GeneratorRegistry,
    gate: Gate,
    per_key: usize,
    bytes_per_question: usize,
    table: RwLock<HashMap<QuestionKey, Vec<Question>>>,
    initialized: AtomicBool,
}

impl PrePopulatedSource {
    pub fn new(registry: GeneratorRegistry, gate: Gate, per_key: usize) -> Self {
        Self {
            registry,
            gate,
            per_key,
            bytes_per_question: 2048,
            table: RwLock::new(HashMap::new()),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn with_bytes_per_question(mut self, bytes: usize) -> Self {
        self.bytes_per_question = bytes;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Generate `per_key` gated questions for every grade, difficulty and
    /// registered subject. A second call is a no-op; use
    /// [`refresh`](PrePopulatedSource::refresh) to rebuild.
    pub async fn initialize(&self) {
        if self.is_initialized() {
            return;
        }
        self.rebuild().await;
    }

    /// Discard the table and generate it again.
    pub async fn refresh(&self) {
        self.initialized.store(false, Ordering::Release);
        self.rebuild().await;
    }

    async fn rebuild(&self) {
        let start = Instant::now();
        let keys = QuestionKey::all_for(&self.registry.subjects());
        let mut table = HashMap::with_capacity(keys.len());

        for key in keys {
            let candidates = self.registry.generate(&key, self.per_key);
            let report = self.gate.admit_batch(candidates, &HashSet::new());
            if !report.admitted.is_empty() {
                table.insert(key, report.admitted);
            }
            tokio::task::yield_now().await;
        }

        let mut guard = self.table.write().await;
        *guard = table;
        self.initialized.store(true, Ordering::Release);
        let total: usize = guard.values().map(Vec::len).sum();
        tracing::info!(
            combinations = guard.len(),
            questions = total,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "pre-populated question table"
        );
    }

    /// Question count per key.
    pub async fn statistics(&self) -> BTreeMap<String, usize> {
        self.table
            .read()
            .await
            .iter()
            .map(|(key, questions)| (key.to_string(), questions.len()))
            .collect()
    }

    pub async fn memory_usage(&self) -> MemoryUsage {
        let table = self.table.read().await;
        let total_questions: usize = table.values().map(Vec::len).sum();
        let bytes = total_questions * self.bytes_per_question;
        MemoryUsage {
            combinations: table.len(),
            total_questions,
            estimated_mb: (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
        }
    }
}

#[async_trait]
impl QuestionSource for PrePopulatedSource {
    fn name(&self) -> &str {
        "prepopulated"
    }

    async fn try_fetch(
        &self,
        key: &QuestionKey,
        desired: usize,
    ) -> Result<Vec<Question>, SourceError> {
        if !self.is_initialized() {
            tracing::warn!(%key, "pre-populated table read before initialization");
            return Ok(Vec::new());
        }
        let table = self.table.read().await;
        let Some(questions) = table.get(key) else {
            return Err(SourceError::NotFound(key.to_string()));
        };
        let mut picked = questions.clone();
        picked.shuffle(&mut rand::thread_rng());
        picked.truncate(desired);
        Ok(picked)
    }
}
