//! Trait definitions at the pipeline's seams.
//!
//! Content sources are implemented by the `quizpool-sources` crate; question
//! templates plug in through [`GeneratorRegistry`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::model::{Difficulty, Grade, Question, QuestionKey, Subject};

// ---------------------------------------------------------------------------
// Content sources
// ---------------------------------------------------------------------------

/// A tier the dispatcher can pull candidate questions from.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Short name for logs (e.g. "static-dir").
    fn name(&self) -> &str;

    /// Fetch up to `desired` questions for `key`.
    async fn try_fetch(&self, key: &QuestionKey, desired: usize)
        -> Result<Vec<Question>, SourceError>;

    /// Like [`try_fetch`](QuestionSource::try_fetch), but failures are logged
    /// and read as zero results.
    async fn fetch(&self, key: &QuestionKey, desired: usize) -> Vec<Question> {
        match self.try_fetch(key, desired).await {
            Ok(questions) => questions,
            Err(SourceError::NotFound(_)) => {
                tracing::debug!(source = self.name(), %key, "nothing published for key");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(source = self.name(), %key, error = %e, "source fetch failed");
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Generator templates
// ---------------------------------------------------------------------------

/// A subject-specific question template.
///
/// Must not panic for any grade and difficulty. Output may be structurally
/// broken; the gate filters it.
pub trait QuestionGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn generate(&self, grade: Grade, difficulty: Difficulty) -> Question;

    fn generate_batch(&self, grade: Grade, difficulty: Difficulty, count: usize) -> Vec<Question> {
        (0..count).map(|_| self.generate(grade, difficulty)).collect()
    }
}

/// Lookup table from subject to template.
#[derive(Clone, Default)]
pub struct GeneratorRegistry {
    generators: HashMap<Subject, Arc<dyn QuestionGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `generator` for `subject`, replacing any previous entry.
    pub fn register(&mut self, subject: Subject, generator: Arc<dyn QuestionGenerator>) {
        self.generators.insert(subject, generator);
    }

    pub fn with(mut self, subject: Subject, generator: Arc<dyn QuestionGenerator>) -> Self {
        self.register(subject, generator);
        self
    }

    pub fn get(&self, subject: Subject) -> Option<&Arc<dyn QuestionGenerator>> {
        self.generators.get(&subject)
    }

    /// Subjects with a template, in [`Subject::ALL`] order.
    pub fn subjects(&self) -> Vec<Subject> {
        Subject::ALL
            .into_iter()
            .filter(|s| self.generators.contains_key(s))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Generate `count` raw candidates for `key`, or none without a template.
    pub fn generate(&self, key: &QuestionKey, count: usize) -> Vec<Question> {
        match self.get(key.subject) {
            Some(generator) => generator.generate_batch(key.grade, key.difficulty, count),
            None => Vec::new(),
        }
    }
}

impl fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("subjects", &self.subjects())
            .finish()
    }
}
