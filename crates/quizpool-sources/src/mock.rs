//! Mock source and generator for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use quizpool_core::error::SourceError;
use quizpool_core::model::{Difficulty, Grade, Question, QuestionKey, Subject};
use quizpool_core::traits::{QuestionGenerator, QuestionSource};

/// A mock content source for exercising the dispatcher without real content.
///
/// Serves canned questions per key, optionally after a delay or by failing.
pub struct MockSource {
    /// Canned questions per key.
    content: HashMap<QuestionKey, Vec<Question>>,
    /// Error message returned instead of content, if set.
    failure: Option<String>,
    /// Delay before answering.
    delay: Duration,
    /// Number of calls made.
    call_count: AtomicU32,
    /// `desired` from the last call.
    last_desired: Mutex<Option<usize>>,
}

impl MockSource {
    /// A source with nothing to offer.
    pub fn empty() -> Self {
        Self {
            content: HashMap::new(),
            failure: None,
            delay: Duration::ZERO,
            call_count: AtomicU32::new(0),
            last_desired: Mutex::new(None),
        }
    }

    /// A source that always fails with a network error.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::empty()
        }
    }

    /// Serve `questions` for `key`.
    pub fn with_questions(mut self, key: QuestionKey, questions: Vec<Question>) -> Self {
        self.content.entry(key).or_default().extend(questions);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Get the number of calls made to this source.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_desired(&self) -> Option<usize> {
        *self.last_desired.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl QuestionSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn try_fetch(
        &self,
        key: &QuestionKey,
        desired: usize,
    ) -> Result<Vec<Question>, SourceError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_desired.lock().unwrap_or_else(|e| e.into_inner()) = Some(desired);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(SourceError::Network(message.clone()));
        }
        Ok(self.content.get(key).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Unique,
    Repeating,
    Broken,
}

/// A mock template.
pub struct MockGenerator {
    mode: Mode,
    subject: Subject,
    call_count: AtomicU32,
}

impl MockGenerator {
    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            subject: Subject::English,
            call_count: AtomicU32::new(0),
        }
    }

    /// Every call yields new, valid content.
    pub fn unique() -> Self {
        Self::with_mode(Mode::Unique)
    }

    /// Every call yields the same valid content.
    pub fn repeating() -> Self {
        Self::with_mode(Mode::Repeating)
    }

    /// Every call yields a question whose answer is not among its options.
    pub fn broken() -> Self {
        Self::with_mode(Mode::Broken)
    }

    pub fn for_subject(mut self, subject: Subject) -> Self {
        self.subject = subject;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

impl QuestionGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    fn generate(&self, grade: Grade, difficulty: Difficulty) -> Question {
        let n = self.call_count.fetch_add(1, Ordering::Relaxed);
        let key = QuestionKey::new(grade, difficulty, self.subject);
        let options = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        let question = match self.mode {
            Mode::Unique => Question::new(&key, format!("Mock question #{n}"), options, "beta"),
            Mode::Repeating => Question::new(&key, "The same mock question", options, "beta"),
            Mode::Broken => Question::new(&key, format!("Broken question #{n}"), options, "delta"),
        };
        question.generated_by("mock")
    }
}
