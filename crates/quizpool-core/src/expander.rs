//! Exhaustion expansion ladder.
//!
//! When a key cannot supply a user any unseen questions, the search widens in
//! a fixed order: other difficulties, adjacent grades, related subjects, and
//! finally synthetic content. The first rung that yields anything wins.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::Dispatcher;
use crate::fallback::synthetic_questions;
use crate::model::{Difficulty, Grade, Question, QuestionKey, Subject};

/// Quotas for each rung of the ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    /// Questions borrowed from each other difficulty level.
    pub per_difficulty_quota: usize,
    /// Questions borrowed from each adjacent grade.
    pub per_grade_quota: usize,
    /// Questions borrowed from each related subject.
    pub per_subject_quota: usize,
    /// Size of a synthetic batch.
    pub synthetic_count: usize,
    /// Expansion runs when fewer unseen questions than this remain.
    pub floor: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            per_difficulty_quota: 10,
            per_grade_quota: 10,
            per_subject_quota: 5,
            synthetic_count: 5,
            floor: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionStrategy {
    Difficulty,
    Grade,
    Subject,
    Synthetic,
}

impl ExpansionStrategy {
    pub const LADDER: [ExpansionStrategy; 4] = [
        ExpansionStrategy::Difficulty,
        ExpansionStrategy::Grade,
        ExpansionStrategy::Subject,
        ExpansionStrategy::Synthetic,
    ];
}

impl fmt::Display for ExpansionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExpansionStrategy::Difficulty => "difficulty",
            ExpansionStrategy::Grade => "grade",
            ExpansionStrategy::Subject => "subject",
            ExpansionStrategy::Synthetic => "synthetic",
        };
        f.write_str(name)
    }
}

/// The criteria actually borrowed from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpandedCriteria {
    pub grades: Vec<Grade>,
    pub subjects: Vec<Subject>,
    pub difficulties: Vec<Difficulty>,
}

/// Outcome of an expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionRecord {
    pub strategy: ExpansionStrategy,
    pub questions: Vec<Question>,
    pub description: String,
    pub original: QuestionKey,
    pub expanded: ExpandedCriteria,
    /// Every rung attempted, in order; the last is `strategy`.
    pub tried: Vec<ExpansionStrategy>,
}

impl ExpansionRecord {
    /// User-facing explanation of why the batch looks different.
    pub fn message(&self) -> String {
        match self.strategy {
            ExpansionStrategy::Difficulty => format!(
                "Great progress! You've completed all {} questions. We've included some {} questions to keep you challenged.",
                self.original.difficulty,
                join_and(&self.expanded.difficulties)
            ),
            ExpansionStrategy::Grade => format!(
                "Excellent work! You've mastered Grade {} questions. Here are some questions from nearby grades to expand your knowledge.",
                self.original.grade
            ),
            ExpansionStrategy::Subject => format!(
                "Amazing! You've completed all {} questions. We've added some related subject questions to broaden your learning.",
                self.original.subject.display_name()
            ),
            ExpansionStrategy::Synthetic => "Outstanding progress! You've completed all available questions. We've created some new practice questions just for you.".to_string(),
        }
    }
}

fn join_and<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Runs the ladder, sourcing neighbor keys through the shared dispatcher.
#[derive(Clone)]
pub struct Expander {
    dispatcher: Dispatcher,
    config: ExpansionConfig,
}

impl Expander {
    pub fn new(dispatcher: Dispatcher, config: ExpansionConfig) -> Self {
        Self { dispatcher, config }
    }

    pub fn config(&self) -> &ExpansionConfig {
        &self.config
    }

    /// Walk the ladder for `key`. Never comes back empty.
    ///
    /// The borrowing rungs run in order until one yields questions; the
    /// synthetic rung closes the ladder.
    pub async fn expand(&self, key: QuestionKey, consumed: &HashSet<String>) -> ExpansionRecord {
        let mut tried = Vec::with_capacity(ExpansionStrategy::LADDER.len());

        for strategy in ExpansionStrategy::LADDER {
            tried.push(strategy);
            let record = match strategy {
                ExpansionStrategy::Difficulty => self.by_difficulty(key, consumed).await,
                ExpansionStrategy::Grade => self.by_grade(key, consumed).await,
                ExpansionStrategy::Subject => self.by_subject(key, consumed).await,
                ExpansionStrategy::Synthetic => break,
            };
            match record {
                Some(record) => return self.chosen(key, record, tried),
                None => tracing::debug!(%key, %strategy, "expansion rung yielded nothing"),
            }
        }

        let record = self.synthetic(key);
        self.chosen(key, record, tried)
    }

    fn chosen(
        &self,
        key: QuestionKey,
        mut record: ExpansionRecord,
        tried: Vec<ExpansionStrategy>,
    ) -> ExpansionRecord {
        tracing::info!(
            %key,
            strategy = %record.strategy,
            questions = record.questions.len(),
            "expanded exhausted key"
        );
        record.tried = tried;
        record
    }

    /// Borrow up to `quota` unseen questions from each neighbor, sourcing
    /// any neighbor whose pool is short.
    async fn borrow(
        &self,
        neighbors: &[QuestionKey],
        quota: usize,
        consumed: &HashSet<String>,
    ) -> (Vec<Question>, Vec<QuestionKey>) {
        let mut questions = Vec::new();
        let mut used = Vec::new();
        for neighbor in neighbors {
            let available = self.dispatcher.available(neighbor, consumed).await;
            if available < quota {
                self.dispatcher.ensure(*neighbor, quota - available).await;
            }
            let picked = self
                .dispatcher
                .sample_unconsumed(neighbor, quota, consumed)
                .await;
            if !picked.is_empty() {
                used.push(*neighbor);
                questions.extend(picked);
            }
        }
        (questions, used)
    }

    async fn by_difficulty(
        &self,
        key: QuestionKey,
        consumed: &HashSet<String>,
    ) -> Option<ExpansionRecord> {
        let neighbors: Vec<QuestionKey> = key
            .difficulty
            .others()
            .into_iter()
            .map(|d| key.with_difficulty(d))
            .collect();
        let (questions, used) = self
            .borrow(&neighbors, self.config.per_difficulty_quota, consumed)
            .await;
        if questions.is_empty() {
            return None;
        }

        let difficulties: Vec<Difficulty> = used.iter().map(|k| k.difficulty).collect();
        Some(ExpansionRecord {
            strategy: ExpansionStrategy::Difficulty,
            questions,
            description: format!("questions at {} difficulty", join_and(&difficulties)),
            original: key,
            expanded: ExpandedCriteria {
                grades: vec![key.grade],
                subjects: vec![key.subject],
                difficulties,
            },
            tried: Vec::new(),
        })
    }

    async fn by_grade(
        &self,
        key: QuestionKey,
        consumed: &HashSet<String>,
    ) -> Option<ExpansionRecord> {
        let neighbors: Vec<QuestionKey> = key
            .grade
            .adjacent()
            .into_iter()
            .map(|g| key.with_grade(g))
            .collect();
        let (questions, used) = self
            .borrow(&neighbors, self.config.per_grade_quota, consumed)
            .await;
        if questions.is_empty() {
            return None;
        }

        let grades: Vec<Grade> = used.iter().map(|k| k.grade).collect();
        Some(ExpansionRecord {
            strategy: ExpansionStrategy::Grade,
            questions,
            description: format!("questions from Grade {}", join_and(&grades)),
            original: key,
            expanded: ExpandedCriteria {
                grades,
                subjects: vec![key.subject],
                difficulties: vec![key.difficulty],
            },
            tried: Vec::new(),
        })
    }

    async fn by_subject(
        &self,
        key: QuestionKey,
        consumed: &HashSet<String>,
    ) -> Option<ExpansionRecord> {
        let neighbors: Vec<QuestionKey> = key
            .subject
            .related()
            .iter()
            .map(|s| key.with_subject(*s))
            .collect();
        let (questions, used) = self
            .borrow(&neighbors, self.config.per_subject_quota, consumed)
            .await;
        if questions.is_empty() {
            return None;
        }

        let subjects: Vec<Subject> = used.iter().map(|k| k.subject).collect();
        let names: Vec<&str> = subjects.iter().map(|s| s.display_name()).collect();
        Some(ExpansionRecord {
            strategy: ExpansionStrategy::Subject,
            questions,
            description: format!("related questions from {}", names.join(", ")),
            original: key,
            expanded: ExpandedCriteria {
                grades: vec![key.grade],
                subjects,
                difficulties: vec![key.difficulty],
            },
            tried: Vec::new(),
        })
    }

    /// Structural and oracle checks apply, duplicates are judged within the
    /// batch only, and the first candidate is kept no matter what.
    fn synthetic(&self, key: QuestionKey) -> ExpansionRecord {
        let candidates = synthetic_questions(&key, self.config.synthetic_count.max(1));

        let gate = self.dispatcher.gate();
        let mut known = HashSet::new();
        let mut questions = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if questions.is_empty() || gate.admit(&candidate, &known).is_ok() {
                known.insert(candidate.normalized_content());
                questions.push(candidate);
            }
        }

        ExpansionRecord {
            strategy: ExpansionStrategy::Synthetic,
            questions,
            description: "newly generated practice questions".to_string(),
            original: key,
            expanded: ExpandedCriteria::default(),
            tried: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(strategy: ExpansionStrategy, expanded: ExpandedCriteria) -> ExpansionRecord {
        ExpansionRecord {
            strategy,
            questions: Vec::new(),
            description: String::new(),
            original: "7_medium_math".parse().unwrap(),
            expanded,
            tried: vec![strategy],
        }
    }

    #[test]
    fn messages_follow_strategy() {
        let difficulty = record(
            ExpansionStrategy::Difficulty,
            ExpandedCriteria {
                difficulties: vec![Difficulty::Easy, Difficulty::Hard],
                ..ExpandedCriteria::default()
            },
        );
        assert_eq!(
            difficulty.message(),
            "Great progress! You've completed all medium questions. We've included some easy and hard questions to keep you challenged."
        );

        let grade = record(ExpansionStrategy::Grade, ExpandedCriteria::default());
        assert!(grade.message().starts_with("Excellent work! You've mastered Grade 7 questions."));

        let subject = record(ExpansionStrategy::Subject, ExpandedCriteria::default());
        assert!(subject.message().contains("completed all Math questions"));

        let synthetic = record(ExpansionStrategy::Synthetic, ExpandedCriteria::default());
        assert!(synthetic.message().starts_with("Outstanding progress!"));
    }

    #[tokio::test]
    async fn empty_sources_fall_through_to_synthetic() {
        let dispatcher = Dispatcher::new(vec![], Default::default(), None);
        let expander = Expander::new(dispatcher.clone(), ExpansionConfig::default());
        let key: QuestionKey = "1_easy_science".parse().unwrap();

        let record = expander.expand(key, &HashSet::new()).await;
        assert_eq!(record.strategy, ExpansionStrategy::Synthetic);
        assert_eq!(record.tried, ExpansionStrategy::LADDER.to_vec());
        assert_eq!(record.questions.len(), 5);
        // Synthetic content is handed out, not pooled.
        assert!(dispatcher.stats().await.is_empty());
    }
}
