//! Questions generated per request with a bounded retry budget.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::instrument;

use quizpool_core::error::SourceError;
use quizpool_core::gate::Gate;
use quizpool_core::model::{Question, QuestionKey};
use quizpool_core::traits::{GeneratorRegistry, QuestionSource};

/// Calls the subject's template one question at a time, making at most
/// `attempt_multiplier × desired` attempts. Returns whatever valid,
/// non-duplicate subset it collected, which may be short.
pub struct OnDemandSource {
    registry: GeneratorRegistry,
    gate: Gate,
    attempt_multiplier: usize,
}

impl OnDemandSource {
    pub fn new(registry: GeneratorRegistry, gate: Gate, attempt_multiplier: usize) -> Self {
        Self {
            registry,
            gate,
            attempt_multiplier: attempt_multiplier.max(1),
        }
    }

    pub fn max_attempts(&self, desired: usize) -> usize {
        self.attempt_multiplier.saturating_mul(desired)
    }
}

#[async_trait]
impl QuestionSource for OnDemandSource {
    fn name(&self) -> &str {
        "on-demand"
    }

    #[instrument(skip(self))]
    async fn try_fetch(
        &self,
        key: &QuestionKey,
        desired: usize,
    ) -> Result<Vec<Question>, SourceError> {
        let Some(generator) = self.registry.get(key.subject) else {
            return Err(SourceError::NotFound(format!(
                "no template registered for {}",
                key.subject
            )));
        };

        let budget = self.max_attempts(desired);
        let mut known = HashSet::new();
        let mut accepted = Vec::with_capacity(desired);
        let mut attempts = 0;

        while accepted.len() < desired && attempts < budget {
            attempts += 1;
            let candidate = generator.generate(key.grade, key.difficulty);
            if self.gate.admit(&candidate, &known).is_ok() {
                known.insert(candidate.normalized_content());
                accepted.push(candidate);
            }
        }

        if accepted.len() < desired {
            tracing::info!(
                generator = generator.name(),
                accepted = accepted.len(),
                attempts,
                "attempt budget spent before reaching desired count"
            );
        }
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGenerator;
    use quizpool_core::model::Subject;
    use std::sync::Arc;

    #[tokio::test]
    async fn stops_at_desired() {
        let generator = Arc::new(MockGenerator::unique());
        let registry = GeneratorRegistry::new().with(Subject::English, generator.clone());
        let source = OnDemandSource::new(registry, Gate::default(), 3);
        let key: QuestionKey = "6_medium_english".parse().unwrap();

        let questions = source.try_fetch(&key, 4).await.unwrap();
        assert_eq!(questions.len(), 4);
        assert_eq!(generator.call_count(), 4);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        // Same content every time, so only the first attempt is admitted.
        let generator = Arc::new(MockGenerator::repeating());
        let registry = GeneratorRegistry::new().with(Subject::Reading, generator.clone());
        let source = OnDemandSource::new(registry, Gate::default(), 3);
        let key: QuestionKey = "2_easy_reading".parse().unwrap();

        let questions = source.try_fetch(&key, 5).await.unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(generator.call_count(), 15);
    }

    #[tokio::test]
    async fn broken_template_yields_nothing() {
        let generator = Arc::new(MockGenerator::broken());
        let registry = GeneratorRegistry::new().with(Subject::Science, generator.clone());
        let source = OnDemandSource::new(registry, Gate::default(), 2);
        let key: QuestionKey = "8_hard_science".parse().unwrap();

        assert!(source.try_fetch(&key, 3).await.unwrap().is_empty());
        assert_eq!(generator.call_count(), 6);
    }

    #[tokio::test]
    async fn unregistered_subject_is_not_found() {
        let source = OnDemandSource::new(GeneratorRegistry::new(), Gate::default(), 3);
        let key: QuestionKey = "8_hard_history".parse().unwrap();
        assert!(matches!(
            source.try_fetch(&key, 3).await,
            Err(SourceError::NotFound(_))
        ));
    }
}
