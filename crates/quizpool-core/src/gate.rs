//! Admission gate for candidate questions.
//!
//! Every question passes through here before it can enter a pool. Checks run
//! in a fixed order and stop at the first failure:
//!
//! 1. non-empty content and correct answer
//! 2. at least two distinct, non-blank options containing the correct answer
//! 3. the oracle accepts the question's own declared answer
//! 4. the normalized content is not already known

use std::collections::{BTreeMap, HashSet};

use crate::error::{Rejection, StructuralIssue};
use crate::model::{normalize_text, Question};
use crate::oracle::Oracle;

/// Admission gate.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    oracle: Oracle,
}

/// Result of gating a batch.
#[derive(Debug, Default)]
pub struct GateReport {
    pub admitted: Vec<Question>,
    pub rejected: Vec<Rejection>,
}

impl GateReport {
    /// Rejection counts keyed by [`Rejection::label`].
    pub fn rejection_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for r in &self.rejected {
            *counts.entry(r.label()).or_insert(0) += 1;
        }
        counts
    }
}

impl Gate {
    pub fn new(oracle: Oracle) -> Self {
        Self { oracle }
    }

    pub fn oracle(&self) -> &Oracle {
        &self.oracle
    }

    /// Shape checks only: steps 1 and 2.
    pub fn check_structure(question: &Question) -> Result<(), StructuralIssue> {
        if question.content.trim().is_empty() {
            return Err(StructuralIssue::EmptyContent);
        }
        if question.correct_answer.trim().is_empty() {
            return Err(StructuralIssue::EmptyAnswer);
        }
        if question.options.len() < 2 {
            return Err(StructuralIssue::TooFewOptions);
        }

        let mut seen = HashSet::with_capacity(question.options.len());
        for option in &question.options {
            if option.trim().is_empty() {
                return Err(StructuralIssue::EmptyOption);
            }
            if !seen.insert(normalize_text(option)) {
                return Err(StructuralIssue::DuplicateOption);
            }
        }

        if !question.options.contains(&question.correct_answer) {
            return Err(StructuralIssue::AnswerNotInOptions);
        }
        Ok(())
    }

    /// Decide whether `candidate` may join a pool whose normalized contents
    /// are `existing`.
    pub fn admit(&self, candidate: &Question, existing: &HashSet<String>) -> Result<(), Rejection> {
        Self::check_structure(candidate).map_err(Rejection::Structural)?;

        if let Err(verdict) = self.oracle.self_check(candidate) {
            return Err(Rejection::Oracle {
                confidence: verdict.confidence,
            });
        }

        if existing.contains(&candidate.normalized_content()) {
            return Err(Rejection::Duplicate);
        }
        Ok(())
    }

    /// Gate a batch, de-duplicating against `existing` and within the batch.
    ///
    /// Rejected candidates are logged and dropped.
    pub fn admit_batch(&self, candidates: Vec<Question>, existing: &HashSet<String>) -> GateReport {
        let mut known = existing.clone();
        let mut report = GateReport::default();

        for candidate in candidates {
            match self.admit(&candidate, &known) {
                Ok(()) => {
                    known.insert(candidate.normalized_content());
                    report.admitted.push(candidate);
                }
                Err(rejection) => {
                    log_rejection(&candidate, &rejection);
                    report.rejected.push(rejection);
                }
            }
        }
        report
    }
}

fn log_rejection(candidate: &Question, rejection: &Rejection) {
    match rejection {
        Rejection::Duplicate => {
            tracing::debug!(id = %candidate.id, excerpt = %candidate.excerpt(), "duplicate question dropped");
        }
        _ => {
            tracing::warn!(
                id = %candidate.id,
                reason = %rejection,
                excerpt = %candidate.excerpt(),
                "question rejected"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionKey;

    fn key() -> QuestionKey {
        QuestionKey::parse("4", "easy", "math").unwrap()
    }

    fn q(content: &str, options: &[&str], correct: &str) -> Question {
        Question::new(
            &key(),
            content,
            options.iter().map(|s| s.to_string()).collect(),
            correct,
        )
    }

    #[test]
    fn accepts_well_formed_question() {
        let gate = Gate::default();
        let candidate = q("What is 3 + 4?", &["6", "7", "8", "9"], "7");
        assert!(gate.admit(&candidate, &HashSet::new()).is_ok());
    }

    #[test]
    fn structural_checks_in_order() {
        let cases = [
            (q("", &["1", "2"], "1"), StructuralIssue::EmptyContent),
            (q("Q", &["1", "2"], " "), StructuralIssue::EmptyAnswer),
            (q("Q", &["1"], "1"), StructuralIssue::TooFewOptions),
            (q("Q", &["1", " "], "1"), StructuralIssue::EmptyOption),
            (q("Q", &["Yes", "yes "], "Yes"), StructuralIssue::DuplicateOption),
            (q("Q", &["1", "2"], "3"), StructuralIssue::AnswerNotInOptions),
        ];
        let gate = Gate::default();
        for (candidate, issue) in cases {
            assert_eq!(
                gate.admit(&candidate, &HashSet::new()),
                Err(Rejection::Structural(issue))
            );
        }
    }

    #[test]
    fn oracle_rejection_is_distinct_from_structure() {
        use crate::oracle::OracleConfig;

        // A threshold above 1.0 makes every self-check fail.
        let gate = Gate::new(Oracle::new(OracleConfig {
            acceptance_threshold: 1.5,
            ..OracleConfig::default()
        }));
        let candidate = q("What is 1 + 1?", &["1", "2"], "2");
        assert!(matches!(
            gate.admit(&candidate, &HashSet::new()),
            Err(Rejection::Oracle { .. })
        ));
    }

    #[test]
    fn duplicate_content_is_case_and_space_insensitive() {
        let gate = Gate::default();
        let existing: HashSet<String> = ["what is 3 + 4?".to_string()].into();
        let candidate = q("  What is  3 + 4? ", &["6", "7"], "7");
        assert_eq!(gate.admit(&candidate, &existing), Err(Rejection::Duplicate));
    }

    #[test]
    fn batch_dedups_within_itself() {
        let gate = Gate::default();
        let batch = vec![
            q("What is 2 + 2?", &["4", "5"], "4"),
            q("what is 2 + 2?", &["4", "5"], "4"),
            q("What is 2 + 3?", &["5", "6"], "7"),
        ];
        let report = gate.admit_batch(batch, &HashSet::new());
        assert_eq!(report.admitted.len(), 1);
        let counts = report.rejection_counts();
        assert_eq!(counts.get("duplicate"), Some(&1));
        assert_eq!(counts.get("structural"), Some(&1));

        for admitted in &report.admitted {
            assert!(admitted.options.contains(&admitted.correct_answer));
            assert!(gate.oracle().is_correct(admitted, &admitted.correct_answer).is_correct);
        }
    }
}
