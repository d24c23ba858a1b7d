//! Built-in question templates.

use rand::Rng;

use quizpool_core::fallback::{arithmetic_question, Op};
use quizpool_core::model::{Difficulty, Grade, Question, QuestionKey, Subject};
use quizpool_core::traits::{GeneratorRegistry, QuestionGenerator};

/// Four-option arithmetic scaled by grade and difficulty.
///
/// Easy keeps to addition and subtraction within a small range, medium adds
/// multiplication, hard mixes all four operators over larger operands.
#[derive(Debug, Clone, Copy)]
pub struct ArithmeticGenerator {
    subject: Subject,
}

impl ArithmeticGenerator {
    pub fn new(subject: Subject) -> Self {
        Self { subject }
    }

    fn operators(difficulty: Difficulty) -> &'static [Op] {
        match difficulty {
            Difficulty::Easy => &[Op::Add, Op::Sub],
            Difficulty::Medium => &[Op::Add, Op::Sub, Op::Mul],
            Difficulty::Hard => &[Op::Add, Op::Sub, Op::Mul, Op::Div],
        }
    }

    fn ceiling(grade: Grade, difficulty: Difficulty) -> i64 {
        let base = i64::from(grade.value()) * 10;
        match difficulty {
            Difficulty::Easy => base,
            Difficulty::Medium => base * 2,
            Difficulty::Hard => base * 5,
        }
    }

    fn operands<R: Rng>(rng: &mut R, op: Op, grade: Grade, difficulty: Difficulty) -> (i64, i64) {
        let ceiling = Self::ceiling(grade, difficulty);
        match op {
            Op::Add => (rng.gen_range(1..=ceiling), rng.gen_range(1..=ceiling)),
            Op::Sub => {
                let a = rng.gen_range(2..=ceiling.max(2));
                (a, rng.gen_range(1..a))
            }
            Op::Mul => {
                let limit = (i64::from(grade.value()) + 2).min(12);
                (rng.gen_range(2..=limit), rng.gen_range(2..=limit))
            }
            Op::Div => {
                let limit = (i64::from(grade.value()) + 2).min(12);
                let divisor = rng.gen_range(2..=limit);
                let quotient = rng.gen_range(1..=limit);
                (divisor * quotient, divisor)
            }
        }
    }
}

impl QuestionGenerator for ArithmeticGenerator {
    fn name(&self) -> &str {
        "arithmetic"
    }

    fn generate(&self, grade: Grade, difficulty: Difficulty) -> Question {
        let key = QuestionKey::new(grade, difficulty, self.subject);
        let mut rng = rand::thread_rng();
        let ops = Self::operators(difficulty);
        let op = ops[rng.gen_range(0..ops.len())];
        let (a, b) = Self::operands(&mut rng, op, grade, difficulty);

        // Operands above are chosen so every operator yields a positive result.
        arithmetic_question(&key, a, op, b, &mut rng)
            .unwrap_or_else(|| {
                Question::new(&key, format!("What is {a} {op} {b}?"), Vec::new(), "")
            })
            .with_tags(["arithmetic", op.topic()])
            .generated_by("arithmetic-template")
    }
}

/// A registry with [`ArithmeticGenerator`] for every math-family subject.
pub fn default_registry() -> GeneratorRegistry {
    let mut registry = GeneratorRegistry::new();
    for subject in Subject::ALL.into_iter().filter(|s| s.is_numeric()) {
        registry.register(subject, std::sync::Arc::new(ArithmeticGenerator::new(subject)));
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizpool_core::gate::Gate;
    use std::collections::HashSet;

    #[test]
    fn every_grade_and_difficulty_passes_the_gate() {
        let gate = Gate::default();
        for subject in [Subject::Math, Subject::Numeracy] {
            let generator = ArithmeticGenerator::new(subject);
            for grade in Grade::all() {
                for difficulty in Difficulty::ALL {
                    for q in generator.generate_batch(grade, difficulty, 10) {
                        assert!(gate.admit(&q, &HashSet::new()).is_ok(), "{}", q.content);
                        assert_eq!(q.key().unwrap(), QuestionKey::new(grade, difficulty, subject));
                        assert!(q.is_generated);
                    }
                }
            }
        }
    }

    #[test]
    fn easy_questions_avoid_multiplication() {
        let generator = ArithmeticGenerator::new(Subject::Math);
        let grade = Grade::new(3).unwrap();
        for q in generator.generate_batch(grade, Difficulty::Easy, 50) {
            assert!(q.content.contains('+') || q.content.contains('-'), "{}", q.content);
        }
    }

    #[test]
    fn default_registry_covers_math_family_only() {
        let registry = default_registry();
        assert_eq!(
            registry.subjects(),
            vec![Subject::Math, Subject::Numeracy, Subject::MathematicalReasoning]
        );
        assert!(registry.get(Subject::English).is_none());
    }
}
