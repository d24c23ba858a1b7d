//! Synthetic emergency content, the last rung of the expansion ladder.
//!
//! Math-family keys get simple arithmetic; every other subject gets
//! grade-banded practice placeholders. Both shapes always pass the gate's
//! structural and oracle checks.

use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::model::{Difficulty, Question, QuestionKey};

/// Provenance tag stamped on synthetic questions.
pub const FALLBACK_CREATOR: &str = "exhaustion-fallback";

/// Arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    pub fn symbol(self) -> char {
        match self {
            Op::Add => '+',
            Op::Sub => '-',
            Op::Mul => '×',
            Op::Div => '÷',
        }
    }

    pub fn topic(self) -> &'static str {
        match self {
            Op::Add => "addition",
            Op::Sub => "subtraction",
            Op::Mul => "multiplication",
            Op::Div => "division",
        }
    }

    /// `None` for division that is not exact or by zero.
    pub fn apply(self, a: i64, b: i64) -> Option<i64> {
        match self {
            Op::Add => a.checked_add(b),
            Op::Sub => a.checked_sub(b),
            Op::Mul => a.checked_mul(b),
            Op::Div if b != 0 && a % b == 0 => Some(a / b),
            Op::Div => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Three distinct positive wrong answers near `correct`.
pub fn distractors<R: Rng + ?Sized>(correct: i64, rng: &mut R) -> Vec<i64> {
    let mut offsets = [-3i64, -2, -1, 1, 2, 3, 10, -10];
    offsets.shuffle(rng);
    let mut picked = Vec::with_capacity(3);
    for offset in offsets {
        let candidate = correct + offset;
        if candidate > 0 && !picked.contains(&candidate) {
            picked.push(candidate);
        }
        if picked.len() == 3 {
            break;
        }
    }
    picked
}

/// A four-option question for `a <op> b`, or `None` if the result is not a
/// positive integer.
pub fn arithmetic_question<R: Rng + ?Sized>(
    key: &QuestionKey,
    a: i64,
    op: Op,
    b: i64,
    rng: &mut R,
) -> Option<Question> {
    let answer = op.apply(a, b).filter(|v| *v > 0)?;
    let mut options: Vec<String> = distractors(answer, rng)
        .into_iter()
        .map(|d| d.to_string())
        .collect();
    options.push(answer.to_string());
    options.shuffle(rng);

    Some(
        Question::new(key, format!("What is {a} {op} {b}?"), options, answer.to_string())
            .with_topic(op.topic())
            .with_explanation(format!("{a} {op} {b} = {answer}")),
    )
}

/// Build `count` synthetic questions for `key`.
pub fn synthetic_questions(key: &QuestionKey, count: usize) -> Vec<Question> {
    let mut rng = rand::thread_rng();
    (1..=count)
        .map(|i| {
            let question = if key.subject.is_numeric() {
                emergency_arithmetic(key, &mut rng)
            } else {
                None
            };
            question
                .unwrap_or_else(|| placeholder(key, i))
                .with_tags(["generated", "fallback"])
                .generated_by(FALLBACK_CREATOR)
        })
        .collect()
}

fn emergency_arithmetic<R: Rng + ?Sized>(key: &QuestionKey, rng: &mut R) -> Option<Question> {
    let scale = i64::from(key.grade.value()) * 5 + 5;
    match key.difficulty {
        Difficulty::Easy => {
            let a = rng.gen_range(1..=scale);
            let b = rng.gen_range(1..=scale);
            arithmetic_question(key, a, Op::Add, b, rng)
        }
        Difficulty::Medium => {
            let a = rng.gen_range(1..=scale * 2);
            let b = rng.gen_range(1..=scale * 2);
            if rng.gen_bool(0.5) {
                arithmetic_question(key, a, Op::Add, b, rng)
            } else {
                let (hi, lo) = if a > b { (a, b) } else { (b + 1, a) };
                arithmetic_question(key, hi, Op::Sub, lo, rng)
            }
        }
        Difficulty::Hard => {
            let b = rng.gen_range(2..=12);
            let c = rng.gen_range(2..=12);
            if rng.gen_bool(0.5) {
                arithmetic_question(key, b, Op::Mul, c, rng)
            } else {
                arithmetic_question(key, b * c, Op::Div, b, rng)
            }
        }
    }
}

fn placeholder(key: &QuestionKey, index: usize) -> Question {
    let band = match key.grade.value() {
        1..=3 => "early",
        4..=6 => "middle",
        7..=9 => "upper",
        _ => "senior",
    };
    let subject = key.subject.display_name();
    let options = ["Option A", "Option B", "Option C", "Option D"]
        .into_iter()
        .map(String::from)
        .collect();

    Question::new(
        key,
        format!(
            "Practice Question {index} for Grade {} {subject} ({band} {} review)",
            key.grade, key.difficulty
        ),
        options,
        "Option A",
    )
    .with_topic(format!("{subject} practice"))
    .with_explanation(format!(
        "A generated practice question to help you keep learning {subject}."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Gate;
    use std::collections::HashSet;

    #[test]
    fn distractors_are_positive_and_distinct() {
        let mut rng = rand::thread_rng();
        for correct in [1, 2, 5, 100] {
            let wrong = distractors(correct, &mut rng);
            assert_eq!(wrong.len(), 3);
            assert!(wrong.iter().all(|d| *d > 0 && *d != correct));
            let unique: HashSet<_> = wrong.iter().collect();
            assert_eq!(unique.len(), 3);
        }
    }

    #[test]
    fn division_must_be_exact() {
        assert_eq!(Op::Div.apply(12, 4), Some(3));
        assert_eq!(Op::Div.apply(13, 4), None);
        assert_eq!(Op::Div.apply(1, 0), None);
    }

    #[test]
    fn synthetic_batches_pass_the_gate() {
        let gate = Gate::default();
        for raw in ["1_easy_math", "6_medium_numeracy", "12_hard_math", "9_hard_thinking-skills"] {
            let key: QuestionKey = raw.parse().unwrap();
            let batch = synthetic_questions(&key, 5);
            assert_eq!(batch.len(), 5);
            for q in &batch {
                assert!(gate.admit(q, &HashSet::new()).is_ok(), "{raw}: {}", q.content);
                assert!(q.tags.contains("fallback"));
                assert_eq!(q.created_by, FALLBACK_CREATOR);
                assert!(q.is_generated);
                assert_eq!(q.key().unwrap(), key);
            }
        }
    }

    #[test]
    fn placeholders_put_the_answer_first() {
        let key: QuestionKey = "3_easy_history".parse().unwrap();
        let q = &synthetic_questions(&key, 1)[0];
        assert_eq!(q.options[0], q.correct_answer);
        assert!(q.content.contains("Grade 3 History"));
    }
}
