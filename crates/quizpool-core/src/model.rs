//! Core data model types for quizpool.
//!
//! Questions, the (grade, difficulty, subject) key that pools are indexed by,
//! and the typed vocabulary around it.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::KeyError;

/// Question difficulty level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[serde(alias = "Easy", alias = "EASY")]
    Easy,
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "Hard", alias = "HARD")]
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    /// The two levels other than `self`, in ascending order.
    pub fn others(self) -> Vec<Difficulty> {
        Self::ALL.into_iter().filter(|d| *d != self).collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(KeyError::Difficulty(other.to_string())),
        }
    }
}

/// School grade, 1 through 12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Grade(u8);

impl Grade {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 12;

    pub fn new(value: u8) -> Result<Self, KeyError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(KeyError::Grade(value.to_string()))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Every grade from 1 to 12.
    pub fn all() -> impl Iterator<Item = Grade> {
        (Self::MIN..=Self::MAX).map(Grade)
    }

    /// Grades one below and one above, dropping any outside 1..=12.
    pub fn adjacent(self) -> Vec<Grade> {
        let mut grades = Vec::with_capacity(2);
        if self.0 > Self::MIN {
            grades.push(Grade(self.0 - 1));
        }
        if self.0 < Self::MAX {
            grades.push(Grade(self.0 + 1));
        }
        grades
    }
}

impl TryFrom<u8> for Grade {
    type Error = KeyError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Grade::new(value)
    }
}

impl From<Grade> for u8 {
    fn from(grade: Grade) -> Self {
        grade.0
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Grade {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        trimmed
            .parse::<u8>()
            .map_err(|_| KeyError::Grade(trimmed.to_string()))
            .and_then(Grade::new)
    }
}

/// Subjects a pool can be keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Subject {
    Math,
    Numeracy,
    MathematicalReasoning,
    English,
    Reading,
    Language,
    ThinkingSkills,
    Science,
    History,
    Geography,
}

impl Subject {
    pub const ALL: [Subject; 10] = [
        Subject::Math,
        Subject::Numeracy,
        Subject::MathematicalReasoning,
        Subject::English,
        Subject::Reading,
        Subject::Language,
        Subject::ThinkingSkills,
        Subject::Science,
        Subject::History,
        Subject::Geography,
    ];

    /// Canonical slug used in keys and file names.
    pub fn slug(self) -> &'static str {
        match self {
            Subject::Math => "math",
            Subject::Numeracy => "numeracy",
            Subject::MathematicalReasoning => "mathematical-reasoning",
            Subject::English => "english",
            Subject::Reading => "reading",
            Subject::Language => "language",
            Subject::ThinkingSkills => "thinking-skills",
            Subject::Science => "science",
            Subject::History => "history",
            Subject::Geography => "geography",
        }
    }

    /// Human-readable name stored on questions.
    pub fn display_name(self) -> &'static str {
        match self {
            Subject::Math => "Math",
            Subject::Numeracy => "Numeracy",
            Subject::MathematicalReasoning => "Mathematical Reasoning",
            Subject::English => "English",
            Subject::Reading => "Reading",
            Subject::Language => "Language",
            Subject::ThinkingSkills => "Thinking Skills",
            Subject::Science => "Science",
            Subject::History => "History",
            Subject::Geography => "Geography",
        }
    }

    /// Map free-form subject text onto a canonical subject.
    ///
    /// Matching is keyword based and case-insensitive, so "Maths",
    /// "math_practice" and "Mathematics" all land on [`Subject::Math`], while
    /// anything mentioning both "math" and "reasoning" is
    /// [`Subject::MathematicalReasoning`].
    pub fn normalize(raw: &str) -> Result<Subject, KeyError> {
        let s = raw.trim().to_lowercase();
        let subject = if s.contains("math") && s.contains("reason") {
            Subject::MathematicalReasoning
        } else if s.contains("math") {
            Subject::Math
        } else if s.contains("numeracy") {
            Subject::Numeracy
        } else if s.contains("thinking") {
            Subject::ThinkingSkills
        } else if s.contains("reading") {
            Subject::Reading
        } else if s.contains("english") {
            Subject::English
        } else if s.contains("language") {
            Subject::Language
        } else if s.contains("science") {
            Subject::Science
        } else if s.contains("history") {
            Subject::History
        } else if s.contains("geography") {
            Subject::Geography
        } else {
            return Err(KeyError::Subject(raw.trim().to_string()));
        };
        Ok(subject)
    }

    /// Subjects close enough to borrow questions from when this one runs dry.
    pub fn related(self) -> &'static [Subject] {
        match self {
            Subject::Math => &[Subject::Numeracy, Subject::MathematicalReasoning],
            Subject::Numeracy => &[Subject::Math, Subject::MathematicalReasoning],
            Subject::MathematicalReasoning => &[Subject::Math, Subject::Numeracy],
            Subject::English => &[Subject::Reading, Subject::Language],
            Subject::Reading => &[Subject::English, Subject::Language],
            Subject::Language => &[Subject::English, Subject::Reading],
            Subject::ThinkingSkills => &[Subject::English, Subject::Math],
            Subject::Science => &[Subject::Math, Subject::ThinkingSkills],
            Subject::History | Subject::Geography => &[Subject::English, Subject::ThinkingSkills],
        }
    }

    /// Whether numeric templates apply to this subject.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Subject::Math | Subject::Numeracy | Subject::MathematicalReasoning
        )
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Subject {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Subject::normalize(s)
    }
}

/// The unit of caching, sourcing and exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuestionKey {
    pub grade: Grade,
    pub difficulty: Difficulty,
    pub subject: Subject,
}

impl QuestionKey {
    pub fn new(grade: Grade, difficulty: Difficulty, subject: Subject) -> Self {
        Self {
            grade,
            difficulty,
            subject,
        }
    }

    /// Build a key from loosely formatted request strings.
    pub fn parse(grade: &str, difficulty: &str, subject: &str) -> Result<Self, KeyError> {
        Ok(Self {
            grade: grade.parse()?,
            difficulty: difficulty.parse()?,
            subject: Subject::normalize(subject)?,
        })
    }

    pub fn with_difficulty(self, difficulty: Difficulty) -> Self {
        Self { difficulty, ..self }
    }

    pub fn with_grade(self, grade: Grade) -> Self {
        Self { grade, ..self }
    }

    pub fn with_subject(self, subject: Subject) -> Self {
        Self { subject, ..self }
    }

    /// `<grade>_<difficulty>_<subject>`, the stem of the static file for this key.
    pub fn file_stem(&self) -> String {
        self.to_string()
    }

    pub fn file_name(&self) -> String {
        format!("{self}.json")
    }

    /// Every grade × difficulty × subject combination for the given subjects.
    pub fn all_for(subjects: &[Subject]) -> Vec<QuestionKey> {
        let mut keys = Vec::with_capacity(12 * 3 * subjects.len());
        for grade in Grade::all() {
            for difficulty in Difficulty::ALL {
                for &subject in subjects {
                    keys.push(QuestionKey::new(grade, difficulty, subject));
                }
            }
        }
        keys
    }
}

impl fmt::Display for QuestionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.grade, self.difficulty, self.subject.slug())
    }
}

impl FromStr for QuestionKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stem = s.trim().trim_end_matches(".json");
        let mut parts = stem.splitn(3, '_');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(grade), Some(difficulty), Some(subject)) => {
                QuestionKey::parse(grade, difficulty, subject)
            }
            _ => Err(KeyError::Malformed(s.to_string())),
        }
    }
}

/// A single practice question.
///
/// Field names on the wire follow the static question files
/// (`correctAnswer`, `isGenerated`, ...). Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Unique identifier.
    #[serde(alias = "_id")]
    pub id: String,
    /// Prompt text.
    pub content: String,
    /// Answer options, in display order.
    #[serde(default)]
    pub options: Vec<String>,
    /// The option that is correct.
    #[serde(default)]
    pub correct_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Subject as authored; normalized with [`Subject::normalize`] when keyed.
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub topic: String,
    pub difficulty: Difficulty,
    #[serde(deserialize_with = "grade_string")]
    pub grade: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Provenance tag of whoever produced this question.
    #[serde(default = "default_created_by")]
    pub created_by: String,
    #[serde(default)]
    pub is_generated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

fn default_created_by() -> String {
    "static".to_string()
}

/// Grades appear both as `"5"` and `5` in the wild.
fn grade_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

impl Question {
    /// Create a question for `key` with a fresh id.
    pub fn new(
        key: &QuestionKey,
        content: impl Into<String>,
        options: Vec<String>,
        correct_answer: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            options,
            correct_answer: correct_answer.into(),
            explanation: None,
            subject: key.subject.display_name().to_string(),
            topic: String::new(),
            difficulty: key.difficulty,
            grade: key.grade.to_string(),
            tags: BTreeSet::new(),
            created_by: "quizpool".to_string(),
            is_generated: false,
            generated_at: None,
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Stamp generation provenance: `created_by`, `is_generated`, `generated_at`.
    pub fn generated_by(mut self, method: impl Into<String>) -> Self {
        self.created_by = method.into();
        self.is_generated = true;
        self.generated_at = Some(Utc::now());
        self
    }

    /// The key this question belongs to, as declared by its own fields.
    pub fn key(&self) -> Result<QuestionKey, KeyError> {
        Ok(QuestionKey {
            grade: self.grade.parse()?,
            difficulty: self.difficulty,
            subject: Subject::normalize(&self.subject)?,
        })
    }

    /// Content with case and whitespace differences removed, for de-duplication.
    pub fn normalized_content(&self) -> String {
        normalize_text(&self.content)
    }

    /// First 50 characters of the content, for log lines.
    pub fn excerpt(&self) -> String {
        let mut excerpt: String = self.content.chars().take(50).collect();
        if self.content.chars().count() > 50 {
            excerpt.push_str("...");
        }
        excerpt
    }
}

/// Lowercase, trim and collapse internal whitespace runs to one space.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_normalization() {
        assert_eq!(Subject::normalize("Math").unwrap(), Subject::Math);
        assert_eq!(Subject::normalize("  Mathematics ").unwrap(), Subject::Math);
        assert_eq!(
            Subject::normalize("Mathematical Reasoning").unwrap(),
            Subject::MathematicalReasoning
        );
        assert_eq!(
            Subject::normalize("thinking skills").unwrap(),
            Subject::ThinkingSkills
        );
        assert_eq!(
            Subject::normalize("thinking-skills").unwrap(),
            Subject::ThinkingSkills
        );
        assert!(Subject::normalize("underwater basket weaving").is_err());
    }

    #[test]
    fn grade_bounds_and_adjacency() {
        assert!("0".parse::<Grade>().is_err());
        assert!("13".parse::<Grade>().is_err());
        assert!("five".parse::<Grade>().is_err());

        let one: Grade = "1".parse().unwrap();
        assert_eq!(one.adjacent(), vec![Grade(2)]);
        let twelve: Grade = " 12 ".parse().unwrap();
        assert_eq!(twelve.adjacent(), vec![Grade(11)]);
        let five: Grade = "5".parse().unwrap();
        assert_eq!(five.adjacent(), vec![Grade(4), Grade(6)]);
    }

    #[test]
    fn difficulty_others() {
        assert_eq!(
            Difficulty::Medium.others(),
            vec![Difficulty::Easy, Difficulty::Hard]
        );
        assert_eq!("HARD".parse::<Difficulty>().unwrap(), Difficulty::Hard);
    }

    #[test]
    fn key_display_and_parse() {
        let key = QuestionKey::parse("9", "hard", "thinking skills").unwrap();
        assert_eq!(key.to_string(), "9_hard_thinking-skills");
        assert_eq!(key.file_name(), "9_hard_thinking-skills.json");
        let back: QuestionKey = "9_hard_thinking-skills".parse().unwrap();
        assert_eq!(back, key);
        assert!("9_hard".parse::<QuestionKey>().is_err());
    }

    #[test]
    fn all_keys_cover_every_combination() {
        let keys = QuestionKey::all_for(&[Subject::Math, Subject::Reading]);
        assert_eq!(keys.len(), 12 * 3 * 2);
    }

    #[test]
    fn question_deserializes_static_file_shape() {
        let json = r#"{
            "_id": "q-1",
            "content": "What is 2 + 2?",
            "options": ["3", "4", "5", "6"],
            "correctAnswer": "4",
            "subject": "Math",
            "topic": "addition",
            "difficulty": "easy",
            "grade": 1,
            "tags": ["arithmetic"],
            "createdAt": "2024-01-01T00:00:00Z"
        }"#;
        let q: Question = serde_json::from_str(json).unwrap();
        assert_eq!(q.id, "q-1");
        assert_eq!(q.grade, "1");
        assert_eq!(q.created_by, "static");
        assert!(!q.is_generated);
        assert_eq!(
            q.key().unwrap(),
            QuestionKey::parse("1", "easy", "math").unwrap()
        );
    }

    #[test]
    fn normalized_content_ignores_case_and_spacing() {
        let key = QuestionKey::parse("3", "easy", "english").unwrap();
        let a = Question::new(&key, "  What is   a noun? ", vec![], "");
        let b = Question::new(&key, "what is a NOUN?", vec![], "");
        assert_eq!(a.normalized_content(), b.normalized_content());
        assert_ne!(a.id, b.id);
    }
}
