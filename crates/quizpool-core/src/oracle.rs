//! Answer equivalence oracle.
//!
//! Decides whether a candidate answer matches a question's declared answer
//! across integer, fraction, decimal, percentage and simple algebraic
//! spellings. The same oracle grades user answers and self-checks generated
//! questions before they are admitted to a pool.

use serde::{Deserialize, Serialize};

use crate::model::{Question, Subject};

/// Tolerances and thresholds for equivalence checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Minimum confidence for a question's self-check to pass.
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f64,
    /// Absolute tolerance when comparing fractions with decimals or integers.
    #[serde(default = "default_fraction_tolerance")]
    pub fraction_tolerance: f64,
    /// Absolute tolerance when comparing percentages with decimals.
    #[serde(default = "default_percent_tolerance")]
    pub percent_tolerance: f64,
    /// Relative tolerance for plain numbers (absolute below magnitude 1).
    #[serde(default = "default_numeric_relative_tolerance")]
    pub numeric_relative_tolerance: f64,
}

fn default_acceptance_threshold() -> f64 {
    0.8
}
fn default_fraction_tolerance() -> f64 {
    1e-4
}
fn default_percent_tolerance() -> f64 {
    1e-3
}
fn default_numeric_relative_tolerance() -> f64 {
    1e-3
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: default_acceptance_threshold(),
            fraction_tolerance: default_fraction_tolerance(),
            percent_tolerance: default_percent_tolerance(),
            numeric_relative_tolerance: default_numeric_relative_tolerance(),
        }
    }
}

/// Which rule established equivalence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Exact,
    Decimal,
    Fraction,
    Percentage,
    Algebraic,
    Numeric,
}

/// A successful equivalence match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Equivalence {
    pub method: Method,
    pub confidence: f64,
}

/// Outcome of grading one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_correct: bool,
    /// 0.0 to 1.0.
    pub confidence: f64,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,
    /// Likely slips behind a wrong answer. Empty when correct.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub common_mistakes: Vec<Mistake>,
}

/// A recognizable slip in a wrong answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mistake {
    OffByOne,
    SignError,
    OrderOfMagnitude,
    ImproperFraction,
    Area,
    Perimeter,
    Percentage,
}

impl Mistake {
    /// Feedback shown to the learner.
    pub fn hint(self) -> &'static str {
        match self {
            Mistake::OffByOne => "Off by one error - check your calculation carefully",
            Mistake::SignError => "Sign error - check positive/negative signs",
            Mistake::OrderOfMagnitude => "Order of magnitude error - check decimal placement",
            Mistake::ImproperFraction => {
                "Remember to convert improper fractions to proper fractions if needed"
            }
            Mistake::Area => "For area problems, make sure to multiply length × width",
            Mistake::Perimeter => "For perimeter, add all sides together",
            Mistake::Percentage => "Remember to convert between percentages and decimals correctly",
        }
    }
}

/// The equivalence checker.
#[derive(Debug, Clone, Default)]
pub struct Oracle {
    config: OracleConfig,
}

impl Oracle {
    pub fn new(config: OracleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// Grade `candidate` against the question's declared correct answer.
    pub fn is_correct(&self, question: &Question, candidate: &str) -> Verdict {
        match self.equivalent(&question.correct_answer, candidate) {
            Some(eq) => {
                let fallback = if eq.method == Method::Exact {
                    "Correct answer!"
                } else {
                    "Mathematically equivalent answer!"
                };
                Verdict {
                    is_correct: true,
                    confidence: eq.confidence,
                    explanation: question
                        .explanation
                        .clone()
                        .unwrap_or_else(|| fallback.to_string()),
                    method: Some(eq.method),
                    common_mistakes: Vec::new(),
                }
            }
            None => Verdict {
                is_correct: false,
                confidence: 0.0,
                explanation: question
                    .explanation
                    .clone()
                    .unwrap_or_else(|| format!("The correct answer is {}", question.correct_answer)),
                method: None,
                common_mistakes: common_mistakes(question, candidate),
            },
        }
    }

    /// Grade the question against its own declared answer.
    ///
    /// Passes only when the verdict is correct with confidence at or above
    /// the acceptance threshold.
    pub fn self_check(&self, question: &Question) -> Result<Verdict, Verdict> {
        let verdict = self.is_correct(question, &question.correct_answer);
        if verdict.is_correct && verdict.confidence >= self.config.acceptance_threshold {
            Ok(verdict)
        } else {
            Err(verdict)
        }
    }

    /// Try each equivalence rule in order; the first that matches wins.
    pub fn equivalent(&self, expected: &str, candidate: &str) -> Option<Equivalence> {
        let a = normalize_answer(expected);
        let b = normalize_answer(candidate);
        if a.is_empty() || b.is_empty() {
            return None;
        }

        if a == b {
            return Some(Equivalence {
                method: Method::Exact,
                confidence: 1.0,
            });
        }

        self.compare_decimals(&a, &b)
            .or_else(|| self.compare_fractions(&a, &b))
            .or_else(|| self.compare_percentages(&a, &b))
            .or_else(|| compare_algebraic(&a, &b))
            .or_else(|| self.compare_numeric(&a, &b))
    }

    /// Two decimal literals, with tolerance one place finer than the most precise.
    fn compare_decimals(&self, a: &str, b: &str) -> Option<Equivalence> {
        if !is_decimal_literal(a) || !is_decimal_literal(b) {
            return None;
        }
        let (x, y) = (a.parse::<f64>().ok()?, b.parse::<f64>().ok()?);
        let places = decimal_places(a).max(decimal_places(b));
        let tolerance = 10f64.powi(-(places as i32 + 1));
        ((x - y).abs() < tolerance).then_some(Equivalence {
            method: Method::Decimal,
            confidence: 0.98,
        })
    }

    /// Fractions against fractions, integers or decimals.
    fn compare_fractions(&self, a: &str, b: &str) -> Option<Equivalence> {
        let (x, y) = (parse_rational(a)?, parse_rational(b)?);
        ((x - y).abs() < self.config.fraction_tolerance).then_some(Equivalence {
            method: Method::Fraction,
            confidence: 0.95,
        })
    }

    /// `50%` against `0.5` or `.5`.
    fn compare_percentages(&self, a: &str, b: &str) -> Option<Equivalence> {
        let (x, y) = (parse_percent(a)?, parse_percent(b)?);
        ((x - y).abs() < self.config.percent_tolerance).then_some(Equivalence {
            method: Method::Percentage,
            confidence: 0.95,
        })
    }

    /// Plain numbers with tolerance relative to magnitude.
    fn compare_numeric(&self, a: &str, b: &str) -> Option<Equivalence> {
        let x = a.parse::<f64>().ok().filter(|v| v.is_finite())?;
        let y = b.parse::<f64>().ok().filter(|v| v.is_finite())?;
        let rel = self.config.numeric_relative_tolerance;
        let magnitude = x.abs().max(y.abs());
        let tolerance = if magnitude > 1.0 { magnitude * rel } else { rel };
        ((x - y).abs() < tolerance).then_some(Equivalence {
            method: Method::Numeric,
            confidence: 0.95,
        })
    }
}

/// Canonical spelling of an answer for comparison.
///
/// Lowercases, strips all whitespace, maps `×`/`÷` to `*`/`/`, folds redundant
/// signs, and makes implicit multiplication explicit (`2x` → `2*x`,
/// `3(x+1)` → `3*(x+1)`).
pub fn normalize_answer(answer: &str) -> String {
    let mut s: String = answer
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '×' | '·' => '*',
            '÷' => '/',
            '−' => '-',
            other => other,
        })
        .collect();

    s = s
        .replace("+-", "-")
        .replace("-+", "-")
        .replace("(+", "(")
        .replace("+)", ")");
    if let Some(rest) = s.strip_prefix('+') {
        s = rest.to_string();
    }

    let mut out = String::with_capacity(s.len() + 4);
    let mut prev: Option<char> = None;
    for c in s.chars() {
        if let Some(p) = prev {
            let implicit = (p.is_ascii_digit() && c.is_ascii_alphabetic())
                || (p.is_ascii_alphabetic() && c.is_ascii_digit())
                || (p == ')' && c == '(')
                || (p.is_ascii_digit() && c == '(')
                || (p == ')' && c.is_ascii_digit());
            if implicit {
                out.push('*');
            }
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

/// `-?\d*\.?\d+`: optional sign, digits, at most one point, ending in a digit.
fn is_decimal_literal(s: &str) -> bool {
    let body = s.strip_prefix('-').unwrap_or(s);
    if body.is_empty() || !body.ends_with(|c: char| c.is_ascii_digit()) {
        return false;
    }
    let mut points = 0;
    for c in body.chars() {
        match c {
            '.' => points += 1,
            d if d.is_ascii_digit() => {}
            _ => return false,
        }
    }
    points <= 1
}

fn decimal_places(s: &str) -> usize {
    s.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0)
}

fn is_integer_literal(s: &str) -> bool {
    let body = s.strip_prefix('-').unwrap_or(s);
    !body.is_empty() && body.chars().all(|c| c.is_ascii_digit())
}

/// Simple fractions, integers and decimals as a number.
fn parse_rational(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        if !is_integer_literal(num) || den.is_empty() || !den.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }
        let den: f64 = den.parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num.parse::<f64>().ok()? / den);
    }
    if is_decimal_literal(s) {
        return s.parse().ok();
    }
    None
}

/// `12.5%` as 0.125, or a bare `0.x`/`.x` decimal as itself.
fn parse_percent(s: &str) -> Option<f64> {
    if let Some(body) = s.strip_suffix('%') {
        if is_decimal_literal(body) && !body.starts_with('-') {
            return Some(body.parse::<f64>().ok()? / 100.0);
        }
        return None;
    }
    let frac = s.strip_prefix("0.").or_else(|| s.strip_prefix('.'))?;
    if !frac.is_empty() && frac.chars().all(|c| c.is_ascii_digit()) {
        return s.parse().ok();
    }
    None
}

/// Slips that would explain `candidate` missing the declared answer.
fn common_mistakes(question: &Question, candidate: &str) -> Vec<Mistake> {
    let mut mistakes = Vec::new();
    let content = question.content.to_lowercase();

    let expected = parse_rational(&normalize_answer(&question.correct_answer));
    let given = parse_rational(&normalize_answer(candidate));
    if let (Some(x), Some(y)) = (expected, given) {
        if ((y - x).abs() - 1.0).abs() < f64::EPSILON {
            mistakes.push(Mistake::OffByOne);
        }
        if x != 0.0 && y == -x {
            mistakes.push(Mistake::SignError);
        }
        if x != 0.0 && y != 0.0 && ((y / x - 10.0).abs() < 0.1 || (x / y - 10.0).abs() < 0.1) {
            mistakes.push(Mistake::OrderOfMagnitude);
        }
        if (content.contains("fraction") || content.contains('/')) && y > 1.0 && x < 1.0 {
            mistakes.push(Mistake::ImproperFraction);
        }
    }

    if Subject::normalize(&question.subject).is_ok_and(Subject::is_numeric) {
        if content.contains("area") {
            mistakes.push(Mistake::Area);
        }
        if content.contains("perimeter") {
            mistakes.push(Mistake::Perimeter);
        }
        if content.contains('%') || content.contains("percent") {
            mistakes.push(Mistake::Percentage);
        }
    }
    mistakes
}

/// Sums of products compared up to reordering of terms and factors.
///
/// Covers `a+b` = `b+a` and `2x` = `x*2`. Expressions with subtraction,
/// division, powers or grouping are left to the other rules.
fn compare_algebraic(a: &str, b: &str) -> Option<Equivalence> {
    let (x, y) = (canonical_sum(a)?, canonical_sum(b)?);
    (x == y).then_some(Equivalence {
        method: Method::Algebraic,
        confidence: 0.9,
    })
}

fn canonical_sum(s: &str) -> Option<String> {
    if !s.contains(|c: char| c == '+' || c == '*') {
        return None;
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '*');
    if !s.chars().all(allowed) {
        return None;
    }

    let mut terms = Vec::new();
    for term in s.split('+') {
        if term.is_empty() {
            return None;
        }
        let mut factors: Vec<&str> = term.split('*').collect();
        if factors.iter().any(|f| f.is_empty()) {
            return None;
        }
        factors.sort_unstable();
        terms.push(factors.join("*"));
    }
    terms.sort_unstable();
    Some(terms.join("+"))
}
