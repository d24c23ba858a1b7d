//! End-to-end behavior of the sourcing pipeline.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use quizpool_core::engine::Dispatcher;
use quizpool_core::error::SourceError;
use quizpool_core::expander::ExpansionStrategy;
use quizpool_core::gate::Gate;
use quizpool_core::model::{Difficulty, Question, QuestionKey};
use quizpool_core::oracle::Oracle;
use quizpool_core::service::{QuestionRequest, QuestionService};
use quizpool_core::traits::QuestionSource;

// ---------------------------------------------------------------------------
// Test sources
// ---------------------------------------------------------------------------

fn arithmetic(key: &QuestionKey, n: usize) -> Question {
    Question::new(
        key,
        format!("What is {n} + 1?"),
        vec![(n + 1).to_string(), (n + 2).to_string(), (n + 3).to_string()],
        (n + 1).to_string(),
    )
}

/// Fixed content per key, with an optional delay.
struct Scripted {
    name: &'static str,
    content: Box<dyn Fn(&QuestionKey) -> Vec<Question> + Send + Sync>,
    delay: Duration,
    calls: AtomicUsize,
    requested: Mutex<Vec<usize>>,
}

impl Scripted {
    fn new(
        name: &'static str,
        content: impl Fn(&QuestionKey) -> Vec<Question> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            content: Box::new(content),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    fn empty(name: &'static str) -> Self {
        Self::new(name, |_| Vec::new())
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestionSource for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    async fn try_fetch(&self, key: &QuestionKey, desired: usize) -> Result<Vec<Question>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(desired);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok((self.content)(key))
    }
}

/// A generator-like source: `desired` fresh questions per call.
fn on_demand() -> Scripted {
    let counter = Arc::new(AtomicUsize::new(1000));
    Scripted::new("on-demand", move |key| {
        (0..10)
            .map(|_| arithmetic(key, counter.fetch_add(1, Ordering::SeqCst)))
            .collect()
    })
}

fn assert_admissible(questions: &[Question]) {
    let oracle = Oracle::default();
    for q in questions {
        assert!(q.options.contains(&q.correct_answer), "{}", q.content);
        let unique: HashSet<&String> = q.options.iter().collect();
        assert_eq!(unique.len(), q.options.len(), "{}", q.content);
        assert!(oracle.is_correct(q, &q.correct_answer).is_correct);
    }
}

// ---------------------------------------------------------------------------
// Single flight
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn concurrent_ensures_share_one_pass() {
    let source = Arc::new(
        Scripted::new("slow", |key| (0..5).map(|n| arithmetic(key, n)).collect())
            .slow(Duration::from_millis(200)),
    );
    let dispatcher = Dispatcher::new(vec![source.clone()], Gate::default(), None);
    let key: QuestionKey = "3_medium_math".parse().unwrap();

    let results = join_all((0..8).map(|i| dispatcher.ensure(key, 5 + i))).await;

    assert_eq!(source.calls(), 1);
    assert_eq!(dispatcher.sourcing_passes(), 1);
    assert!(!dispatcher.is_in_flight(&key));
    for result in &results {
        assert!(Arc::ptr_eq(result, &results[0]));
    }
    assert_eq!(results[0].len(), 5);
}

#[tokio::test(start_paused = true)]
async fn abandoned_caller_does_not_cancel_the_pass() {
    let source = Arc::new(
        Scripted::new("slow", |key| (0..4).map(|n| arithmetic(key, n)).collect())
            .slow(Duration::from_millis(500)),
    );
    let dispatcher = Dispatcher::new(vec![source.clone()], Gate::default(), None);
    let key: QuestionKey = "7_easy_numeracy".parse().unwrap();

    let gave_up = tokio::time::timeout(Duration::from_millis(10), dispatcher.ensure(key, 4)).await;
    assert!(gave_up.is_err());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(dispatcher.pool().await.len(&key), 4);
    assert!(!dispatcher.is_in_flight(&key));

    // The next caller finds the cached content without a second pass.
    let consumed = HashSet::new();
    assert_eq!(dispatcher.available(&key, &consumed).await, 4);
    assert_eq!(source.calls(), 1);
}

// ---------------------------------------------------------------------------
// Source priority
// ---------------------------------------------------------------------------

#[tokio::test]
async fn static_shortfall_falls_through_to_on_demand() {
    let key = QuestionKey::parse("5", "easy", "math").unwrap();
    let statics = Arc::new(Scripted::new("static", |key| {
        (0..3).map(|n| arithmetic(key, n)).collect()
    }));
    let prepopulated = Arc::new(Scripted::empty("prepopulated"));
    let generated = Arc::new(on_demand());
    let dispatcher = Dispatcher::new(
        vec![statics.clone(), prepopulated.clone(), generated.clone()],
        Gate::default(),
        None,
    );
    let service = QuestionService::new(dispatcher);

    let batch = service.request(&QuestionRequest::new(key, 10)).await;

    assert_eq!(batch.questions.len(), 10);
    assert!(batch.expansion.is_none());
    assert_admissible(&batch.questions);

    assert_eq!(*statics.requested.lock().unwrap(), vec![10]);
    assert_eq!(*prepopulated.requested.lock().unwrap(), vec![7]);
    assert_eq!(*generated.requested.lock().unwrap(), vec![7]);
}

#[tokio::test]
async fn later_tiers_are_skipped_once_satisfied() {
    let key = QuestionKey::parse("2", "hard", "math").unwrap();
    let statics = Arc::new(Scripted::new("static", |key| {
        (0..12).map(|n| arithmetic(key, n)).collect()
    }));
    let generated = Arc::new(on_demand());
    let dispatcher = Dispatcher::new(vec![statics, generated.clone()], Gate::default(), None);

    let admitted = dispatcher.ensure(key, 10).await;
    assert_eq!(admitted.len(), 12);
    assert_eq!(generated.calls(), 0);
}

// ---------------------------------------------------------------------------
// Exhaustion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn exhausted_key_walks_the_whole_ladder() {
    let key = QuestionKey::parse("9", "hard", "thinking skills").unwrap();
    let dispatcher = Dispatcher::new(
        vec![Arc::new(Scripted::empty("static")), Arc::new(Scripted::empty("on-demand"))],
        Gate::default(),
        None,
    );
    let service = QuestionService::new(dispatcher);

    let batch = service.request(&QuestionRequest::new(key, 5)).await;

    let record = batch.expansion.expect("expansion ran");
    assert_eq!(record.tried, ExpansionStrategy::LADDER.to_vec());
    assert_eq!(record.strategy, ExpansionStrategy::Synthetic);
    assert!(!batch.questions.is_empty());
    assert_admissible(&batch.questions);
    assert_eq!(batch.message.as_deref(), Some(record.message().as_str()));
}

#[tokio::test]
async fn first_productive_rung_stops_the_ladder() {
    let key = QuestionKey::parse("9", "hard", "math").unwrap();
    // Only the adjacent grades have content.
    let source = Scripted::new("static", move |k| {
        if k.grade != key.grade && k.difficulty == key.difficulty && k.subject == key.subject {
            (0..3).map(|n| arithmetic(k, n + usize::from(k.grade.value()) * 100)).collect()
        } else {
            Vec::new()
        }
    });
    let dispatcher = Dispatcher::new(vec![Arc::new(source)], Gate::default(), None);
    let service = QuestionService::new(dispatcher.clone());

    let batch = service.request(&QuestionRequest::new(key, 4)).await;

    let record = batch.expansion.expect("expansion ran");
    assert_eq!(
        record.tried,
        vec![ExpansionStrategy::Difficulty, ExpansionStrategy::Grade]
    );
    assert_eq!(record.expanded.grades.len(), 2);
    assert_eq!(batch.questions.len(), 4);

    // Borrowed content stays under its own key.
    assert!(dispatcher.pool().await.is_empty(&key));
    assert_eq!(dispatcher.pool().await.len(&key.with_grade("8".parse().unwrap())), 3);
}

#[tokio::test]
async fn difficulty_expansion_skips_consumed_neighbors() {
    let key = QuestionKey::parse("4", "medium", "math").unwrap();
    let source = Scripted::new("static", move |k| {
        if k.difficulty == Difficulty::Easy && k.grade == key.grade {
            (0..2).map(|n| arithmetic(k, n)).collect()
        } else {
            Vec::new()
        }
    });
    let dispatcher = Dispatcher::new(vec![Arc::new(source)], Gate::default(), None);
    let service = QuestionService::new(dispatcher);

    let first = service
        .request(&QuestionRequest::new(key, 5).for_user("sam"))
        .await;
    let record = first.expansion.expect("expansion ran");
    assert_eq!(record.strategy, ExpansionStrategy::Difficulty);
    assert_eq!(record.expanded.difficulties, vec![Difficulty::Easy]);
    assert!(first
        .message
        .as_deref()
        .is_some_and(|m| m.contains("some easy questions")));

    let ids: Vec<String> = first.questions.iter().map(|q| q.id.clone()).collect();
    service.mark_answered("sam", &ids).await;

    let second = service
        .request(&QuestionRequest::new(key, 5).for_user("sam"))
        .await;
    let record = second.expansion.expect("expansion ran");
    assert_eq!(record.strategy, ExpansionStrategy::Synthetic);
}

#[tokio::test]
async fn every_key_yields_something_with_empty_sources() {
    let dispatcher = Dispatcher::new(vec![Arc::new(Scripted::empty("none"))], Gate::default(), None);
    let service = QuestionService::new(dispatcher);

    for raw in ["1_easy_math", "12_hard_english", "6_medium_geography", "3_hard_numeracy"] {
        let key: QuestionKey = raw.parse().unwrap();
        let batch = service.request(&QuestionRequest::new(key, 3)).await;
        assert!(!batch.questions.is_empty(), "{raw}");
        assert!(batch.questions.len() <= 3);
        assert_admissible(&batch.questions);
    }
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

#[test]
fn half_as_fraction_or_decimal_agrees() {
    let oracle = Oracle::default();
    let key: QuestionKey = "6_medium_math".parse().unwrap();
    for declared in ["0.5", "1/2"] {
        let q = Question::new(
            &key,
            "What is one half?",
            vec!["0.5".into(), "1/2".into(), "2".into()],
            declared,
        );
        let a = oracle.is_correct(&q, "0.5");
        let b = oracle.is_correct(&q, "1/2");
        assert!(a.is_correct && b.is_correct, "declared {declared}");
    }
}
