//! Single-flight sourcing dispatcher.
//!
//! Owns the pool cache and the in-flight map. A shortfall for a key starts
//! exactly one sourcing pass that walks the sources in priority order, gates
//! every candidate and merges the survivors into the pool. Concurrent callers
//! for the same key attach to that pass instead of starting their own.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::gate::Gate;
use crate::model::{Question, QuestionKey};
use crate::pool::PoolCache;
use crate::storage::GeneratedQuestionStore;
use crate::traits::QuestionSource;

type SharedPass = Shared<BoxFuture<'static, Arc<Vec<Question>>>>;

struct InFlight {
    id: u64,
    pass: SharedPass,
}

struct Inner {
    sources: Vec<Arc<dyn QuestionSource>>,
    gate: Gate,
    pool: RwLock<PoolCache>,
    in_flight: Mutex<HashMap<QuestionKey, InFlight>>,
    store: Option<GeneratedQuestionStore>,
    passes: AtomicU64,
    next_id: AtomicU64,
}

/// Cheap to clone; clones share the same pool and in-flight map.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

/// Removes the in-flight entry when the pass settles or is dropped.
struct InFlightGuard {
    inner: Arc<Inner>,
    key: QuestionKey,
    id: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if in_flight.get(&self.key).is_some_and(|f| f.id == self.id) {
            in_flight.remove(&self.key);
        }
    }
}

impl Dispatcher {
    /// `sources` are tried in the order given.
    pub fn new(
        sources: Vec<Arc<dyn QuestionSource>>,
        gate: Gate,
        store: Option<GeneratedQuestionStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                sources,
                gate,
                pool: RwLock::new(PoolCache::new()),
                in_flight: Mutex::new(HashMap::new()),
                store,
                passes: AtomicU64::new(0),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn gate(&self) -> &Gate {
        &self.inner.gate
    }

    pub fn source_names(&self) -> Vec<String> {
        self.inner.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Read-only view of the pool cache.
    pub async fn pool(&self) -> RwLockReadGuard<'_, PoolCache> {
        self.inner.pool.read().await
    }

    /// Number of sourcing passes started so far.
    pub fn sourcing_passes(&self) -> u64 {
        self.inner.passes.load(Ordering::Relaxed)
    }

    /// Whether a pass for `key` is currently running.
    pub fn is_in_flight(&self, key: &QuestionKey) -> bool {
        let in_flight = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.contains_key(key)
    }

    pub async fn available(&self, key: &QuestionKey, consumed: &HashSet<String>) -> usize {
        self.pool().await.available(key, consumed)
    }

    pub async fn sample_unconsumed(
        &self,
        key: &QuestionKey,
        n: usize,
        consumed: &HashSet<String>,
    ) -> Vec<Question> {
        self.pool().await.sample_unconsumed(key, n, consumed)
    }

    pub async fn stats(&self) -> BTreeMap<String, usize> {
        self.pool().await.stats()
    }

    /// Source up to `desired` new questions for `key`.
    ///
    /// Returns the questions admitted by the pass. Callers that arrive while a
    /// pass is running get that pass's result, whatever count they asked for.
    /// The pass runs on its own task, so dropping the returned future does not
    /// cancel it.
    pub async fn ensure(&self, key: QuestionKey, desired: usize) -> Arc<Vec<Question>> {
        if desired == 0 {
            return Arc::new(Vec::new());
        }

        let pass = {
            let mut in_flight = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            match in_flight.get(&key) {
                Some(running) => {
                    tracing::debug!(%key, "attaching to in-flight sourcing pass");
                    running.pass.clone()
                }
                None => {
                    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                    let pass = self.start_pass(key, desired, id);
                    in_flight.insert(
                        key,
                        InFlight {
                            id,
                            pass: pass.clone(),
                        },
                    );
                    pass
                }
            }
        };
        pass.await
    }

    fn start_pass(&self, key: QuestionKey, desired: usize, id: u64) -> SharedPass {
        let inner = Arc::clone(&self.inner);
        let guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
            key,
            id,
        };
        let handle = tokio::spawn(async move {
            let _guard = guard;
            source_pass(&inner, key, desired).await
        });

        async move {
            match handle.await {
                Ok(admitted) => admitted,
                Err(e) => {
                    tracing::error!(%key, error = %e, "sourcing pass aborted");
                    Arc::new(Vec::new())
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Load persisted generated questions back into the pool through the gate.
    ///
    /// Returns the number admitted.
    pub async fn restore(&self) -> usize {
        let Some(store) = &self.inner.store else {
            return 0;
        };

        let mut by_key: HashMap<QuestionKey, Vec<Question>> = HashMap::new();
        for question in store.load().await {
            match question.key() {
                Ok(key) => by_key.entry(key).or_default().push(question),
                Err(e) => tracing::warn!(id = %question.id, error = %e, "stored question has no valid key"),
            }
        }

        let mut pool = self.inner.pool.write().await;
        let mut restored = 0;
        for (key, candidates) in by_key {
            let report = self.inner.gate.admit_batch(candidates, &pool.contents(&key));
            restored += pool.merge(key, report.admitted);
        }
        tracing::info!(restored, "restored generated questions");
        restored
    }

    /// Drop stale invalid entries from the pool and the persisted store.
    pub async fn cleanup(&self, horizon: Duration, now: DateTime<Utc>) -> usize {
        let mut removed = self.inner.pool.write().await.cleanup(horizon, now);
        if let Some(store) = &self.inner.store {
            removed += store.cleanup(horizon, now).await;
        }
        removed
    }

    /// Put `questions` straight into the pool, bypassing sources and gate.
    #[cfg(test)]
    pub(crate) async fn seed(&self, key: QuestionKey, questions: Vec<Question>) {
        self.inner.pool.write().await.merge(key, questions);
    }

    /// Empty the pool. Running passes are left alone.
    pub async fn clear(&self) {
        self.inner.pool.write().await.clear();
    }
}

#[tracing::instrument(skip_all, fields(%key, desired))]
async fn source_pass(inner: &Inner, key: QuestionKey, desired: usize) -> Arc<Vec<Question>> {
    inner.passes.fetch_add(1, Ordering::Relaxed);

    let mut known = inner.pool.read().await.contents(&key);
    let mut accumulated: Vec<Question> = Vec::new();

    for source in &inner.sources {
        if accumulated.len() >= desired {
            break;
        }
        let remaining = desired - accumulated.len();
        let candidates = source.fetch(&key, remaining).await;
        if candidates.is_empty() {
            tracing::debug!(source = source.name(), "source returned nothing");
            continue;
        }

        let fetched = candidates.len();
        let report = inner.gate.admit_batch(candidates, &known);
        known.extend(report.admitted.iter().map(Question::normalized_content));
        tracing::info!(
            source = source.name(),
            fetched,
            admitted = report.admitted.len(),
            rejected = report.rejected.len(),
            "sourced candidates"
        );
        accumulated.extend(report.admitted);
    }

    if accumulated.len() < desired {
        tracing::info!(
            found = accumulated.len(),
            desired,
            "sources exhausted before reaching desired count"
        );
    }

    let generated: Vec<Question> = accumulated
        .iter()
        .filter(|q| q.is_generated)
        .cloned()
        .collect();
    inner.pool.write().await.merge(key, accumulated.clone());
    if let Some(store) = &inner.store {
        store.append(&generated).await;
    }

    Arc::new(accumulated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use async_trait::async_trait;

    struct Listed(Vec<Question>);

    #[async_trait]
    impl QuestionSource for Listed {
        fn name(&self) -> &str {
            "listed"
        }

        async fn try_fetch(&self, _: &QuestionKey, _: usize) -> Result<Vec<Question>, SourceError> {
            Ok(self.0.clone())
        }
    }

    fn key() -> QuestionKey {
        QuestionKey::parse("5", "easy", "math").unwrap()
    }

    fn question(content: &str) -> Question {
        Question::new(&key(), content, vec!["1".into(), "2".into()], "1")
    }

    #[tokio::test]
    async fn pass_merges_admitted_questions() {
        let mut broken = question("broken");
        broken.options = vec!["3".into(), "4".into()];
        let source = Listed(vec![question("a"), question("b"), broken]);
        let dispatcher = Dispatcher::new(vec![Arc::new(source)], Gate::default(), None);

        let admitted = dispatcher.ensure(key(), 10).await;
        assert_eq!(admitted.len(), 2);
        assert_eq!(dispatcher.pool().await.len(&key()), 2);
        assert_eq!(dispatcher.sourcing_passes(), 1);
        assert!(!dispatcher.is_in_flight(&key()));

        // Already pooled content is not admitted twice.
        assert!(dispatcher.ensure(key(), 10).await.is_empty());
        assert_eq!(dispatcher.pool().await.len(&key()), 2);
    }

    #[tokio::test]
    async fn zero_desired_starts_nothing() {
        let dispatcher = Dispatcher::new(vec![], Gate::default(), None);
        assert!(dispatcher.ensure(key(), 0).await.is_empty());
        assert_eq!(dispatcher.sourcing_passes(), 0);
    }

    #[tokio::test]
    async fn generated_questions_persist_and_restore() {
        let store = GeneratedQuestionStore::in_memory();
        let generated = question("made up").generated_by("test");
        let source = Listed(vec![generated, question("static")]);
        let dispatcher = Dispatcher::new(vec![Arc::new(source)], Gate::default(), Some(store.clone()));
        dispatcher.ensure(key(), 5).await;
        assert_eq!(store.load().await.len(), 1);

        let fresh = Dispatcher::new(vec![], Gate::default(), Some(store));
        assert_eq!(fresh.restore().await, 1);
        assert_eq!(fresh.pool().await.len(&key()), 1);
    }

    /// Makes `desired` new generated questions for whatever key it is asked.
    struct Generating(std::sync::atomic::AtomicUsize);

    #[async_trait]
    impl QuestionSource for Generating {
        fn name(&self) -> &str {
            "generating"
        }

        async fn try_fetch(&self, key: &QuestionKey, desired: usize) -> Result<Vec<Question>, SourceError> {
            tokio::task::yield_now().await;
            Ok((0..desired)
                .map(|_| {
                    let n = self.0.fetch_add(1, Ordering::Relaxed);
                    Question::new(key, format!("Generated #{n}"), vec!["1".into(), "2".into()], "1")
                        .generated_by("test")
                })
                .collect())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_passes_on_different_keys_all_persist() {
        use crate::model::Grade;
        use crate::storage::FileBlobStore;

        let dir = tempfile::tempdir().unwrap();
        let store = GeneratedQuestionStore::new(Arc::new(FileBlobStore::new(dir.path())));
        let source = Generating(std::sync::atomic::AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(vec![Arc::new(source)], Gate::default(), Some(store.clone()));

        let keys: Vec<QuestionKey> = (1..=8)
            .map(|g| key().with_grade(Grade::new(g).unwrap()))
            .collect();
        futures::future::join_all(keys.iter().map(|k| dispatcher.ensure(*k, 3))).await;

        let pooled = keys.len() * 3;
        let stats = dispatcher.stats().await;
        assert_eq!(stats.values().sum::<usize>(), pooled);
        assert_eq!(store.load().await.len(), pooled);
    }
}
