//! Per-key in-memory question pools.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;

use crate::gate::Gate;
use crate::model::{Question, QuestionKey};

/// Questions known for each key.
///
/// Grows by [`merge`](PoolCache::merge) and only shrinks through
/// [`cleanup`](PoolCache::cleanup) or [`clear`](PoolCache::clear).
#[derive(Debug, Default)]
pub struct PoolCache {
    pools: HashMap<QuestionKey, Vec<Question>>,
}

impl PoolCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// All questions for `key`.
    pub fn get(&self, key: &QuestionKey) -> &[Question] {
        self.pools.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self, key: &QuestionKey) -> usize {
        self.get(key).len()
    }

    pub fn is_empty(&self, key: &QuestionKey) -> bool {
        self.len(key) == 0
    }

    /// Normalized contents for `key`, for de-duplicating candidates.
    pub fn contents(&self, key: &QuestionKey) -> HashSet<String> {
        self.get(key).iter().map(Question::normalized_content).collect()
    }

    /// Append `questions`, then drop any whose normalized content is already
    /// present. Returns how many were actually added.
    pub fn merge(&mut self, key: QuestionKey, questions: Vec<Question>) -> usize {
        let pool = self.pools.entry(key).or_default();
        let mut seen: HashSet<String> = pool.iter().map(Question::normalized_content).collect();
        let before = pool.len();
        for q in questions {
            if seen.insert(q.normalized_content()) {
                pool.push(q);
            }
        }
        pool.len() - before
    }

    /// Shuffle the pool and take up to `n`.
    pub fn sample(&self, key: &QuestionKey, n: usize) -> Vec<Question> {
        sample_from(self.get(key).iter(), n)
    }

    /// Like [`sample`](PoolCache::sample) but skipping `consumed` ids.
    pub fn sample_unconsumed(
        &self,
        key: &QuestionKey,
        n: usize,
        consumed: &HashSet<String>,
    ) -> Vec<Question> {
        sample_from(
            self.get(key).iter().filter(|q| !consumed.contains(&q.id)),
            n,
        )
    }

    /// How many questions for `key` are not in `consumed`.
    pub fn available(&self, key: &QuestionKey, consumed: &HashSet<String>) -> usize {
        self.get(key)
            .iter()
            .filter(|q| !consumed.contains(&q.id))
            .count()
    }

    /// Drop entries older than `horizon` that are no longer structurally valid.
    ///
    /// Returns the number removed.
    pub fn cleanup(&mut self, horizon: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - horizon;
        let mut removed = 0;
        for pool in self.pools.values_mut() {
            let before = pool.len();
            pool.retain(|q| keep_after_cleanup(q, cutoff));
            removed += before - pool.len();
        }
        self.pools.retain(|_, pool| !pool.is_empty());
        removed
    }

    /// Pool sizes keyed by `<grade>_<difficulty>_<subject>`.
    pub fn stats(&self) -> BTreeMap<String, usize> {
        self.pools
            .iter()
            .map(|(key, pool)| (key.to_string(), pool.len()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.pools.clear();
    }
}

/// Recent questions are kept; older ones only while structurally valid.
pub fn keep_after_cleanup(question: &Question, cutoff: DateTime<Utc>) -> bool {
    if question.generated_at.is_some_and(|at| at > cutoff) {
        return true;
    }
    Gate::check_structure(question).is_ok()
}

fn sample_from<'a>(questions: impl Iterator<Item = &'a Question>, n: usize) -> Vec<Question> {
    let mut picked: Vec<Question> = questions.cloned().collect();
    picked.shuffle(&mut rand::thread_rng());
    picked.truncate(n);
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> QuestionKey {
        QuestionKey::parse("2", "easy", "math").unwrap()
    }

    fn numbered(n: usize) -> Vec<Question> {
        (0..n)
            .map(|i| {
                Question::new(
                    &key(),
                    format!("What is {i} + 1?"),
                    vec![(i + 1).to_string(), (i + 2).to_string()],
                    (i + 1).to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn merge_dedups_by_normalized_content() {
        let mut cache = PoolCache::new();
        assert_eq!(cache.merge(key(), numbered(3)), 3);

        let mut again = numbered(1);
        again[0].content = "  WHAT is 0 + 1? ".into();
        assert_eq!(cache.merge(key(), again), 0);
        assert_eq!(cache.len(&key()), 3);
    }

    #[test]
    fn sample_sizes() {
        let mut cache = PoolCache::new();
        cache.merge(key(), numbered(5));

        let three = cache.sample(&key(), 3);
        assert_eq!(three.len(), 3);
        let ids: HashSet<_> = three.iter().map(|q| q.id.clone()).collect();
        assert_eq!(ids.len(), 3);

        assert_eq!(cache.sample(&key(), 50).len(), 5);
        let other = QuestionKey::parse("3", "easy", "math").unwrap();
        assert!(cache.sample(&other, 4).is_empty());
    }

    #[test]
    fn sample_skips_consumed() {
        let mut cache = PoolCache::new();
        let questions = numbered(4);
        let consumed: HashSet<String> = questions[..3].iter().map(|q| q.id.clone()).collect();
        let remaining = questions[3].id.clone();
        cache.merge(key(), questions);

        assert_eq!(cache.available(&key(), &consumed), 1);
        let picked = cache.sample_unconsumed(&key(), 10, &consumed);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, remaining);
    }

    #[test]
    fn cleanup_keeps_valid_old_entries() {
        let mut cache = PoolCache::new();
        let now = Utc::now();
        let mut old_valid = numbered(1).remove(0);
        old_valid.generated_at = Some(now - Duration::days(30));

        let mut old_broken = numbered(2).remove(1);
        old_broken.generated_at = Some(now - Duration::days(30));
        old_broken.options.clear();

        let mut fresh_broken = Question::new(&key(), "fresh", vec![], "x");
        fresh_broken.generated_at = Some(now - Duration::hours(1));

        cache.merge(key(), vec![old_valid, old_broken, fresh_broken]);
        let removed = cache.cleanup(Duration::days(7), now);
        assert_eq!(removed, 1);
        assert_eq!(cache.len(&key()), 2);
    }

    #[test]
    fn stats_and_clear() {
        let mut cache = PoolCache::new();
        cache.merge(key(), numbered(2));
        assert_eq!(cache.stats().get("2_easy_math"), Some(&2));
        cache.clear();
        assert!(cache.is_empty(&key()));
    }
}
