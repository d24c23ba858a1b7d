//! Top-level request flow.
//!
//! Unseen pool content first, then a single-flight sourcing pass for the
//! shortfall, then the expansion ladder when the key is exhausted.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::engine::Dispatcher;
use crate::expander::{ExpansionConfig, ExpansionRecord, Expander};
use crate::model::{Question, QuestionKey};
use crate::monitor::{MonitorThresholds, PoolHealth, PoolMonitor, PoolStatus};
use crate::storage::{ConsumedTracker, MemoryConsumedTracker};

/// A request for `count` questions at `key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRequest {
    pub key: QuestionKey,
    pub count: usize,
    /// When set, questions this user has already seen are skipped.
    #[serde(default)]
    pub user_id: Option<String>,
}

impl QuestionRequest {
    pub fn new(key: QuestionKey, count: usize) -> Self {
        Self {
            key,
            count,
            user_id: None,
        }
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// What a caller gets back. `questions` is never empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionBatch {
    pub questions: Vec<Question>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expansion: Option<ExpansionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub struct QuestionService {
    dispatcher: Dispatcher,
    expander: Expander,
    monitor: PoolMonitor,
    tracker: Arc<dyn ConsumedTracker>,
    cleanup_horizon: Duration,
}

impl QuestionService {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            expander: Expander::new(dispatcher.clone(), ExpansionConfig::default()),
            dispatcher,
            monitor: PoolMonitor::default(),
            tracker: Arc::new(MemoryConsumedTracker::new()),
            cleanup_horizon: Duration::days(7),
        }
    }

    pub fn with_expansion(mut self, config: ExpansionConfig) -> Self {
        self.expander = Expander::new(self.dispatcher.clone(), config);
        self
    }

    pub fn with_thresholds(mut self, thresholds: MonitorThresholds) -> Self {
        self.monitor = PoolMonitor::new(thresholds);
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn ConsumedTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_cleanup_horizon(mut self, horizon: Duration) -> Self {
        self.cleanup_horizon = horizon;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn tracker(&self) -> &Arc<dyn ConsumedTracker> {
        &self.tracker
    }

    async fn consumed_for(&self, user_id: Option<&str>) -> HashSet<String> {
        match user_id {
            Some(user) => self.tracker.consumed(user).await,
            None => HashSet::new(),
        }
    }

    /// Serve a request. Always returns at least one question; a count of
    /// zero is served as one.
    #[tracing::instrument(skip_all, fields(key = %request.key, count = request.count))]
    pub async fn request(&self, request: &QuestionRequest) -> QuestionBatch {
        let key = request.key;
        let count = request.count.max(1);
        let consumed = self.consumed_for(request.user_id.as_deref()).await;

        let mut available = self.dispatcher.available(&key, &consumed).await;
        if available < count {
            self.dispatcher.ensure(key, count - available).await;
            available = self.dispatcher.available(&key, &consumed).await;
        } else {
            tracing::debug!(available, "served from pool");
        }

        let mut questions = self
            .dispatcher
            .sample_unconsumed(&key, count, &consumed)
            .await;

        // Expansion only when usable supply is below the floor. An empty
        // sample can only mean nothing is available at all.
        let floor = self.expander.config().floor;
        if available >= floor && !questions.is_empty() {
            return QuestionBatch {
                questions,
                expansion: None,
                message: None,
            };
        }

        let record = self.expander.expand(key, &consumed).await;
        let message = if questions.is_empty() {
            record.message()
        } else {
            format!(
                "Great progress! Including some {} to keep you learning.",
                record.description.to_lowercase()
            )
        };

        questions.extend(record.questions.iter().cloned());
        questions.shuffle(&mut rand::thread_rng());
        questions.truncate(count);

        QuestionBatch {
            questions,
            expansion: Some(record),
            message: Some(message),
        }
    }

    /// Remember that `user_id` has answered `ids`.
    pub async fn mark_answered(&self, user_id: &str, ids: &[String]) {
        self.tracker.record(user_id, ids).await;
    }

    pub async fn status(&self, key: &QuestionKey, consumed: &HashSet<String>) -> PoolStatus {
        let pool = self.dispatcher.pool().await;
        self.monitor.status(&pool, key, consumed)
    }

    /// Top `key` up to the healthy threshold when it is running low.
    ///
    /// Returns the status after any sourcing.
    pub async fn maintain(&self, key: QuestionKey, consumed: &HashSet<String>) -> PoolStatus {
        let before = self.status(&key, consumed).await;
        if before.health == PoolHealth::Healthy {
            return before;
        }

        let target = self.monitor.thresholds().healthy_at;
        let shortfall = target.saturating_sub(before.available_count);
        tracing::info!(%key, health = %before.health, shortfall, "maintaining pool");
        self.dispatcher.ensure(key, shortfall).await;
        self.status(&key, consumed).await
    }

    /// Load persisted generated questions into the pool.
    pub async fn restore(&self) -> usize {
        self.dispatcher.restore().await
    }

    /// Remove stale invalid entries older than the cleanup horizon.
    pub async fn cleanup(&self, now: DateTime<Utc>) -> usize {
        self.dispatcher.cleanup(self.cleanup_horizon, now).await
    }
}
