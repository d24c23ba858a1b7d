//! Pool health classification.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::QuestionKey;
use crate::pool::PoolCache;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorThresholds {
    /// At or above this many unseen questions the pool is healthy.
    pub healthy_at: usize,
    /// At or above this many (and below `healthy_at`) the pool is low.
    pub low_at: usize,
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            healthy_at: 20,
            low_at: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolHealth {
    Healthy,
    Low,
    Critical,
}

impl PoolHealth {
    pub fn recommendation(self) -> &'static str {
        match self {
            PoolHealth::Healthy => "No action needed",
            PoolHealth::Low => "Consider generating more questions soon",
            PoolHealth::Critical => "Generate questions immediately",
        }
    }
}

impl fmt::Display for PoolHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PoolHealth::Healthy => "healthy",
            PoolHealth::Low => "low",
            PoolHealth::Critical => "critical",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    pub health: PoolHealth,
    pub available_count: usize,
    pub recommendation: String,
}

/// Read-only view over pool supply.
#[derive(Debug, Clone, Default)]
pub struct PoolMonitor {
    thresholds: MonitorThresholds,
}

impl PoolMonitor {
    pub fn new(thresholds: MonitorThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &MonitorThresholds {
        &self.thresholds
    }

    pub fn classify(&self, available: usize) -> PoolStatus {
        let health = if available >= self.thresholds.healthy_at {
            PoolHealth::Healthy
        } else if available >= self.thresholds.low_at {
            PoolHealth::Low
        } else {
            PoolHealth::Critical
        };
        PoolStatus {
            health,
            available_count: available,
            recommendation: health.recommendation().to_string(),
        }
    }

    /// Status of `key` counting only questions not in `consumed`.
    pub fn status(
        &self,
        pool: &PoolCache,
        key: &QuestionKey,
        consumed: &HashSet<String>,
    ) -> PoolStatus {
        self.classify(pool.available(key, consumed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Question;

    #[test]
    fn thresholds_are_inclusive() {
        let monitor = PoolMonitor::default();
        assert_eq!(monitor.classify(20).health, PoolHealth::Healthy);
        assert_eq!(monitor.classify(19).health, PoolHealth::Low);
        assert_eq!(monitor.classify(10).health, PoolHealth::Low);
        assert_eq!(monitor.classify(9).health, PoolHealth::Critical);
        assert_eq!(monitor.classify(0).recommendation, "Generate questions immediately");
    }

    #[test]
    fn consumed_questions_do_not_count() {
        let key: QuestionKey = "2_hard_english".parse().unwrap();
        let questions: Vec<Question> = (0..12)
            .map(|i| Question::new(&key, format!("Q{i}"), vec!["a".into(), "b".into()], "a"))
            .collect();
        let consumed: HashSet<String> = questions[..3].iter().map(|q| q.id.clone()).collect();
        let mut pool = PoolCache::new();
        pool.merge(key, questions);

        let monitor = PoolMonitor::default();
        assert_eq!(monitor.status(&pool, &key, &HashSet::new()).health, PoolHealth::Low);
        let status = monitor.status(&pool, &key, &consumed);
        assert_eq!(status.available_count, 9);
        assert_eq!(status.health, PoolHealth::Critical);
    }
}
