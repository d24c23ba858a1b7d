//! The `manifest.json` index that sits next to static question files.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quizpool_core::model::QuestionKey;

/// File name of the manifest inside a static content directory.
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub filename: String,
    pub count: usize,
    pub generated: DateTime<Utc>,
}

/// Which keys have static content, and how much.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub generated: DateTime<Utc>,
    pub total_combinations: usize,
    pub total_questions: usize,
    /// Keyed by `<grade>_<difficulty>_<subject>`.
    pub combinations: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    /// Build a manifest from per-key counts. Keys with no questions are left out.
    pub fn from_batches<I>(batches: I, generated: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = (QuestionKey, usize)>,
    {
        let combinations: BTreeMap<String, ManifestEntry> = batches
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(key, count)| {
                (
                    key.to_string(),
                    ManifestEntry {
                        filename: key.file_name(),
                        count,
                        generated,
                    },
                )
            })
            .collect();

        Self {
            generated,
            total_combinations: combinations.len(),
            total_questions: combinations.values().map(|e| e.count).sum(),
            combinations,
        }
    }

    /// Whether any static content is published for `key`.
    pub fn has(&self, key: &QuestionKey) -> bool {
        self.combinations
            .get(&key.to_string())
            .is_some_and(|e| e.count > 0)
    }

    pub fn count(&self, key: &QuestionKey) -> usize {
        self.combinations
            .get(&key.to_string())
            .map_or(0, |e| e.count)
    }

    /// Question count per key.
    pub fn statistics(&self) -> BTreeMap<String, usize> {
        self.combinations
            .iter()
            .map(|(key, entry)| (key.clone(), entry.count))
            .collect()
    }

    /// Parsed keys for every listed combination. Unparseable entries are skipped.
    pub fn keys(&self) -> Vec<QuestionKey> {
        self.combinations
            .keys()
            .filter_map(|k| k.parse().ok())
            .collect()
    }
}
