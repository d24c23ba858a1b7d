pub mod build;
pub mod check;
pub mod request;
pub mod status;
pub mod validate;

use std::path::Path;

use anyhow::{Context, Result};

use quizpool_core::model::{Question, QuestionKey};
use quizpool_sources::manifest::MANIFEST_FILE;

/// Every `<key>.json` question file in `dir`, sorted by key.
pub(crate) fn question_files(dir: &Path) -> Result<Vec<(QuestionKey, std::path::PathBuf)>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == MANIFEST_FILE || !name.ends_with(".json") {
            continue;
        }
        match name.parse::<QuestionKey>() {
            Ok(key) => files.push((key, path)),
            Err(e) => tracing::warn!(file = name, error = %e, "skipping file with unrecognized name"),
        }
    }
    files.sort_by_key(|(key, _)| *key);
    Ok(files)
}

pub(crate) fn read_questions(path: &Path) -> Result<Vec<Question>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}
