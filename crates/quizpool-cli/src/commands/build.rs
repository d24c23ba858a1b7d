//! The `quizpool build` command.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;

use quizpool_core::gate::Gate;
use quizpool_core::model::{QuestionKey, Subject};
use quizpool_sources::manifest::{Manifest, MANIFEST_FILE};
use quizpool_sources::templates::default_registry;

pub fn execute(out: PathBuf, per_key: usize, subjects: Option<String>) -> Result<()> {
    let registry = default_registry();
    let subjects: Vec<Subject> = match subjects {
        Some(list) => list
            .split(',')
            .map(|s| {
                let subject = Subject::normalize(s)?;
                if registry.get(subject).is_none() {
                    anyhow::bail!("no question template for subject '{}'", subject);
                }
                Ok(subject)
            })
            .collect::<Result<_>>()?,
        None => registry.subjects(),
    };

    std::fs::create_dir_all(&out)
        .with_context(|| format!("failed to create {}", out.display()))?;

    let gate = Gate::default();
    let mut counts = Vec::new();
    let mut rejected = 0;

    for key in QuestionKey::all_for(&subjects) {
        let report = gate.admit_batch(registry.generate(&key, per_key), &HashSet::new());
        rejected += report.rejected.len();
        if report.admitted.is_empty() {
            continue;
        }

        let path = out.join(key.file_name());
        let json = serde_json::to_string_pretty(&report.admitted)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        counts.push((key, report.admitted.len()));
    }

    let manifest = Manifest::from_batches(counts, Utc::now());
    let manifest_path = out.join(MANIFEST_FILE);
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("failed to write {}", manifest_path.display()))?;

    println!(
        "Wrote {} questions across {} keys to {}",
        manifest.total_questions,
        manifest.total_combinations,
        out.display()
    );
    if rejected > 0 {
        println!("{rejected} generated candidate(s) dropped by the gate.");
    }
    Ok(())
}
