//! The `quizpool status` command.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use quizpool_core::engine::Dispatcher;
use quizpool_core::gate::Gate;
use quizpool_core::monitor::PoolMonitor;
use quizpool_core::oracle::Oracle;
use quizpool_sources::load_config_from;
use quizpool_sources::static_dir::StaticDirSource;

use super::question_files;

pub async fn execute(
    dir: PathBuf,
    consumed_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let consumed: HashSet<String> = match &consumed_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => HashSet::new(),
    };

    let files = question_files(&dir)?;
    let dispatcher = Dispatcher::new(
        vec![Arc::new(StaticDirSource::new(&dir))],
        Gate::new(Oracle::new(config.oracle.clone())),
        None,
    );
    let monitor = PoolMonitor::new(config.monitor.clone());

    let mut table = Table::new();
    table.set_header(vec!["Key", "Available", "Health", "Recommendation"]);

    for (key, _) in &files {
        dispatcher.ensure(*key, usize::MAX).await;
        let pool = dispatcher.pool().await;
        let status = monitor.status(&pool, key, &consumed);
        table.add_row(vec![
            Cell::new(key),
            Cell::new(status.available_count),
            Cell::new(status.health),
            Cell::new(&status.recommendation),
        ]);
    }

    println!("{table}");
    println!("{} keys checked.", files.len());
    Ok(())
}
