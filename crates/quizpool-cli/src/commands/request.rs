//! The `quizpool request` command.

use std::path::PathBuf;

use anyhow::Result;

use quizpool_core::model::QuestionKey;
use quizpool_core::service::QuestionRequest;
use quizpool_sources::{build_service, default_registry, load_config_from};

pub async fn execute(
    grade: String,
    difficulty: String,
    subject: String,
    count: usize,
    user: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    if count == 0 {
        anyhow::bail!("--count must be at least 1");
    }
    let key = QuestionKey::parse(&grade, &difficulty, &subject)?;
    let config = load_config_from(config_path.as_deref())?;
    let service = build_service(&config, default_registry()).await?;

    let mut request = QuestionRequest::new(key, count);
    if let Some(user) = user {
        request = request.for_user(user);
    }

    let batch = service.request(&request).await;
    if let Some(message) = &batch.message {
        tracing::info!(%key, "{message}");
    }
    println!("{}", serde_json::to_string_pretty(&batch)?);
    Ok(())
}
