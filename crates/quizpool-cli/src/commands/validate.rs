//! The `quizpool validate` command.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use quizpool_core::gate::Gate;

use super::{question_files, read_questions};

pub fn execute(dir: PathBuf, strict: bool) -> Result<()> {
    let files = question_files(&dir)?;
    let gate = Gate::default();

    let mut table = Table::new();
    table.set_header(vec!["Key", "Questions", "Admitted", "Rejected", "Reasons"]);

    let mut total_questions = 0;
    let mut total_problems = 0;

    for (key, path) in &files {
        let questions = match read_questions(path) {
            Ok(questions) => questions,
            Err(e) => {
                println!("  [{key}] ERROR: {e:#}");
                total_problems += 1;
                continue;
            }
        };

        let mismatched = questions
            .iter()
            .filter(|q| q.key().ok().as_ref() != Some(key))
            .count();
        if mismatched > 0 {
            println!("  [{key}] WARNING: {mismatched} question(s) declare a different key");
        }

        let count = questions.len();
        let report = gate.admit_batch(questions, &HashSet::new());
        let reasons = report
            .rejection_counts()
            .iter()
            .map(|(label, n)| format!("{label}: {n}"))
            .collect::<Vec<_>>()
            .join(", ");

        total_questions += count;
        total_problems += report.rejected.len();
        table.add_row(vec![
            Cell::new(key),
            Cell::new(count),
            Cell::new(report.admitted.len()),
            Cell::new(report.rejected.len()),
            Cell::new(reasons),
        ]);
    }

    println!("{table}");

    if total_problems == 0 {
        println!("All {total_questions} questions in {} files valid.", files.len());
        return Ok(());
    }

    println!("\n{total_problems} problem(s) found.");
    if strict {
        anyhow::bail!("{total_problems} invalid question(s) or file(s)");
    }
    Ok(())
}
