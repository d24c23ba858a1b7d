//! The `quizpool check` command.

use anyhow::Result;

use quizpool_core::oracle::Oracle;

pub fn execute(expected: &str, answer: &str) -> Result<()> {
    let oracle = Oracle::default();
    match oracle.equivalent(expected, answer) {
        Some(eq) => println!(
            "correct ({:?}, confidence {:.2})",
            eq.method, eq.confidence
        ),
        None => println!("incorrect: expected {expected}"),
    }
    Ok(())
}
