//! quizpool CLI: build, validate and exercise question pools.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "quizpool", version, about = "Question pool manager for practice tests")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate static question files and a manifest
    Build {
        /// Output directory
        #[arg(long, default_value = "./questions")]
        out: PathBuf,

        /// Questions to generate per key
        #[arg(long, default_value = "50")]
        per_key: usize,

        /// Subjects to build (comma-separated, default: every subject with a template)
        #[arg(long)]
        subjects: Option<String>,
    },

    /// Run static question files through the admission gate
    Validate {
        /// Directory of static question files
        #[arg(long)]
        dir: PathBuf,

        /// Exit code 1 if any question is rejected
        #[arg(long)]
        strict: bool,
    },

    /// Request questions through the full pipeline and print them as JSON
    Request {
        #[arg(long)]
        grade: String,

        #[arg(long)]
        difficulty: String,

        #[arg(long)]
        subject: String,

        /// Number of questions
        #[arg(long, default_value = "10")]
        count: usize,

        /// Skip questions this user has already answered
        #[arg(long)]
        user: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show pool health for every key in a static directory
    Status {
        /// Directory of static question files
        #[arg(long)]
        dir: PathBuf,

        /// JSON array of question ids to treat as consumed
        #[arg(long)]
        consumed: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Check whether an answer matches the expected one
    Check {
        /// Expected answer
        #[arg(long)]
        expected: String,

        /// Candidate answer
        #[arg(long)]
        answer: String,
    },
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "quizpool=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Build {
            out,
            per_key,
            subjects,
        } => commands::build::execute(out, per_key, subjects),
        Commands::Validate { dir, strict } => commands::validate::execute(dir, strict),
        Commands::Request {
            grade,
            difficulty,
            subject,
            count,
            user,
            config,
        } => commands::request::execute(grade, difficulty, subject, count, user, config).await,
        Commands::Status {
            dir,
            consumed,
            config,
        } => commands::status::execute(dir, consumed, config).await,
        Commands::Check { expected, answer } => commands::check::execute(&expected, &answer),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
