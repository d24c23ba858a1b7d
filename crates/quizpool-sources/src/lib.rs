//! quizpool-sources: Content sources and configuration.
//!
//! Implements the `QuestionSource` trait for static files (local or over
//! HTTP), an eagerly pre-populated table and on-demand generation, plus the
//! built-in arithmetic template and the config-driven source factory.

pub mod config;
pub mod http;
pub mod manifest;
pub mod mock;
pub mod on_demand;
pub mod prepopulated;
pub mod static_dir;
pub mod templates;

pub use config::{build_service, build_sources, load_config, load_config_from, QuizpoolConfig};
pub use manifest::Manifest;
pub use templates::default_registry;
