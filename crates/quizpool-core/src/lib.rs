//! quizpool-core: Question pools, single-flight sourcing and admission.
//!
//! This crate defines the data model, the answer oracle, the admission gate
//! and the pool pipeline that the rest of quizpool builds on. Content sources
//! plug in through [`traits::QuestionSource`].

pub mod engine;
pub mod error;
pub mod expander;
pub mod fallback;
pub mod gate;
pub mod model;
pub mod monitor;
pub mod oracle;
pub mod pool;
pub mod service;
pub mod storage;
pub mod traits;
