//! texrun: incremental execution cache for code embedded in documents
//!
//! Code blocks extracted from a document are grouped into sessions, each
//! session is fingerprinted, and only sessions whose fingerprint, declared
//! dependencies or previous outcome call for it are executed again. Results
//! are kept in a persisted store alongside the artifacts they produced.

pub mod cli;
pub mod config;
pub mod deps;
pub mod domain;
pub mod engine;
pub mod error;
pub mod exec;
pub mod fingerprint;
pub mod highlight;
pub mod pipeline;
pub mod reap;
pub mod rerun;
pub mod store;
pub mod utils;
