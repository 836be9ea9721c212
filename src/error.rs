//! Error taxonomy for the execution cache.
//!
//! Global errors (`MalformedRecord`, `UnknownFamily`) abort a build. The
//! session-level variants are never returned from `build`; they are rendered
//! into diagnostics and counted against the session that produced them.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("persisted store is stale: {0}")]
    StaleStoreFormat(String),

    #[error("{session}: dependency '{path}' cannot be found")]
    MissingDependency { session: String, path: String },

    #[error("{session}: dependency '{path}' was modified during this run; it will be rerun next time")]
    UnresolvedDependency { session: String, path: String },

    #[error("{session}: {message}")]
    ExecutionFailure { session: String, message: String },

    #[error("malformed code block on line {line} ({key}): {reason}")]
    MalformedRecord { key: String, line: usize, reason: String },

    #[error("no execution engine is configured for family '{0}'")]
    UnknownFamily(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Whether this error aborts the whole build rather than one session.
    #[must_use]
    pub fn is_global(&self) -> bool {
        matches!(self, Self::MalformedRecord { .. } | Self::UnknownFamily(_))
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::EngineError;

    #[test]
    fn malformed_record_is_global() {
        let err = EngineError::MalformedRecord {
            key: "python#main#0".to_string(),
            line: 4,
            reason: "unknown command 'zz'".to_string(),
        };
        assert!(err.is_global());
        assert!(err.to_string().contains("line 4"));
    }

    #[test]
    fn missing_dependency_is_session_level() {
        let err = EngineError::MissingDependency {
            session: "python#main#0".to_string(),
            path: "data.csv".to_string(),
        };
        assert!(!err.is_global());
        assert_eq!(err.to_string(), "python#main#0: dependency 'data.csv' cannot be found");
    }
}
