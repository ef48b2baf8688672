use crate::reference_cache::CacheSource;
use parts_protocol::{Identity, ProtocolError, ValidationIssue};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error in '{}': {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Document '{}' is invalid: {}", .path.display(), format_issues(.issues))]
    InvalidDocument {
        path: PathBuf,
        issues: Vec<ValidationIssue>,
    },

    #[error("Could not locate build plan collection '{0}'")]
    MissingBuildPlan(Identity),

    #[error("Build plan collection should contain only components: {0:?}")]
    InvalidBuildPlan(Vec<Identity>),

    #[error("Template collection '{collection}' lists '{member}', which is not a component")]
    MissingTemplateMember { collection: Identity, member: Identity },

    #[error("Identity '{identity}' is defined differently in '{}' and '{}'", .first.display(), .second.display())]
    IdentityCollision {
        identity: Identity,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("{} cache already holds different content for key '{key}'", .cache.label())]
    CacheCollision { cache: CacheSource, key: String },

    #[error("Could not convert '{}': {message}", .path.display())]
    Conversion { path: PathBuf, message: String },

    #[error("Curation failed: {0}")]
    Curation(String),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors that invalidate the whole run rather than a single package.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            Self::IdentityCollision { .. } | Self::CacheCollision { .. }
        )
    }
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, PipelineError>;
