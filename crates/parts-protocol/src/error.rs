use crate::objects::Identity;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Could not read document '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not write document '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not parse document '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Document JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Identity '{0}' is already present in the document")]
    DuplicateIdentity(Identity),

    #[error("Identity '{0}' is already present with different content")]
    ConflictingIdentity(Identity),
}
