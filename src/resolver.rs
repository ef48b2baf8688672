//! Fetching records that are neither local nor cached.

use crate::convert::SequenceRecord;
use crate::reference_cache::CacheSource;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no remote access configured for {} reference '{accession}'", .source_kind.label())]
    Unavailable {
        source_kind: CacheSource,
        accession: String,
    },
    #[error("{} reference '{accession}' not found", .source_kind.label())]
    NotFound {
        source_kind: CacheSource,
        accession: String,
    },
}

/// Looks up an accession at its external source and converts the result.
/// A failure is a permanent miss for the current run.
pub trait RemoteResolver {
    fn resolve(&self, source: CacheSource, accession: &str) -> Result<SequenceRecord, ResolveError>;
}

/// Resolver used when no network access is available: every lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineResolver;

impl RemoteResolver for OfflineResolver {
    fn resolve(&self, source: CacheSource, accession: &str) -> Result<SequenceRecord, ResolveError> {
        Err(ResolveError::Unavailable {
            source_kind: source,
            accession: accession.to_string(),
        })
    }
}
