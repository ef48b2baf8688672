//! Persisted lookup tables for externally resolved parts, one per source.
//!
//! A cache file is a JSON object mapping keys to [`SequenceRecord`]s. A
//! missing file is an empty cache. Storing a record under a key that already
//! holds different content is a [`PipelineError::CacheCollision`]; the cache
//! never overwrites.

use crate::config::PipelineConfig;
use crate::convert::SequenceRecord;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CacheSource {
    RegistryFasta,
    GenBank,
    RegistrySbol,
}

impl CacheSource {
    pub const ALL: [CacheSource; 3] = [Self::RegistryFasta, Self::GenBank, Self::RegistrySbol];

    pub fn label(self) -> &'static str {
        match self {
            Self::RegistryFasta => "registry_fasta",
            Self::GenBank => "genbank",
            Self::RegistrySbol => "registry_sbol",
        }
    }

    pub fn file_name(self, config: &PipelineConfig) -> &str {
        match self {
            Self::RegistryFasta => &config.registry_fasta_cache_name,
            Self::GenBank => &config.genbank_cache_name,
            Self::RegistrySbol => &config.registry_sbol_cache_name,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStore {
    Inserted,
    AlreadyPresent,
}

#[derive(Debug, Clone)]
pub struct ReferenceCache {
    source: CacheSource,
    path: PathBuf,
    entries: BTreeMap<String, SequenceRecord>,
    dirty: bool,
}

impl ReferenceCache {
    pub fn open(source: CacheSource, path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
            serde_json::from_str(&text).map_err(|source| PipelineError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            source,
            path: path.to_path_buf(),
            entries,
            dirty: false,
        })
    }

    pub fn source(&self) -> CacheSource {
        self.source
    }

    pub fn lookup(&self, key: &str) -> Option<&SequenceRecord> {
        self.entries.get(key)
    }

    pub fn store(&mut self, key: &str, record: SequenceRecord) -> Result<CacheStore> {
        match self.entries.get(key) {
            Some(existing) if *existing == record => Ok(CacheStore::AlreadyPresent),
            Some(_) => Err(PipelineError::CacheCollision {
                cache: self.source,
                key: key.to_string(),
            }),
            None => {
                self.entries.insert(key.to_string(), record);
                self.dirty = true;
                Ok(CacheStore::Inserted)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the cache back when something was added since it was opened.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let mut text = serde_json::to_string_pretty(&self.entries).map_err(|source| {
            PipelineError::Json {
                path: self.path.clone(),
                source,
            }
        })?;
        text.push('\n');
        fs::write(&self.path, text).map_err(|e| PipelineError::io(&self.path, e))?;
        self.dirty = false;
        Ok(())
    }
}

/// The three caches living in one package directory.
#[derive(Debug, Clone)]
pub struct ReferenceCaches {
    registry_fasta: ReferenceCache,
    genbank: ReferenceCache,
    registry_sbol: ReferenceCache,
}

impl ReferenceCaches {
    pub fn open_for_package(config: &PipelineConfig, package: &Path) -> Result<Self> {
        let open = |source: CacheSource| ReferenceCache::open(source, &package.join(source.file_name(config)));
        Ok(Self {
            registry_fasta: open(CacheSource::RegistryFasta)?,
            genbank: open(CacheSource::GenBank)?,
            registry_sbol: open(CacheSource::RegistrySbol)?,
        })
    }

    pub fn cache(&self, source: CacheSource) -> &ReferenceCache {
        match source {
            CacheSource::RegistryFasta => &self.registry_fasta,
            CacheSource::GenBank => &self.genbank,
            CacheSource::RegistrySbol => &self.registry_sbol,
        }
    }

    fn cache_mut(&mut self, source: CacheSource) -> &mut ReferenceCache {
        match source {
            CacheSource::RegistryFasta => &mut self.registry_fasta,
            CacheSource::GenBank => &mut self.genbank,
            CacheSource::RegistrySbol => &mut self.registry_sbol,
        }
    }

    pub fn lookup(&self, source: CacheSource, key: &str) -> Option<&SequenceRecord> {
        self.cache(source).lookup(key)
    }

    pub fn store(&mut self, source: CacheSource, key: &str, record: SequenceRecord) -> Result<CacheStore> {
        self.cache_mut(source).store(key, record)
    }

    pub fn save_all(&mut self) -> Result<()> {
        CacheSource::ALL
            .into_iter()
            .try_for_each(|source| self.cache_mut(source).save())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty_cache() {
        let td = tempdir().unwrap();
        let cache = ReferenceCache::open(CacheSource::GenBank, &td.path().join("none.json")).unwrap();
        assert!(cache.is_empty());
        assert!(cache.lookup("JWYZ01000115").is_none());
    }

    #[test]
    fn test_store_then_reopen() {
        let td = tempdir().unwrap();
        let path = td.path().join("cache.json");
        let mut cache = ReferenceCache::open(CacheSource::RegistryFasta, &path).unwrap();
        let record = SequenceRecord::new("BBa_J23100", "ttgacggctagctcagtcctaggtacagtgctagc");
        assert_eq!(cache.store("BBa_J23100", record.clone()).unwrap(), CacheStore::Inserted);
        assert_eq!(cache.store("BBa_J23100", record.clone()).unwrap(), CacheStore::AlreadyPresent);
        cache.save().unwrap();

        let reopened = ReferenceCache::open(CacheSource::RegistryFasta, &path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.lookup("BBa_J23100"), Some(&record));
    }

    #[test]
    fn test_differing_content_for_same_key_is_a_collision() {
        let td = tempdir().unwrap();
        let mut cache = ReferenceCache::open(CacheSource::RegistrySbol, &td.path().join("c.json")).unwrap();
        cache.store("BBa_J23101", SequenceRecord::new("BBa_J23101", "ACGT")).unwrap();
        let err = cache
            .store("BBa_J23101", SequenceRecord::new("BBa_J23101", "ACGA"))
            .unwrap_err();
        assert!(err.is_fatal_to_run());
        assert!(matches!(err, PipelineError::CacheCollision { cache: CacheSource::RegistrySbol, .. }));
        assert_eq!(cache.lookup("BBa_J23101").unwrap().elements, "ACGT");
    }

    #[test]
    fn test_unchanged_cache_is_not_rewritten() {
        let td = tempdir().unwrap();
        let path = td.path().join("cache.json");
        let mut cache = ReferenceCache::open(CacheSource::GenBank, &path).unwrap();
        cache.save().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_package_caches_use_configured_names() {
        let td = tempdir().unwrap();
        let config = PipelineConfig::default();
        let mut caches = ReferenceCaches::open_for_package(&config, td.path()).unwrap();
        caches
            .store(CacheSource::GenBank, "JWYZ01000115", SequenceRecord::new("JWYZ01000115", "ATG"))
            .unwrap();
        assert!(caches.lookup(CacheSource::RegistrySbol, "JWYZ01000115").is_none());
        assert_eq!(caches.cache(CacheSource::GenBank).len(), 1);
        assert_eq!(caches.cache(CacheSource::GenBank).source(), CacheSource::GenBank);
        caches.save_all().unwrap();
        assert!(td.path().join(&config.genbank_cache_name).exists());
        assert!(!td.path().join(&config.registry_fasta_cache_name).exists());

        let reopened = ReferenceCaches::open_for_package(&config, td.path()).unwrap();
        assert!(reopened.lookup(CacheSource::GenBank, "JWYZ01000115").is_some());
    }
}
