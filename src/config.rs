use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

pub const DEFAULT_DISTRIBUTION_NAMESPACE: &str =
    "https://github.com/iGEM-Engineering/iGEM-distribution";

/// File roles, namespaces and reference schemes shared by every stage.
/// Every field has a default, so an empty JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub distribution_namespace: String,

    pub export_directory: String,
    pub specification_name: String,
    pub package_document_name: String,
    pub distribution_name: String,
    pub synthesis_name: String,
    pub synthesis_genbank_name: String,
    pub synthesis_fasta_name: String,
    pub synthesis_insert_fasta_name: String,

    pub registry_fasta_cache_name: String,
    pub genbank_cache_name: String,
    pub registry_sbol_cache_name: String,

    pub registry_sbol_prefix: String,
    pub registry_fasta_prefix: String,
    pub genbank_prefix: String,

    pub curator_program: String,
    /// Package directory name to the fixed option vector handed to the curator.
    pub curation_profiles: BTreeMap<String, Vec<String>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            distribution_namespace: DEFAULT_DISTRIBUTION_NAMESPACE.to_string(),
            export_directory: "export".to_string(),
            specification_name: "package_specification.json".to_string(),
            package_document_name: "package.json".to_string(),
            distribution_name: "distribution.json".to_string(),
            synthesis_name: "synthesis.json".to_string(),
            synthesis_genbank_name: "synthesis.gb".to_string(),
            synthesis_fasta_name: "synthesis.fasta".to_string(),
            synthesis_insert_fasta_name: "synthesis_inserts.fasta".to_string(),
            registry_fasta_cache_name: "registry_fasta_cache.json".to_string(),
            genbank_cache_name: "genbank_cache.json".to_string(),
            registry_sbol_cache_name: "registry_sbol_cache.json".to_string(),
            registry_sbol_prefix: "https://synbiohub.org/public/igem/".to_string(),
            registry_fasta_prefix: "http://parts.igem.org/".to_string(),
            genbank_prefix: "https://www.ncbi.nlm.nih.gov/nuccore/".to_string(),
            curator_program: "sequences_to_features".to_string(),
            curation_profiles: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        serde_json::from_str(&text).map_err(|source| PipelineError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads the configuration when the file exists, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::from_json_file(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn cache_file_names(&self) -> [&str; 3] {
        [
            self.registry_fasta_cache_name.as_str(),
            self.genbank_cache_name.as_str(),
            self.registry_sbol_cache_name.as_str(),
        ]
    }

    pub fn curation_options(&self, package_name: &str) -> &[String] {
        self.curation_profiles
            .get(package_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
