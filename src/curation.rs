//! GenBank conversion and third-party curation of package files.
//!
//! Conversion turns every GenBank file of a package into a sibling
//! `<stem>.gbconv.json` document. Curation hands those documents to an
//! external annotation program with the package's fixed option vector and
//! expects `<stem>.curated.json` outputs.

use crate::config::PipelineConfig;
use crate::convert::{self, GENBANK_EXTENSIONS};
use crate::error::{PipelineError, Result};
use crate::packages::{self, package_namespace};
use log::{debug, info, warn};
use std::{
    collections::BTreeMap,
    ffi::OsString,
    path::{Path, PathBuf},
    process::Command,
};

pub const GBCONV_SUFFIX: &str = ".gbconv.json";
pub const CURATED_SUFFIX: &str = ".curated.json";

fn sibling_with_suffix(path: &Path, strip: Option<&str>, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = match strip {
        Some(strip) => name.strip_suffix(strip).unwrap_or(&name).to_string(),
        None => path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or(name),
    };
    path.with_file_name(format!("{stem}{suffix}"))
}

/// Converts the package's GenBank files, returning input to output paths.
/// Files that convert into an invalid document are skipped with a warning.
pub fn convert_package_genbank(package: &Path, config: &PipelineConfig) -> Result<BTreeMap<PathBuf, PathBuf>> {
    let namespace = package_namespace(config, package);
    let mut mappings = BTreeMap::new();
    for file in packages::sorted_files(package)?
        .into_iter()
        .filter(|f| packages::has_extension(f, GENBANK_EXTENSIONS))
    {
        info!("Converting GenBank file '{}'", file.display());
        let records = convert::read_genbank(&file)?;
        let doc = convert::records_to_document(&namespace, &records)?;
        let issues = doc.validate();
        if !issues.is_empty() {
            warn!(
                "GenBank conversion of '{}' produced an invalid document, skipping",
                file.display()
            );
            continue;
        }
        let output = sibling_with_suffix(&file, None, GBCONV_SUFFIX);
        doc.save_to_path(&output)?;
        mappings.insert(file, output);
    }
    Ok(mappings)
}

/// Third-party annotation of converted documents.
pub trait Curator {
    fn curate(&self, options: &[String], targets: &[PathBuf], outputs: &[PathBuf]) -> Result<()>;
}

/// Runs an external curation program as `<program> <options> -t <targets> -o <outputs>`.
#[derive(Debug, Clone)]
pub struct CommandCurator {
    program: String,
}

impl CommandCurator {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.curator_program)
    }

    pub fn arguments(options: &[String], targets: &[PathBuf], outputs: &[PathBuf]) -> Vec<OsString> {
        let mut args: Vec<OsString> = options.iter().map(OsString::from).collect();
        args.push("-t".into());
        args.extend(targets.iter().map(|p| p.as_os_str().to_owned()));
        args.push("-o".into());
        args.extend(outputs.iter().map(|p| p.as_os_str().to_owned()));
        args
    }
}

impl Curator for CommandCurator {
    fn curate(&self, options: &[String], targets: &[PathBuf], outputs: &[PathBuf]) -> Result<()> {
        let status = Command::new(&self.program)
            .args(Self::arguments(options, targets, outputs))
            .status()
            .map_err(|e| PipelineError::Curation(format!("could not run '{}': {e}", self.program)))?;
        if !status.success() {
            return Err(PipelineError::Curation(format!(
                "'{}' exited with {status}",
                self.program
            )));
        }
        Ok(())
    }
}

/// Curates the package's converted GenBank documents when the package has a
/// curation profile. Returns target to output paths; empty when there was
/// nothing to do.
pub fn curate_package(
    package: &Path,
    config: &PipelineConfig,
    curator: &dyn Curator,
) -> Result<BTreeMap<PathBuf, PathBuf>> {
    let name = packages::package_name(package);
    let options = config.curation_options(&name);
    if options.is_empty() {
        debug!("Package '{name}' has no curation profile");
        return Ok(BTreeMap::new());
    }
    let targets: Vec<PathBuf> = packages::sorted_files(package)?
        .into_iter()
        .filter(|f| packages::has_extension(f, &[GBCONV_SUFFIX]))
        .collect();
    if targets.is_empty() {
        debug!("Package '{name}' has no converted GenBank files to curate");
        return Ok(BTreeMap::new());
    }
    let outputs: Vec<PathBuf> = targets
        .iter()
        .map(|t| sibling_with_suffix(t, Some(GBCONV_SUFFIX), CURATED_SUFFIX))
        .collect();
    info!("Curating {} converted files of package '{name}'", targets.len());
    curator.curate(options, &targets, &outputs)?;
    Ok(targets.into_iter().zip(outputs).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_genbank_fixture;
    use parts_protocol::{Document, ObjectKind};
    use std::cell::RefCell;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingCurator {
        calls: RefCell<Vec<Vec<OsString>>>,
    }

    impl Curator for RecordingCurator {
        fn curate(&self, options: &[String], targets: &[PathBuf], outputs: &[PathBuf]) -> Result<()> {
            self.calls
                .borrow_mut()
                .push(CommandCurator::arguments(options, targets, outputs));
            Ok(())
        }
    }

    fn curated_config(package_name: &str) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.curation_profiles.insert(
            package_name.to_string(),
            vec!["-m".to_string(), "1".to_string(), "-ni".to_string()],
        );
        config
    }

    #[test]
    fn test_genbank_files_become_gbconv_documents() {
        let td = tempdir().unwrap();
        let package = td.path().join("Open Yeast Collection");
        write_genbank_fixture(
            &package.join("yeast.gb"),
            &[("YFP", "ATGGTGAGCAAGGGCGAG"), ("CFP", "ATGGTGAGCAAAGGCGAA")],
        );
        let config = PipelineConfig::default();
        let mappings = convert_package_genbank(&package, &config).unwrap();

        let output = package.join("yeast.gbconv.json");
        assert_eq!(mappings.get(&package.join("yeast.gb")), Some(&output));
        let doc = Document::load_from_path(&output).unwrap();
        assert_eq!(doc.count_of(ObjectKind::Component), 2);
        assert_eq!(doc.namespace, package_namespace(&config, &package));
    }

    #[test]
    fn test_curation_passes_fixed_options_targets_and_outputs() {
        let td = tempdir().unwrap();
        let package = td.path().join("Open Yeast Collection");
        std::fs::create_dir_all(&package).unwrap();
        for name in ["b.gbconv.json", "a.gbconv.json", "notes.json"] {
            std::fs::write(package.join(name), "{}").unwrap();
        }
        let curator = RecordingCurator::default();
        let mappings = curate_package(&package, &curated_config("Open Yeast Collection"), &curator).unwrap();

        assert_eq!(mappings.len(), 2);
        let calls = curator.calls.borrow();
        assert_eq!(calls.len(), 1);
        let expected: Vec<OsString> = vec![
            "-m".into(),
            "1".into(),
            "-ni".into(),
            "-t".into(),
            package.join("a.gbconv.json").into(),
            package.join("b.gbconv.json").into(),
            "-o".into(),
            package.join("a.curated.json").into(),
            package.join("b.curated.json").into(),
        ];
        assert_eq!(calls[0], expected);
    }

    #[test]
    fn test_package_without_profile_is_not_curated() {
        let td = tempdir().unwrap();
        let package = td.path().join("Anderson Promoters");
        std::fs::create_dir_all(&package).unwrap();
        std::fs::write(package.join("a.gbconv.json"), "{}").unwrap();
        let curator = RecordingCurator::default();
        let mappings = curate_package(&package, &curated_config("Open Yeast Collection"), &curator).unwrap();
        assert!(mappings.is_empty());
        assert!(curator.calls.borrow().is_empty());
    }

    #[test]
    fn test_missing_curator_program_is_a_curation_error() {
        let curator = CommandCurator::new("definitely-not-an-installed-curator");
        let err = curator
            .curate(&[], &[PathBuf::from("a.gbconv.json")], &[PathBuf::from("a.curated.json")])
            .unwrap_err();
        assert!(matches!(err, PipelineError::Curation(_)));
    }
}
