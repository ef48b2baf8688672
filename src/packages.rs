//! A package is a directory, nothing more: every helper here is a pure
//! function of the package path and the configuration.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use parts_protocol::join_identity;
use std::{
    fs,
    path::{Path, PathBuf},
};

pub fn package_name(package: &Path) -> String {
    package
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "package".to_string())
}

/// Namespace for identities minted inside a package.
pub fn package_namespace(config: &PipelineConfig, package: &Path) -> String {
    join_identity(&config.distribution_namespace, &package_name(package))
}

pub fn export_dir(config: &PipelineConfig, package: &Path) -> PathBuf {
    package.join(&config.export_directory)
}

pub fn specification_path(config: &PipelineConfig, package: &Path) -> PathBuf {
    export_dir(config, package).join(&config.specification_name)
}

pub fn package_document_path(config: &PipelineConfig, package: &Path) -> PathBuf {
    export_dir(config, package).join(&config.package_document_name)
}

/// Sub-directories of `root` that carry a package specification, in name order.
pub fn package_dirs(root: &Path, config: &PipelineConfig) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(root).map_err(|e| PipelineError::io(root, e))?;
    let mut packages: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && specification_path(config, path).is_file())
        .collect();
    packages.sort();
    Ok(packages)
}

/// Regular files directly inside a directory, in name order.
pub fn sorted_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    extensions.iter().any(|ext| name.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_package_dirs_requires_specification_and_sorts() {
        let td = tempdir().unwrap();
        let config = PipelineConfig::default();
        for name in ["zeta", "alpha", "no_spec"] {
            fs::create_dir_all(td.path().join(name).join("export")).unwrap();
        }
        for name in ["zeta", "alpha"] {
            fs::write(specification_path(&config, &td.path().join(name)), "{}").unwrap();
        }
        fs::write(td.path().join("stray.json"), "{}").unwrap();

        let dirs = package_dirs(td.path(), &config).unwrap();
        let names: Vec<String> = dirs.iter().map(|p| package_name(p)).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_package_namespace_joins_distribution_namespace() {
        let config = PipelineConfig::default();
        assert_eq!(
            package_namespace(&config, Path::new("/tmp/dist/test_package")),
            "https://github.com/iGEM-Engineering/iGEM-distribution/test_package"
        );
    }

    #[test]
    fn test_has_extension_is_case_insensitive() {
        assert!(has_extension(Path::new("a/B.GB"), &[".gb", ".gbk"]));
        assert!(has_extension(Path::new("x.fasta"), &[".fa", ".fasta"]));
        assert!(!has_extension(Path::new("x.json"), &[".fa", ".fasta"]));
    }
}
