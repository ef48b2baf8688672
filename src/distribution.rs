//! Distribution assembly: the union of every expanded package document plus
//! one distribution-wide `BuildProducts` collection.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::packages;
use crate::pipeline::PackageFailure;
use itertools::Itertools;
use log::{debug, error, info};
use parts_protocol::{
    BUILD_PRODUCTS_COLLECTION, Collection, Component, Document, Identity, ProtocolError, TopLevel,
    build_products_identity,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

#[derive(Debug)]
pub struct DistributionAssembly {
    pub document: Document,
    /// Packages left out of the distribution, in processing order.
    pub failures: Vec<PackageFailure>,
}

impl DistributionAssembly {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Packages resolving the same external part produce components that differ
/// only in the activity that generated them. Those fold into one component
/// listing every activity.
fn merge_provenance(existing: &TopLevel, incoming: &TopLevel) -> Option<Component> {
    let (TopLevel::Component(a), TopLevel::Component(b)) = (existing, incoming) else {
        return None;
    };
    let mut merged = a.clone();
    let mut other = b.clone();
    merged.generated_by.clear();
    other.generated_by.clear();
    if merged != other {
        return None;
    }
    merged.generated_by = a
        .generated_by
        .iter()
        .chain(&b.generated_by)
        .cloned()
        .sorted()
        .dedup()
        .collect();
    Some(merged)
}

struct Assembler {
    doc: Document,
    origins: BTreeMap<Identity, PathBuf>,
    members: BTreeSet<Identity>,
}

impl Assembler {
    fn import(&mut self, package_doc: &Document, path: &Path) -> Result<()> {
        let build_products = package_doc
            .collection(&build_products_identity(&package_doc.namespace))
            .ok_or_else(|| PipelineError::MissingBuildPlan(build_products_identity(&package_doc.namespace)))?;

        for object in package_doc.objects() {
            match self.doc.add_or_fold(object.clone()) {
                Ok(true) => {
                    self.origins
                        .insert(object.identity().to_string(), path.to_path_buf());
                }
                Ok(false) => {}
                Err(ProtocolError::ConflictingIdentity(identity)) => {
                    if let Some(merged) = self
                        .doc
                        .get(&identity)
                        .and_then(|existing| merge_provenance(existing, object))
                    {
                        debug!("Merged provenance of '{identity}'");
                        self.doc.replace(merged);
                        continue;
                    }
                    let first = self.origins.get(&identity).cloned().unwrap_or_default();
                    return Err(PipelineError::IdentityCollision {
                        identity,
                        first,
                        second: path.to_path_buf(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!(
            "Imported {} objects and {} build products from '{}'",
            package_doc.len(),
            build_products.members.len(),
            path.display()
        );
        self.members.extend(build_products.members.iter().cloned());
        Ok(())
    }
}

/// Merges the expanded documents of `packages` and writes the distribution
/// document at `root`. Unreadable packages are reported in the result; an
/// identity defined differently by two packages aborts the assembly.
pub fn build_distribution(root: &Path, packages: &[PathBuf], config: &PipelineConfig) -> Result<DistributionAssembly> {
    info!("Assembling distribution from {} packages", packages.len());
    let mut assembler = Assembler {
        doc: Document::new(&config.distribution_namespace),
        origins: BTreeMap::new(),
        members: BTreeSet::new(),
    };
    let mut failures = vec![];

    for package in packages {
        let name = packages::package_name(package);
        let path = packages::package_document_path(config, package);
        let result = Document::load_from_path(&path)
            .map_err(PipelineError::from)
            .and_then(|package_doc| assembler.import(&package_doc, &path));
        match result {
            Ok(()) => {}
            Err(e) if e.is_fatal_to_run() => return Err(e),
            Err(e) => {
                error!("Package '{name}' left out of the distribution: {e}");
                failures.push(PackageFailure { package: name, error: e });
            }
        }
    }

    let path = root.join(&config.distribution_name);
    let identity = build_products_identity(&config.distribution_namespace);
    if let Some(first) = assembler.origins.get(&identity) {
        return Err(PipelineError::IdentityCollision {
            first: first.clone(),
            identity,
            second: path,
        });
    }
    let mut build_products = Collection::new(&config.distribution_namespace, BUILD_PRODUCTS_COLLECTION);
    build_products.extend_members(&assembler.members);
    let mut doc = assembler.doc;
    doc.add(build_products)?;

    let issues = doc.validate();
    if !issues.is_empty() {
        return Err(PipelineError::InvalidDocument { path, issues });
    }
    doc.save_to_path(&path)?;
    info!(
        "Distribution lists {} build products in {} objects",
        assembler.members.len(),
        doc.len()
    );
    Ok(DistributionAssembly {
        document: doc,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::expand_document;
    use crate::test_support::{build_plan_document, write_package_document};
    use parts_protocol::{Component, join_identity};
    use std::fs;
    use tempfile::tempdir;

    fn expanded_package(root: &Path, config: &PipelineConfig, name: &str) -> PathBuf {
        let package = root.join(name);
        let mut doc = build_plan_document(&packages::package_namespace(config, &package));
        expand_document(&mut doc).unwrap();
        write_package_document(config, &package, &doc);
        package
    }

    #[test]
    fn test_distribution_collects_all_build_products() {
        let td = tempdir().unwrap();
        let config = PipelineConfig::default();
        let package = expanded_package(td.path(), &config, "demo");
        let package_doc = Document::load_from_path(&packages::package_document_path(&config, &package)).unwrap();

        let assembly = build_distribution(td.path(), &[package], &config).unwrap();
        assert!(assembly.is_complete());
        let doc = &assembly.document;
        assert_eq!(doc.len(), package_doc.len() + 1);
        let members = &doc
            .collection(&build_products_identity(&config.distribution_namespace))
            .unwrap()
            .members;
        assert_eq!(members.len(), 10);
        let mut sorted = members.clone();
        sorted.sort();
        assert_eq!(*members, sorted);
        assert!(td.path().join(&config.distribution_name).is_file());
    }

    #[test]
    fn test_conflicting_identity_across_packages_is_fatal() {
        let td = tempdir().unwrap();
        let config = PipelineConfig::default();
        let first = expanded_package(td.path(), &config, "first");

        let second = td.path().join("second");
        let ns = packages::package_namespace(&config, &second);
        let mut doc = build_plan_document(&ns);
        expand_document(&mut doc).unwrap();
        // redefine a part of the first package with a different description
        let mut clash = Component::new(&packages::package_namespace(&config, &first), "BBa_J23100");
        clash.description = Some("a different promoter".to_string());
        doc.add(clash).unwrap();
        write_package_document(&config, &second, &doc);

        let err = build_distribution(td.path(), &[first, second], &config).unwrap_err();
        assert!(err.is_fatal_to_run());
        assert!(matches!(err, PipelineError::IdentityCollision { .. }));
        assert!(!td.path().join(&config.distribution_name).exists());
    }

    #[test]
    fn test_identical_shared_objects_fold() {
        let td = tempdir().unwrap();
        let config = PipelineConfig::default();
        let first = expanded_package(td.path(), &config, "first");
        let first_doc = Document::load_from_path(&packages::package_document_path(&config, &first)).unwrap();

        let second = td.path().join("second");
        let ns = packages::package_namespace(&config, &second);
        let mut doc = build_plan_document(&ns);
        expand_document(&mut doc).unwrap();
        let shared = first_doc.component(&join_identity(&first_doc.namespace, "BBa_J23100")).unwrap();
        let shared_seq = first_doc.concrete_sequence(shared).unwrap();
        doc.add(shared_seq.clone()).unwrap();
        doc.add(shared.clone()).unwrap();
        write_package_document(&config, &second, &doc);

        let assembly = build_distribution(td.path(), &[first, second], &config).unwrap();
        let members = &assembly
            .document
            .collection(&build_products_identity(&config.distribution_namespace))
            .unwrap()
            .members;
        assert_eq!(members.len(), 20);
    }

    #[test]
    fn test_shared_external_part_merges_provenance() {
        let td = tempdir().unwrap();
        let config = PipelineConfig::default();
        let identity = format!("{}BBa_J23100/1", config.registry_sbol_prefix);
        let mut packages_list = vec![];
        for name in ["first", "second"] {
            let package = td.path().join(name);
            let ns = packages::package_namespace(&config, &package);
            let mut doc = build_plan_document(&ns);
            let mut shared = Component::with_identity(identity.clone(), "BBa_J23100");
            shared.generated_by.push(format!("{ns}/registry_sbol_import"));
            doc.add(shared).unwrap();
            expand_document(&mut doc).unwrap();
            write_package_document(&config, &package, &doc);
            packages_list.push(package);
        }

        let assembly = build_distribution(td.path(), &packages_list, &config).unwrap();
        let merged = assembly.document.component(&identity).unwrap();
        assert_eq!(merged.generated_by.len(), 2);
    }

    #[test]
    fn test_missing_package_is_a_per_package_failure() {
        let td = tempdir().unwrap();
        let config = PipelineConfig::default();
        let good = expanded_package(td.path(), &config, "good");
        let missing = td.path().join("missing");

        let assembly = build_distribution(td.path(), &[good, missing], &config).unwrap();
        assert_eq!(assembly.failures.len(), 1);
        assert_eq!(assembly.failures[0].package, "missing");
        let members = &assembly
            .document
            .collection(&build_products_identity(&config.distribution_namespace))
            .unwrap()
            .members;
        assert_eq!(members.len(), 10);
    }

    #[test]
    fn test_package_without_build_products_is_a_failure() {
        let td = tempdir().unwrap();
        let config = PipelineConfig::default();
        let package = td.path().join("unexpanded");
        write_package_document(&config, &package, &build_plan_document(&packages::package_namespace(&config, &package)));

        let assembly = build_distribution(td.path(), &[package], &config).unwrap();
        assert!(matches!(
            assembly.failures[0].error,
            PipelineError::MissingBuildPlan(_)
        ));
        assert_eq!(assembly.document.len(), 1);
    }

    #[test]
    fn test_distribution_is_byte_identical_on_rerun() {
        let td = tempdir().unwrap();
        let config = PipelineConfig::default();
        let packages_list = vec![
            expanded_package(td.path(), &config, "first"),
            expanded_package(td.path(), &config, "second"),
        ];
        let path = td.path().join(&config.distribution_name);

        build_distribution(td.path(), &packages_list, &config).unwrap();
        let first = fs::read(&path).unwrap();
        let assembly = build_distribution(td.path(), &packages_list, &config).unwrap();
        assert!(assembly.is_complete());
        assert_eq!(fs::read(&path).unwrap(), first);
    }
}
