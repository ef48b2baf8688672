//! Collation: turn a package specification full of placeholder references into
//! one resolved package document.
//!
//! A placeholder is a component without sequences and features. Its identity
//! decides where it is resolved from:
//! - registry SBOL, registry FASTA and GenBank prefixes go through the matching
//!   reference cache, falling back to the remote resolver on a miss;
//! - anything else is looked up in the package's local JSON documents, then in
//!   its local FASTA and GenBank records by display id.
//!
//! Placeholders that cannot be resolved stay in the document unchanged.

use crate::config::PipelineConfig;
use crate::convert::{self, SequenceRecord};
use crate::error::{PipelineError, Result};
use crate::packages::{self, package_namespace};
use crate::reference_cache::{CacheSource, CacheStore, ReferenceCaches};
use crate::resolver::RemoteResolver;
use log::{debug, info, warn};
use parts_protocol::{
    Activity, ActivityKind, Component, Document, Encoding, Identity, ProtocolError, Sequence,
    TopLevel,
};
use sha1::{Digest, Sha1};
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

const LOCAL_IMPORT: &str = "local_import";

/// Content identity of a sequence: equal encodings and residues give equal keys.
pub fn sequence_content_key(encoding: Encoding, elements: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(encoding.label().as_bytes());
    hasher.update(b":");
    hasher.update(elements.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Reference {
    Cached { source: CacheSource, key: String },
    LocalDocument(usize),
    LocalRecord(String),
    Unknown,
}

/// Records and documents found directly inside the package directory.
#[derive(Default)]
struct LocalSources {
    documents: Vec<(PathBuf, Document)>,
    records: BTreeMap<String, (PathBuf, SequenceRecord)>,
}

impl LocalSources {
    fn scan(package: &Path, config: &PipelineConfig) -> Result<Self> {
        let mut ret = Self::default();
        let skip = config.cache_file_names();
        for path in packages::sorted_files(package)? {
            let name = path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            if skip.contains(&name.as_str()) {
                continue;
            }
            if let Some(records) = convert::read_sequence_file(&path) {
                for record in records? {
                    let display_id = record.display_id();
                    if ret.records.contains_key(&display_id) {
                        debug!("Ignoring repeated local record '{display_id}' in '{name}'");
                        continue;
                    }
                    ret.records.insert(display_id, (path.clone(), record));
                }
            } else if packages::has_extension(&path, &[".json"]) {
                match Document::load_from_path(&path) {
                    Ok(doc) => ret.documents.push((path, doc)),
                    Err(e @ ProtocolError::Parse { .. }) => {
                        warn!("Ignoring '{name}', not an object-graph document: {e}");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(ret)
    }

    fn defining_document(&self, identity: &str) -> Option<usize> {
        self.documents.iter().position(|(_, doc)| {
            doc.component(identity)
                .map(|c| !c.is_placeholder())
                .unwrap_or(false)
        })
    }
}

fn accession_key(identity: &str, prefix: &str) -> Option<String> {
    identity
        .strip_prefix(prefix)?
        .split(['/', '#'])
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn classify(config: &PipelineConfig, local: &LocalSources, component: &Component) -> Reference {
    let schemes = [
        (&config.registry_sbol_prefix, CacheSource::RegistrySbol),
        (&config.registry_fasta_prefix, CacheSource::RegistryFasta),
        (&config.genbank_prefix, CacheSource::GenBank),
    ];
    for (prefix, source) in schemes {
        if let Some(key) = accession_key(&component.identity, prefix) {
            return Reference::Cached { source, key };
        }
    }
    if let Some(idx) = local.defining_document(&component.identity) {
        return Reference::LocalDocument(idx);
    }
    if local.records.contains_key(&component.display_id) {
        return Reference::LocalRecord(component.display_id.clone());
    }
    Reference::Unknown
}

/// Output document under construction, with the sequence content index.
struct Collation {
    doc: Document,
    sequence_by_content: HashMap<String, Identity>,
    activities: BTreeMap<String, Activity>,
}

impl Collation {
    fn new(namespace: &str) -> Self {
        Self {
            doc: Document::new(namespace),
            sequence_by_content: HashMap::new(),
            activities: BTreeMap::new(),
        }
    }

    /// Adds a sequence unless equal content is already present; returns the
    /// identity the caller should reference.
    fn adopt_sequence(&mut self, sequence: Sequence) -> Result<Identity> {
        let key = sequence_content_key(sequence.encoding, &sequence.elements);
        if let Some(existing) = self.sequence_by_content.get(&key) {
            if *existing != sequence.identity {
                debug!("Sequence '{}' shares content with '{existing}'", sequence.identity);
            }
            return Ok(existing.clone());
        }
        let identity = sequence.identity.clone();
        self.doc.add_or_fold(sequence)?;
        self.sequence_by_content.insert(key, identity.clone());
        Ok(identity)
    }

    /// Adds a component whose sequences come from `sequences`, remapping
    /// references onto deduplicated sequence objects. A resolved component
    /// replaces a placeholder of the same identity. When the identity is
    /// already resolved the first resolution stays, and a second one with the
    /// same content only adds its provenance.
    fn adopt_component(&mut self, mut component: Component, sequences: Vec<Sequence>) -> Result<()> {
        if component.is_placeholder() {
            return self.adopt_placeholder(component);
        }
        match self.doc.get(&component.identity) {
            Some(TopLevel::Component(existing)) if !existing.is_placeholder() => {
                let existing = existing.clone();
                self.fold_resolution(existing, &component, &sequences);
                return Ok(());
            }
            Some(TopLevel::Component(_)) | None => {}
            Some(_) => return Err(ProtocolError::ConflictingIdentity(component.identity).into()),
        }
        let mut remapped: Vec<Identity> = vec![];
        for sequence in sequences {
            let identity = self.adopt_sequence(sequence)?;
            if !remapped.contains(&identity) {
                remapped.push(identity);
            }
        }
        component.sequences = remapped;
        self.doc.replace(component);
        Ok(())
    }

    /// Keeps an unresolved reference unless something already stands for it.
    fn adopt_placeholder(&mut self, placeholder: Component) -> Result<()> {
        match self.doc.get(&placeholder.identity) {
            Some(TopLevel::Component(_)) => Ok(()),
            Some(_) => Err(ProtocolError::ConflictingIdentity(placeholder.identity).into()),
            None => {
                self.doc.add(placeholder)?;
                Ok(())
            }
        }
    }

    fn fold_resolution(&mut self, existing: Component, incoming: &Component, sequences: &[Sequence]) {
        let same_sequences = existing.sequences.len() == sequences.len()
            && sequences.iter().all(|s| {
                self.sequence_by_content
                    .get(&sequence_content_key(s.encoding, &s.elements))
                    .is_some_and(|id| existing.sequences.contains(id))
            });
        if !same_sequences || existing.features != incoming.features {
            warn!(
                "'{}' resolved again with different content, keeping the first resolution",
                existing.identity
            );
            return;
        }
        let mut merged = existing;
        for activity in &incoming.generated_by {
            if !merged.generated_by.contains(activity) {
                merged.generated_by.push(activity.clone());
            }
        }
        debug!("'{}' resolved again, merged provenance", merged.identity);
        self.doc.replace(merged);
    }

    fn note_activity(&mut self, display_id: &str, kind: ActivityKind, used: &str) -> Identity {
        let namespace = self.doc.namespace.clone();
        let activity = self
            .activities
            .entry(display_id.to_string())
            .or_insert_with(|| Activity::new(&namespace, display_id, kind));
        if !activity.used.iter().any(|u| u == used) {
            activity.used.push(used.to_string());
        }
        activity.identity.clone()
    }

    fn finish(mut self) -> Result<Document> {
        for (_, mut activity) in std::mem::take(&mut self.activities) {
            activity.used.sort();
            self.doc.add_or_fold(activity)?;
        }
        Ok(self.doc)
    }
}

fn resolved_component(placeholder: &Component, record: &SequenceRecord, activity: Identity) -> (Component, Sequence) {
    let mut component = placeholder.clone();
    if component.description.is_none() {
        component.description = record.description.clone();
    }
    component.topology = record.topology;
    if !component.generated_by.contains(&activity) {
        component.generated_by.push(activity);
    }
    let sequence = Sequence::new(
        format!("{}_sequence", component.identity),
        &format!("{}_sequence", component.display_id),
        record.encoding,
        &record.elements,
    );
    (component, sequence)
}

fn relative_name(package: &Path, path: &Path) -> String {
    path.strip_prefix(package)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

/// Where the placeholders of one package can be resolved from.
struct Sources<'a> {
    name: &'a str,
    package: &'a Path,
    config: &'a PipelineConfig,
    local: &'a LocalSources,
    resolver: &'a dyn RemoteResolver,
}

/// Resolves one placeholder into `out`. Returns `false` when it had to stay a
/// placeholder.
fn resolve_placeholder(
    src: &Sources<'_>,
    caches: &mut ReferenceCaches,
    out: &mut Collation,
    placeholder: &Component,
) -> Result<bool> {
    let name = src.name;
    if out
        .doc
        .component(&placeholder.identity)
        .is_some_and(|c| !c.is_placeholder())
    {
        debug!("Package '{name}': '{}' already supplied by a local document", placeholder.identity);
        return Ok(true);
    }
    match classify(src.config, src.local, placeholder) {
        Reference::Cached { source, key } => {
            let record = match caches.lookup(source, &key) {
                Some(record) => {
                    debug!("{} cache hit for '{key}'", source.label());
                    record.clone()
                }
                None => match src.resolver.resolve(source, &key) {
                    Ok(record) => {
                        if caches.store(source, &key, record.clone())? == CacheStore::Inserted {
                            debug!("Cached {} record '{key}'", source.label());
                        }
                        record
                    }
                    Err(e) => {
                        warn!("Package '{name}': skipping '{}': {e}", placeholder.identity);
                        out.adopt_placeholder(placeholder.clone())?;
                        return Ok(false);
                    }
                },
            };
            let activity = out.note_activity(
                &format!("{}_import", source.label()),
                ActivityKind::CacheResolution,
                &key,
            );
            let (component, sequence) = resolved_component(placeholder, &record, activity);
            out.adopt_component(component, vec![sequence])?;
        }
        Reference::LocalDocument(idx) => {
            let (path, source_doc) = &src.local.documents[idx];
            let activity = out.note_activity(
                LOCAL_IMPORT,
                ActivityKind::LocalImport,
                &relative_name(src.package, path),
            );
            for identity in source_doc.part_closure(&placeholder.identity) {
                let Some(part) = source_doc.component(&identity) else {
                    continue;
                };
                let mut part = part.clone();
                if !part.is_placeholder() && !part.generated_by.contains(&activity) {
                    part.generated_by.push(activity.clone());
                }
                let sequences = part
                    .sequences
                    .iter()
                    .filter_map(|id| source_doc.sequence(id).cloned())
                    .collect();
                out.adopt_component(part, sequences)?;
            }
        }
        Reference::LocalRecord(display_id) => {
            let Some((path, record)) = src.local.records.get(&display_id) else {
                return Ok(false);
            };
            let activity = out.note_activity(
                LOCAL_IMPORT,
                ActivityKind::LocalImport,
                &relative_name(src.package, path),
            );
            let (component, sequence) = resolved_component(placeholder, record, activity);
            out.adopt_component(component, vec![sequence])?;
        }
        Reference::Unknown => {
            warn!(
                "Package '{name}': no source for placeholder '{}', leaving it unresolved",
                placeholder.identity
            );
            out.adopt_placeholder(placeholder.clone())?;
            return Ok(false);
        }
    }
    Ok(true)
}

/// Resolves every placeholder of the package specification and writes the
/// merged document into the package's export directory.
pub fn collate_package(
    package: &Path,
    config: &PipelineConfig,
    resolver: &dyn RemoteResolver,
) -> Result<Document> {
    let name = packages::package_name(package);
    let spec_path = packages::specification_path(config, package);
    info!("Collating package '{name}'");
    let spec = Document::load_from_path(&spec_path)?;
    let local = LocalSources::scan(package, config)?;
    let mut caches = ReferenceCaches::open_for_package(config, package)?;
    let mut out = Collation::new(&package_namespace(config, package));

    // Concrete content goes in first so its sequences own their content keys.
    for sequence in spec.sequences() {
        out.adopt_sequence(sequence.clone())?;
    }
    let mut placeholders = vec![];
    for object in spec.objects() {
        match object {
            TopLevel::Sequence(_) => {}
            TopLevel::Component(c) if c.is_placeholder() => placeholders.push(c),
            TopLevel::Component(c) => {
                let sequences = c
                    .sequences
                    .iter()
                    .filter_map(|id| spec.sequence(id).cloned())
                    .collect();
                out.adopt_component(c.clone(), sequences)?;
            }
            other => {
                out.doc.add_or_fold(other.clone())?;
            }
        }
    }

    let sources = Sources {
        name: &name,
        package,
        config,
        local: &local,
        resolver,
    };
    let mut unresolved = 0usize;
    let outcome = placeholders.into_iter().try_for_each(|placeholder| -> Result<()> {
        if !resolve_placeholder(&sources, &mut caches, &mut out, placeholder)? {
            unresolved += 1;
        }
        Ok(())
    });
    // records fetched before a failure stay cached
    caches.save_all()?;
    outcome?;

    let doc = out.finish()?;
    let issues = doc.validate();
    if !issues.is_empty() {
        return Err(PipelineError::InvalidDocument {
            path: spec_path,
            issues,
        });
    }

    let export = packages::export_dir(config, package);
    fs::create_dir_all(&export).map_err(|e| PipelineError::io(&export, e))?;
    doc.save_to_path(&packages::package_document_path(config, package))?;
    info!(
        "Package '{name}': {} objects collated, {unresolved} references unresolved",
        doc.len()
    );
    Ok(doc)
}
