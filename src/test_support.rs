//! Fixture builders shared by the stage tests.

use crate::config::PipelineConfig;
use crate::convert::{self, SequenceRecord};
use crate::packages;
use crate::reference_cache::CacheSource;
use crate::resolver::{RemoteResolver, ResolveError};
use gb_io::seq::{Seq, Topology};
use parts_protocol::{Collection, Component, Document, TemplateSide};
use std::{cell::Cell, collections::BTreeMap, fs, fs::File, path::Path};

/// In-memory resolver counting how often it is consulted.
#[derive(Default)]
pub struct MapResolver {
    records: BTreeMap<(CacheSource, String), SequenceRecord>,
    calls: Cell<usize>,
}

impl MapResolver {
    pub fn insert(&mut self, source: CacheSource, accession: &str, record: SequenceRecord) {
        self.records.insert((source, accession.to_string()), record);
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl RemoteResolver for MapResolver {
    fn resolve(&self, source: CacheSource, accession: &str) -> Result<SequenceRecord, ResolveError> {
        self.calls.set(self.calls.get() + 1);
        self.records
            .get(&(source, accession.to_string()))
            .cloned()
            .ok_or_else(|| ResolveError::NotFound {
                source_kind: source,
                accession: accession.to_string(),
            })
    }
}

pub fn write_specification(config: &PipelineConfig, package: &Path, spec: &Document) {
    fs::create_dir_all(packages::export_dir(config, package)).unwrap();
    spec.save_to_path(&packages::specification_path(config, package))
        .unwrap();
}

pub fn write_package_document(config: &PipelineConfig, package: &Path, doc: &Document) {
    fs::create_dir_all(packages::export_dir(config, package)).unwrap();
    doc.save_to_path(&packages::package_document_path(config, package))
        .unwrap();
}

/// Writes a multi-record GenBank file, one linear DNA record per `(name, elements)`.
pub fn write_genbank_fixture(path: &Path, records: &[(&str, &str)]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut file = File::create(path).unwrap();
    for (name, elements) in records {
        let mut seq = Seq::empty();
        seq.name = Some(name.to_string());
        seq.topology = Topology::Linear;
        seq.molecule_type = Some("DNA".to_string());
        seq.seq = elements.as_bytes().to_vec();
        seq.len = Some(seq.seq.len());
        gb_io::writer::write(&mut file, &seq).unwrap();
    }
}

fn add_part(doc: &mut Document, display_id: &str, elements: Option<&str>) -> String {
    let ns = doc.namespace.clone();
    match elements {
        Some(elements) => {
            let (component, sequence) =
                convert::record_to_objects(&ns, &SequenceRecord::new(display_id, elements));
            let identity = component.identity.clone();
            doc.add(sequence).unwrap();
            doc.add(component).unwrap();
            identity
        }
        None => {
            let component = Component::new(&ns, display_id);
            let identity = component.identity.clone();
            doc.add(component).unwrap();
            identity
        }
    }
}

fn add_template(doc: &mut Document, base: &str, side: TemplateSide, members: &[String]) {
    let ns = doc.namespace.clone();
    let suffix = match side {
        TemplateSide::Insert => "ins_template",
        TemplateSide::Vector => "vector_template",
    };
    let mut collection = Collection::template(&ns, &format!("{base}_{suffix}"), base, side);
    collection.extend_members(members);
    doc.add(collection).unwrap();
}

pub const PROMOTER_BASE: &str = "Anderson_Promoters_in_vector";
pub const TERMINATOR_BASE: &str = "Terminators_in_vector";
pub const KNOWN_VECTOR: &str = "pSB1C3";
pub const UNKNOWN_VECTOR: &str = "pSB1K3";

/// A collated package with two template pairs: four promoters into two
/// vectors and two terminators into one. Only `pSB1C3` has a sequence.
pub fn build_plan_document(namespace: &str) -> Document {
    let mut doc = Document::new(namespace);
    let promoters: Vec<String> = [
        ("BBa_J23100", "TTGACGGCTAGCTCAGTCCTAGGTACAGTGCTAGC"),
        ("BBa_J23101", "TTTACAGCTAGCTCAGTCCTAGGTATTATGCTAGC"),
        ("BBa_J23102", "TTGACAGCTAGCTCAGTCCTAGGTACTGTGCTAGC"),
        ("BBa_J23103", "CTGATAGCTAGCTCAGTCCTAGGGATTATGCTAGC"),
    ]
    .iter()
    .map(|(id, elements)| add_part(&mut doc, id, Some(elements)))
    .collect();
    let terminators: Vec<String> = [
        ("BBa_B0015", "CCAGGCATCAAATAAAACGAAAGGCTCAGTCGAAAGACTGGGCC"),
        ("BBa_B0010", "CCAGGCATCAAATAAAACGAAAGGCTCAGTCGAAAGACTGGGC"),
    ]
    .iter()
    .map(|(id, elements)| add_part(&mut doc, id, Some(elements)))
    .collect();
    let known = add_part(&mut doc, KNOWN_VECTOR, Some("TACTAGTAGCGGCCGCTGCAGTCCGGCAAAAAAGGGCAAGGTG"));
    let unknown = add_part(&mut doc, UNKNOWN_VECTOR, None);

    add_template(&mut doc, PROMOTER_BASE, TemplateSide::Insert, &promoters);
    add_template(&mut doc, PROMOTER_BASE, TemplateSide::Vector, &[known.clone(), unknown]);
    add_template(&mut doc, TERMINATOR_BASE, TemplateSide::Insert, &terminators);
    add_template(&mut doc, TERMINATOR_BASE, TemplateSide::Vector, &[known]);
    doc
}
