//! Conversion between flat sequence files and the object graph.
//! FASTA is read with `bio`, GenBank is read and written with `gb_io`.

use crate::error::{PipelineError, Result};
use bio::io::fasta;
use gb_io::seq::{Feature, Location, Seq};
use parts_protocol::{
    Component, Document, Encoding, Sequence, Topology, sanitize_display_id,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

pub const FASTA_EXTENSIONS: &[&str] = &[".fasta", ".fa", ".fna", ".ffn"];
pub const GENBANK_EXTENSIONS: &[&str] = &[".gb", ".gbk", ".genbank"];

const FASTA_LINE_WIDTH: usize = 80;

/// One sequence as read from, or cached for, an external source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub topology: Topology,
    #[serde(default)]
    pub encoding: Encoding,
    pub elements: String,
}

impl SequenceRecord {
    pub fn new(id: &str, elements: &str) -> Self {
        Self {
            id: id.to_string(),
            description: None,
            topology: Topology::Linear,
            encoding: Encoding::IupacDna,
            elements: Sequence::normalize_elements(elements),
        }
    }

    pub fn display_id(&self) -> String {
        sanitize_display_id(&self.id)
    }

    fn from_genbank_seq(seq: &Seq, record_idx: usize) -> Self {
        let id = seq
            .version
            .clone()
            .or_else(|| seq.accession.clone())
            .or_else(|| seq.name.clone())
            .unwrap_or_else(|| format!("record_{}", record_idx + 1));
        let encoding = match seq.molecule_type.as_deref().map(str::to_ascii_uppercase) {
            Some(m) if m.contains("RNA") => Encoding::IupacRna,
            Some(m) if m == "AA" || m.contains("PROTEIN") => Encoding::IupacProtein,
            _ => Encoding::IupacDna,
        };
        Self {
            id,
            description: seq.definition.clone().filter(|d| !d.trim().is_empty()),
            topology: match seq.topology {
                gb_io::seq::Topology::Circular => Topology::Circular,
                gb_io::seq::Topology::Linear => Topology::Linear,
            },
            encoding,
            elements: Sequence::normalize_elements(&String::from_utf8_lossy(&seq.seq)),
        }
    }
}

fn conversion_error(path: &Path, message: impl ToString) -> PipelineError {
    PipelineError::Conversion {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

pub fn read_fasta(path: &Path) -> Result<Vec<SequenceRecord>> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    fasta::Reader::new(file)
        .records()
        .map(|record| {
            let record = record.map_err(|e| conversion_error(path, e))?;
            let mut ret = SequenceRecord::new(record.id(), &String::from_utf8_lossy(record.seq()));
            ret.description = record.desc().map(str::to_string);
            Ok(ret)
        })
        .collect()
}

pub fn read_genbank(path: &Path) -> Result<Vec<SequenceRecord>> {
    let seqs = gb_io::reader::parse_file(path).map_err(|e| conversion_error(path, e))?;
    Ok(seqs
        .iter()
        .enumerate()
        .map(|(idx, seq)| SequenceRecord::from_genbank_seq(seq, idx))
        .collect())
}

/// Reads any supported flat sequence file; `None` for other file types.
pub fn read_sequence_file(path: &Path) -> Option<Result<Vec<SequenceRecord>>> {
    if crate::packages::has_extension(path, FASTA_EXTENSIONS) {
        Some(read_fasta(path))
    } else if crate::packages::has_extension(path, GENBANK_EXTENSIONS) {
        Some(read_genbank(path))
    } else {
        None
    }
}

/// Builds a component plus its sequence for a record under `namespace`.
pub fn record_to_objects(namespace: &str, record: &SequenceRecord) -> (Component, Sequence) {
    let display_id = record.display_id();
    let mut component = Component::new(namespace, &display_id);
    component.description = record.description.clone();
    component.topology = record.topology;
    let sequence = Sequence::new(
        format!("{}_sequence", component.identity),
        &format!("{display_id}_sequence"),
        record.encoding,
        &record.elements,
    );
    component.sequences.push(sequence.identity.clone());
    (component, sequence)
}

pub fn records_to_document(namespace: &str, records: &[SequenceRecord]) -> Result<Document> {
    let mut doc = Document::new(namespace);
    for record in records {
        let (component, sequence) = record_to_objects(namespace, record);
        doc.add(sequence)?;
        doc.add(component)?;
    }
    Ok(doc)
}

/// Writes `(header, elements)` pairs as FASTA with blank descriptions.
pub fn write_fasta<'a, I>(path: &Path, entries: I) -> Result<usize>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut out = BufWriter::new(file);
    let mut count = 0;
    for (header, elements) in entries {
        writeln!(out, ">{}", header.replace(' ', "_")).map_err(|e| PipelineError::io(path, e))?;
        for chunk in elements.as_bytes().chunks(FASTA_LINE_WIDTH) {
            out.write_all(chunk).map_err(|e| PipelineError::io(path, e))?;
            out.write_all(b"\n").map_err(|e| PipelineError::io(path, e))?;
        }
        count += 1;
    }
    out.flush().map_err(|e| PipelineError::io(path, e))?;
    Ok(count)
}

/// Writes one GenBank record per listed component that carries a sequence.
/// Returns the number of records written.
pub fn write_genbank(path: &Path, doc: &Document, components: &[&Component]) -> Result<usize> {
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut out = BufWriter::new(file);
    let mut count = 0;
    for component in components {
        let Some(sequence) = doc.concrete_sequence(component) else {
            continue;
        };
        let seq = component_to_genbank_seq(doc, component, sequence)?;
        gb_io::writer::write(&mut out, &seq).map_err(|e| PipelineError::io(path, e))?;
        count += 1;
    }
    out.flush().map_err(|e| PipelineError::io(path, e))?;
    Ok(count)
}

fn component_to_genbank_seq(doc: &Document, component: &Component, sequence: &Sequence) -> Result<Seq> {
    let mut seq = Seq::empty();
    seq.name = Some(component.display_id.clone());
    seq.topology = match component.topology {
        Topology::Circular => gb_io::seq::Topology::Circular,
        Topology::Linear => gb_io::seq::Topology::Linear,
    };
    seq.molecule_type = Some(
        match sequence.encoding {
            Encoding::IupacDna => "DNA",
            Encoding::IupacRna => "RNA",
            Encoding::IupacProtein => "AA",
        }
        .to_string(),
    );
    seq.definition = component
        .name
        .clone()
        .or_else(|| component.description.clone())
        .or_else(|| Some(component.display_id.clone()));
    seq.seq = sequence.elements.as_bytes().to_vec();
    seq.len = Some(seq.seq.len());
    seq.features = sub_part_features(doc, component, sequence.len())?;
    Ok(seq)
}

/// Annotates where each sub-part sits in a composite built by concatenation.
/// Composites whose length does not add up get no annotations.
fn sub_part_features(doc: &Document, component: &Component, total_len: usize) -> Result<Vec<Feature>> {
    let mut spans = vec![];
    let mut offset = 0usize;
    for feature in &component.features {
        let Some(part) = doc.component(&feature.instance_of) else {
            return Ok(vec![]);
        };
        let Some(part_seq) = doc.concrete_sequence(part) else {
            return Ok(vec![]);
        };
        spans.push((part.display_id.clone(), offset, offset + part_seq.len()));
        offset += part_seq.len();
    }
    if offset != total_len {
        return Ok(vec![]);
    }
    spans
        .into_iter()
        .map(|(label, start, end)| {
            let text = format!("{}..{}", start + 1, end);
            let location = Location::from_gb_format(&text).map_err(|e| PipelineError::Conversion {
                path: component.identity.clone().into(),
                message: format!("invalid feature location '{text}': {e}"),
            })?;
            Ok(Feature {
                kind: std::borrow::Cow::from("misc_feature"),
                location,
                qualifiers: vec![("label".into(), Some(label))],
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parts_protocol::FeatureRole;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_read_fasta_normalizes_and_keeps_description() {
        let td = tempdir().unwrap();
        let path = td.path().join("parts.fasta");
        fs::write(&path, ">J23102-modified promoter variant\nttgacagc\ntagctcag\n>LmrA\nATGA\n").unwrap();
        let records = read_fasta(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "J23102-modified");
        assert_eq!(records[0].display_id(), "J23102_modified");
        assert_eq!(records[0].elements, "TTGACAGCTAGCTCAG");
        assert_eq!(records[0].description.as_deref(), Some("promoter variant"));
        assert_eq!(records[1].description, None);
    }

    #[test]
    fn test_genbank_written_records_read_back() {
        let td = tempdir().unwrap();
        let path = td.path().join("out.gb");
        let ns = "https://example.org/pkg";
        let doc = records_to_document(
            ns,
            &[SequenceRecord::new("alpha", "ACGTACGT"), SequenceRecord::new("beta", "GGGCCC")],
        )
        .unwrap();
        let components: Vec<&Component> = doc.components().collect();
        assert_eq!(write_genbank(&path, &doc, &components).unwrap(), 2);

        let records = read_genbank(&path).unwrap();
        let elements: Vec<&str> = records.iter().map(|r| r.elements.as_str()).collect();
        assert_eq!(elements, vec!["ACGTACGT", "GGGCCC"]);
    }

    #[test]
    fn test_composite_gets_sub_part_annotations() {
        let ns = "https://example.org/pkg";
        let mut doc = records_to_document(
            ns,
            &[SequenceRecord::new("ins", "AAAA"), SequenceRecord::new("vec", "CCCCCC")],
        )
        .unwrap();
        let mut product = Component::new(ns, "product");
        product.add_feature(FeatureRole::Insert, &format!("{ns}/ins"));
        product.add_feature(FeatureRole::Vector, &format!("{ns}/vec"));
        let seq = Sequence::new(format!("{ns}/product_sequence"), "product_sequence", Encoding::IupacDna, "AAAACCCCCC");
        product.sequences.push(seq.identity.clone());
        doc.add(seq).unwrap();
        doc.add(product.clone()).unwrap();

        let features = sub_part_features(&doc, &product, 10).unwrap();
        assert_eq!(features.len(), 2);
        assert!(sub_part_features(&doc, &product, 11).unwrap().is_empty());
    }

    #[test]
    fn test_write_fasta_wraps_lines() {
        let td = tempdir().unwrap();
        let path = td.path().join("out.fasta");
        let long = "A".repeat(85);
        let n = write_fasta(&path, [("first part", long.as_str()), ("second", "CG")]).unwrap();
        assert_eq!(n, 2);
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, format!(">first_part\n{}\n{}\n>second\nCG\n", "A".repeat(80), "AAAAA"));
    }
}
