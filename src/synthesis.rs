//! Synthesis extraction: the synthesis-ready part of a distribution, as an
//! object-graph document and as flat GenBank and FASTA files.

use crate::config::PipelineConfig;
use crate::convert;
use crate::error::{PipelineError, Result};
use itertools::Itertools;
use log::{info, warn};
use parts_protocol::{
    Component, Document, Encoding, FeatureRole, Identity, build_products_identity,
};
use std::{collections::HashSet, path::Path};

/// Components listed by the build-products collection of `doc`, sorted, after
/// checking that every member is a component.
fn build_product_members(doc: &Document) -> Result<Vec<Identity>> {
    let identity = build_products_identity(&doc.namespace);
    let collection = doc
        .collection(&identity)
        .ok_or(PipelineError::MissingBuildPlan(identity))?;
    let non_components: Vec<Identity> = collection
        .members
        .iter()
        .filter(|m| doc.component(m).is_none())
        .cloned()
        .collect();
    if !non_components.is_empty() {
        return Err(PipelineError::InvalidBuildPlan(non_components));
    }
    Ok(collection.members.iter().cloned().sorted().collect())
}

/// Copies a complete product, the parts it is built from and their sequences.
fn copy_closure(source: &Document, target: &mut Document, product: &str) -> Result<()> {
    for identity in source.part_closure(product) {
        let Some(component) = source.component(&identity) else {
            continue;
        };
        for sequence in component.sequences.iter().filter_map(|id| source.sequence(id)) {
            target.add_or_fold(sequence.clone())?;
        }
        target.add_or_fold(component.clone())?;
    }
    Ok(())
}

/// The part a vendor synthesizes for a product: its insert, or the product
/// itself when it was not built into a vector.
fn synthesis_target<'a>(doc: &'a Document, product: &'a Component) -> &'a Component {
    product
        .feature(FeatureRole::Insert)
        .and_then(|f| doc.component(&f.instance_of))
        .unwrap_or(product)
}

/// Extracts every build product of `doc` whose whole composite carries
/// sequences, writes the synthesis document and flat files under `root`, and
/// returns the synthesis document. Incomplete products are left out.
pub fn extract_synthesis_files(root: &Path, doc: &Document, config: &PipelineConfig) -> Result<Document> {
    info!("Exporting files for synthesis");
    let members = build_product_members(doc)?;
    let mut out = Document::new(&doc.namespace);
    let mut selected: Vec<Identity> = vec![];
    for member in &members {
        if !doc.is_complete(member) {
            info!("Omitting '{member}': its sequence is not fully known");
            continue;
        }
        copy_closure(doc, &mut out, member)?;
        selected.push(member.clone());
    }

    let identity = build_products_identity(&doc.namespace);
    let mut build_products = doc
        .collection(&identity)
        .cloned()
        .ok_or(PipelineError::MissingBuildPlan(identity))?;
    build_products.members = selected.clone();
    out.add(build_products)?;

    let document_path = root.join(&config.synthesis_name);
    let issues = out.validate();
    if !issues.is_empty() {
        return Err(PipelineError::InvalidDocument {
            path: document_path,
            issues,
        });
    }
    out.save_to_path(&document_path)?;

    let components: Vec<&Component> = out.components().collect();
    let genbank_records = convert::write_genbank(&root.join(&config.synthesis_genbank_name), &out, &components)?;

    // one entry per sequence, named after the first component that carries it
    let mut written: HashSet<&str> = HashSet::new();
    let fasta_entries: Vec<(&str, &str)> = components
        .iter()
        .filter_map(|c| out.concrete_sequence(c).map(|s| (c, s)))
        .filter(|(_, s)| written.insert(s.identity.as_str()))
        .map(|(c, s)| (c.display_id.as_str(), s.elements.as_str()))
        .collect();
    let fasta_records = convert::write_fasta(&root.join(&config.synthesis_fasta_name), fasta_entries)?;

    let mut insert_entries: Vec<(&str, &str)> = vec![];
    for product in selected.iter().filter_map(|id| out.component(id)) {
        let target = synthesis_target(&out, product);
        match out.concrete_sequence(target) {
            Some(sequence) if sequence.encoding == Encoding::IupacDna => {
                insert_entries.push((product.display_id.as_str(), sequence.elements.as_str()));
            }
            _ => warn!(
                "'{}' cannot be synthesized: '{}' has no DNA sequence",
                product.identity, target.identity
            ),
        }
    }
    let insert_records =
        convert::write_fasta(&root.join(&config.synthesis_insert_fasta_name), insert_entries)?;

    info!(
        "Synthesis export: {} of {} build products, {genbank_records} GenBank records, {fasta_records} FASTA sequences, {insert_records} inserts",
        selected.len(),
        members.len()
    );
    Ok(out)
}
