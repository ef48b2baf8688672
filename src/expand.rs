//! Combinatorial build-plan expansion.
//!
//! Template collections come in pairs sharing a base name, one insert side and
//! one vector side. Every insert × vector combination becomes a composite
//! product named `<base>_<insert>_<vector>` after the display ids of its two
//! members. When that name is claimed by more than one combination (members
//! sharing a display id, or underscores shifting between base and member
//! names) or by another object, each of those combinations gets an extra
//! `_<hash>` suffix computed from the base and both member identities.
//! Products of one pair are listed in `<base>_build_products`; the
//! package-wide `BuildProducts` collection lists all of them, pair by pair in
//! base-name order.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::packages;
use itertools::iproduct;
use log::{debug, info, warn};
use parts_protocol::{
    Activity, ActivityKind, Collection, Component, Document, FeatureRole, Identity, ProtocolError,
    Sequence, TemplateSide, TopLevel, build_product_display_id, build_products_identity,
    join_identity,
};
use sha1::{Digest, Sha1};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

const PRODUCT_SUFFIX_LEN: usize = 8;

pub const ENGINEERED_PLASMID_ROLE: &str = "engineered_plasmid";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpansionSummary {
    pub template_pairs: usize,
    pub products: usize,
    pub calculated_sequences: usize,
}

#[derive(Default)]
struct TemplatePair<'a> {
    inserts: Option<&'a Collection>,
    vectors: Option<&'a Collection>,
}

fn template_pairs(doc: &Document) -> BTreeMap<String, TemplatePair<'_>> {
    let mut pairs: BTreeMap<String, TemplatePair<'_>> = BTreeMap::new();
    for collection in doc.collections() {
        let Some(slot) = &collection.template else {
            continue;
        };
        let pair = pairs.entry(slot.base.clone()).or_default();
        let side = match slot.side {
            TemplateSide::Insert => &mut pair.inserts,
            TemplateSide::Vector => &mut pair.vectors,
        };
        if let Some(first) = side.as_ref() {
            warn!(
                "Template '{}' already uses '{}', ignoring '{}'",
                slot.base, first.identity, collection.identity
            );
            continue;
        }
        *side = Some(collection);
    }
    pairs
}

fn template_members<'a>(doc: &'a Document, collection: &Collection) -> Result<Vec<&'a Component>> {
    collection
        .members
        .iter()
        .map(|member| {
            doc.component(member)
                .ok_or_else(|| PipelineError::MissingTemplateMember {
                    collection: collection.identity.clone(),
                    member: member.clone(),
                })
        })
        .collect()
}

/// One insert × vector combination of a template pair.
struct Combination<'a> {
    base: &'a str,
    insert: &'a Component,
    vector: &'a Component,
}

impl Combination<'_> {
    fn readable_name(&self) -> String {
        build_product_display_id(self.base, &self.insert.display_id, &self.vector.display_id)
    }

    fn suffixed_name(&self) -> String {
        let mut hasher = Sha1::new();
        for part in [self.base, self.insert.identity.as_str(), self.vector.identity.as_str()] {
            hasher.update(part.as_bytes());
            hasher.update(b"\n");
        }
        let digest = format!("{:x}", hasher.finalize());
        format!("{}_{}", self.readable_name(), &digest[..PRODUCT_SUFFIX_LEN])
    }

    /// Whether `existing` is this combination's product from an earlier run.
    fn built(&self, existing: &TopLevel) -> bool {
        matches!(existing, TopLevel::Component(c)
            if c.derived_from == [self.insert.identity.as_str(), self.vector.identity.as_str()])
    }
}

/// Product display ids for `combinations`, in the same order. A readable name
/// is kept only when exactly one combination claims it and the document holds
/// nothing else under the product or its assembly activity.
fn product_names(doc: &Document, combinations: &[Combination<'_>]) -> Vec<String> {
    let namespace = &doc.namespace;
    let mut claims: BTreeMap<String, BTreeSet<(&str, &str, &str)>> = BTreeMap::new();
    for c in combinations {
        claims
            .entry(c.readable_name())
            .or_default()
            .insert((c.base, c.insert.identity.as_str(), c.vector.identity.as_str()));
    }
    combinations
        .iter()
        .map(|c| {
            let readable = c.readable_name();
            let shared = claims.get(&readable).is_some_and(|owners| owners.len() > 1);
            let product_taken = doc
                .get(&join_identity(namespace, &readable))
                .is_some_and(|existing| !c.built(existing));
            let activity_taken = doc
                .get(&join_identity(namespace, &format!("{readable}_assembly")))
                .is_some_and(|existing| !matches!(existing, TopLevel::Activity(_)));
            if shared || product_taken || activity_taken {
                let suffixed = c.suffixed_name();
                debug!("Product name '{readable}' is ambiguous, using '{suffixed}'");
                suffixed
            } else {
                readable
            }
        })
        .collect()
}

fn product_for(namespace: &str, display_id: &str, insert: &Component, vector: &Component) -> (Component, Activity) {
    let mut activity = Activity::new(
        namespace,
        &format!("{display_id}_assembly"),
        ActivityKind::BuildPlanExpansion,
    );
    activity.used = vec![insert.identity.clone(), vector.identity.clone()];

    let mut product = Component::new(namespace, display_id);
    product.roles.push(ENGINEERED_PLASMID_ROLE.to_string());
    product.topology = vector.topology;
    product.add_feature(FeatureRole::Insert, &insert.identity);
    product.add_feature(FeatureRole::Vector, &vector.identity);
    product.derived_from = vec![insert.identity.clone(), vector.identity.clone()];
    product.generated_by.push(activity.identity.clone());
    (product, activity)
}

type PlannedPair = (String, Vec<(Component, Activity)>);

/// Products of every complete template pair, grouped by base name.
fn plan_products(doc: &Document) -> Result<Vec<PlannedPair>> {
    let mut members = vec![];
    for (base, pair) in template_pairs(doc) {
        let (Some(inserts), Some(vectors)) = (pair.inserts, pair.vectors) else {
            warn!("Template '{base}' lacks an insert or vector side, skipping");
            continue;
        };
        members.push((base, template_members(doc, inserts)?, template_members(doc, vectors)?));
    }
    let combinations: Vec<Combination<'_>> = members
        .iter()
        .flat_map(|(base, inserts, vectors)| {
            iproduct!(inserts.iter(), vectors.iter()).map(move |(insert, vector)| Combination {
                base: base.as_str(),
                insert,
                vector,
            })
        })
        .collect();
    let mut names = product_names(doc, &combinations).into_iter();
    let mut combinations = combinations.iter();

    let mut planned = vec![];
    for (base, inserts, vectors) in &members {
        let products: Vec<_> = combinations
            .by_ref()
            .take(inserts.len() * vectors.len())
            .zip(names.by_ref())
            .map(|(c, name)| product_for(&doc.namespace, &name, c.insert, c.vector))
            .collect();
        debug!(
            "Template '{base}': {} inserts x {} vectors = {} products",
            inserts.len(),
            vectors.len(),
            products.len()
        );
        planned.push((base.clone(), products));
    }
    Ok(planned)
}

/// Adds a product unless the same composite is already present. A product
/// found from an earlier run may carry a calculated sequence, so only its
/// composition is compared.
fn add_product(doc: &mut Document, product: Component) -> Result<bool> {
    match doc.get(&product.identity) {
        Some(TopLevel::Component(existing))
            if existing.features == product.features && existing.derived_from == product.derived_from =>
        {
            Ok(false)
        }
        Some(_) => Err(ProtocolError::ConflictingIdentity(product.identity).into()),
        None => {
            doc.add(product)?;
            Ok(true)
        }
    }
}

/// Expands every template pair of `doc` in place and fills in composite
/// sequences that can be derived from their parts.
pub fn expand_document(doc: &mut Document) -> Result<ExpansionSummary> {
    let namespace = doc.namespace.clone();
    let mut summary = ExpansionSummary::default();
    let planned = plan_products(doc)?;

    let build_products_id = build_products_identity(&namespace);
    let mut build_products = match doc.collection(&build_products_id) {
        Some(existing) => existing.clone(),
        None => Collection::new(&namespace, parts_protocol::BUILD_PRODUCTS_COLLECTION),
    };

    for (base, products) in planned {
        let mut pair_collection = Collection::new(&namespace, &format!("{base}_build_products"));
        for (product, activity) in products {
            let identity: Identity = product.identity.clone();
            doc.add_or_fold(activity)?;
            add_product(doc, product)?;
            pair_collection.push_member(&identity);
            summary.products += 1;
        }
        build_products.extend_members(&pair_collection.members);
        doc.add_or_fold(pair_collection)?;
        summary.template_pairs += 1;
    }
    doc.replace(build_products);

    summary.calculated_sequences = calculate_sequences(doc)?;
    Ok(summary)
}

/// Gives every composite without a sequence the concatenation of its parts'
/// sequences, in feature order, when each part has exactly one sequence and
/// all share an encoding. Repeats until nothing changes so nested composites
/// are filled bottom-up. Returns the number of sequences added.
pub fn calculate_sequences(doc: &mut Document) -> Result<usize> {
    let mut total = 0;
    loop {
        let mut computed: Vec<(Identity, Sequence)> = vec![];
        for component in doc.components() {
            if !component.sequences.is_empty() || component.features.is_empty() {
                continue;
            }
            let parts: Option<Vec<&Sequence>> = component
                .features
                .iter()
                .map(|f| match doc.component(&f.instance_of)?.sequences.as_slice() {
                    [only] => doc.sequence(only),
                    _ => None,
                })
                .collect();
            let Some(parts) = parts else {
                continue;
            };
            let encoding = parts[0].encoding;
            if parts.iter().any(|s| s.encoding != encoding || s.is_empty()) {
                continue;
            }
            let elements: String = parts.iter().map(|s| s.elements.as_str()).collect();
            computed.push((
                component.identity.clone(),
                Sequence::new(
                    format!("{}_sequence", component.identity),
                    &format!("{}_sequence", component.display_id),
                    encoding,
                    &elements,
                ),
            ));
        }
        if computed.is_empty() {
            return Ok(total);
        }
        for (identity, sequence) in computed {
            let sequence_id = sequence.identity.clone();
            doc.add_or_fold(sequence)?;
            if let Some(component) = doc.component_mut(&identity) {
                component.sequences.push(sequence_id);
                total += 1;
            }
        }
    }
}

/// Expands the package's collated document and writes it back in place.
pub fn expand_build_plan(package: &Path, config: &PipelineConfig) -> Result<Document> {
    let name = packages::package_name(package);
    let path = packages::package_document_path(config, package);
    info!("Expanding build plan of package '{name}'");
    let mut doc = Document::load_from_path(&path)?;
    let summary = expand_document(&mut doc)?;
    let issues = doc.validate();
    if !issues.is_empty() {
        return Err(PipelineError::InvalidDocument { path, issues });
    }
    doc.save_to_path(&path)?;
    info!(
        "Package '{name}': {} template pairs, {} build products, {} sequences calculated",
        summary.template_pairs, summary.products, summary.calculated_sequences
    );
    Ok(doc)
}
