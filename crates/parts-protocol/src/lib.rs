//! Shared machine-readable contracts for part packages.
//!
//! Every pipeline stage reads and writes the same [`Document`]: a flat,
//! identity-keyed set of typed top-level objects that serializes in
//! identity order, so equal documents are always byte-identical on disk.

mod document;
mod error;
mod identity;
mod objects;

pub use document::{Document, ObjectKind, ValidationIssue};
pub use error::ProtocolError;
pub use identity::{
    BUILD_PRODUCTS_COLLECTION, build_product_display_id, build_products_identity,
    join_identity, sanitize_display_id, short_name,
};
pub use objects::{
    Activity, ActivityKind, Collection, Component, Encoding, FeatureRole, Identity, Sequence,
    SubComponent, TemplateSide, TemplateSlot, TopLevel, Topology,
};
