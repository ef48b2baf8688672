use crate::identity::join_identity;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

pub type Identity = String;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    #[default]
    Linear,
    Circular,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    IupacDna,
    IupacRna,
    IupacProtein,
}

impl Encoding {
    pub fn label(self) -> &'static str {
        match self {
            Self::IupacDna => "iupac_dna",
            Self::IupacRna => "iupac_rna",
            Self::IupacProtein => "iupac_protein",
        }
    }

    pub fn is_nucleic_acid(self) -> bool {
        matches!(self, Self::IupacDna | Self::IupacRna)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureRole {
    Insert,
    Vector,
    Part,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubComponent {
    pub role: FeatureRole,
    pub instance_of: Identity,
}

/// A genetic part. A component without sequences or features is a
/// placeholder waiting to be resolved during collation.
#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub identity: Identity,
    pub display_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default)]
    pub topology: Topology,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sequences: Vec<Identity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<SubComponent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_from: Vec<Identity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generated_by: Vec<Identity>,
}

impl Component {
    pub fn new(namespace: &str, display_id: &str) -> Self {
        Self::with_identity(join_identity(namespace, display_id), display_id)
    }

    pub fn with_identity(identity: impl Into<Identity>, display_id: &str) -> Self {
        Self {
            identity: identity.into(),
            display_id: display_id.to_string(),
            name: None,
            description: None,
            roles: vec![],
            topology: Topology::default(),
            sequences: vec![],
            features: vec![],
            derived_from: vec![],
            generated_by: vec![],
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.sequences.is_empty() && self.features.is_empty()
    }

    pub fn is_composite(&self) -> bool {
        !self.features.is_empty()
    }

    pub fn feature(&self, role: FeatureRole) -> Option<&SubComponent> {
        self.features.iter().find(|f| f.role == role)
    }

    pub fn add_feature(&mut self, role: FeatureRole, instance_of: &str) {
        self.features.push(SubComponent {
            role,
            instance_of: instance_of.to_string(),
        });
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub identity: Identity,
    pub display_id: String,
    #[serde(default)]
    pub encoding: Encoding,
    pub elements: String,
}

impl Sequence {
    pub fn new(identity: impl Into<Identity>, display_id: &str, encoding: Encoding, elements: &str) -> Self {
        Self {
            identity: identity.into(),
            display_id: display_id.to_string(),
            encoding,
            elements: Self::normalize_elements(elements),
        }
    }

    /// Strips whitespace and upper-cases residue letters.
    pub fn normalize_elements(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSide {
    Insert,
    Vector,
}

/// Marks a collection as one side of a combinatorial template pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSlot {
    pub base: String,
    pub side: TemplateSide,
}

#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub identity: Identity,
    pub display_id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub members: Vec<Identity>,
    pub template: Option<TemplateSlot>,
}

impl Collection {
    pub fn new(namespace: &str, display_id: &str) -> Self {
        Self {
            identity: join_identity(namespace, display_id),
            display_id: display_id.to_string(),
            name: None,
            members: vec![],
            template: None,
        }
    }

    pub fn template(namespace: &str, display_id: &str, base: &str, side: TemplateSide) -> Self {
        let mut ret = Self::new(namespace, display_id);
        ret.template = Some(TemplateSlot {
            base: base.to_string(),
            side,
        });
        ret
    }

    /// Appends a member unless it is already listed. Returns whether it was added.
    pub fn push_member(&mut self, identity: &str) -> bool {
        if self.members.iter().any(|m| m == identity) {
            return false;
        }
        self.members.push(identity.to_string());
        true
    }

    pub fn extend_members<I, S>(&mut self, identities: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for identity in identities {
            self.push_member(identity.as_ref());
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    LocalImport,
    CacheResolution,
    BuildPlanExpansion,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub identity: Identity,
    pub display_id: String,
    pub kind: ActivityKind,
    #[serde(default)]
    pub used: Vec<String>,
}

impl Activity {
    pub fn new(namespace: &str, display_id: &str, kind: ActivityKind) -> Self {
        Self {
            identity: join_identity(namespace, display_id),
            display_id: display_id.to_string(),
            kind,
            used: vec![],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TopLevel {
    Component(Component),
    Sequence(Sequence),
    Collection(Collection),
    Activity(Activity),
}

impl TopLevel {
    pub fn identity(&self) -> &str {
        match self {
            Self::Component(c) => &c.identity,
            Self::Sequence(s) => &s.identity,
            Self::Collection(c) => &c.identity,
            Self::Activity(a) => &a.identity,
        }
    }

    pub fn display_id(&self) -> &str {
        match self {
            Self::Component(c) => &c.display_id,
            Self::Sequence(s) => &s.display_id,
            Self::Collection(c) => &c.display_id,
            Self::Activity(a) => &a.display_id,
        }
    }
}

impl From<Component> for TopLevel {
    fn from(value: Component) -> Self {
        Self::Component(value)
    }
}

impl From<Sequence> for TopLevel {
    fn from(value: Sequence) -> Self {
        Self::Sequence(value)
    }
}

impl From<Collection> for TopLevel {
    fn from(value: Collection) -> Self {
        Self::Collection(value)
    }
}

impl From<Activity> for TopLevel {
    fn from(value: Activity) -> Self {
        Self::Activity(value)
    }
}
