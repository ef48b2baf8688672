use crate::error::ProtocolError;
use crate::objects::{Activity, Collection, Component, Identity, Sequence, TopLevel};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    fmt, fs,
    path::Path,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Component,
    Sequence,
    Collection,
    Activity,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub identity: Identity,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.identity, self.message)
    }
}

/// Identity-keyed object graph. Objects are kept in identity order, which is
/// also the serialization order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub namespace: String,
    #[serde(default)]
    objects: BTreeMap<Identity, TopLevel>,
}

impl Document {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.trim_end_matches('/').to_string(),
            objects: BTreeMap::new(),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ProtocolError> {
        let text = fs::read_to_string(path).map_err(|source| ProtocolError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ProtocolError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), ProtocolError> {
        let text = self.to_json_string()?;
        fs::write(path, text).map_err(|source| ProtocolError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_json_string(&self) -> Result<String, ProtocolError> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.objects.contains_key(identity)
    }

    pub fn get(&self, identity: &str) -> Option<&TopLevel> {
        self.objects.get(identity)
    }

    pub fn objects(&self) -> impl Iterator<Item = &TopLevel> {
        self.objects.values()
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.objects.keys()
    }

    pub fn component(&self, identity: &str) -> Option<&Component> {
        match self.objects.get(identity) {
            Some(TopLevel::Component(c)) => Some(c),
            _ => None,
        }
    }

    pub fn component_mut(&mut self, identity: &str) -> Option<&mut Component> {
        match self.objects.get_mut(identity) {
            Some(TopLevel::Component(c)) => Some(c),
            _ => None,
        }
    }

    pub fn sequence(&self, identity: &str) -> Option<&Sequence> {
        match self.objects.get(identity) {
            Some(TopLevel::Sequence(s)) => Some(s),
            _ => None,
        }
    }

    pub fn collection(&self, identity: &str) -> Option<&Collection> {
        match self.objects.get(identity) {
            Some(TopLevel::Collection(c)) => Some(c),
            _ => None,
        }
    }

    pub fn collection_mut(&mut self, identity: &str) -> Option<&mut Collection> {
        match self.objects.get_mut(identity) {
            Some(TopLevel::Collection(c)) => Some(c),
            _ => None,
        }
    }

    pub fn activity(&self, identity: &str) -> Option<&Activity> {
        match self.objects.get(identity) {
            Some(TopLevel::Activity(a)) => Some(a),
            _ => None,
        }
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.objects.values().filter_map(|o| match o {
            TopLevel::Component(c) => Some(c),
            _ => None,
        })
    }

    pub fn sequences(&self) -> impl Iterator<Item = &Sequence> {
        self.objects.values().filter_map(|o| match o {
            TopLevel::Sequence(s) => Some(s),
            _ => None,
        })
    }

    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.objects.values().filter_map(|o| match o {
            TopLevel::Collection(c) => Some(c),
            _ => None,
        })
    }

    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.objects.values().filter_map(|o| match o {
            TopLevel::Activity(a) => Some(a),
            _ => None,
        })
    }

    /// Adds a new object; an identity that is already present is an error.
    pub fn add(&mut self, object: impl Into<TopLevel>) -> Result<(), ProtocolError> {
        let object = object.into();
        let identity = object.identity().to_string();
        if self.objects.contains_key(&identity) {
            return Err(ProtocolError::DuplicateIdentity(identity));
        }
        self.objects.insert(identity, object);
        Ok(())
    }

    /// Adds an object, folding it into an identical one already present.
    /// Returns `true` when the object was new.
    pub fn add_or_fold(&mut self, object: impl Into<TopLevel>) -> Result<bool, ProtocolError> {
        let object = object.into();
        match self.objects.get(object.identity()) {
            Some(existing) if *existing == object => Ok(false),
            Some(_) => Err(ProtocolError::ConflictingIdentity(
                object.identity().to_string(),
            )),
            None => {
                self.objects.insert(object.identity().to_string(), object);
                Ok(true)
            }
        }
    }

    /// Inserts or overwrites an object, returning the previous one.
    pub fn replace(&mut self, object: impl Into<TopLevel>) -> Option<TopLevel> {
        let object = object.into();
        self.objects.insert(object.identity().to_string(), object)
    }

    pub fn remove(&mut self, identity: &str) -> Option<TopLevel> {
        self.objects.remove(identity)
    }

    pub fn count_by_kind(&self) -> BTreeMap<ObjectKind, usize> {
        let mut counts = BTreeMap::new();
        for object in self.objects.values() {
            let kind = match object {
                TopLevel::Component(_) => ObjectKind::Component,
                TopLevel::Sequence(_) => ObjectKind::Sequence,
                TopLevel::Collection(_) => ObjectKind::Collection,
                TopLevel::Activity(_) => ObjectKind::Activity,
            };
            *counts.entry(kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn count_of(&self, kind: ObjectKind) -> usize {
        self.count_by_kind().get(&kind).copied().unwrap_or(0)
    }

    /// First non-empty sequence attached to a component.
    pub fn concrete_sequence(&self, component: &Component) -> Option<&Sequence> {
        component
            .sequences
            .iter()
            .filter_map(|id| self.sequence(id))
            .find(|s| !s.is_empty())
    }

    /// A component is complete when it and every component it transitively
    /// references through its features carry a concrete sequence. Evaluated on
    /// demand; nothing stores this flag.
    pub fn is_complete(&self, identity: &str) -> bool {
        let mut path = HashSet::new();
        self.is_complete_on_path(identity, &mut path)
    }

    fn is_complete_on_path(&self, identity: &str, path: &mut HashSet<String>) -> bool {
        let Some(component) = self.component(identity) else {
            return false;
        };
        // a cyclic composite can never be materialized
        if !path.insert(identity.to_string()) {
            return false;
        }
        let complete = self.concrete_sequence(component).is_some()
            && component
                .features
                .iter()
                .all(|f| self.is_complete_on_path(&f.instance_of, path));
        path.remove(identity);
        complete
    }

    /// The component followed by every component it transitively references,
    /// breadth-first in feature order, without repeats. Identities missing from
    /// the document are skipped.
    pub fn part_closure(&self, identity: &str) -> Vec<Identity> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([identity]);
        let mut out = vec![];
        while let Some(current) = queue.pop_front() {
            let Some(component) = self.component(current) else {
                continue;
            };
            if !seen.insert(component.identity.as_str()) {
                continue;
            }
            out.push(component.identity.clone());
            queue.extend(component.features.iter().map(|f| f.instance_of.as_str()));
        }
        out
    }

    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = vec![];
        let mut issue = |identity: &str, message: String| {
            issues.push(ValidationIssue {
                identity: identity.to_string(),
                message,
            })
        };

        for (key, object) in &self.objects {
            if key != object.identity() {
                issue(key, format!("stored under mismatching identity '{}'", object.identity()));
            }
            if object.display_id().is_empty() {
                issue(key, "display id is empty".to_string());
            }
            match object {
                TopLevel::Component(c) => {
                    for seq_id in &c.sequences {
                        if self.sequence(seq_id).is_none() {
                            issue(key, format!("references missing sequence '{seq_id}'"));
                        }
                    }
                    for feature in &c.features {
                        if self.component(&feature.instance_of).is_none() {
                            issue(
                                key,
                                format!("feature references missing component '{}'", feature.instance_of),
                            );
                        }
                    }
                }
                TopLevel::Collection(c) => {
                    let mut members = HashSet::new();
                    for member in &c.members {
                        if !members.insert(member) {
                            issue(key, format!("lists member '{member}' more than once"));
                        }
                        if !self.objects.contains_key(member) {
                            issue(key, format!("lists missing member '{member}'"));
                        }
                    }
                }
                TopLevel::Sequence(_) | TopLevel::Activity(_) => {}
            }
        }
        issues
    }
}
