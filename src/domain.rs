use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::XrefError;

pub mod class {
    pub const DATABASE_OBJECT: &str = "DatabaseObject";
    pub const SPECIES: &str = "Species";
    pub const REFERENCE_DATABASE: &str = "ReferenceDatabase";
    pub const INSTANCE_EDIT: &str = "InstanceEdit";
    pub const PERSON: &str = "Person";
    pub const DATABASE_IDENTIFIER: &str = "DatabaseIdentifier";
    pub const REFERENCE_ENTITY: &str = "ReferenceEntity";
    pub const REFERENCE_SEQUENCE: &str = "ReferenceSequence";
    pub const REFERENCE_GENE_PRODUCT: &str = "ReferenceGeneProduct";
    pub const REFERENCE_DNA_SEQUENCE: &str = "ReferenceDNASequence";
    pub const REFERENCE_RNA_SEQUENCE: &str = "ReferenceRNASequence";
    pub const REFERENCE_MOLECULE: &str = "ReferenceMolecule";
}

pub mod attr {
    pub const DISPLAY_NAME: &str = "_displayName";
    pub const CREATED: &str = "created";
    pub const IDENTIFIER: &str = "identifier";
    pub const NAME: &str = "name";
    pub const SPECIES: &str = "species";
    pub const REFERENCE_DATABASE: &str = "referenceDatabase";
    pub const CROSS_REFERENCE: &str = "crossReference";
    pub const REFERENCE_GENE: &str = "referenceGene";
    pub const REFERENCE_TRANSCRIPT: &str = "referenceTranscript";
    pub const URL: &str = "url";
    pub const ACCESS_URL: &str = "accessUrl";
    pub const AUTHOR: &str = "author";
    pub const DATE_TIME: &str = "dateTime";
    pub const NOTE: &str = "note";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = XrefError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| XrefError::Configuration(format!("invalid entity id: {value}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Value {
    Text(String),
    Int(i64),
    Ref(EntityId),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<EntityId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<EntityId> for Value {
    fn from(value: EntityId) -> Self {
        Value::Ref(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub class: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<Value>>,
}

impl Entity {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            id: EntityId(0),
            class: class.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, attribute: &str, value: impl Into<Value>) -> Self {
        self.push(attribute, value.into());
        self
    }

    pub fn values(&self, attribute: &str) -> &[Value] {
        self.attributes
            .get(attribute)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn text(&self, attribute: &str) -> Option<&str> {
        self.values(attribute).first().and_then(Value::as_text)
    }

    pub fn texts(&self, attribute: &str) -> Vec<&str> {
        self.values(attribute)
            .iter()
            .filter_map(Value::as_text)
            .collect()
    }

    pub fn reference(&self, attribute: &str) -> Option<EntityId> {
        self.values(attribute).first().and_then(Value::as_ref_id)
    }

    pub fn references(&self, attribute: &str) -> Vec<EntityId> {
        self.values(attribute)
            .iter()
            .filter_map(Value::as_ref_id)
            .collect()
    }

    pub fn identifier(&self) -> Option<&str> {
        self.text(attr::IDENTIFIER)
    }

    pub fn species(&self) -> Option<EntityId> {
        self.reference(attr::SPECIES)
    }

    pub fn set(&mut self, attribute: &str, value: impl Into<Value>) {
        self.attributes
            .insert(attribute.to_string(), vec![value.into()]);
    }

    pub fn push(&mut self, attribute: &str, value: Value) {
        self.attributes
            .entry(attribute.to_string())
            .or_default()
            .push(value);
    }

    pub fn remove_reference(&mut self, target: EntityId) -> bool {
        let mut removed = false;
        for values in self.attributes.values_mut() {
            let before = values.len();
            values.retain(|value| value.as_ref_id() != Some(target));
            removed |= values.len() != before;
        }
        removed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XrefLayout {
    pub class: String,
    pub back_reference: String,
}

impl Default for XrefLayout {
    fn default() -> Self {
        Self {
            class: class::DATABASE_IDENTIFIER.to_string(),
            back_reference: attr::CROSS_REFERENCE.to_string(),
        }
    }
}
