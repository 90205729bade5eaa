use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{attr, class};
use crate::error::XrefError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    Text,
    Int,
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub kind: AttributeKind,
    #[serde(default)]
    pub multiple: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassDef {
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeDef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    classes: BTreeMap<String, ClassDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(mut self, name: &str, parent: Option<&str>) -> Self {
        self.classes.insert(
            name.to_string(),
            ClassDef {
                parent: parent.map(str::to_string),
                attributes: BTreeMap::new(),
            },
        );
        self
    }

    pub fn attribute(mut self, class: &str, name: &str, kind: AttributeKind, multiple: bool) -> Self {
        self.classes
            .entry(class.to_string())
            .or_default()
            .attributes
            .insert(name.to_string(), AttributeDef { kind, multiple });
        self
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn resolve_attribute(&self, class: &str, attribute: &str) -> Option<AttributeDef> {
        let mut current = Some(class);
        while let Some(name) = current {
            let def = self.classes.get(name)?;
            if let Some(found) = def.attributes.get(attribute) {
                return Some(*found);
            }
            current = def.parent.as_deref();
        }
        None
    }

    pub fn require_attribute(&self, class: &str, attribute: &str) -> Result<AttributeDef, XrefError> {
        if !self.has_class(class) {
            return Err(XrefError::Configuration(format!("unknown class {class}")));
        }
        self.resolve_attribute(class, attribute).ok_or_else(|| {
            XrefError::Configuration(format!("class {class} has no attribute {attribute}"))
        })
    }

    pub fn is_a(&self, class: &str, ancestor: &str) -> bool {
        let mut current = Some(class);
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self
                .classes
                .get(name)
                .and_then(|def| def.parent.as_deref());
        }
        false
    }

    pub fn subclasses(&self, ancestor: &str) -> Vec<&str> {
        self.classes
            .keys()
            .map(String::as_str)
            .filter(|name| self.is_a(name, ancestor))
            .collect()
    }

    pub fn reference_graph() -> Self {
        use AttributeKind::{Instance, Int, Text};

        Self::new()
            .class(class::DATABASE_OBJECT, None)
            .attribute(class::DATABASE_OBJECT, attr::DISPLAY_NAME, Text, false)
            .attribute(class::DATABASE_OBJECT, attr::CREATED, Instance, false)
            .class(class::PERSON, Some(class::DATABASE_OBJECT))
            .attribute(class::PERSON, attr::NAME, Text, true)
            .class(class::INSTANCE_EDIT, Some(class::DATABASE_OBJECT))
            .attribute(class::INSTANCE_EDIT, attr::AUTHOR, Instance, true)
            .attribute(class::INSTANCE_EDIT, attr::DATE_TIME, Text, false)
            .attribute(class::INSTANCE_EDIT, attr::NOTE, Text, false)
            .class(class::SPECIES, Some(class::DATABASE_OBJECT))
            .attribute(class::SPECIES, attr::NAME, Text, true)
            .class(class::REFERENCE_DATABASE, Some(class::DATABASE_OBJECT))
            .attribute(class::REFERENCE_DATABASE, attr::NAME, Text, true)
            .attribute(class::REFERENCE_DATABASE, attr::URL, Text, false)
            .attribute(class::REFERENCE_DATABASE, attr::ACCESS_URL, Text, false)
            .class(class::DATABASE_IDENTIFIER, Some(class::DATABASE_OBJECT))
            .attribute(class::DATABASE_IDENTIFIER, attr::IDENTIFIER, Text, false)
            .attribute(class::DATABASE_IDENTIFIER, attr::REFERENCE_DATABASE, Instance, false)
            .attribute(class::DATABASE_IDENTIFIER, attr::SPECIES, Instance, false)
            .attribute(class::DATABASE_IDENTIFIER, "version", Int, false)
            .class(class::REFERENCE_ENTITY, Some(class::DATABASE_OBJECT))
            .attribute(class::REFERENCE_ENTITY, attr::IDENTIFIER, Text, false)
            .attribute(class::REFERENCE_ENTITY, attr::NAME, Text, true)
            .attribute(class::REFERENCE_ENTITY, attr::REFERENCE_DATABASE, Instance, false)
            .attribute(class::REFERENCE_ENTITY, attr::CROSS_REFERENCE, Instance, true)
            .class(class::REFERENCE_SEQUENCE, Some(class::REFERENCE_ENTITY))
            .attribute(class::REFERENCE_SEQUENCE, attr::SPECIES, Instance, false)
            .class(class::REFERENCE_GENE_PRODUCT, Some(class::REFERENCE_SEQUENCE))
            .attribute(class::REFERENCE_GENE_PRODUCT, attr::REFERENCE_GENE, Instance, true)
            .attribute(class::REFERENCE_GENE_PRODUCT, attr::REFERENCE_TRANSCRIPT, Instance, true)
            .class(class::REFERENCE_DNA_SEQUENCE, Some(class::REFERENCE_SEQUENCE))
            .class(class::REFERENCE_RNA_SEQUENCE, Some(class::REFERENCE_SEQUENCE))
            .class(class::REFERENCE_MOLECULE, Some(class::REFERENCE_ENTITY))
    }
}
