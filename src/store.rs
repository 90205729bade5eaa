use std::collections::BTreeMap;
use std::fs;

use camino::Utf8Path;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::domain::{Entity, EntityId, Value};
use crate::error::XrefError;
use crate::schema::{AttributeKind, Schema};

pub const DEFAULT_TEXT_LIMIT: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    /// SQL-style `LIKE` with leading and/or trailing `%`.
    Like,
    IsNull,
}

pub trait GraphStore: Send + Sync {
    fn schema(&self) -> &Schema;
    fn fetch_by_id(&self, id: EntityId) -> Result<Option<Entity>, XrefError>;
    fn fetch_by_attribute(
        &self,
        class: &str,
        attribute: &str,
        operator: Operator,
        value: &Value,
    ) -> Result<Vec<Entity>, XrefError>;
    fn fetch_by_class(&self, class: &str) -> Result<Vec<Entity>, XrefError>;
    fn create(&self, entity: Entity) -> Result<EntityId, XrefError>;
    fn update(&self, entity: &Entity, attribute: &str) -> Result<(), XrefError>;
    fn delete(&self, id: EntityId) -> Result<(), XrefError>;
    fn referrers(
        &self,
        id: EntityId,
        attribute: Option<&str>,
    ) -> Result<Vec<(EntityId, String)>, XrefError>;

    fn require(&self, id: EntityId) -> Result<Entity, XrefError> {
        self.fetch_by_id(id)?.ok_or(XrefError::EntityNotFound(id))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    next_id: u64,
    entities: BTreeMap<EntityId, Entity>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    schema: Schema,
    #[serde(default = "default_text_limit")]
    text_limit: usize,
    state: State,
}

fn default_text_limit() -> usize {
    DEFAULT_TEXT_LIMIT
}

#[derive(Debug)]
pub struct MemoryStore {
    schema: Schema,
    text_limit: usize,
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            text_limit: DEFAULT_TEXT_LIMIT,
            state: RwLock::new(State {
                next_id: 1,
                entities: BTreeMap::new(),
            }),
        }
    }

    pub fn with_text_limit(mut self, limit: usize) -> Self {
        self.text_limit = limit;
        self
    }

    pub fn len(&self) -> usize {
        self.state.read().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_class(&self, class: &str) -> usize {
        self.state
            .read()
            .entities
            .values()
            .filter(|entity| entity.class == class)
            .count()
    }

    pub fn load(path: &Utf8Path) -> Result<Self, XrefError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| XrefError::Filesystem(err.to_string()))?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .map_err(|err| XrefError::Store(format!("invalid snapshot {path}: {err}")))?;
        Ok(Self {
            schema: snapshot.schema,
            text_limit: snapshot.text_limit,
            state: RwLock::new(snapshot.state),
        })
    }

    pub fn save(&self, path: &Utf8Path) -> Result<(), XrefError> {
        let state = self.state.read();
        let snapshot = SnapshotRef {
            schema: &self.schema,
            text_limit: self.text_limit,
            state: &state,
        };
        let content = serde_json::to_vec_pretty(&snapshot)
            .map_err(|err| XrefError::Filesystem(err.to_string()))?;
        write_bytes_atomic(path, &content)
    }

    fn validate(&self, entity: &Entity) -> Result<(), XrefError> {
        if !self.schema.has_class(&entity.class) {
            return Err(XrefError::Store(format!("unknown class {}", entity.class)));
        }
        for (name, values) in &entity.attributes {
            self.validate_attribute(&entity.class, name, values)?;
        }
        Ok(())
    }

    fn validate_attribute(&self, class: &str, name: &str, values: &[Value]) -> Result<(), XrefError> {
        let def = self
            .schema
            .resolve_attribute(class, name)
            .ok_or_else(|| XrefError::Store(format!("class {class} has no attribute {name}")))?;
        if !def.multiple && values.len() > 1 {
            return Err(XrefError::Store(format!(
                "attribute {class}.{name} is single-valued"
            )));
        }
        for value in values {
            let kind_ok = matches!(
                (def.kind, value),
                (AttributeKind::Text, Value::Text(_))
                    | (AttributeKind::Int, Value::Int(_))
                    | (AttributeKind::Instance, Value::Ref(_))
            );
            if !kind_ok {
                return Err(XrefError::Store(format!(
                    "attribute {class}.{name} has the wrong value kind"
                )));
            }
            if let Value::Text(text) = value
                && text.chars().count() > self.text_limit
            {
                return Err(XrefError::ValueTooLong {
                    attribute: name.to_string(),
                    value: text.clone(),
                    limit: self.text_limit,
                });
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    schema: &'a Schema,
    text_limit: usize,
    state: &'a State,
}

impl GraphStore for MemoryStore {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn fetch_by_id(&self, id: EntityId) -> Result<Option<Entity>, XrefError> {
        Ok(self.state.read().entities.get(&id).cloned())
    }

    fn fetch_by_attribute(
        &self,
        class: &str,
        attribute: &str,
        operator: Operator,
        value: &Value,
    ) -> Result<Vec<Entity>, XrefError> {
        if self.schema.resolve_attribute(class, attribute).is_none() {
            return Err(XrefError::Store(format!(
                "class {class} has no attribute {attribute}"
            )));
        }
        let state = self.state.read();
        Ok(state
            .entities
            .values()
            .filter(|entity| self.schema.is_a(&entity.class, class))
            .filter(|entity| matches_operator(entity.values(attribute), operator, value))
            .cloned()
            .collect())
    }

    fn fetch_by_class(&self, class: &str) -> Result<Vec<Entity>, XrefError> {
        if !self.schema.has_class(class) {
            return Err(XrefError::Store(format!("unknown class {class}")));
        }
        let state = self.state.read();
        Ok(state
            .entities
            .values()
            .filter(|entity| self.schema.is_a(&entity.class, class))
            .cloned()
            .collect())
    }

    fn create(&self, mut entity: Entity) -> Result<EntityId, XrefError> {
        self.validate(&entity)?;
        let mut state = self.state.write();
        for target in entity.attributes.values().flatten().filter_map(Value::as_ref_id) {
            if !state.entities.contains_key(&target) {
                return Err(XrefError::EntityNotFound(target));
            }
        }
        let id = EntityId::new(state.next_id);
        state.next_id += 1;
        entity.id = id;
        state.entities.insert(id, entity);
        Ok(id)
    }

    fn update(&self, entity: &Entity, attribute: &str) -> Result<(), XrefError> {
        let values = entity.values(attribute);
        self.validate_attribute(&entity.class, attribute, values)?;
        let mut state = self.state.write();
        for target in values.iter().filter_map(Value::as_ref_id) {
            if !state.entities.contains_key(&target) {
                return Err(XrefError::EntityNotFound(target));
            }
        }
        let stored = state
            .entities
            .get_mut(&entity.id)
            .ok_or(XrefError::EntityNotFound(entity.id))?;
        stored
            .attributes
            .insert(attribute.to_string(), values.to_vec());
        Ok(())
    }

    fn delete(&self, id: EntityId) -> Result<(), XrefError> {
        let mut state = self.state.write();
        if state.entities.remove(&id).is_none() {
            return Err(XrefError::EntityNotFound(id));
        }
        for entity in state.entities.values_mut() {
            entity.remove_reference(id);
        }
        Ok(())
    }

    fn referrers(
        &self,
        id: EntityId,
        attribute: Option<&str>,
    ) -> Result<Vec<(EntityId, String)>, XrefError> {
        let state = self.state.read();
        let mut found = Vec::new();
        for entity in state.entities.values() {
            for (name, values) in &entity.attributes {
                if attribute.is_some_and(|wanted| wanted != name) {
                    continue;
                }
                if values.iter().any(|value| value.as_ref_id() == Some(id)) {
                    found.push((entity.id, name.clone()));
                }
            }
        }
        Ok(found)
    }
}

fn matches_operator(values: &[Value], operator: Operator, expected: &Value) -> bool {
    match operator {
        Operator::IsNull => values.is_empty(),
        Operator::Eq => values.iter().any(|value| value == expected),
        Operator::Like => {
            let Some(pattern) = expected.as_text() else {
                return false;
            };
            values
                .iter()
                .filter_map(Value::as_text)
                .any(|text| like_match(text, pattern))
        }
    }
}

fn like_match(text: &str, pattern: &str) -> bool {
    let starts = pattern.starts_with('%');
    let ends = pattern.len() > 1 && pattern.ends_with('%');
    let core = pattern.trim_start_matches('%').trim_end_matches('%');
    match (starts, ends) {
        (true, true) => text.contains(core),
        (true, false) => text.ends_with(core),
        (false, true) => text.starts_with(core),
        (false, false) => text == core,
    }
}

fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), XrefError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| XrefError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix("kira-xref-snapshot")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| XrefError::Filesystem(err.to_string()))?;
    std::io::Write::write_all(&mut temp, content)
        .map_err(|err| XrefError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| XrefError::Filesystem(err.to_string()))?;
    Ok(())
}
