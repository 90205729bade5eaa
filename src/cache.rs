use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{Entity, EntityId, attr, class};
use crate::error::XrefError;
use crate::store::GraphStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    #[default]
    Eager,
    Lazy,
}

pub fn default_tracked_classes() -> Vec<String> {
    vec![
        class::REFERENCE_GENE_PRODUCT.to_string(),
        class::REFERENCE_DNA_SEQUENCE.to_string(),
        class::REFERENCE_RNA_SEQUENCE.to_string(),
        class::REFERENCE_MOLECULE.to_string(),
    ]
}

#[derive(Debug, Default, Clone)]
pub struct AliasTable {
    names_to_ids: HashMap<String, Vec<EntityId>>,
    ids_to_names: HashMap<EntityId, Vec<String>>,
}

impl AliasTable {
    fn from_records(kind: &str, records: &[Entity]) -> Self {
        let mut table = Self::default();
        for record in records {
            let names = record.texts(attr::NAME);
            if names.is_empty() {
                warn!(kind, id = %record.id, "record has no name; left out of alias table");
                continue;
            }
            for name in names {
                let ids = table.names_to_ids.entry(name.to_string()).or_default();
                if !ids.contains(&record.id) {
                    ids.push(record.id);
                    ids.sort();
                }
                table
                    .ids_to_names
                    .entry(record.id)
                    .or_default()
                    .push(name.to_string());
            }
        }
        for (name, ids) in &table.names_to_ids {
            if ids.len() > 1 {
                warn!(kind, name = %name, ids = ?ids, "alias maps to more than one record");
            }
        }
        table
    }

    pub fn id(&self, name: &str) -> Option<EntityId> {
        self.names_to_ids
            .get(name)
            .and_then(|ids| ids.first().copied())
    }

    pub fn ids(&self, name: &str) -> &[EntityId] {
        self.names_to_ids
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn names(&self, id: EntityId) -> &[String] {
        self.ids_to_names
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn primary_name(&self, id: EntityId) -> Option<&str> {
        self.names(id).first().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names_to_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names_to_ids.is_empty()
    }
}

#[derive(Debug, Default)]
struct ClassIndex {
    by_id: HashMap<EntityId, Arc<Entity>>,
    by_species: HashMap<EntityId, Vec<Arc<Entity>>>,
    by_database: HashMap<EntityId, Vec<Arc<Entity>>>,
    by_database_species: HashMap<(EntityId, Option<EntityId>), Vec<Arc<Entity>>>,
}

impl ClassIndex {
    fn load(store: &dyn GraphStore, class: &str) -> Result<Self, XrefError> {
        let mut index = Self::default();
        for entity in store.fetch_by_class(class)? {
            let entity = Arc::new(entity);
            let species = entity.species();
            if let Some(species) = species {
                index
                    .by_species
                    .entry(species)
                    .or_default()
                    .push(Arc::clone(&entity));
            }
            if let Some(database) = entity.reference(attr::REFERENCE_DATABASE) {
                index
                    .by_database
                    .entry(database)
                    .or_default()
                    .push(Arc::clone(&entity));
                index
                    .by_database_species
                    .entry((database, species))
                    .or_default()
                    .push(Arc::clone(&entity));
            }
            index.by_id.insert(entity.id, entity);
        }
        debug!(class, entities = index.by_id.len(), "indexed class");
        Ok(index)
    }
}

#[derive(Debug)]
pub struct CacheSnapshot {
    databases: Arc<AliasTable>,
    species: Arc<AliasTable>,
    indices: BTreeMap<String, OnceCell<ClassIndex>>,
}

impl CacheSnapshot {
    fn build(
        store: &dyn GraphStore,
        tracked: &[String],
        mode: CacheMode,
    ) -> Result<Self, XrefError> {
        let databases = store.fetch_by_class(class::REFERENCE_DATABASE)?;
        let species = store.fetch_by_class(class::SPECIES)?;
        let snapshot = Self {
            databases: Arc::new(AliasTable::from_records("database", &databases)),
            species: Arc::new(AliasTable::from_records("species", &species)),
            indices: tracked
                .iter()
                .map(|class| (class.clone(), OnceCell::new()))
                .collect(),
        };
        if mode == CacheMode::Eager {
            for class in tracked {
                snapshot.index(store, class)?;
            }
        }
        Ok(snapshot)
    }

    pub fn databases(&self) -> &AliasTable {
        &self.databases
    }

    pub fn species(&self) -> &AliasTable {
        &self.species
    }

    pub fn is_loaded(&self, class: &str) -> bool {
        self.indices
            .get(class)
            .is_some_and(|cell| cell.get().is_some())
    }

    fn index(&self, store: &dyn GraphStore, class: &str) -> Result<&ClassIndex, XrefError> {
        let cell = self.indices.get(class).ok_or_else(|| {
            XrefError::Configuration(format!("class {class} is not tracked by the cache"))
        })?;
        cell.get_or_try_init(|| ClassIndex::load(store, class))
    }

    fn all_indices(&self, store: &dyn GraphStore) -> Result<Vec<&ClassIndex>, XrefError> {
        self.indices
            .keys()
            .map(|class| self.index(store, class))
            .collect()
    }
}

#[derive(Default)]
pub struct ReferenceCacheBuilder {
    store: Option<Arc<dyn GraphStore>>,
    mode: CacheMode,
    tracked: Option<Vec<String>>,
}

impl ReferenceCacheBuilder {
    pub fn store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn mode(mut self, mode: CacheMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn track(mut self, classes: Vec<String>) -> Self {
        self.tracked = Some(classes);
        self
    }

    pub fn build(self) -> Result<ReferenceCache, XrefError> {
        let store = self.store.ok_or(XrefError::MissingStore)?;
        let tracked = self.tracked.unwrap_or_else(default_tracked_classes);
        for class in &tracked {
            store.schema().require_attribute(class, attr::IDENTIFIER)?;
        }
        let snapshot = CacheSnapshot::build(store.as_ref(), &tracked, self.mode)?;
        info!(
            mode = ?self.mode,
            databases = snapshot.databases.len(),
            species = snapshot.species.len(),
            classes = tracked.len(),
            "built reference cache"
        );
        Ok(ReferenceCache {
            store,
            mode: self.mode,
            tracked,
            snapshot: ArcSwap::from_pointee(snapshot),
        })
    }
}

pub struct ReferenceCache {
    store: Arc<dyn GraphStore>,
    mode: CacheMode,
    tracked: Vec<String>,
    snapshot: ArcSwap<CacheSnapshot>,
}

impl ReferenceCache {
    pub fn builder() -> ReferenceCacheBuilder {
        ReferenceCacheBuilder::default()
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    pub fn tracked_classes(&self) -> &[String] {
        &self.tracked
    }

    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.snapshot.load_full()
    }

    pub fn by_database(&self, database: EntityId) -> Result<Vec<Arc<Entity>>, XrefError> {
        let snapshot = self.snapshot();
        let mut seen = BTreeSet::new();
        let mut found = Vec::new();
        for index in snapshot.all_indices(self.store.as_ref())? {
            for entity in index.by_database.get(&database).into_iter().flatten() {
                if seen.insert(entity.id) {
                    found.push(Arc::clone(entity));
                }
            }
        }
        Ok(found)
    }

    pub fn by_species(&self, species: EntityId) -> Result<Vec<Arc<Entity>>, XrefError> {
        let snapshot = self.snapshot();
        let mut seen = BTreeSet::new();
        let mut found = Vec::new();
        for index in snapshot.all_indices(self.store.as_ref())? {
            for entity in index.by_species.get(&species).into_iter().flatten() {
                if seen.insert(entity.id) {
                    found.push(Arc::clone(entity));
                }
            }
        }
        Ok(found)
    }

    pub fn by_database_and_species(
        &self,
        database: EntityId,
        species: Option<EntityId>,
        class: &str,
    ) -> Result<Vec<Arc<Entity>>, XrefError> {
        let snapshot = self.snapshot();
        let index = snapshot.index(self.store.as_ref(), class)?;
        Ok(index
            .by_database_species
            .get(&(database, species))
            .cloned()
            .unwrap_or_default())
    }

    pub fn by_id(&self, id: EntityId) -> Result<Option<Arc<Entity>>, XrefError> {
        let snapshot = self.snapshot();
        for index in snapshot.all_indices(self.store.as_ref())? {
            if let Some(entity) = index.by_id.get(&id) {
                return Ok(Some(Arc::clone(entity)));
            }
        }
        Ok(None)
    }

    pub fn database_names_to_ids(&self) -> Arc<AliasTable> {
        Arc::clone(&self.snapshot.load().databases)
    }

    pub fn species_names_to_ids(&self) -> Arc<AliasTable> {
        Arc::clone(&self.snapshot.load().species)
    }

    pub fn database_id(&self, name: &str) -> Option<EntityId> {
        self.snapshot.load().databases.id(name)
    }

    pub fn species_id(&self, name: &str) -> Option<EntityId> {
        self.snapshot.load().species.id(name)
    }

    pub fn rebuild(&self) -> Result<(), XrefError> {
        let snapshot = CacheSnapshot::build(self.store.as_ref(), &self.tracked, self.mode)?;
        info!(
            databases = snapshot.databases.len(),
            species = snapshot.species.len(),
            "rebuilt reference cache"
        );
        self.snapshot.store(Arc::new(snapshot));
        Ok(())
    }
}

impl std::fmt::Debug for ReferenceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceCache")
            .field("mode", &self.mode)
            .field("tracked", &self.tracked)
            .finish_non_exhaustive()
    }
}
