use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::ReferenceCache;
use crate::domain::{Entity, EntityId, Value, XrefLayout, attr, class};
use crate::error::XrefError;
use crate::provenance::ProvenanceSlot;
use crate::store::{GraphStore, Operator};

#[derive(Debug, Clone)]
pub struct CreateRequest<'a> {
    pub identifier: &'a str,
    pub owner: EntityId,
    pub database: &'a str,
    pub author: EntityId,
    pub species: Option<EntityId>,
    pub extra: &'a [(String, Value)],
}

#[derive(Debug, Clone)]
pub struct NewDatabase {
    pub names: Vec<String>,
    pub url: Option<String>,
    pub access_url: Option<String>,
}

/// The only writer of cross-reference and database records.
pub struct ReferenceCreator {
    store: Arc<dyn GraphStore>,
    cache: Arc<ReferenceCache>,
    layout: XrefLayout,
    note: String,
    with_species: bool,
    provenance: ProvenanceSlot,
}

impl ReferenceCreator {
    pub fn new(
        cache: Arc<ReferenceCache>,
        layout: XrefLayout,
        note: impl Into<String>,
    ) -> Result<Self, XrefError> {
        let store = Arc::clone(cache.store());
        let schema = store.schema();
        schema.require_attribute(&layout.class, attr::IDENTIFIER)?;
        schema.require_attribute(&layout.class, attr::REFERENCE_DATABASE)?;
        schema.require_attribute(&layout.class, attr::CREATED)?;
        schema.require_attribute(class::REFERENCE_DATABASE, attr::NAME)?;
        let with_species = schema
            .resolve_attribute(&layout.class, attr::SPECIES)
            .is_some();
        Ok(Self {
            store,
            cache,
            layout,
            note: note.into(),
            with_species,
            provenance: ProvenanceSlot::new(),
        })
    }

    pub fn layout(&self) -> &XrefLayout {
        &self.layout
    }

    pub fn cache(&self) -> &Arc<ReferenceCache> {
        &self.cache
    }

    pub fn provenance(&self) -> Option<EntityId> {
        self.provenance.get()
    }

    pub fn check_owner_class(&self, class: &str) -> Result<(), XrefError> {
        let def = self
            .store
            .schema()
            .require_attribute(class, &self.layout.back_reference)?;
        if !def.multiple {
            return Err(XrefError::Configuration(format!(
                "{class}.{} must be multi-valued",
                self.layout.back_reference
            )));
        }
        Ok(())
    }

    pub fn create_identifier(&self, request: &CreateRequest<'_>) -> Result<EntityId, XrefError> {
        let database = self
            .cache
            .database_id(request.database)
            .ok_or_else(|| XrefError::UnknownTargetDatabase(request.database.to_string()))?;

        self.remove_leftovers(request, database)?;

        let edit = self
            .provenance
            .get_or_create(self.store.as_ref(), request.author, &self.note)?;

        let mut entity = Entity::new(&self.layout.class)
            .with(attr::IDENTIFIER, request.identifier)
            .with(attr::REFERENCE_DATABASE, database)
            .with(attr::CREATED, edit)
            .with(
                attr::DISPLAY_NAME,
                format!("{}:{}", request.database, request.identifier),
            );
        if let Some(species) = request.species.filter(|_| self.with_species) {
            entity.set(attr::SPECIES, species);
        }
        for (name, value) in request.extra {
            entity.push(name, value.clone());
        }

        let id = self
            .store
            .create(entity)
            .map_err(|err| truncation(err, request))?;
        let created = self.store.require(id)?;

        let mut owner = self.store.require(request.owner)?;
        owner.push(&self.layout.back_reference, Value::Ref(created.id));
        self.store
            .update(&owner, &self.layout.back_reference)
            .map_err(|err| truncation(err, request))?;

        debug!(
            identifier = request.identifier,
            database = request.database,
            owner = %request.owner,
            id = %created.id,
            "created cross-reference"
        );
        Ok(created.id)
    }

    fn remove_leftovers(&self, request: &CreateRequest<'_>, database: EntityId) -> Result<(), XrefError> {
        let matches = self.store.fetch_by_attribute(
            &self.layout.class,
            attr::IDENTIFIER,
            Operator::Eq,
            &Value::from(request.identifier),
        )?;
        for candidate in matches {
            if candidate
                .reference(attr::REFERENCE_DATABASE)
                .is_some_and(|existing| existing != database)
            {
                continue;
            }
            let referrers = self
                .store
                .referrers(candidate.id, Some(&self.layout.back_reference))?;
            if referrers.iter().any(|(owner, _)| *owner == request.owner) {
                warn!(
                    identifier = request.identifier,
                    owner = %request.owner,
                    id = %candidate.id,
                    "deleting leftover cross-reference"
                );
                self.store.delete(candidate.id)?;
            }
        }
        Ok(())
    }

    pub fn create_database(&self, database: &NewDatabase, author: EntityId) -> Result<EntityId, XrefError> {
        let edit = self
            .provenance
            .get_or_create(self.store.as_ref(), author, &self.note)?;
        let mut entity = Entity::new(class::REFERENCE_DATABASE).with(attr::CREATED, edit);
        if let Some(name) = database.names.first() {
            entity.set(attr::DISPLAY_NAME, name.as_str());
        }
        for name in &database.names {
            entity.push(attr::NAME, Value::from(name.as_str()));
        }
        if let Some(url) = &database.url {
            entity.set(attr::URL, url.as_str());
        }
        if let Some(access_url) = &database.access_url {
            entity.set(attr::ACCESS_URL, access_url.as_str());
        }
        let id = self.store.create(entity)?;
        info!(id = %id, names = ?database.names, "created reference database");
        self.cache.rebuild()?;
        Ok(id)
    }
}

fn truncation(err: XrefError, request: &CreateRequest<'_>) -> XrefError {
    match err {
        XrefError::ValueTooLong {
            attribute, limit, ..
        } => XrefError::PersistenceTruncation {
            identifier: request.identifier.to_string(),
            owner: request.owner,
            attribute,
            limit,
        },
        other => other,
    }
}
