#![allow(dead_code)]

use std::sync::Arc;

use kira_xref::cache::{CacheMode, ReferenceCache};
use kira_xref::domain::{Entity, EntityId, attr, class};
use kira_xref::schema::Schema;
use kira_xref::store::{GraphStore, MemoryStore};

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub cache: Arc<ReferenceCache>,
    pub author: EntityId,
    pub human: EntityId,
    pub mouse: EntityId,
    pub uniprot: EntityId,
    pub entrez: EntityId,
    pub viruses: EntityId,
    pub p12345: EntityId,
    pub q99999: EntityId,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new(Schema::reference_graph()), CacheMode::Eager)
    }

    pub fn lazy() -> Self {
        Self::with_store(MemoryStore::new(Schema::reference_graph()), CacheMode::Lazy)
    }

    pub fn with_store(store: MemoryStore, mode: CacheMode) -> Self {
        kira_xref::logging::init();
        let store = Arc::new(store);

        let author = store
            .create(Entity::new(class::PERSON).with(attr::NAME, "Curator"))
            .unwrap();
        let human = store
            .create(
                Entity::new(class::SPECIES)
                    .with(attr::NAME, "Homo sapiens")
                    .with(attr::NAME, "human"),
            )
            .unwrap();
        let mouse = store
            .create(Entity::new(class::SPECIES).with(attr::NAME, "Mus musculus"))
            .unwrap();
        let uniprot = database(&store, "UniProt", None);
        let entrez = database(
            &store,
            "Entrez Gene",
            Some("https://www.ncbi.nlm.nih.gov/gene/###ID###"),
        );
        let viruses = database(&store, "KEGG Gene (Viruses)", None);
        for name in [
            "BioGPS Gene",
            "CTD Gene",
            "dbSNP Gene",
            "RefSeq Peptide",
            "RefSeq RNA",
            "Affymetrix",
            "ENSEMBL",
        ] {
            database(&store, name, None);
        }

        let p12345 = gene_product(&store, "P12345", uniprot, Some(human));
        let q99999 = gene_product(&store, "Q99999", uniprot, Some(mouse));

        let dyn_store: Arc<dyn GraphStore> = store.clone();
        let cache = Arc::new(
            ReferenceCache::builder()
                .store(dyn_store)
                .mode(mode)
                .build()
                .unwrap(),
        );

        Self {
            store,
            cache,
            author,
            human,
            mouse,
            uniprot,
            entrez,
            viruses,
            p12345,
            q99999,
        }
    }

    pub fn sources(&self) -> Vec<Entity> {
        self.store
            .fetch_by_class(class::REFERENCE_GENE_PRODUCT)
            .unwrap()
    }

    pub fn source(&self, id: EntityId) -> Entity {
        self.store.require(id).unwrap()
    }

    /// Cross-references attached to `owner` as (identifier, database id).
    pub fn attached(&self, owner: EntityId) -> Vec<(String, Option<EntityId>)> {
        let owner = self.store.require(owner).unwrap();
        owner
            .references(attr::CROSS_REFERENCE)
            .into_iter()
            .map(|id| self.store.require(id).unwrap())
            .map(|xref| {
                (
                    xref.identifier().unwrap_or_default().to_string(),
                    xref.reference(attr::REFERENCE_DATABASE),
                )
            })
            .collect()
    }

    pub fn attached_count(&self, owner: EntityId, identifier: &str) -> usize {
        self.attached(owner)
            .iter()
            .filter(|(value, _)| value == identifier)
            .count()
    }
}

pub fn database(store: &MemoryStore, name: &str, access_url: Option<&str>) -> EntityId {
    let mut entity = Entity::new(class::REFERENCE_DATABASE).with(attr::NAME, name);
    if let Some(access_url) = access_url {
        entity.set(attr::ACCESS_URL, access_url);
    }
    store.create(entity).unwrap()
}

pub fn gene_product(
    store: &MemoryStore,
    identifier: &str,
    database: EntityId,
    species: Option<EntityId>,
) -> EntityId {
    let mut entity = Entity::new(class::REFERENCE_GENE_PRODUCT)
        .with(attr::IDENTIFIER, identifier)
        .with(attr::REFERENCE_DATABASE, database);
    if let Some(species) = species {
        entity.set(attr::SPECIES, species);
    }
    store.create(entity).unwrap()
}

pub fn mapping(pairs: &[(&str, &[&str])]) -> kira_xref::mapping::Mapping {
    pairs
        .iter()
        .map(|(key, values)| {
            (
                key.to_string(),
                values.iter().map(|value| value.to_string()).collect(),
            )
        })
        .collect()
}
