mod common;

use std::sync::Arc;
use std::thread;

use assert_matches::assert_matches;
use kira_xref::cache::{CacheMode, ReferenceCache};
use kira_xref::domain::{Entity, attr, class};
use kira_xref::error::XrefError;
use kira_xref::schema::Schema;
use kira_xref::store::{GraphStore, MemoryStore};

use common::{Fixture, database, gene_product};

fn ids(entities: &[Arc<Entity>]) -> Vec<u64> {
    let mut ids = entities.iter().map(|entity| entity.id.get()).collect::<Vec<_>>();
    ids.sort();
    ids
}

#[test]
fn missing_store_is_fatal() {
    let err = ReferenceCache::builder().build().unwrap_err();
    assert_matches!(err, XrefError::MissingStore);
}

#[test]
fn eager_queries_by_database_and_species() {
    let fixture = Fixture::new();
    let cache = &fixture.cache;
    assert_eq!(cache.mode(), CacheMode::Eager);

    assert_eq!(
        ids(&cache.by_database(fixture.uniprot).unwrap()),
        vec![fixture.p12345.get(), fixture.q99999.get()]
    );
    assert_eq!(
        ids(&cache.by_species(fixture.human).unwrap()),
        vec![fixture.p12345.get()]
    );
    assert_eq!(
        ids(&cache
            .by_database_and_species(
                fixture.uniprot,
                Some(fixture.mouse),
                class::REFERENCE_GENE_PRODUCT
            )
            .unwrap()),
        vec![fixture.q99999.get()]
    );
    assert!(cache.by_database(fixture.entrez).unwrap().is_empty());
    assert_eq!(
        cache.by_id(fixture.p12345).unwrap().unwrap().identifier(),
        Some("P12345")
    );
    assert!(cache.by_id(fixture.uniprot).unwrap().is_none());
}

#[test]
fn names_resolve_through_aliases() {
    let fixture = Fixture::new();
    let cache = &fixture.cache;

    assert_eq!(cache.species_id("Homo sapiens"), Some(fixture.human));
    assert_eq!(cache.species_id("human"), Some(fixture.human));
    assert_eq!(cache.species_id("Danio rerio"), None);
    assert_eq!(cache.database_id("Entrez Gene"), Some(fixture.entrez));

    let species = cache.species_names_to_ids();
    assert_eq!(species.primary_name(fixture.human), Some("Homo sapiens"));
    assert_eq!(species.names(fixture.human).len(), 2);
}

#[test]
fn lazy_mode_loads_only_the_queried_class() {
    let fixture = Fixture::lazy();
    let cache = &fixture.cache;
    let snapshot = cache.snapshot();
    assert!(!snapshot.is_loaded(class::REFERENCE_GENE_PRODUCT));

    let found = cache
        .by_database_and_species(fixture.uniprot, Some(fixture.human), class::REFERENCE_GENE_PRODUCT)
        .unwrap();
    assert_eq!(ids(&found), vec![fixture.p12345.get()]);
    assert!(snapshot.is_loaded(class::REFERENCE_GENE_PRODUCT));
    assert!(!snapshot.is_loaded(class::REFERENCE_MOLECULE));

    // answers match an eager cache over the same store
    let store: Arc<dyn GraphStore> = fixture.store.clone();
    let eager = ReferenceCache::builder().store(store).build().unwrap();
    assert_eq!(
        ids(&cache.by_species(fixture.mouse).unwrap()),
        ids(&eager.by_species(fixture.mouse).unwrap())
    );
}

#[test]
fn untracked_class_is_a_configuration_error() {
    let fixture = Fixture::new();
    let err = fixture
        .cache
        .by_database_and_species(fixture.uniprot, None, class::REFERENCE_DATABASE)
        .unwrap_err();
    assert_matches!(err, XrefError::Configuration(_));
}

#[test]
fn tracking_a_class_without_identifier_fails() {
    let store: Arc<dyn GraphStore> = Arc::new(MemoryStore::new(Schema::reference_graph()));
    let err = ReferenceCache::builder()
        .store(store)
        .track(vec![class::SPECIES.to_string()])
        .build()
        .unwrap_err();
    assert_matches!(err, XrefError::Configuration(_));
}

#[test]
fn rebuild_publishes_a_new_snapshot() {
    let fixture = Fixture::new();
    let before = fixture.cache.snapshot();
    let held = fixture.cache.database_names_to_ids();

    let added = database(&fixture.store, "Reactome", None);
    let product = gene_product(&fixture.store, "O00001", added, Some(fixture.human));
    assert_eq!(fixture.cache.database_id("Reactome"), None);

    fixture.cache.rebuild().unwrap();
    assert_eq!(fixture.cache.database_id("Reactome"), Some(added));
    assert_eq!(
        ids(&fixture.cache.by_database(added).unwrap()),
        vec![product.get()]
    );

    // readers holding the old tables keep seeing them unchanged
    assert_eq!(before.databases().id("Reactome"), None);
    assert_eq!(held.id("Reactome"), None);
    assert!(!Arc::ptr_eq(&before, &fixture.cache.snapshot()));
}

#[test]
fn readers_see_complete_tables_during_rebuilds() {
    let fixture = Fixture::new();
    let baseline = fixture.cache.database_names_to_ids().len();

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..200 {
                    let table = fixture.cache.database_names_to_ids();
                    assert!(table.len() >= baseline);
                    assert_eq!(table.id("UniProt"), Some(fixture.uniprot));
                    assert_eq!(table.id("Entrez Gene"), Some(fixture.entrez));
                }
            });
        }
        scope.spawn(|| {
            for index in 0..20 {
                database(&fixture.store, &format!("Extra {index}"), None);
                fixture.cache.rebuild().unwrap();
            }
        });
    });

    assert_eq!(fixture.cache.database_names_to_ids().len(), baseline + 20);
}

#[test]
fn unnamed_database_stays_in_entity_indices() {
    let store = Arc::new(MemoryStore::new(Schema::reference_graph()));
    let unnamed = store.create(Entity::new(class::REFERENCE_DATABASE)).unwrap();
    let product = gene_product(&store, "P00001", unnamed, None);

    let dyn_store: Arc<dyn GraphStore> = store.clone();
    let cache = ReferenceCache::builder().store(dyn_store).build().unwrap();
    assert!(cache.database_names_to_ids().names(unnamed).is_empty());
    assert_eq!(ids(&cache.by_database(unnamed).unwrap()), vec![product.get()]);
    assert!(cache.by_id(product).unwrap().is_some());
}

#[test]
fn conflicting_alias_resolves_to_lowest_id() {
    let store = Arc::new(MemoryStore::new(Schema::reference_graph()));
    let first = database(&store, "Ensembl", None);
    let second = store
        .create(
            Entity::new(class::REFERENCE_DATABASE)
                .with(attr::NAME, "ENSEMBL")
                .with(attr::NAME, "Ensembl"),
        )
        .unwrap();

    let dyn_store: Arc<dyn GraphStore> = store.clone();
    let cache = ReferenceCache::builder().store(dyn_store).build().unwrap();
    let table = cache.database_names_to_ids();
    assert_eq!(table.ids("Ensembl"), &[first, second]);
    assert_eq!(table.id("Ensembl"), Some(first));
    assert_eq!(table.id("ENSEMBL"), Some(second));
}
