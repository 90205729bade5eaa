mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use kira_xref::cache::CacheMode;
use kira_xref::creator::{CreateRequest, NewDatabase, ReferenceCreator};
use kira_xref::domain::{Entity, EntityId, Value, XrefLayout, attr, class};
use kira_xref::error::XrefError;
use kira_xref::schema::Schema;
use kira_xref::store::{GraphStore, MemoryStore};

use common::Fixture;

fn creator(fixture: &Fixture) -> ReferenceCreator {
    ReferenceCreator::new(
        Arc::clone(&fixture.cache),
        XrefLayout::default(),
        "creator test",
    )
    .unwrap()
}

fn request<'a>(
    fixture: &Fixture,
    identifier: &'a str,
    database: &'a str,
    owner: EntityId,
) -> CreateRequest<'a> {
    CreateRequest {
        identifier,
        owner,
        database,
        author: fixture.author,
        species: Some(fixture.human),
        extra: &[],
    }
}

#[test]
fn creates_attached_identifier() {
    let fixture = Fixture::new();
    let creator = creator(&fixture);

    let id = creator
        .create_identifier(&request(&fixture, "7157", "Entrez Gene", fixture.p12345))
        .unwrap();

    let xref = fixture.store.require(id).unwrap();
    assert_eq!(xref.class, class::DATABASE_IDENTIFIER);
    assert_eq!(xref.identifier(), Some("7157"));
    assert_eq!(xref.reference(attr::REFERENCE_DATABASE), Some(fixture.entrez));
    assert_eq!(xref.species(), Some(fixture.human));
    assert_eq!(xref.text(attr::DISPLAY_NAME), Some("Entrez Gene:7157"));
    assert_eq!(xref.reference(attr::CREATED), creator.provenance());

    let owner = fixture.source(fixture.p12345);
    assert_eq!(owner.references(attr::CROSS_REFERENCE), vec![id]);
    // nothing else on the owner was rewritten
    assert_eq!(owner.identifier(), Some("P12345"));
    assert_eq!(owner.reference(attr::REFERENCE_DATABASE), Some(fixture.uniprot));
}

#[test]
fn provenance_is_shared_within_a_creator() {
    let fixture = Fixture::new();
    let creator = creator(&fixture);
    assert!(creator.provenance().is_none());

    let first = creator
        .create_identifier(&request(&fixture, "7157", "Entrez Gene", fixture.p12345))
        .unwrap();
    let second = creator
        .create_identifier(&request(&fixture, "22059", "Entrez Gene", fixture.q99999))
        .unwrap();

    let edit = creator.provenance().unwrap();
    for id in [first, second] {
        let xref = fixture.store.require(id).unwrap();
        assert_eq!(xref.reference(attr::CREATED), Some(edit));
    }
    assert_eq!(fixture.store.count_class(class::INSTANCE_EDIT), 1);

    let record = fixture.store.require(edit).unwrap();
    assert_eq!(record.reference(attr::AUTHOR), Some(fixture.author));
    assert_eq!(record.text(attr::NOTE), Some("creator test"));
    assert!(record.text(attr::DATE_TIME).is_some());
}

#[test]
fn unknown_database_fails_without_side_effects() {
    let fixture = Fixture::new();
    let creator = creator(&fixture);
    let before = fixture.store.len();

    let err = creator
        .create_identifier(&request(&fixture, "X1", "No Such Database", fixture.p12345))
        .unwrap_err();
    assert_matches!(err, XrefError::UnknownTargetDatabase(name) if name == "No Such Database");
    assert_eq!(fixture.store.len(), before);
    assert!(creator.provenance().is_none());
}

#[test]
fn truncation_carries_the_offending_value() {
    let store = MemoryStore::new(Schema::reference_graph()).with_text_limit(64);
    let fixture = Fixture::with_store(store, CacheMode::Eager);
    let creator = creator(&fixture);
    let long = "N".repeat(65);

    let err = creator
        .create_identifier(&request(&fixture, &long, "Entrez Gene", fixture.p12345))
        .unwrap_err();
    assert_matches!(
        err,
        XrefError::PersistenceTruncation { identifier, owner, limit, .. }
            if identifier == long && owner == fixture.p12345 && limit == 64
    );
    assert!(fixture.source(fixture.p12345).references(attr::CROSS_REFERENCE).is_empty());
}

#[test]
fn leftover_copies_on_the_same_owner_are_replaced() {
    let fixture = Fixture::new();
    let creator = creator(&fixture);
    let first = creator
        .create_identifier(&request(&fixture, "7157", "Entrez Gene", fixture.p12345))
        .unwrap();

    let second = creator
        .create_identifier(&request(&fixture, "7157", "Entrez Gene", fixture.p12345))
        .unwrap();

    assert_ne!(first, second);
    assert!(fixture.store.fetch_by_id(first).unwrap().is_none());
    assert_eq!(
        fixture.source(fixture.p12345).references(attr::CROSS_REFERENCE),
        vec![second]
    );
}

#[test]
fn copies_held_by_other_owners_are_kept() {
    let fixture = Fixture::new();
    let creator = creator(&fixture);
    let mine = creator
        .create_identifier(&request(&fixture, "7157", "Entrez Gene", fixture.q99999))
        .unwrap();

    let theirs = creator
        .create_identifier(&request(&fixture, "7157", "Entrez Gene", fixture.p12345))
        .unwrap();

    assert!(fixture.store.fetch_by_id(mine).unwrap().is_some());
    assert_eq!(
        fixture.source(fixture.q99999).references(attr::CROSS_REFERENCE),
        vec![mine]
    );
    assert_eq!(
        fixture.source(fixture.p12345).references(attr::CROSS_REFERENCE),
        vec![theirs]
    );
}

#[test]
fn extra_attributes_are_written() {
    let fixture = Fixture::new();
    let creator = ReferenceCreator::new(
        Arc::clone(&fixture.cache),
        XrefLayout {
            class: class::REFERENCE_GENE_PRODUCT.to_string(),
            back_reference: attr::REFERENCE_GENE.to_string(),
        },
        "genes",
    )
    .unwrap();
    let extra = vec![(attr::NAME.to_string(), Value::from("TP53"))];

    let id = creator
        .create_identifier(&CreateRequest {
            identifier: "ENSG00000141510",
            owner: fixture.p12345,
            database: "ENSEMBL",
            author: fixture.author,
            species: Some(fixture.human),
            extra: &extra,
        })
        .unwrap();

    let gene = fixture.store.require(id).unwrap();
    assert_eq!(gene.texts(attr::NAME), vec!["TP53"]);
    assert_eq!(
        fixture.source(fixture.p12345).references(attr::REFERENCE_GENE),
        vec![id]
    );
}

#[test]
fn owner_class_needs_a_multi_valued_back_reference() {
    let fixture = Fixture::new();
    let creator = creator(&fixture);
    assert!(creator.check_owner_class(class::REFERENCE_GENE_PRODUCT).is_ok());
    assert_matches!(
        creator.check_owner_class(class::SPECIES),
        Err(XrefError::Configuration(_))
    );
}

#[test]
fn created_database_is_immediately_resolvable() {
    let fixture = Fixture::new();
    let creator = creator(&fixture);

    let id = creator
        .create_database(
            &NewDatabase {
                names: vec!["KEGG Gene (Danio rerio)".to_string(), "KEGG Gene (dre)".to_string()],
                url: Some("https://www.genome.jp/kegg/genes.html".to_string()),
                access_url: Some("https://www.genome.jp/dbget-bin/www_bget?dre:###ID###".to_string()),
            },
            fixture.author,
        )
        .unwrap();

    assert_eq!(fixture.cache.database_id("KEGG Gene (dre)"), Some(id));
    assert_eq!(
        fixture.cache.database_names_to_ids().primary_name(id),
        Some("KEGG Gene (Danio rerio)")
    );
    let record: Entity = fixture.store.require(id).unwrap();
    assert_eq!(record.reference(attr::CREATED), creator.provenance());

    creator
        .create_identifier(&request(&fixture, "30037", "KEGG Gene (dre)", fixture.p12345))
        .unwrap();
    assert_eq!(fixture.attached_count(fixture.p12345, "30037"), 1);
}
