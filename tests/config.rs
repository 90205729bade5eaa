use std::fs;

use assert_matches::assert_matches;
use kira_xref::cache::CacheMode;
use kira_xref::config::{ConfigLoader, DEFAULT_CONFIG_FILE};
use kira_xref::domain::EntityId;
use kira_xref::error::XrefError;
use kira_xref::mapping::Mapping;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn full_config_resolves() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        DEFAULT_CONFIG_FILE,
        r#"{
            "schema_version": 1,
            "author": "140537",
            "note": "KEGG gene update",
            "dry_run": true,
            "workers": 3,
            "cache_mode": "lazy",
            "tracked_classes": ["ReferenceGeneProduct"],
            "probe": {"timeout_ms": 1500, "retries": 1},
            "kegg": {"base_name": "KEGG", "access_url": "https://example.org/###PREFIX###/###ID###"}
        }"#,
    );

    let config = ConfigLoader::resolve(Some(&path)).unwrap();
    assert_eq!(config.author, EntityId::new(140537));
    assert_eq!(config.note, "KEGG gene update");
    assert!(config.dry_run);
    assert_eq!(config.workers, 3);
    assert_eq!(config.cache_mode, CacheMode::Lazy);
    assert_eq!(config.tracked_classes, vec!["ReferenceGeneProduct"]);
    let probe = config.probe.unwrap();
    assert_eq!(probe.timeout_ms, 1500);
    assert_eq!(probe.retries, 1);
    assert_eq!(config.kegg.base_name, "KEGG");
    assert_eq!(
        config.kegg.fixed_buckets.get("ag").map(String::as_str),
        Some("KEGG Gene (Addendum)")
    );
}

#[test]
fn zero_workers_is_raised_to_one() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "zero.json", r#"{"author": "1", "workers": 0}"#);
    let config = ConfigLoader::resolve(Some(&path)).unwrap();
    assert_eq!(config.workers, 1);
}

#[test]
fn missing_file_is_reported_with_its_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, XrefError::ConfigRead(reported) if reported == path);
}

#[test]
fn malformed_json_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "bad.json", "{ author: ");
    assert_matches!(
        ConfigLoader::resolve(Some(&path)),
        Err(XrefError::ConfigParse(_))
    );
}

#[test]
fn author_is_required() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "anonymous.json", r#"{"dry_run": true}"#);
    assert_matches!(
        ConfigLoader::resolve(Some(&path)),
        Err(XrefError::Configuration(_))
    );

    let path = write(&dir, "named.json", r#"{"author": "curator"}"#);
    assert_matches!(
        ConfigLoader::resolve(Some(&path)),
        Err(XrefError::Configuration(_))
    );
}

#[test]
fn mapping_file_loads_each_shape() {
    let dir = TempDir::new().unwrap();
    let flat = write(&dir, "flat.json", r#"{"P12345": "7157"}"#);
    let nested = write(
        &dir,
        "nested.json",
        r#"{"Homo sapiens": {"P12345": ["hsa:7157"]}}"#,
    );

    let flat = Mapping::load(camino::Utf8Path::new(&flat)).unwrap();
    assert_eq!(flat.candidates("P12345", None), vec!["7157"]);

    let nested = Mapping::load(camino::Utf8Path::new(&nested)).unwrap();
    assert!(nested.contains("P12345", Some("Homo sapiens")));
    assert!(!nested.contains("P12345", Some("Mus musculus")));

    let missing = dir.path().join("missing.json").to_string_lossy().into_owned();
    assert_matches!(
        Mapping::load(camino::Utf8Path::new(&missing)),
        Err(XrefError::Filesystem(_))
    );
}
