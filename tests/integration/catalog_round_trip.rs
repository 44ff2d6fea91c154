//! Catalog documents survive TOML and JSON round trips

use scaffold_engine::catalog::{CapabilityKind, Catalog, Stage};
use scaffold_engine::error::CatalogError;
use serde_json::json;
use tempfile::TempDir;

const CATALOG_TOML: &str = r#"
[[frames]]
id = "fetch"
name = "Fetch sources"
capability_kind = "process"
entry_point = "git fetch --all"
rollback_description = "nothing to undo"

[[frames]]
id = "lint"
name = "Lint"
capability_kind = "in_process"
entry_point = "builtin.echo"
dependencies = ["fetch"]

[frames.parameters]
timeout_secs = 30
resources = { cpu = 10 }

[frames.success_criteria]
lint_clean = true

[[frames]]
id = "report"
name = "Report"
capability_kind = "remote"
entry_point = "http://127.0.0.1:9/report"
dependencies = ["fetch", "lint"]

[[scaffolds]]
id = "hygiene"
name = "Code hygiene"
description = "Fetch, lint, report"
version = "2.1"
dependencies = ["git"]

[scaffolds.stages]
1 = ["fetch"]
4 = ["lint"]
8 = ["report"]

[scaffolds.success_criteria]
lint_clean = true
"#;

fn write_source(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("scaffolds.toml");
    std::fs::write(&path, CATALOG_TOML).unwrap();
    path
}

#[test]
fn test_toml_catalog_loads() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::load(&write_source(&dir)).unwrap();

    assert_eq!(catalog.list_frames().len(), 3);
    let lint = catalog.get_frame("lint").unwrap();
    assert_eq!(lint.capability_kind, CapabilityKind::InProcess);
    assert_eq!(lint.parameters["resources"], json!({"cpu": 10}));
    assert_eq!(lint.version, "1.0");

    let hygiene = catalog.get_scaffold("hygiene").unwrap();
    assert_eq!(hygiene.version, "2.1");
    assert_eq!(hygiene.frame_ids(Stage::Publish), ["report".to_string()]);
    assert!(hygiene.frame_ids(Stage::Plan).is_empty());
    assert!(hygiene.is_load_bearing(&lint));
}

#[test]
fn test_toml_json_toml_preserves_graph() {
    let dir = TempDir::new().unwrap();
    let original = Catalog::load(&write_source(&dir)).unwrap();

    let json_path = dir.path().join("copy.json");
    original.save(&json_path).unwrap();
    let from_json = Catalog::load(&json_path).unwrap();

    let toml_path = dir.path().join("copy.toml");
    from_json.save(&toml_path).unwrap();
    let from_toml = Catalog::load(&toml_path).unwrap();

    for copy in [&from_json, &from_toml] {
        assert_eq!(copy.frame_ids(), original.frame_ids());
        assert_eq!(copy.dependency_edges(), original.dependency_edges());
        assert_eq!(copy.fingerprint(), original.fingerprint());
        assert_eq!(
            copy.get_scaffold("hygiene").unwrap(),
            original.get_scaffold("hygiene").unwrap()
        );
        assert_eq!(
            copy.get_frame("lint").unwrap(),
            original.get_frame("lint").unwrap()
        );
    }
}

#[test]
fn test_unresolved_dependency_rejected_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(
        &path,
        r#"{"frames": [{"id": "a", "name": "a", "capability_kind": "in_process",
            "entry_point": "a", "dependencies": ["missing"]}]}"#,
    )
    .unwrap();

    assert!(matches!(
        Catalog::load(&path),
        Err(CatalogError::DependencyUnresolved { .. })
    ));
}

#[test]
fn test_unknown_extension_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("catalog.yaml");
    std::fs::write(&path, "frames: []").unwrap();

    assert!(matches!(
        Catalog::load(&path),
        Err(CatalogError::UnsupportedFormat(_))
    ));
}
