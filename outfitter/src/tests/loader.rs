use crate::catalog::Catalog;
use crate::errors::OutfitterError;
use crate::manifest::{load, validate_profile, LoadOptions};
use crate::tests::Workspace;
use outfitter_schema::ErrorCode;

fn empty_catalog(ws: &Workspace) -> Catalog {
    Catalog::new(ws.path("no-modules"))
}

#[test]
fn empty_manifest_loads_with_defaults() {
    let ws = Workspace::new();
    let path = ws.write("empty.jsonc", "{}");
    let mut catalog = empty_catalog(&ws);
    let loaded = load(&path, &mut catalog, &LoadOptions::default()).unwrap();
    assert_eq!(loaded.manifest.version, 1);
    assert_eq!(loaded.manifest.name, "");
    assert!(loaded.manifest.apps.is_empty());
    assert!(loaded.manifest.restore.is_empty());
    assert_eq!(loaded.expanded_hash.len(), 16);
}

#[test]
fn unsupported_version_is_rejected() {
    let ws = Workspace::new();
    let path = ws.write("v9.jsonc", r#"{ "version": 9 }"#);
    let mut catalog = empty_catalog(&ws);
    let err = load(&path, &mut catalog, &LoadOptions::default()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ManifestValidationError);
}

#[test]
fn includes_append_after_includer() {
    let ws = Workspace::new();
    ws.write(
        "base.jsonc",
        r#"{
            "name": "base",
            "apps": [{ "id": "from-root", "refs": { "linux": "Root.App" } }],
            "includes": ["extra.jsonc"]
        }"#,
    );
    ws.write(
        "extra.jsonc",
        r#"{
            "name": "extra",
            "captured": "2024-01-01T00:00:00Z",
            "apps": [{ "id": "from-include", "refs": { "linux": "Extra.App" } }]
        }"#,
    );
    let mut catalog = empty_catalog(&ws);
    let loaded = load(&ws.path("base.jsonc"), &mut catalog, &LoadOptions::default()).unwrap();

    let ids: Vec<&str> = loaded.manifest.app_ids().collect();
    assert_eq!(ids, ["from-root", "from-include"]);
    // scalars: includer wins when set, include fills gaps
    assert_eq!(loaded.manifest.name, "base");
    assert_eq!(
        loaded.manifest.captured.as_deref(),
        Some("2024-01-01T00:00:00Z")
    );
}

#[test]
fn include_cycle_is_detected_with_both_paths() {
    let ws = Workspace::new();
    ws.write("a.jsonc", r#"{ "includes": ["b.jsonc"] }"#);
    ws.write("b.jsonc", r#"{ "includes": ["a.jsonc"] }"#);
    let mut catalog = empty_catalog(&ws);
    let err = load(&ws.path("a.jsonc"), &mut catalog, &LoadOptions::default()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ManifestValidationError);
    let OutfitterError::IncludeCycle { chain } = &err else {
        panic!("expected IncludeCycle, got {err:?}");
    };
    let text: Vec<&str> = chain.iter().map(|p| p.as_str()).collect();
    assert!(text.iter().any(|p| p.ends_with("a.jsonc")));
    assert!(text.iter().any(|p| p.ends_with("b.jsonc")));
}

#[test]
fn self_include_fails_the_cycle_check() {
    let ws = Workspace::new();
    ws.write("selfish.jsonc", r#"{ "includes": ["selfish.jsonc"] }"#);
    let mut catalog = empty_catalog(&ws);
    let err = load(
        &ws.path("selfish.jsonc"),
        &mut catalog,
        &LoadOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, OutfitterError::IncludeCycle { .. }));
}

#[test]
fn unknown_module_lists_known_ids_sorted() {
    let ws = Workspace::new();
    ws.write(
        "modules/zeta/module.jsonc",
        r#"{ "id": "apps.zeta", "displayName": "Zeta", "matches": { "winget": ["Zeta.Zeta"] } }"#,
    );
    ws.write(
        "modules/alpha/module.jsonc",
        r#"{ "id": "apps.alpha", "displayName": "Alpha", "matches": { "winget": ["Alpha.Alpha"] } }"#,
    );
    let path = ws.write(
        "m.jsonc",
        r#"{ "configModules": ["apps.nonexistent"] }"#,
    );
    let mut catalog = Catalog::new(ws.path("modules"));
    let err = load(&path, &mut catalog, &LoadOptions::default()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ManifestValidationError);
    let OutfitterError::UnknownModule { id, known } = &err else {
        panic!("expected UnknownModule, got {err:?}");
    };
    assert_eq!(id, "apps.nonexistent");
    assert_eq!(known, &["apps.alpha".to_owned(), "apps.zeta".to_owned()]);
}

#[test]
fn config_modules_expand_once_with_provenance() {
    let ws = Workspace::new();
    ws.write(
        "modules/git/module.jsonc",
        r#"{
            "id": "apps.git",
            "displayName": "Git",
            "matches": { "winget": ["Git.Git"] },
            "restore": [{ "source": "gitconfig", "target": "/tmp/out/gitconfig" }],
            "verify": [{ "type": "command-exists", "command": "git" }]
        }"#,
    );
    let path = ws.write(
        "m.jsonc",
        r#"{
            "restore": [{ "source": "inline.txt", "target": "/tmp/out/inline.txt" }],
            "configModules": ["apps.git", "apps.git"]
        }"#,
    );
    let mut catalog = Catalog::new(ws.path("modules"));
    let loaded = load(&path, &mut catalog, &LoadOptions::default()).unwrap();

    // listed twice, expanded once; module items land after inline items
    assert_eq!(loaded.manifest.restore.len(), 2);
    assert_eq!(loaded.manifest.restore[0].from_module, None);
    assert_eq!(
        loaded.manifest.restore[1].from_module.as_deref(),
        Some("apps.git")
    );
    // module-relative sources are anchored to the module's directory
    assert!(loaded.manifest.restore[1].source.ends_with("git/gitconfig"));
    assert_eq!(loaded.manifest.verify.len(), 1);
}

#[test]
fn exclude_configs_suppresses_listed_modules() {
    let ws = Workspace::new();
    ws.write(
        "modules/git/module.jsonc",
        r#"{
            "id": "apps.git",
            "displayName": "Git",
            "matches": { "winget": ["Git.Git"] },
            "restore": [{ "source": "gitconfig", "target": "/tmp/gitconfig" }]
        }"#,
    );
    let path = ws.write(
        "m.jsonc",
        r#"{ "configModules": ["apps.git"], "excludeConfigs": ["apps.git"] }"#,
    );
    let mut catalog = Catalog::new(ws.path("modules"));
    let loaded = load(&path, &mut catalog, &LoadOptions::default()).unwrap();
    assert!(loaded.manifest.restore.is_empty());
}

#[test]
fn expanded_hash_is_stable_and_ref_order_independent() {
    let ws = Workspace::new();
    let a = ws.write(
        "a/m.jsonc",
        r#"{ "name": "p", "apps": [{ "id": "x", "refs": { "windows": "X.X", "linux": "x" } }] }"#,
    );
    let b = ws.write(
        "b/m.jsonc",
        r#"{ "name": "p", "apps": [{ "id": "x", "refs": { "linux": "x", "windows": "X.X" } }] }"#,
    );
    let mut catalog = empty_catalog(&ws);
    let la = load(&a, &mut catalog, &LoadOptions::default()).unwrap();
    let lb = load(&b, &mut catalog, &LoadOptions::default()).unwrap();
    assert_eq!(la.expanded_hash, lb.expanded_hash);
    // raw hashes differ (different bytes), expanded hashes agree
    assert_ne!(la.raw_hash, lb.raw_hash);

    // loading the same file again is stable
    let la2 = load(&a, &mut catalog, &LoadOptions::default()).unwrap();
    assert_eq!(la.expanded_hash, la2.expanded_hash);
}

#[test]
fn single_objects_wrap_into_arrays() {
    let ws = Workspace::new();
    let path = ws.write(
        "single.jsonc",
        r#"{ "restore": { "source": "a", "target": "/tmp/a" } }"#,
    );
    let mut catalog = empty_catalog(&ws);
    let loaded = load(&path, &mut catalog, &LoadOptions::default()).unwrap();
    assert_eq!(loaded.manifest.restore.len(), 1);
}

#[test]
fn bundle_and_recipe_items_precede_inline_restore() {
    let ws = Workspace::new();
    ws.write(
        "bundles/devtools.jsonc",
        r#"{ "restore": [{ "source": "b.txt", "target": "/tmp/from-bundle" }] }"#,
    );
    ws.write(
        "recipes/shell.jsonc",
        r#"{ "restore": [{ "source": "r.txt", "target": "/tmp/from-recipe" }] }"#,
    );
    let path = ws.write(
        "manifests/m.jsonc",
        r#"{
            "bundles": ["devtools"],
            "recipes": ["shell"],
            "restore": [{ "source": "i.txt", "target": "/tmp/inline" }]
        }"#,
    );
    let mut catalog = empty_catalog(&ws);
    let loaded = load(&path, &mut catalog, &LoadOptions::default()).unwrap();
    let targets: Vec<&str> = loaded
        .manifest
        .restore
        .iter()
        .map(|r| r.target.as_str())
        .collect();
    assert_eq!(targets, ["/tmp/from-bundle", "/tmp/from-recipe", "/tmp/inline"]);
}

#[test]
fn comments_parse_and_yaml_is_accepted() {
    let ws = Workspace::new();
    let jsonc = ws.write(
        "c.jsonc",
        "{\n  // the name\n  \"name\": \"commented\" /* trailing */\n}",
    );
    let yaml = ws.write("y.yaml", "name: yamlish\nversion: 1\n");
    let mut catalog = empty_catalog(&ws);
    let lj = load(&jsonc, &mut catalog, &LoadOptions::default()).unwrap();
    assert_eq!(lj.manifest.name, "commented");
    let ly = load(&yaml, &mut catalog, &LoadOptions::default()).unwrap();
    assert_eq!(ly.manifest.name, "yamlish");
}

#[test]
fn validate_profile_reports_contract_violations() {
    let ws = Workspace::new();
    let missing = ws.path("nope.jsonc");
    let v = validate_profile(&missing).unwrap();
    assert!(!v.is_ok());

    let bad_apps = ws.write("bad.jsonc", r#"{ "apps": "not-an-array" }"#);
    let v = validate_profile(&bad_apps).unwrap();
    assert!(v.errors.iter().any(|e| e.contains("apps")));

    let warn = ws.write("warn.jsonc", r#"{ "apps": [{ "refs": { "linux": "x" } }] }"#);
    let v = validate_profile(&warn).unwrap();
    assert!(v.is_ok());
    assert!(v.warnings.iter().any(|w| w.contains("apps[0]")));
}
