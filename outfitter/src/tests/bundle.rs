use crate::bundle::{
    create_bundle, expand_bundle, resolve_profile, ProfileSource,
};
use crate::catalog::Catalog;
use crate::manifest::{load, LoadOptions};
use crate::state::StateStore;
use crate::tests::Workspace;

#[test]
fn bundle_round_trips_apps_and_metadata() {
    let ws = Workspace::new();
    ws.write("payload/settings.json", r#"{ "theme": "dark" }"#);
    let manifest_path = ws.write(
        "profile.jsonc",
        r#"{
            "name": "workstation",
            "apps": [
                { "id": "git", "refs": { "windows": "Git.Git" } },
                { "id": "vscode", "refs": { "windows": "Microsoft.VisualStudioCode" } }
            ],
            "restore": [{ "source": "payload/settings.json", "target": "/tmp/settings.json" }]
        }"#,
    );
    let mut catalog = Catalog::new(ws.path("no-modules"));
    let loaded = load(&manifest_path, &mut catalog, &LoadOptions::default()).unwrap();

    let zip_path = ws.path("out/workstation.zip");
    let report = create_bundle(&loaded, &zip_path, &[], &mut catalog, "0.3.0", vec![]).unwrap();
    assert!(zip_path.exists());
    assert_eq!(report.metadata.schema_version, "1.0");
    assert_eq!(report.metadata.cli_version, "0.3.0");
    // staged-then-renamed: no temp artifact left behind
    assert!(!ws.path("out/workstation.zip.tmp").exists());

    let expanded = expand_bundle(&zip_path).unwrap();
    let reloaded = load(
        &expanded.manifest_path,
        &mut catalog,
        &LoadOptions {
            skip_module_expansion: true,
        },
    )
    .unwrap();
    let original_ids: Vec<&str> = loaded.manifest.app_ids().collect();
    let bundled_ids: Vec<&str> = reloaded.manifest.app_ids().collect();
    assert_eq!(original_ids, bundled_ids);
    assert!(expanded.metadata.is_some());

    // the inline payload travelled with the bundle
    assert!(expanded.root.join("payload/settings.json").exists());
    expanded.cleanup().unwrap();
}

#[test]
fn bundled_module_sources_point_into_configs() {
    let ws = Workspace::new();
    ws.write(
        "modules/git/module.jsonc",
        r#"{
            "id": "apps.git",
            "displayName": "Git",
            "matches": { "winget": ["Git.Git"] },
            "restore": [{ "source": "gitconfig", "target": "/tmp/gitconfig" }],
            "capture": { "files": [{ "source": "gitconfig", "dest": "gitconfig" }] }
        }"#,
    );
    ws.write("modules/git/gitconfig", "[user]\nname=pat\n");
    let manifest_path = ws.write(
        "profile.jsonc",
        r#"{ "name": "p", "configModules": ["apps.git"] }"#,
    );
    let mut catalog = Catalog::new(ws.path("modules"));
    let loaded = load(&manifest_path, &mut catalog, &LoadOptions::default()).unwrap();

    let zip_path = ws.path("p.zip");
    create_bundle(&loaded, &zip_path, &[], &mut catalog, "0.3.0", vec![]).unwrap();

    let expanded = expand_bundle(&zip_path).unwrap();
    assert!(expanded.has_configs);
    let reloaded = load(
        &expanded.manifest_path,
        &mut catalog,
        &LoadOptions {
            skip_module_expansion: true,
        },
    )
    .unwrap();
    // sources were rewritten bundle-relative, module expansion disabled
    assert!(reloaded.manifest.config_modules.is_empty());
    assert_eq!(reloaded.manifest.restore.len(), 1);
    assert!(reloaded.manifest.restore[0].source.starts_with("configs/git/"));
    assert!(expanded
        .root
        .join(&reloaded.manifest.restore[0].source)
        .exists());
    expanded.cleanup().unwrap();
}

#[test]
fn profile_probe_order_is_zip_then_dir_then_flat() {
    let ws = Workspace::new();
    ws.write("profiles/dev.jsonc", "{}");
    ws.write("profiles/dev/manifest.jsonc", "{}");
    assert_eq!(
        resolve_profile("dev", &ws.path("profiles")),
        Some(ProfileSource::Manifest(
            ws.path("profiles/dev/manifest.jsonc")
        ))
    );

    ws.write("profiles/dev.zip", "not really a zip, but probed first");
    assert_eq!(
        resolve_profile("dev", &ws.path("profiles")),
        Some(ProfileSource::Zip(ws.path("profiles/dev.zip")))
    );

    assert_eq!(resolve_profile("absent", &ws.path("profiles")), None);
}

#[test]
fn flat_manifest_is_the_last_resort() {
    let ws = Workspace::new();
    ws.write("profiles/solo.jsonc", "{}");
    assert_eq!(
        resolve_profile("solo", &ws.path("profiles")),
        Some(ProfileSource::Manifest(ws.path("profiles/solo.jsonc")))
    );
}

#[test]
fn run_ids_sort_newest_first() {
    let ws = Workspace::new();
    let state = StateStore::new(ws.path("state-root"));
    state.ensure_layout().unwrap();

    for run_id in ["20240101-000000-000-m", "20240103-000000-000-m", "20240102-000000-000-m"] {
        let record = outfitter_schema::RunRecord {
            run_id: run_id.to_owned(),
            timestamp: "2024-01-01T00:00:00Z".to_owned(),
            command: "plan".to_owned(),
            dry_run: false,
            manifest: None,
            summary: Default::default(),
            actions: vec![],
            warnings: vec![],
            reverted_restore_run_id: None,
        };
        state.save_run_record(&record).unwrap();
    }
    let ids = state.list_run_ids().unwrap();
    assert_eq!(
        ids,
        [
            "20240103-000000-000-m",
            "20240102-000000-000-m",
            "20240101-000000-000-m"
        ]
    );
}
