use crate::catalog::{Catalog, Discoveries};
use crate::state::{hash16, machine_name};
use crate::tests::Workspace;

fn git_module(ws: &Workspace) {
    ws.write(
        "modules/git/module.jsonc",
        r#"{
            // reusable recipes for git
            "id": "apps.git",
            "displayName": "Git",
            "matches": {
                "winget": ["Git.Git"],
                "exe": ["git*"]
            },
            "capture": {
                "files": [
                    { "source": "gitconfig", "dest": "gitconfig" },
                    { "source": "missing-but-fine", "dest": "x", "optional": true },
                    { "source": "missing-and-required", "dest": "y" }
                ],
                "excludeGlobs": ["*.secret"]
            },
            "sensitive": { "files": ["*credentials*"] }
        }"#,
    );
    ws.write("modules/git/gitconfig", "[user]\nname=pat\n");
}

#[test]
fn scan_is_lazy_and_tolerant_of_broken_modules() {
    let ws = Workspace::new();
    git_module(&ws);
    ws.write("modules/broken/module.jsonc", "{ not json at all");
    ws.write(
        "modules/no-matches/module.jsonc",
        r#"{ "id": "apps.empty", "displayName": "Empty", "matches": {} }"#,
    );

    let mut catalog = Catalog::new(ws.path("modules"));
    assert_eq!(catalog.known_ids().unwrap(), ["apps.git"]);
    let warnings = catalog.warnings().unwrap();
    assert_eq!(warnings.len(), 2);
}

#[test]
fn duplicate_ids_keep_the_first_and_warn() {
    let ws = Workspace::new();
    ws.write(
        "modules/a/module.jsonc",
        r#"{ "id": "apps.dup", "displayName": "First", "matches": { "winget": ["A.A"] } }"#,
    );
    ws.write(
        "modules/b/module.jsonc",
        r#"{ "id": "apps.dup", "displayName": "Second", "matches": { "winget": ["B.B"] } }"#,
    );
    let mut catalog = Catalog::new(ws.path("modules"));
    // walkdir visits a/ before b/, so First wins
    assert_eq!(
        catalog.get("apps.dup").unwrap().unwrap().display_name,
        "First"
    );
    assert!(catalog.warnings().unwrap()[0].contains("duplicate"));
}

#[test]
fn matcher_compares_globs_case_insensitively() {
    let ws = Workspace::new();
    git_module(&ws);
    let mut catalog = Catalog::new(ws.path("modules"));

    let matches = catalog
        .matches_for_apps(
            &["git.git".to_owned(), "Unrelated.Thing".to_owned()],
            &Discoveries {
                exe_names: vec!["GIT.EXE".to_owned()],
                uninstall_display_names: vec![],
            },
        )
        .unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].module_id, "apps.git");
    let fields: Vec<&str> = matches[0].reasons.iter().map(|r| r.field.as_str()).collect();
    assert_eq!(fields, ["winget", "exe"]);
}

#[test]
fn no_hits_means_no_match_entries() {
    let ws = Workspace::new();
    git_module(&ws);
    let mut catalog = Catalog::new(ws.path("modules"));
    let matches = catalog
        .matches_for_apps(&["Other.App".to_owned()], &Discoveries::default())
        .unwrap();
    assert!(matches.is_empty());
}

#[test]
fn capture_copies_honour_deny_lists_and_optionality() {
    let ws = Workspace::new();
    git_module(&ws);
    let mut catalog = Catalog::new(ws.path("modules"));

    let payload = ws.path("payload");
    let report = catalog
        .capture_files(&["apps.git".to_owned()], &payload)
        .unwrap();

    assert_eq!(report.copied, ["git/gitconfig"]);
    assert!(payload.join("git/gitconfig").exists());
    // optional-and-missing is a skip, required-and-missing is a warning
    assert!(report.skipped.iter().any(|s| s.ends_with("/x")));
    assert!(report.missing.iter().any(|s| s.ends_with("/y")));
    assert!(report.warnings.iter().any(|w| w.contains("missing-and-required")));
    assert_eq!(report.modules_captured, ["apps.git"]);
}

#[test]
fn clear_forces_a_rescan() {
    let ws = Workspace::new();
    let mut catalog = Catalog::new(ws.path("modules"));
    assert!(catalog.is_empty().unwrap());

    git_module(&ws);
    // still cached as empty until cleared
    assert!(catalog.is_empty().unwrap());
    catalog.clear();
    assert_eq!(catalog.known_ids().unwrap(), ["apps.git"]);
}

#[test]
fn raw_hash_normalizes_line_endings() {
    let unix = hash16("{\n  \"a\": 1\n}\n");
    let windows = hash16("{\r\n  \"a\": 1\r\n}\r\n");
    assert_eq!(unix, windows);
    assert_eq!(unix.len(), 16);
    assert!(unix.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn machine_names_are_filename_safe() {
    let name = machine_name();
    assert!(!name.is_empty());
    assert!(name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
}
