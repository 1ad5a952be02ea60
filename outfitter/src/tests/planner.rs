use std::collections::BTreeSet;

use crate::catalog::Catalog;
use crate::manifest::{load, LoadOptions};
use crate::planner::{build_plan, PlanInputs};
use crate::tests::Workspace;
use outfitter_schema::{Action, ActionStatus, Plan};

const INPUTS: PlanInputs<'static> = PlanInputs {
    driver: "fake",
    platform: "windows",
    run_id: "20240101-000000-000-test",
    created_utc: "2024-01-01T00:00:00Z",
};

fn plan_for(ws: &Workspace, manifest: &str, observed: &[&str]) -> Plan {
    let path = ws.write("m.jsonc", manifest);
    let mut catalog = Catalog::new(ws.path("no-modules"));
    let loaded = load(&path, &mut catalog, &LoadOptions::default()).unwrap();
    let observed: BTreeSet<String> = observed.iter().map(|s| s.to_string()).collect();
    build_plan(&loaded, &observed, &INPUTS)
}

#[test]
fn already_installed_app_plans_as_skip() {
    let ws = Workspace::new();
    let plan = plan_for(
        &ws,
        r#"{ "apps": [{ "id": "git", "refs": { "windows": "Git.Git" } }] }"#,
        &["Git.Git"],
    );
    assert_eq!(plan.actions.len(), 1);
    let Action::App(app) = &plan.actions[0] else {
        panic!("expected an app action");
    };
    assert_eq!(app.id, "git");
    assert_eq!(app.package_ref, "Git.Git");
    assert_eq!(app.status, ActionStatus::Skip);
    assert_eq!(app.reason.as_deref(), Some("already installed"));
    assert_eq!(plan.summary.skip, 1);
    assert_eq!(plan.summary.install, 0);
}

#[test]
fn missing_app_plans_as_install() {
    let ws = Workspace::new();
    let plan = plan_for(
        &ws,
        r#"{ "apps": [{ "id": "git", "refs": { "windows": "Git.Git" } }] }"#,
        &[],
    );
    let Action::App(app) = &plan.actions[0] else {
        panic!("expected an app action");
    };
    assert_eq!(app.status, ActionStatus::Install);
    assert_eq!(plan.summary.install, 1);
}

#[test]
fn app_without_platform_ref_warns_instead_of_erroring() {
    let ws = Workspace::new();
    let plan = plan_for(
        &ws,
        r#"{ "apps": [{ "id": "mac-only", "refs": { "macos": "brew:thing" } }] }"#,
        &[],
    );
    assert!(plan.actions.is_empty());
    assert!(plan
        .warnings
        .iter()
        .any(|w| w.contains("mac-only") && w.contains("windows")));
}

#[test]
fn plan_order_is_apps_then_restores_then_verifies() {
    let ws = Workspace::new();
    let plan = plan_for(
        &ws,
        r#"{
            "verify": [{ "type": "file-exists", "path": "/tmp/x" }],
            "restore": [{ "source": "a", "target": "/tmp/a" }],
            "apps": [{ "id": "one", "refs": { "windows": "One.One" } }]
        }"#,
        &[],
    );
    let kinds: Vec<&str> = plan
        .actions
        .iter()
        .map(|a| match a {
            Action::App(_) => "app",
            Action::Restore(_) => "restore",
            Action::Verify(_) => "verify",
        })
        .collect();
    assert_eq!(kinds, ["app", "restore", "verify"]);
    assert_eq!(plan.summary.restore, 1);
    assert_eq!(plan.summary.verify, 1);
}

#[test]
fn empty_manifest_plans_to_an_empty_action_list() {
    let ws = Workspace::new();
    let plan = plan_for(&ws, "{}", &[]);
    assert!(plan.actions.is_empty());
    assert_eq!(plan.summary.install + plan.summary.skip, 0);
}

#[test]
fn plans_survive_a_disk_round_trip() {
    let ws = Workspace::new();
    let plan = plan_for(
        &ws,
        r#"{
            "apps": [{ "id": "git", "refs": { "windows": "Git.Git" } }],
            "restore": [{ "type": "merge", "format": "json", "arrayStrategy": "concat",
                          "source": "s.json", "target": "/tmp/t.json" }]
        }"#,
        &[],
    );
    let json = serde_json::to_string_pretty(&plan).unwrap();
    let reloaded: Plan = serde_json::from_str(&json).unwrap();
    assert_eq!(
        serde_json::to_value(&plan.actions).unwrap(),
        serde_json::to_value(&reloaded.actions).unwrap()
    );
    assert_eq!(plan.run_id, reloaded.run_id);
}

#[test]
fn deterministic_for_identical_inputs() {
    let ws1 = Workspace::new();
    let ws2 = Workspace::new();
    let src = r#"{
        "apps": [
            { "id": "a", "refs": { "windows": "A.A" } },
            { "id": "b", "refs": { "windows": "B.B" } }
        ]
    }"#;
    let p1 = plan_for(&ws1, src, &["B.B"]);
    let p2 = plan_for(&ws2, src, &["B.B"]);
    assert_eq!(
        serde_json::to_value(&p1.actions).unwrap(),
        serde_json::to_value(&p2.actions).unwrap()
    );
}
