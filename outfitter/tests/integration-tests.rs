//! End-to-end pipeline runs over temp dirs with the fake driver.

use std::io::Write;
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use outfitter::driver::{DriverRegistry, FakeDriver};
use outfitter::events::{EventSink, EventsMode};
use outfitter::{
    do_apply, do_capture, do_plan, do_revert, do_verify, ApplyOptions, ApplySource, CaptureArgs,
    Config, Session,
};
use outfitter_schema::{Action, ActionStatus, EventLine};

struct World {
    _dir: temp_dir::TempDir,
    root: Utf8PathBuf,
}

impl World {
    fn new() -> Self {
        let dir = temp_dir::TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        World { _dir: dir, root }
    }

    fn write(&self, rel: &str, contents: &str) -> Utf8PathBuf {
        let path = self.root.join(rel);
        axoasset::LocalAsset::write_new_all(contents, &path).unwrap();
        path
    }

    fn read(&self, path: &Utf8Path) -> String {
        axoasset::LocalAsset::load_string(path).unwrap()
    }

    fn session(&self, installed: &[&str]) -> Session {
        self.session_with_driver(FakeDriver::with_installed(
            installed.iter().map(|s| s.to_string()),
        ))
    }

    fn session_with_driver(&self, driver: FakeDriver) -> Session {
        let state_root = self.root.join("state-root");
        let config = Config {
            modules_dir: self.root.join("modules"),
            profiles_dir: self.root.join("manifests"),
            state_root,
            driver: Some("fake".to_owned()),
            platform: "windows".to_owned(),
            parallel: 1,
            events: EventsMode::Off,
        };
        let mut session = Session::new(config).unwrap();
        session.drivers = DriverRegistry::with_drivers(vec![Box::new(driver)]);
        session
    }
}

fn app_status(actions: &[Action], id: &str) -> ActionStatus {
    actions
        .iter()
        .find_map(|a| match a {
            Action::App(app) if app.id == id => Some(app.status),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no app action '{id}'"))
}

const TWO_APP_MANIFEST: &str = r#"{
    "name": "dev-box",
    "apps": [
        { "id": "git", "refs": { "windows": "Git.Git" } },
        { "id": "curl", "refs": { "windows": "Curl.Curl" } }
    ]
}"#;

#[test]
fn apply_installs_missing_and_skips_installed() {
    let world = World::new();
    let manifest = world.write("m.jsonc", TWO_APP_MANIFEST);
    let mut session = world.session(&["Git.Git"]);

    let report = do_apply(
        &mut session,
        &ApplySource::Manifest(manifest),
        &ApplyOptions::default(),
    )
    .unwrap();

    assert_eq!(app_status(&report.record.actions, "git"), ActionStatus::Skipped);
    assert_eq!(app_status(&report.record.actions, "curl"), ActionStatus::Success);
    assert_eq!(report.record.summary.success, 1);
    assert_eq!(report.record.summary.skipped, 1);
    assert_eq!(report.record.summary.failed, 0);
    assert!(report.record.is_success());

    // the run record was persisted and reloads
    let reloaded = session.state.load_run_record(&session.run_id).unwrap();
    assert_eq!(reloaded.summary.success, 1);
    // the plan was persisted for apply-from-plan
    assert!(session.state.plan_path(&session.run_id).exists());
}

#[test]
fn failed_installs_are_partial_failures_not_aborts() {
    let world = World::new();
    let manifest = world.write(
        "m.jsonc",
        r#"{
            "apps": [
                { "id": "bad", "refs": { "windows": "Bad.App" } },
                { "id": "good", "refs": { "windows": "Good.App" } }
            ]
        }"#,
    );
    let mut driver = FakeDriver::with_installed([]);
    driver.fail_refs.insert("Bad.App".to_owned());
    let mut session = world.session_with_driver(driver);

    let report = do_apply(
        &mut session,
        &ApplySource::Manifest(manifest),
        &ApplyOptions::default(),
    )
    .unwrap();

    assert_eq!(app_status(&report.record.actions, "bad"), ActionStatus::Failed);
    assert_eq!(app_status(&report.record.actions, "good"), ActionStatus::Success);
    assert_eq!(report.record.summary.failed, 1);
    assert!(!report.record.is_success());
    // every action still reached a terminal status
    assert!(report.record.actions.iter().all(|a| a.status().is_terminal()
        || a.status() == ActionStatus::Skip
        || a.status() == ActionStatus::Skipped));
}

#[test]
fn dry_run_counts_installed_apps_as_success_and_writes_nothing() {
    let world = World::new();
    let manifest = world.write("m.jsonc", TWO_APP_MANIFEST);
    let mut session = world.session(&["Git.Git"]);

    let report = do_apply(
        &mut session,
        &ApplySource::Manifest(manifest),
        &ApplyOptions {
            dry_run: true,
            ..Default::default()
        },
    )
    .unwrap();

    // dry-run accounting: the already-installed app counts as success
    assert_eq!(report.record.summary.success, 2);
    assert_eq!(report.record.summary.skipped, 0);
    assert!(report.journal_path.is_none());
    assert!(report.record.dry_run);
}

#[test]
fn restores_are_skipped_unless_enabled() {
    let world = World::new();
    world.write("payload.txt", "config payload");
    let target = world.root.join("restored.txt");
    let manifest = world.write(
        "m.jsonc",
        &format!(
            r#"{{ "restore": [{{ "source": "payload.txt", "target": "{target}" }}] }}"#
        ),
    );
    let mut session = world.session(&[]);

    let report = do_apply(
        &mut session,
        &ApplySource::Manifest(manifest.clone()),
        &ApplyOptions::default(),
    )
    .unwrap();
    let Action::Restore(restore) = &report.record.actions[0] else {
        panic!("expected restore action");
    };
    assert_eq!(restore.status, ActionStatus::Skipped);
    assert_eq!(restore.reason.as_deref(), Some("restore not enabled"));
    assert!(!target.exists());

    let mut session = world.session(&[]);
    let report = do_apply(
        &mut session,
        &ApplySource::Manifest(manifest),
        &ApplyOptions {
            enable_restore: true,
            ..Default::default()
        },
    )
    .unwrap();
    let Action::Restore(restore) = &report.record.actions[0] else {
        panic!("expected restore action");
    };
    assert_eq!(restore.status, ActionStatus::Success);
    assert_eq!(world.read(&target), "config payload");
    assert!(report.journal_path.as_ref().unwrap().exists());
}

#[test]
fn apply_restore_revert_round_trip() {
    let world = World::new();
    world.write("src.txt", "managed contents");
    let target = world.write("target.txt", "original contents long");
    let manifest = world.write(
        "m.jsonc",
        &format!(
            r#"{{ "restore": [{{ "source": "src.txt", "target": "{target}" }}] }}"#
        ),
    );

    let mut session = world.session(&[]);
    let restore_run_id = session.run_id.clone();
    do_apply(
        &mut session,
        &ApplySource::Manifest(manifest),
        &ApplyOptions {
            enable_restore: true,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(world.read(&target), "managed contents");

    // a fresh command reverts the journal the restore wrote
    let mut session = world.session(&[]);
    let record = do_revert(&mut session, Some(&restore_run_id), false).unwrap();
    assert_eq!(
        record.reverted_restore_run_id.as_deref(),
        Some(restore_run_id.as_str())
    );
    assert_eq!(record.summary.failed, 0);
    assert_eq!(world.read(&target), "original contents long");
}

#[test]
fn second_apply_is_idempotent() {
    let world = World::new();
    world.write("src.txt", "stable contents");
    let target = world.root.join("t.txt");
    let manifest = world.write(
        "m.jsonc",
        &format!(
            r#"{{
                "apps": [{{ "id": "git", "refs": {{ "windows": "Git.Git" }} }}],
                "restore": [{{ "source": "src.txt", "target": "{target}" }}]
            }}"#
        ),
    );
    let opts = ApplyOptions {
        enable_restore: true,
        ..Default::default()
    };

    let mut session = world.session(&[]);
    let first = do_apply(&mut session, &ApplySource::Manifest(manifest.clone()), &opts).unwrap();
    assert_eq!(first.record.summary.failed, 0);
    assert_eq!(first.record.summary.success, 2);

    // the fake driver forgets between sessions, so reseed it as if the
    // install had really happened
    let mut session = world.session(&["Git.Git"]);
    let second = do_apply(&mut session, &ApplySource::Manifest(manifest), &opts).unwrap();
    assert_eq!(second.record.summary.failed, 0);
    // both the app and the restore are now skips
    assert_eq!(second.record.summary.skipped, 2);
}

#[test]
fn apply_from_plan_replays_the_same_actions() {
    let world = World::new();
    let manifest = world.write("m.jsonc", TWO_APP_MANIFEST);

    let mut session = world.session(&["Git.Git"]);
    let plan = do_plan(&mut session, &manifest).unwrap();
    let plan_path = session.state.plan_path(&session.run_id);
    assert!(plan_path.exists());

    let mut session = world.session(&["Git.Git"]);
    let report = do_apply(
        &mut session,
        &ApplySource::Plan(plan_path),
        &ApplyOptions::default(),
    )
    .unwrap();

    let planned_ids: Vec<&str> = plan.actions.iter().map(|a| a.id()).collect();
    let executed_ids: Vec<&str> = report.record.actions.iter().map(|a| a.id()).collect();
    assert_eq!(planned_ids, executed_ids);
    assert_eq!(app_status(&report.record.actions, "curl"), ActionStatus::Success);
}

#[test]
fn verify_reports_failures_and_not_implemented_checks() {
    let world = World::new();
    let exists = world.write("exists.txt", "x");
    let manifest = world.write(
        "m.jsonc",
        &format!(
            r#"{{
                "verify": [
                    {{ "type": "file-exists", "path": "{exists}" }},
                    {{ "type": "file-exists", "path": "{missing}" }},
                    {{ "type": "command-succeeds", "command": "some-tool --check" }}
                ]
            }}"#,
            missing = world.root.join("missing.txt"),
        ),
    );
    let mut session = world.session(&[]);
    let record = do_verify(&mut session, &manifest).unwrap();

    let statuses: Vec<ActionStatus> = record.actions.iter().map(|a| a.status()).collect();
    assert_eq!(
        statuses,
        [ActionStatus::Success, ActionStatus::Failed, ActionStatus::Success]
    );
    // command-succeeds must say out loud that it didn't really check
    let Action::Verify(not_impl) = &record.actions[2] else {
        panic!("expected verify action");
    };
    assert!(not_impl
        .message
        .as_deref()
        .unwrap()
        .contains("not implemented"));
    assert_eq!(record.summary.failed, 1);
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn event_stream_is_valid_jsonl_with_causal_per_app_ordering() {
    let world = World::new();
    let manifest = world.write("m.jsonc", TWO_APP_MANIFEST);
    let mut session = world.session(&[]);

    let buf = SharedBuf::default();
    session.sink = EventSink::with_stream(
        EventsMode::Jsonl,
        &session.run_id,
        Box::new(buf.clone()),
    );

    do_apply(
        &mut session,
        &ApplySource::Manifest(manifest),
        &ApplyOptions::default(),
    )
    .unwrap();

    let bytes = buf.0.lock().unwrap().clone();
    let text = String::from_utf8(bytes).unwrap();
    let lines: Vec<EventLine> = text
        .lines()
        .map(|line| serde_json::from_str(line).expect("every line is one JSON event"))
        .collect();
    assert!(!lines.is_empty());
    assert!(lines.iter().all(|l| l.run_id == session.run_id));

    // started before completed, per app
    let started: Vec<usize> = positions(&text, "app-started");
    let completed: Vec<usize> = positions(&text, "app-completed");
    assert_eq!(started.len(), 2);
    assert_eq!(completed.len(), 2);
    assert!(started[0] < completed[0]);
    // the run closes with a summary event
    assert!(text.lines().last().unwrap().contains("summary"));
}

fn positions(text: &str, needle: &str) -> Vec<usize> {
    text.lines()
        .enumerate()
        .filter(|(_, l)| l.contains(needle))
        .map(|(i, _)| i)
        .collect()
}

#[test]
fn capture_writes_a_profile_and_filters_runtimes() {
    let world = World::new();
    let mut session = world.session(&[
        "Git.Git",
        "Microsoft.VCRedist.2015",
        "Mozilla.Firefox",
    ]);

    let outcome = do_capture(
        &mut session,
        &CaptureArgs {
            profile: Some("captured-box".to_owned()),
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(outcome.app_count, 2);
    let manifest_path = Utf8PathBuf::from(&outcome.manifest_path);
    let text = world.read(&manifest_path);
    assert!(text.contains("Git.Git"));
    assert!(text.contains("Mozilla.Firefox"));
    assert!(!text.contains("VCRedist"));
}

#[test]
fn capture_discover_records_matching_modules() {
    let world = World::new();
    world.write(
        "modules/git/module.jsonc",
        r#"{
            "id": "apps.git",
            "displayName": "Git",
            "matches": { "winget": ["Git.*"] }
        }"#,
    );
    let mut session = world.session(&["Git.Git"]);

    let outcome = do_capture(
        &mut session,
        &CaptureArgs {
            profile: Some("discovered".to_owned()),
            discover: true,
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(outcome.discovered_modules, ["apps.git"]);
    let text = world.read(&Utf8PathBuf::from(&outcome.manifest_path));
    assert!(text.contains("apps.git"));
}

#[test]
fn capture_with_no_observed_packages_is_an_error() {
    let world = World::new();
    let mut session = world.session(&[]);
    let err = do_capture(
        &mut session,
        &CaptureArgs {
            profile: Some("empty".to_owned()),
            ..Default::default()
        },
    )
    .unwrap_err();
    assert_eq!(
        err.code(),
        outfitter_schema::ErrorCode::WingetCaptureEmpty
    );
}

#[test]
fn parallel_installs_complete_deterministically_in_the_record() {
    let world = World::new();
    let manifest = world.write(
        "m.jsonc",
        r#"{
            "apps": [
                { "id": "a", "refs": { "windows": "A.A" } },
                { "id": "b", "refs": { "windows": "B.B" } },
                { "id": "c", "refs": { "windows": "C.C" } },
                { "id": "d", "refs": { "windows": "D.D" } }
            ]
        }"#,
    );
    let mut session = world.session(&[]);
    session.config.parallel = 4;

    let report = do_apply(
        &mut session,
        &ApplySource::Manifest(manifest),
        &ApplyOptions::default(),
    )
    .unwrap();

    // record order follows the action list regardless of completion order
    let ids: Vec<&str> = report.record.actions.iter().map(|a| a.id()).collect();
    assert_eq!(ids, ["a", "b", "c", "d"]);
    assert_eq!(report.record.summary.success, 4);
}
