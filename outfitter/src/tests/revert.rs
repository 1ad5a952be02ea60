use outfitter_schema::{ActionStatus, JournalAction, RestoreJournal, RestoreType};

use crate::manifest::RestoreItem;
use crate::restore::{apply_item, RestoreContext};
use crate::revert::{revert_journal, RevertContext};
use crate::state::StateStore;
use crate::tests::{read, Workspace};

const RESTORE_RUN: &str = "20240101-000000-000-test";
const REVERT_RUN: &str = "20240102-000000-000-test";

fn copy_item(source: &str, target: &str) -> RestoreItem {
    RestoreItem {
        kind: RestoreType::Copy,
        source: source.to_owned(),
        target: target.to_owned(),
        backup: None,
        requires_admin: false,
        format: Default::default(),
        array_strategy: Default::default(),
        dedupe: false,
        newline: Default::default(),
        from_module: None,
    }
}

fn run_restore(ws: &Workspace, state: &StateStore, source: &str, target: &str) -> RestoreJournal {
    let ctx = RestoreContext {
        run_id: RESTORE_RUN,
        manifest_dir: &ws.root,
        payload_root: None,
        state,
        dry_run: false,
        elevated: false,
    };
    let outcome = apply_item(&copy_item(source, target), &ctx);
    RestoreJournal {
        run_id: RESTORE_RUN.to_owned(),
        manifest_path: None,
        entries: vec![outcome.entry],
    }
}

#[test]
fn revert_restores_the_backup() {
    let ws = Workspace::new();
    let state = StateStore::new(ws.path("state-root"));
    state.ensure_layout().unwrap();

    ws.write("src.txt", "b2 new contents");
    let target = ws.write("target.txt", "b1");
    let journal = run_restore(&ws, &state, "src.txt", target.as_str());
    assert_eq!(read(&target), "b2 new contents");

    let results = revert_journal(
        &journal,
        &RevertContext {
            state: &state,
            run_id: REVERT_RUN,
            dry_run: false,
        },
    );
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, ActionStatus::Success);
    // the target is back to its pre-restore bytes
    assert_eq!(read(&target), "b1");
    // and the pre-revert state was preserved under the revert's own run id
    let safety = state.backup_path_for(REVERT_RUN, &target);
    assert_eq!(read(&safety), "b2 new contents");
}

#[test]
fn revert_deletes_targets_the_restore_created() {
    let ws = Workspace::new();
    let state = StateStore::new(ws.path("state-root"));
    state.ensure_layout().unwrap();

    ws.write("src.txt", "fresh file");
    let target = ws.path("created.txt");
    let journal = run_restore(&ws, &state, "src.txt", target.as_str());
    assert!(target.exists());

    let results = revert_journal(
        &journal,
        &RevertContext {
            state: &state,
            run_id: REVERT_RUN,
            dry_run: false,
        },
    );
    assert_eq!(results[0].status, ActionStatus::Success);
    assert!(!target.exists());
    // safety backup still lets the user recover the deleted file
    let safety = state.backup_path_for(REVERT_RUN, &target);
    assert_eq!(read(&safety), "fresh file");
}

#[test]
fn unrevertable_entries_are_skipped_with_an_explanation() {
    let ws = Workspace::new();
    let state = StateStore::new(ws.path("state-root"));
    state.ensure_layout().unwrap();
    let target = ws.write("t.txt", "current");

    let journal = RestoreJournal {
        run_id: RESTORE_RUN.to_owned(),
        manifest_path: None,
        entries: vec![outfitter_schema::JournalEntry {
            kind: RestoreType::Copy,
            source: "s".to_owned(),
            target: target.to_string(),
            resolved_source_path: None,
            target_path: Some(target.to_string()),
            backup_requested: false,
            target_existed_before: true,
            backup_created: false,
            backup_path: None,
            action: JournalAction::Restored,
            error: None,
        }],
    };
    let results = revert_journal(
        &journal,
        &RevertContext {
            state: &state,
            run_id: REVERT_RUN,
            dry_run: false,
        },
    );
    assert_eq!(results[0].status, ActionStatus::Skipped);
    assert!(results[0].detail.contains("no backup available"));
    assert_eq!(read(&target), "current");
}

#[test]
fn skipped_journal_entries_are_not_reverse_applied() {
    let ws = Workspace::new();
    let state = StateStore::new(ws.path("state-root"));
    state.ensure_layout().unwrap();
    let target = ws.write("t.txt", "same");

    let journal = RestoreJournal {
        run_id: RESTORE_RUN.to_owned(),
        manifest_path: None,
        entries: vec![outfitter_schema::JournalEntry {
            kind: RestoreType::Copy,
            source: "s".to_owned(),
            target: target.to_string(),
            resolved_source_path: None,
            target_path: Some(target.to_string()),
            backup_requested: true,
            target_existed_before: true,
            backup_created: false,
            backup_path: None,
            action: JournalAction::SkippedUpToDate,
            error: None,
        }],
    };
    let results = revert_journal(
        &journal,
        &RevertContext {
            state: &state,
            run_id: REVERT_RUN,
            dry_run: false,
        },
    );
    assert_eq!(results[0].status, ActionStatus::Skipped);
    assert_eq!(read(&target), "same");
}

#[test]
fn entries_revert_in_reverse_order() {
    let ws = Workspace::new();
    let state = StateStore::new(ws.path("state-root"));
    state.ensure_layout().unwrap();

    ws.write("s1.txt", "source one");
    ws.write("s2.txt", "source two");
    let t1 = ws.path("t1.txt");
    let t2 = ws.path("t2.txt");

    let ctx = RestoreContext {
        run_id: RESTORE_RUN,
        manifest_dir: &ws.root,
        payload_root: None,
        state: &state,
        dry_run: false,
        elevated: false,
    };
    let e1 = apply_item(&copy_item("s1.txt", t1.as_str()), &ctx).entry;
    let e2 = apply_item(&copy_item("s2.txt", t2.as_str()), &ctx).entry;
    let journal = RestoreJournal {
        run_id: RESTORE_RUN.to_owned(),
        manifest_path: None,
        entries: vec![e1, e2],
    };

    let results = revert_journal(
        &journal,
        &RevertContext {
            state: &state,
            run_id: REVERT_RUN,
            dry_run: true,
        },
    );
    // journal order was t1 then t2; revert visits t2 first
    assert!(results[0].target.ends_with("t2.txt"));
    assert!(results[1].target.ends_with("t1.txt"));
}

#[test]
fn dry_run_revert_touches_nothing() {
    let ws = Workspace::new();
    let state = StateStore::new(ws.path("state-root"));
    state.ensure_layout().unwrap();

    ws.write("src.txt", "replacement");
    let target = ws.write("t.txt", "before");
    let journal = run_restore(&ws, &state, "src.txt", target.as_str());
    assert_eq!(read(&target), "replacement");

    let results = revert_journal(
        &journal,
        &RevertContext {
            state: &state,
            run_id: REVERT_RUN,
            dry_run: true,
        },
    );
    assert_eq!(results[0].status, ActionStatus::DryRun);
    assert_eq!(read(&target), "replacement");
}
