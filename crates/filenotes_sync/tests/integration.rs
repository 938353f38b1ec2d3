//! Integration tests for the replicator against in-memory and directory
//! remotes.

use chrono::Utc;
use filenotes_sync::{
    CloudService, DirectoryCloud, EventType, FileSettings, LocalFileSystem, NotesManager,
    ObserverResult, Replicator, RunLatch, RunOutcome, SettingsStore, SyncConfig, SyncError,
    SyncMode,
};
use filenotes_testkit::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

fn event_types(events: &[filenotes_sync::Event]) -> Vec<EventType> {
    events.iter().map(|e| e.event_type).collect()
}

#[test]
fn fresh_install_with_empty_notes_dir_downloads_everything() {
    let ws = TestWorkspace::new();
    ws.write_remote("a.txt", "alpha", at(1_000));
    ws.write_remote("b.txt", "beta", at(2_000));
    let (replicator, events) = ws.observed_replicator();

    let before = Utc::now();
    let outcome = replicator.invoke();

    let RunOutcome::Completed(report) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(report.mode, SyncMode::FirstSync);
    assert_eq!(report.downloads.len(), 2);
    assert_eq!(ws.local_names(), vec!["a.txt", "b.txt"]);
    assert_eq!(ws.read_local("a.txt").as_deref(), Some(&b"alpha"[..]));

    let events = drain(&events);
    assert_eq!(
        event_types(&events),
        vec![EventType::LocalUpdate, EventType::LocalUpdate]
    );
    assert_eq!(events[0].path, "/a.txt");
    assert_eq!(events[0].message(), "Local update: /a.txt");

    assert!(ws.last_sync().unwrap() >= before);
    assert!(!ws.settings.replication_required());
}

#[test]
fn fresh_install_with_empty_remote_uploads() {
    let ws = TestWorkspace::new();
    ws.write_local("x.txt", "local note", at(1_000));
    let (replicator, events) = ws.observed_replicator();

    assert!(replicator.invoke().is_completed());

    assert_eq!(ws.remote_names(), vec!["x.txt"]);
    assert_eq!(ws.cloud.contents("x.txt").unwrap(), b"local note");
    assert_eq!(event_types(&drain(&events)), vec![EventType::RemoteUpdate]);
    assert_eq!(replicator.update_count(), 1);
}

#[test]
fn first_sync_conflict_keeps_both_versions() {
    let ws = TestWorkspace::new();
    ws.write_local("n.txt", "0123456789", at(1_000));
    ws.write_remote("n.txt", "01234567890123456789", at(1_000));
    let (replicator, events) = ws.observed_replicator();

    let outcome = replicator.invoke();

    assert!(outcome.is_completed());
    assert_eq!(ws.local_names(), vec!["n.txt", "n.txt.conflict"]);
    assert_eq!(ws.read_local("n.txt").unwrap(), b"0123456789");
    assert_eq!(
        ws.read_local("n.txt.conflict").unwrap(),
        b"01234567890123456789"
    );
    assert_eq!(ws.local.describe("n.txt").unwrap().last_modified, at(1_000));
    assert_eq!(ws.remote_names(), vec!["n.txt"]);

    assert!(drain(&events).is_empty());
    assert_eq!(replicator.update_count(), 0);
    assert_eq!(outcome.report().unwrap().conflicts, vec!["n.txt.conflict"]);
}

#[test]
fn incremental_local_delete_propagates() {
    let ws = TestWorkspace::with_last_sync(at(5_000));
    ws.write_remote("old.txt", "stale", at(1_000));
    let (replicator, events) = ws.observed_replicator();

    let outcome = replicator.invoke();

    assert!(outcome.is_completed());
    assert_eq!(outcome.report().unwrap().mode, SyncMode::Incremental(at(5_000)));
    assert!(ws.remote_names().is_empty());
    let events = drain(&events);
    assert_eq!(event_types(&events), vec![EventType::RemoteDelete]);
    assert_eq!(events[0].message(), "Remote delete: /old.txt");
}

#[test]
fn incremental_remote_update_downloads() {
    let ws = TestWorkspace::with_last_sync(at(5_000));
    ws.write_local("n", "old", at(1_000));
    ws.write_remote("n", "new", at(6_000));
    let (replicator, events) = ws.observed_replicator();

    assert!(replicator.invoke().is_completed());

    assert_eq!(ws.read_local("n").unwrap(), b"new");
    assert_eq!(event_types(&drain(&events)), vec![EventType::LocalUpdate]);
}

#[test]
fn incremental_true_conflict_keeps_both_versions() {
    let ws = TestWorkspace::with_last_sync(at(5_000));
    ws.write_local("n", "mine", at(6_000));
    ws.write_remote("n", "theirs", at(7_000));
    let (replicator, events) = ws.observed_replicator();

    assert!(replicator.invoke().is_completed());

    assert_eq!(ws.read_local("n").unwrap(), b"mine");
    assert_eq!(ws.read_local("n.conflict").unwrap(), b"theirs");
    assert_eq!(ws.cloud.contents("n").unwrap(), b"theirs");
    assert!(drain(&events).is_empty());
}

#[test]
fn incremental_remote_delete_propagates() {
    let ws = TestWorkspace::with_last_sync(at(5_000));
    ws.write_local("gone.txt", "x", at(1_000));
    let (replicator, events) = ws.observed_replicator();

    assert!(replicator.invoke().is_completed());

    assert!(ws.local_names().is_empty());
    assert_eq!(event_types(&drain(&events)), vec![EventType::LocalDelete]);
}

#[test]
fn local_pass_events_precede_remote_pass_events() {
    let ws = TestWorkspace::with_last_sync(at(5_000));
    ws.write_local("b.txt", "new local", at(6_000));
    ws.write_remote("a.txt", "old remote", at(1_000));
    ws.write_remote("c.txt", "new remote", at(7_000));
    let (replicator, events) = ws.observed_replicator();

    assert!(replicator.invoke().is_completed());

    assert_eq!(
        event_types(&drain(&events)),
        vec![
            EventType::RemoteUpdate,
            EventType::RemoteDelete,
            EventType::LocalUpdate,
        ]
    );
    assert_eq!(ws.local_names(), vec!["b.txt", "c.txt"]);
    assert_eq!(ws.remote_names(), vec!["b.txt", "c.txt"]);
}

#[test]
fn second_run_after_sync_is_quiet() {
    let ws = TestWorkspace::new();
    ws.write_local("a.txt", "a", at(1_000));
    ws.write_remote("b.txt", "b", at(2_000));
    ws.write_local("c.txt", "local c", at(3_000));
    ws.write_remote("c.txt", "remote c", at(4_000));
    let (replicator, events) = ws.observed_replicator();

    assert!(replicator.invoke().is_completed());
    assert_eq!(replicator.update_count(), 3);
    let first_checkpoint = ws.last_sync().unwrap();
    drain(&events);

    let outcome = replicator.invoke();

    assert!(outcome.is_completed());
    assert_eq!(outcome.report().unwrap().mode, SyncMode::Incremental(first_checkpoint));
    assert_eq!(replicator.update_count(), 0);
    assert!(drain(&events).is_empty());
    assert!(ws.last_sync().unwrap() >= first_checkpoint);
}

#[test]
fn conflict_copy_is_removed_by_the_next_incremental_run() {
    let ws = TestWorkspace::with_last_sync(at(5_000));
    ws.write_local("n", "mine", at(6_000));
    ws.write_remote("n", "theirs", at(7_000));
    let replicator = ws.replicator();
    assert!(replicator.invoke().is_completed());

    // The copy exists only locally and predates the new checkpoint, so the
    // incremental table reads it as deleted remotely.
    let outcome = replicator.invoke();

    assert!(outcome.is_completed());
    let report = outcome.report().unwrap();
    assert_eq!(report.local_deletes.len(), 1);
    assert_eq!(report.local_deletes[0].name, "n.conflict");
    assert_eq!(ws.local_names(), vec!["n"]);
}

#[test]
fn transfer_failure_keeps_checkpoint_and_applied_work() {
    let ws = TestWorkspace::with_last_sync(at(5_000));
    ws.write_remote("a.txt", "a", at(6_000));
    ws.write_remote("b.txt", "b", at(6_000));
    ws.write_remote("c.txt", "c", at(6_000));
    ws.cloud.fail_transfers_for("b.txt");
    ws.settings.set_replication_required(true).unwrap();
    let (replicator, events) = ws.observed_replicator();

    let outcome = replicator.invoke();

    let RunOutcome::Failed { error, report } = outcome else {
        panic!("expected a failed run");
    };
    assert!(error.is_retryable());
    assert_eq!(report.downloads.len(), 1);
    assert_eq!(ws.local_names(), vec!["a.txt"]);
    assert_eq!(drain(&events).len(), 1);
    assert_eq!(ws.last_sync(), Some(at(5_000)));
    assert!(ws.settings.replication_required());
    assert_eq!(replicator.stats().runs_failed, 1);

    ws.cloud.clear_failures();
    let retry = replicator.invoke();

    // The retry re-enters with the old checkpoint, so the file downloaded
    // before the failure now looks changed on both sides.
    assert!(retry.is_completed());
    assert_eq!(retry.report().unwrap().conflicts, vec!["a.txt.conflict"]);
    assert_eq!(
        ws.local_names(),
        vec!["a.txt", "a.txt.conflict", "b.txt", "c.txt"]
    );
    assert!(ws.last_sync().unwrap() > at(5_000));
    assert!(!ws.settings.replication_required());
}

#[test]
fn listing_failure_changes_nothing() {
    let ws = TestWorkspace::new();
    ws.write_local("a.txt", "a", at(1_000));
    ws.cloud.fail_listing(true);
    let (replicator, events) = ws.observed_replicator();

    let outcome = replicator.invoke();

    assert!(matches!(
        outcome.error(),
        Some(SyncError::ProviderUnavailable { .. })
    ));
    assert_eq!(outcome.report().unwrap().update_count(), 0);
    assert!(ws.remote_names().is_empty());
    assert!(drain(&events).is_empty());
    assert_eq!(ws.last_sync(), None);
}

#[test]
fn remote_file_with_temp_shaped_name_is_left_alone() {
    let ws = TestWorkspace::new();
    ws.write_remote(".draft.filenotes.tmp", "draft", at(1_000));
    ws.write_remote("a.txt", "a", at(1_000));
    let replicator = ws.replicator();

    assert!(replicator.invoke().is_completed());
    assert_eq!(ws.local_names(), vec!["a.txt"]);
    assert!(!ws.notes_dir().join(".draft.filenotes.tmp").exists());

    let outcome = replicator.invoke();
    assert!(outcome.is_completed());
    assert_eq!(outcome.report().unwrap().update_count(), 0);
    assert_eq!(ws.remote_names(), vec![".draft.filenotes.tmp", "a.txt"]);
    assert_eq!(
        ws.cloud.contents(".draft.filenotes.tmp").unwrap(),
        b"draft".to_vec()
    );
}

#[cfg(unix)]
#[test]
fn backslash_in_a_local_name_replicates() {
    let ws = TestWorkspace::new();
    ws.write_local("a\\b.txt", "ab", at(1_000));
    ws.write_remote("other.txt", "other", at(1_000));

    let outcome = ws.replicator().invoke();

    assert!(outcome.is_completed());
    assert_eq!(ws.read_local("other.txt").unwrap(), b"other".to_vec());
    assert_eq!(ws.cloud.contents("a\\b.txt").unwrap(), b"ab".to_vec());
    assert!(ws.last_sync().is_some());
}

#[test]
fn unauthenticated_run_is_a_noop() {
    let ws = TestWorkspace::new();
    ws.write_local("a.txt", "a", at(1_000));
    ws.cloud.set_authenticated(false);
    let replicator = ws.replicator();

    assert!(matches!(replicator.invoke(), RunOutcome::NotAuthenticated));
    assert!(ws.remote_names().is_empty());
    assert_eq!(ws.last_sync(), None);
    assert!(matches!(
        replicator.preview(),
        Err(SyncError::NotAuthenticated)
    ));
}

#[test]
fn invoke_during_active_run_is_a_noop() {
    let ws = TestWorkspace::new();
    ws.write_remote("a.txt", "a", at(1_000));
    let latch = Arc::new(RunLatch::new());
    let replicator = Replicator::new(
        ws.config.clone(),
        Arc::clone(&ws.cloud),
        Arc::clone(&ws.settings),
        Arc::clone(&ws.settings),
    )
    .with_latch(Arc::clone(&latch));

    let guard = latch.try_acquire().unwrap();
    assert!(matches!(replicator.invoke(), RunOutcome::AlreadyRunning));
    assert!(ws.local_names().is_empty());
    assert_eq!(ws.last_sync(), None);

    drop(guard);
    assert!(replicator.invoke().is_completed());
    assert_eq!(ws.local_names(), vec!["a.txt"]);
}

#[test]
fn failing_observers_do_not_stop_the_run() {
    let ws = TestWorkspace::new();
    ws.write_remote("a.txt", "a", at(1_000));
    ws.write_remote("b.txt", "b", at(1_000));
    let replicator = ws.replicator();
    replicator.add_observer(|_: &filenotes_sync::Event| -> ObserverResult {
        Err("observer refused".into())
    });
    replicator.add_observer(|_: &filenotes_sync::Event| -> ObserverResult {
        panic!("observer crashed")
    });
    let (observer, events) = filenotes_sync::ChannelObserver::new();
    replicator.add_observer(observer);

    assert!(replicator.invoke().is_completed());
    assert_eq!(drain(&events).len(), 2);
    assert_eq!(ws.local_names(), vec!["a.txt", "b.txt"]);
}

#[test]
fn preview_matches_the_following_run() {
    let ws = TestWorkspace::with_last_sync(at(5_000));
    ws.write_local("up.txt", "u", at(6_000));
    ws.write_remote("down.txt", "d", at(6_000));
    ws.write_remote("stale.txt", "s", at(1_000));
    let replicator = ws.replicator();

    let plan = replicator.preview().unwrap();
    let planned: Vec<_> = plan.actions.iter().map(|a| a.verb()).collect();
    assert_eq!(planned, vec!["upload", "download", "delete remote"]);
    assert_eq!(ws.remote_names(), vec!["down.txt", "stale.txt"]);

    let outcome = replicator.invoke();
    assert_eq!(outcome.report().unwrap().update_count(), plan.len());
}

#[test]
fn directory_remote_round_trip() {
    let temp = TempDir::new().unwrap();
    let remote_dir = temp.path().join("remote");
    std::fs::create_dir(&remote_dir).unwrap();
    std::fs::write(remote_dir.join("from-remote.txt"), b"remote").unwrap();

    let config = SyncConfig::new(temp.path().join("notes"));
    let local = LocalFileSystem::open(&config).unwrap();
    local.write("from-local.txt", b"local").unwrap();

    let settings = Arc::new(FileSettings::open(temp.path().join("settings.json")).unwrap());
    let cloud = Arc::new(DirectoryCloud::new(local.clone(), &remote_dir));
    let replicator = Replicator::new(config, cloud, Arc::clone(&settings), Arc::clone(&settings))
        .with_latch(Arc::new(RunLatch::new()));

    assert!(replicator.invoke().is_completed());
    assert_eq!(
        std::fs::read(remote_dir.join("from-local.txt")).unwrap(),
        b"local"
    );
    assert_eq!(local.read("from-remote.txt").unwrap(), b"remote");

    let checkpoint = FileSettings::open(temp.path().join("settings.json"))
        .unwrap()
        .last_sync()
        .unwrap();
    assert!(checkpoint.is_some());

    std::fs::remove_file(remote_dir.join("from-local.txt")).unwrap();
    let outcome = replicator.invoke();

    assert!(outcome.is_completed());
    assert_eq!(outcome.report().unwrap().local_deletes.len(), 1);
    let names: Vec<_> = local.files().unwrap().iter().map(|f| f.name.clone()).collect();
    assert_eq!(names, vec!["from-remote.txt"]);
}

#[test]
fn directory_remote_missing_is_unauthenticated() {
    let temp = TempDir::new().unwrap();
    let config = SyncConfig::new(temp.path().join("notes"));
    let local = LocalFileSystem::open(&config).unwrap();
    let cloud = DirectoryCloud::new(local, temp.path().join("absent"));

    assert!(!cloud.is_authenticated());
    assert!(matches!(cloud.login(), Err(SyncError::NotAuthenticated)));
}
