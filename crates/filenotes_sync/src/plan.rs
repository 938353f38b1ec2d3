//! Reconciliation decision tables.
//!
//! Planning is pure: it only reads the two snapshots and the checkpoint. The
//! local pass always precedes the remote pass, and each pass follows snapshot
//! order, so applying a plan front to back reproduces the decision order.
//!
//! Modification times from the two sides come from two different clocks and
//! are compared as if they were one. A skewed device clock can therefore
//! make the wrong side win under first sync, or hide a change from the
//! incremental checkpoint comparison.

use crate::descriptor::{FileDescriptor, FileSet};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// Which algorithm a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// No checkpoint: last write wins per name, nothing is deleted.
    FirstSync,
    /// Changes are judged against the checkpoint; deletes propagate.
    Incremental(DateTime<Utc>),
}

impl SyncMode {
    /// Mode selected by a persisted checkpoint.
    pub fn from_last_sync(last_sync: Option<DateTime<Utc>>) -> Self {
        match last_sync {
            None => SyncMode::FirstSync,
            Some(since) => SyncMode::Incremental(since),
        }
    }
}

/// A single decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Fetch the remote file into the notes directory.
    Download(FileDescriptor),
    /// Copy the local file to the remote folder.
    Upload(FileDescriptor),
    /// Remove the local file; the remote side deleted it.
    DeleteLocal(FileDescriptor),
    /// Remove the remote file; the local side deleted it.
    DeleteRemote(FileDescriptor),
    /// Keep the local file and store the remote one next to it.
    ResolveConflict {
        /// Local version, left untouched.
        local: FileDescriptor,
        /// Remote version, downloaded under the conflict name.
        remote: FileDescriptor,
    },
}

impl Action {
    /// Name the action is about.
    pub fn name(&self) -> &str {
        match self {
            Action::Download(f)
            | Action::Upload(f)
            | Action::DeleteLocal(f)
            | Action::DeleteRemote(f) => &f.name,
            Action::ResolveConflict { local, .. } => &local.name,
        }
    }

    /// Short verb for logs and previews.
    pub fn verb(&self) -> &'static str {
        match self {
            Action::Download(_) => "download",
            Action::Upload(_) => "upload",
            Action::DeleteLocal(_) => "delete local",
            Action::DeleteRemote(_) => "delete remote",
            Action::ResolveConflict { .. } => "conflict",
        }
    }
}

/// The ordered decisions of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Algorithm used.
    pub mode: SyncMode,
    /// Decisions, local pass first.
    pub actions: Vec<Action>,
}

impl Plan {
    /// Plans a run for the given checkpoint.
    pub fn build(local: &FileSet, remote: &FileSet, last_sync: Option<DateTime<Utc>>) -> Self {
        let mode = SyncMode::from_last_sync(last_sync);
        let actions = match mode {
            SyncMode::FirstSync => first_sync(local, remote),
            SyncMode::Incremental(since) => incremental(local, remote, since),
        };
        Self { mode, actions }
    }

    /// True if the two sides already agree.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Number of decisions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }
}

/// Decisions without a checkpoint: last write wins, no deletes.
pub fn first_sync(local: &FileSet, remote: &FileSet) -> Vec<Action> {
    let mut actions = Vec::new();

    for l in local {
        let Some(r) = remote.get(&l.name) else {
            tracing::debug!("first sync: {}: remote is missing", l.name);
            actions.push(Action::Upload(l.clone()));
            continue;
        };

        match l.last_modified.cmp(&r.last_modified) {
            Ordering::Greater => {
                tracing::debug!("first sync: {}: local is newer", l.name);
                actions.push(Action::Upload(l.clone()));
            }
            Ordering::Less => {
                tracing::debug!("first sync: {}: remote is newer", l.name);
                actions.push(Action::Download(r.clone()));
            }
            Ordering::Equal if l.size == r.size => {
                tracing::debug!("first sync: {}: same age and size", l.name);
            }
            Ordering::Equal => {
                tracing::debug!("first sync: {}: same age, different sizes", l.name);
                actions.push(Action::ResolveConflict {
                    local: l.clone(),
                    remote: r.clone(),
                });
            }
        }
    }

    for r in remote {
        if !local.contains(&r.name) {
            tracing::debug!("first sync: {}: local is missing", r.name);
            actions.push(Action::Download(r.clone()));
        }
    }

    actions
}

/// Decisions against checkpoint `since`.
pub fn incremental(local: &FileSet, remote: &FileSet, since: DateTime<Utc>) -> Vec<Action> {
    let mut actions = Vec::new();

    for l in local {
        let r = remote.get(&l.name);
        let action = match (l.changed_since(since), r) {
            (false, None) => Some(Action::DeleteLocal(l.clone())),
            (false, Some(r)) if r.changed_since(since) => Some(Action::Download(r.clone())),
            (false, Some(_)) => None,
            (true, None) => Some(Action::Upload(l.clone())),
            (true, Some(r)) if !r.changed_since(since) => Some(Action::Upload(l.clone())),
            (true, Some(r)) => Some(Action::ResolveConflict {
                local: l.clone(),
                remote: r.clone(),
            }),
        };

        match action {
            Some(action) => {
                tracing::debug!("sync: {}: {}", l.name, action.verb());
                actions.push(action);
            }
            None => tracing::debug!("sync: {}: skip", l.name),
        }
    }

    for r in remote {
        if local.contains(&r.name) {
            continue;
        }
        if r.changed_since(since) {
            actions.push(Action::Download(r.clone()));
        } else {
            actions.push(Action::DeleteRemote(r.clone()));
        }
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn local(files: &[(&str, u64, i64)]) -> FileSet {
        FileSet::from_files(files.iter().map(|(name, size, mtime)| {
            FileDescriptor::local(*name, *size, at(*mtime), PathBuf::from("/notes").join(name))
        }))
        .unwrap()
    }

    fn remote(files: &[(&str, u64, i64)]) -> FileSet {
        FileSet::from_files(files.iter().map(|(name, size, mtime)| {
            FileDescriptor::remote(*name, *size, at(*mtime), format!("/{}", name))
        }))
        .unwrap()
    }

    fn summary(actions: &[Action]) -> Vec<(&'static str, String)> {
        actions
            .iter()
            .map(|a| (a.verb(), a.name().to_string()))
            .collect()
    }

    #[test]
    fn mode_from_checkpoint() {
        assert_eq!(SyncMode::from_last_sync(None), SyncMode::FirstSync);
        assert_eq!(
            SyncMode::from_last_sync(Some(at(5))),
            SyncMode::Incremental(at(5))
        );
    }

    #[test]
    fn first_sync_table() {
        let l = local(&[
            ("only-local", 1, 10),
            ("local-newer", 1, 20),
            ("remote-newer", 1, 10),
            ("same", 5, 10),
            ("conflict", 10, 10),
        ]);
        let r = remote(&[
            ("local-newer", 1, 10),
            ("remote-newer", 1, 20),
            ("same", 5, 10),
            ("conflict", 20, 10),
            ("only-remote", 1, 10),
        ]);

        assert_eq!(
            summary(&first_sync(&l, &r)),
            vec![
                ("upload", "only-local".to_string()),
                ("upload", "local-newer".to_string()),
                ("download", "remote-newer".to_string()),
                ("conflict", "conflict".to_string()),
                ("download", "only-remote".to_string()),
            ]
        );
    }

    #[test]
    fn first_sync_never_deletes() {
        let l = local(&[("a", 1, 1)]);
        let r = remote(&[("b", 1, 1)]);
        let actions = first_sync(&l, &r);
        assert!(actions
            .iter()
            .all(|a| !matches!(a, Action::DeleteLocal(_) | Action::DeleteRemote(_))));
    }

    #[test]
    fn incremental_local_table() {
        let since = 50;
        let l = local(&[
            ("unchanged-gone", 1, 10),
            ("remote-updated", 1, 10),
            ("untouched", 1, 10),
            ("new-local", 1, 60),
            ("local-updated", 1, 60),
            ("both-changed", 1, 60),
        ]);
        let r = remote(&[
            ("remote-updated", 1, 70),
            ("untouched", 1, 10),
            ("local-updated", 1, 10),
            ("both-changed", 1, 70),
        ]);

        assert_eq!(
            summary(&incremental(&l, &r, at(since))),
            vec![
                ("delete local", "unchanged-gone".to_string()),
                ("download", "remote-updated".to_string()),
                ("upload", "new-local".to_string()),
                ("upload", "local-updated".to_string()),
                ("conflict", "both-changed".to_string()),
            ]
        );
    }

    #[test]
    fn incremental_remote_only_files() {
        let l = local(&[]);
        let r = remote(&[("old", 1, 50), ("new", 1, 51)]);

        assert_eq!(
            summary(&incremental(&l, &r, at(50))),
            vec![
                ("delete remote", "old".to_string()),
                ("download", "new".to_string()),
            ]
        );
    }

    #[test]
    fn checkpoint_boundary_counts_as_unchanged() {
        let l = local(&[("n", 1, 50)]);
        let r = remote(&[("n", 1, 50)]);
        assert!(incremental(&l, &r, at(50)).is_empty());
    }

    #[test]
    fn plan_selects_algorithm() {
        let l = local(&[]);
        let r = remote(&[("old", 1, 10)]);

        let first = Plan::build(&l, &r, None);
        assert_eq!(first.mode, SyncMode::FirstSync);
        assert_eq!(summary(&first.actions), vec![("download", "old".to_string())]);

        let next = Plan::build(&l, &r, Some(at(20)));
        assert_eq!(next.mode, SyncMode::Incremental(at(20)));
        assert_eq!(summary(&next.actions), vec![("delete remote", "old".to_string())]);
    }
}
