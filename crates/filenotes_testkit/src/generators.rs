//! Property-based test generators using proptest.
//!
//! File tables map a note name to its content and modification time in
//! seconds. All generated times fall between 2001 and 2020, well before any
//! checkpoint a real run takes.

use proptest::prelude::*;
use std::collections::BTreeMap;

/// Earliest generated modification time.
pub const MIN_MTIME: i64 = 1_000_000_000;
/// Latest generated modification time.
pub const MAX_MTIME: i64 = 1_600_000_000;

/// Content and modification time of one generated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// File content.
    pub data: Vec<u8>,
    /// Modification time in seconds since the epoch.
    pub mtime: i64,
}

/// A generated name-to-file table.
pub type FileTable = BTreeMap<String, GeneratedFile>;

/// Strategy for note names. Drawn from a small alphabet so local and remote
/// tables overlap often.
pub fn note_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-f]{1,2}\\.txt").expect("Invalid regex")
}

/// Strategy for a single file.
pub fn file_strategy() -> impl Strategy<Value = GeneratedFile> {
    (
        prop::collection::vec(any::<u8>(), 0..64),
        // Coarse steps make equal times on both sides likely.
        (MIN_MTIME / 1_000..MAX_MTIME / 1_000).prop_map(|t| t * 1_000),
    )
        .prop_map(|(data, mtime)| GeneratedFile { data, mtime })
}

/// Strategy for a file table.
pub fn file_table_strategy() -> impl Strategy<Value = FileTable> {
    prop::collection::btree_map(note_name_strategy(), file_strategy(), 0..8)
}

/// Strategy for a local table and a remote table.
pub fn sides_strategy() -> impl Strategy<Value = (FileTable, FileTable)> {
    (file_table_strategy(), file_table_strategy())
}

/// Strategy for a checkpoint inside the generated time range.
pub fn checkpoint_strategy() -> impl Strategy<Value = i64> {
    MIN_MTIME..MAX_MTIME
}

/// Local and remote tables with no first-sync conflict.
///
/// Shared names with equal times get identical content on both sides.
pub fn first_sync_sides_strategy() -> impl Strategy<Value = (FileTable, FileTable)> {
    sides_strategy().prop_map(|(local, mut remote)| {
        for (name, l) in &local {
            if let Some(r) = remote.get_mut(name) {
                if r.mtime == l.mtime {
                    r.data = l.data.clone();
                }
            }
        }
        (local, remote)
    })
}

/// Local and remote tables plus a checkpoint, with no name changed on both
/// sides since the checkpoint.
pub fn incremental_sides_strategy() -> impl Strategy<Value = (FileTable, FileTable, i64)> {
    (sides_strategy(), checkpoint_strategy()).prop_map(|((local, mut remote), since)| {
        for (name, l) in &local {
            if let Some(r) = remote.get_mut(name) {
                if l.mtime > since && r.mtime > since {
                    r.mtime = since;
                }
            }
        }
        (local, remote, since)
    })
}
