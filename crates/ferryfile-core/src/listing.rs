//! Ordering of directory listings.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::entry::FileEntry;

/// Column a listing is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortColumn {
    #[default]
    Name,
    Extension,
    Size,
    Modified,
}

/// Sort column plus direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: SortColumn,
    pub ascending: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            column: SortColumn::Name,
            ascending: true,
        }
    }
}

impl SortSpec {
    pub fn new(column: SortColumn, ascending: bool) -> Self {
        Self { column, ascending }
    }
}

/// Group rank: the parent marker, then directories, then files.
fn group(entry: &FileEntry) -> u8 {
    if entry.is_parent_marker() {
        0
    } else if entry.is_dir {
        1
    } else {
        2
    }
}

fn by_name(a: &FileEntry, b: &FileEntry) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.name.cmp(&b.name))
}

fn by_column(column: SortColumn, a: &FileEntry, b: &FileEntry) -> Ordering {
    match column {
        SortColumn::Name => by_name(a, b),
        SortColumn::Extension => a
            .extension
            .to_lowercase()
            .cmp(&b.extension.to_lowercase())
            .then_with(|| by_name(a, b)),
        SortColumn::Size => a.size.cmp(&b.size).then_with(|| by_name(a, b)),
        SortColumn::Modified => a.modified.cmp(&b.modified).then_with(|| by_name(a, b)),
    }
}

/// Compare two entries under `spec`.
///
/// The direction only applies within a group, so `..` always comes first and
/// files always come after directories.
pub fn compare_entries(spec: SortSpec, a: &FileEntry, b: &FileEntry) -> Ordering {
    group(a).cmp(&group(b)).then_with(|| {
        let ord = by_column(spec.column, a, b);
        if spec.ascending { ord } else { ord.reverse() }
    })
}

/// Sort a listing in place.
pub fn sort_entries(entries: &mut [FileEntry], spec: SortSpec) {
    entries.sort_by(|a, b| compare_entries(spec, a, b));
}
