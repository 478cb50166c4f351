//! The client's cached copy of one scope.

use lineup_rank::Rank;
use lineup_types::{ItemId, RankedEntry, ScopeId, is_strictly_ordered};

/// Ordered entries of one scope as this client currently shows them.
///
/// Entries stay sorted by rank. Ties are possible transiently (a remote
/// write landing on a locally predicted rank) and break by item id until a
/// revalidation or settlement resolves them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalView {
    scope: ScopeId,
    entries: Vec<RankedEntry>,
    /// Bumped on every mutation.
    version: u64,
}

/// A saved copy of a view's entries, taken before an optimistic change.
///
/// Restoring it puts back exactly these entries, in this order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    entries: Vec<RankedEntry>,
}

impl Snapshot {
    pub fn entries(&self) -> &[RankedEntry] {
        &self.entries
    }
}

fn sort_entries(entries: &mut [RankedEntry]) {
    entries.sort_by(|a, b| a.rank.cmp(&b.rank).then(a.id.cmp(&b.id)));
}

impl LocalView {
    pub fn new(scope: ScopeId, mut entries: Vec<RankedEntry>) -> Self {
        sort_entries(&mut entries);
        Self {
            scope,
            entries,
            version: 0,
        }
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn entries(&self) -> &[RankedEntry] {
        &self.entries
    }

    /// Item ids in display order.
    pub fn ids(&self) -> Vec<ItemId> {
        self.entries.iter().map(|e| e.id).collect()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, item: ItemId) -> bool {
        self.entries.iter().any(|e| e.id == item)
    }

    pub fn rank_of(&self, item: ItemId) -> Option<&Rank> {
        self.entries.iter().find(|e| e.id == item).map(|e| &e.rank)
    }

    /// True when no two entries share a rank.
    pub fn is_consistent(&self) -> bool {
        is_strictly_ordered(&self.entries)
    }

    /// Every entry except `item`, still sorted.
    pub(crate) fn siblings_of(&self, item: ItemId) -> Vec<RankedEntry> {
        self.entries.iter().filter(|e| e.id != item).cloned().collect()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: self.entries.clone(),
        }
    }

    /// A snapshot of this view with `item` at `rank` instead of wherever it
    /// is now (absent when `rank` is `None`).
    pub(crate) fn snapshot_with(&self, item: ItemId, rank: Option<&Rank>) -> Snapshot {
        let mut entries = self.siblings_of(item);
        if let Some(rank) = rank {
            entries.push(RankedEntry::new(item, rank.clone()));
            sort_entries(&mut entries);
        }
        Snapshot { entries }
    }

    /// Put `item` at `rank`, inserting it if absent.
    pub(crate) fn place(&mut self, item: ItemId, rank: Rank) {
        self.entries.retain(|e| e.id != item);
        let entry = RankedEntry::new(item, rank);
        let at = self
            .entries
            .partition_point(|e| (&e.rank, e.id) < (&entry.rank, entry.id));
        self.entries.insert(at, entry);
        self.version += 1;
    }

    pub(crate) fn remove(&mut self, item: ItemId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != item);
        let removed = self.entries.len() != before;
        if removed {
            self.version += 1;
        }
        removed
    }

    pub(crate) fn replace(&mut self, mut entries: Vec<RankedEntry>) {
        sort_entries(&mut entries);
        self.entries = entries;
        self.version += 1;
    }

    pub(crate) fn restore(&mut self, snapshot: Snapshot) {
        self.entries = snapshot.entries;
        self.version += 1;
    }
}
