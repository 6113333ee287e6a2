//! Sound catalog: entries, view parameters, and the derived ordered view
//!
//! The store owns every `SoundEntry`; the rest of the app only ever sees
//! snapshots (clones). Filtering and sorting both work on a canonical text
//! form so search is accent- and case-insensitive.

use std::cmp::Ordering;

use serde::Deserialize;
use unicode_normalization::UnicodeNormalization;

/// One sound in the catalog, as served by the backend.
///
/// Identity is the canonicalized `name`; everything else is payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundEntry {
    pub name: String,
    /// Opaque locator, resolved against the server's asset base.
    pub asset_ref: String,
    /// Last-modified time as a unix timestamp. Doubles as the cache-buster.
    pub last_modified: i64,
    pub play_count: u64,
    pub tags: Vec<String>,
}

impl SoundEntry {
    /// Canonical identity key for this entry.
    pub fn key(&self) -> String {
        canonical(&self.name)
    }
}

/// Normalize text for comparison and search: Unicode-decompose (NFD),
/// case-fold, trim. Idempotent, and diacritic/case variants of the same
/// text collapse to the same key.
pub fn canonical(s: &str) -> String {
    let folded: String = s.nfd().collect::<String>().to_lowercase();
    folded.trim().to_string()
}

/// Sort key for the ordered view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SortKey {
    /// Keep fetch order
    #[default]
    None,
    /// Play count
    Count,
    /// Last-modified time
    Date,
    /// Canonicalized name
    Alpha,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn toggle(&mut self) {
        *self = match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        };
    }
}

/// Current filter/sort/mode parameters for the view.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewParameters {
    /// Canonicalized substring filter. Empty matches everything.
    pub filter: String,
    pub sort_key: SortKey,
    pub sort_order: SortOrder,
    /// Exclusive (single-play) mode: tile activation replaces the current
    /// clip instead of layering a new one.
    pub exclusive_mode: bool,
}

impl ViewParameters {
    /// Whether an entry is a member of the current view.
    pub fn matches(&self, entry: &SoundEntry) -> bool {
        self.filter.is_empty() || entry.key().contains(&self.filter)
    }

    /// Comparator under the current sort key/order. Callers needing the
    /// stable fetch-order tie-break should use a stable sort.
    pub fn compare(&self, a: &SoundEntry, b: &SoundEntry) -> Ordering {
        let ord = match self.sort_key {
            SortKey::None => Ordering::Equal,
            SortKey::Count => a.play_count.cmp(&b.play_count),
            SortKey::Date => a.last_modified.cmp(&b.last_modified),
            SortKey::Alpha => a.key().cmp(&b.key()),
        };
        match self.sort_order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    }
}

/// Partial update to `ViewParameters`. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ViewChange {
    /// Raw filter text; canonicalized on application.
    pub filter: Option<String>,
    pub sort_key: Option<SortKey>,
    pub sort_order: Option<SortOrder>,
    pub exclusive_mode: Option<bool>,
}

/// What a parameter update changed, so the renderer can pick between a
/// full reorder and a cheap visibility patch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewDiff {
    /// Sort key or order changed: tile order is stale.
    pub reordered: bool,
    /// Filter text changed: membership is stale.
    pub filter_changed: bool,
    /// Exclusive-mode flag flipped: no repaint needed.
    pub exclusive_changed: bool,
}

impl ViewDiff {
    pub fn any(&self) -> bool {
        self.reordered || self.filter_changed || self.exclusive_changed
    }
}

/// A catalog change arriving from the live update feed, already resolved
/// to the data the store needs.
#[derive(Debug, Clone)]
pub enum LiveEvent {
    /// Insert or replace (re-adding an existing name is idempotent).
    Add(SoundEntry),
    /// Patch the named entry in place from the push payload.
    Edit { name: String, last_modified: i64 },
    Delete { name: String },
    /// Delete old + add new; play state is not carried over.
    Rename {
        previous: Option<String>,
        entry: SoundEntry,
    },
}

/// Outcome of applying a live event, with snapshots for view patching.
#[derive(Debug, Clone)]
pub enum Applied {
    Added(SoundEntry),
    Edited(SoundEntry),
    Removed(SoundEntry),
    Renamed {
        removed: Option<SoundEntry>,
        added: SoundEntry,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The feed referenced a name we don't hold locally. Non-fatal: the
    /// feed is the source of truth and the local view may be behind.
    #[error("no local entry named '{0}'")]
    StaleReference(String),
}

/// Owns the fetched entries and the current view parameters.
///
/// Entries are kept in fetch order; the ordered view is derived on demand
/// with a stable sort so ties fall back to fetch order.
#[derive(Debug, Default)]
pub struct CatalogStore {
    entries: Vec<SoundEntry>,
    params: ViewParameters,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a freshly fetched catalog. Zero entries is a valid state.
    pub fn load(&mut self, entries: Vec<SoundEntry>) {
        self.entries = entries;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn params(&self) -> &ViewParameters {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<&SoundEntry> {
        let key = canonical(name);
        self.entries.iter().find(|e| e.key() == key)
    }

    /// Apply a partial parameter update. Pure and synchronous; returns
    /// what changed so the renderer can decide how much to repaint.
    pub fn set_view_parameters(&mut self, change: ViewChange) -> ViewDiff {
        let mut diff = ViewDiff::default();

        if let Some(filter) = change.filter {
            let filter = canonical(&filter);
            if filter != self.params.filter {
                self.params.filter = filter;
                diff.filter_changed = true;
            }
        }
        if let Some(key) = change.sort_key {
            if key != self.params.sort_key {
                self.params.sort_key = key;
                diff.reordered = true;
            }
        }
        if let Some(order) = change.sort_order {
            if order != self.params.sort_order {
                self.params.sort_order = order;
                diff.reordered = true;
            }
        }
        if let Some(exclusive) = change.exclusive_mode {
            if exclusive != self.params.exclusive_mode {
                self.params.exclusive_mode = exclusive;
                diff.exclusive_changed = true;
            }
        }

        diff
    }

    /// The full catalog in sorted order, ignoring the filter. This is the
    /// render sequence: the grid keeps a tile per entry and applies the
    /// filter as a visibility flag rather than a teardown.
    pub fn sorted_entries(&self) -> Vec<SoundEntry> {
        let mut sequence = self.entries.clone();
        sequence.sort_by(|a, b| self.params.compare(a, b));
        sequence
    }

    /// The filtered, ordered sequence of entry snapshots.
    pub fn ordered_view(&self) -> Vec<SoundEntry> {
        let mut view: Vec<SoundEntry> = self
            .entries
            .iter()
            .filter(|e| self.params.matches(e))
            .cloned()
            .collect();
        view.sort_by(|a, b| self.params.compare(a, b));
        view
    }

    /// Apply one catalog change from the live feed. Updates are atomic and
    /// serial: callers only ever observe fully-applied state.
    pub fn apply_live_event(&mut self, event: LiveEvent) -> Result<Applied, CatalogError> {
        match event {
            LiveEvent::Add(entry) => Ok(Applied::Added(self.insert(entry))),
            LiveEvent::Edit {
                name,
                last_modified,
            } => {
                let key = canonical(&name);
                let entry = self
                    .entries
                    .iter_mut()
                    .find(|e| e.key() == key)
                    .ok_or(CatalogError::StaleReference(name))?;
                entry.last_modified = last_modified;
                Ok(Applied::Edited(entry.clone()))
            }
            LiveEvent::Delete { name } => {
                let removed = self
                    .remove(&name)
                    .ok_or(CatalogError::StaleReference(name))?;
                Ok(Applied::Removed(removed))
            }
            LiveEvent::Rename { previous, entry } => {
                let removed = previous.and_then(|old| self.remove(&old));
                let added = self.insert(entry);
                Ok(Applied::Renamed { removed, added })
            }
        }
    }

    /// Insert or replace by canonical name; replacement keeps the original
    /// fetch-order slot so tie-breaks stay stable.
    fn insert(&mut self, entry: SoundEntry) -> SoundEntry {
        let key = entry.key();
        match self.entries.iter_mut().find(|e| e.key() == key) {
            Some(slot) => *slot = entry.clone(),
            None => self.entries.push(entry.clone()),
        }
        entry
    }

    fn remove(&mut self, name: &str) -> Option<SoundEntry> {
        let key = canonical(name);
        let idx = self.entries.iter().position(|e| e.key() == key)?;
        Some(self.entries.remove(idx))
    }
}
