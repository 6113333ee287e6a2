//! Tile grid and the render scheduler that materializes it
//!
//! The grid holds one tile per catalog entry, in sorted order; the filter
//! is a visibility flag, never a teardown. Full renders and reorders are
//! split into fixed-size slices queued on the cooperative `SliceQueue`, so
//! a large catalog never blocks the interaction thread. Reorders reuse
//! tile identity (a recreated tile would lose its playing indicator).

use std::collections::HashMap;

use crate::catalog::{canonical, SoundEntry, ViewParameters};
use crate::scheduler::SliceQueue;

/// Entries materialized per cooperative work unit.
pub const SLICE_SIZE: usize = 50;

/// Reveal stagger, in frames per grid position.
const STAGGER_STEP: u16 = 1;
/// Stagger cap so deep tiles don't take seconds to appear.
const STAGGER_CAP: u16 = 24;

fn stagger(position: usize) -> u16 {
    ((position as u16).saturating_mul(STAGGER_STEP)).min(STAGGER_CAP)
}

/// One interactive tile. Holds a denormalized snapshot of its entry, not
/// a live reference; staleness is corrected by re-patching on updates.
#[derive(Debug, Clone)]
pub struct Tile {
    /// Canonical name; tile identity.
    pub key: String,
    pub snapshot: SoundEntry,
    /// Filter membership. Hidden tiles keep their state.
    pub visible: bool,
    /// Frames until the tile is shown. Presentation only.
    pub reveal: u16,
    /// Whether any playback unit for this entry is active.
    pub playing: bool,
}

impl Tile {
    fn new(snapshot: SoundEntry, visible: bool, reveal: u16) -> Self {
        Self {
            key: snapshot.key(),
            snapshot,
            visible,
            reveal,
            playing: false,
        }
    }

    /// Shown this frame: a member of the view whose stagger has elapsed.
    pub fn shown(&self) -> bool {
        self.visible && self.reveal == 0
    }
}

/// The shared visual tree. Mutated only by the render scheduler and only
/// from the main thread.
#[derive(Debug, Default)]
pub struct TileGrid {
    pub tiles: Vec<Tile>,
    /// Tiles parked during an in-flight reorder, keyed by identity.
    staging: HashMap<String, Tile>,
}

impl TileGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&Tile> {
        let key = canonical(name);
        self.tiles.iter().find(|t| t.key == key)
    }

    /// Indices of tiles currently shown, in grid order.
    pub fn shown_indices(&self) -> Vec<usize> {
        self.tiles
            .iter()
            .enumerate()
            .filter(|(_, t)| t.shown())
            .map(|(i, _)| i)
            .collect()
    }

    /// Advance reveal staggers by one frame.
    pub fn tick_reveal(&mut self) {
        for tile in &mut self.tiles {
            tile.reveal = tile.reveal.saturating_sub(1);
        }
    }

    /// Update playing indicators from a lookup.
    pub fn refresh_indicators(&mut self, is_playing: impl Fn(&str) -> bool) {
        for tile in &mut self.tiles {
            tile.playing = is_playing(&tile.key);
        }
    }

    fn park_all(&mut self) {
        for tile in self.tiles.drain(..) {
            self.staging.insert(tile.key.clone(), tile);
        }
    }
}

/// Materializes the catalog's sorted sequence into the grid in
/// cooperative slices, and patches it in place on live updates.
pub struct RenderScheduler {
    queue: SliceQueue<TileGrid>,
}

impl Default for RenderScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self {
            queue: SliceQueue::new(),
        }
    }

    /// Clear the grid and paint `sequence` (sorted, unfiltered) in slices.
    /// Visibility comes from the filter in `params`.
    pub fn render_full(
        &mut self,
        grid: &mut TileGrid,
        sequence: &[SoundEntry],
        params: &ViewParameters,
    ) {
        self.queue.cancel_all();
        grid.tiles.clear();
        grid.staging.clear();

        for (slice_idx, chunk) in sequence.chunks(SLICE_SIZE).enumerate() {
            let base = slice_idx * SLICE_SIZE;
            let chunk: Vec<SoundEntry> = chunk.to_vec();
            let params = params.clone();
            self.queue.submit(move |grid| {
                for (offset, entry) in chunk.into_iter().enumerate() {
                    let visible = params.matches(&entry);
                    grid.tiles.push(Tile::new(entry, visible, stagger(base + offset)));
                }
            });
        }
    }

    /// Patch the grid after a parameter change. A pure filter change
    /// toggles visibility on existing tiles; a reorder cancels in-flight
    /// slices and re-appends existing tiles in the new order.
    pub fn render_patch(
        &mut self,
        grid: &mut TileGrid,
        reordered: bool,
        sequence: &[SoundEntry],
        params: &ViewParameters,
    ) {
        if reordered {
            self.reorder(grid, sequence, params);
        } else if self.queue.is_idle() {
            Self::patch_visibility(grid, params);
        } else {
            // Mid-render the grid is incomplete, so not-yet-materialized
            // tiles can't be toggled; start over under the new membership.
            self.render_full(grid, sequence, params);
        }
    }

    fn patch_visibility(grid: &mut TileGrid, params: &ViewParameters) {
        let mut newly_visible = 0usize;
        for tile in &mut grid.tiles {
            let visible = params.matches(&tile.snapshot);
            if visible && !tile.visible {
                // Restagger only the newly-visible subset
                tile.reveal = stagger(newly_visible);
                newly_visible += 1;
            }
            tile.visible = visible;
        }
    }

    fn reorder(&mut self, grid: &mut TileGrid, sequence: &[SoundEntry], params: &ViewParameters) {
        self.queue.cancel_all();
        grid.park_all();

        for (slice_idx, chunk) in sequence.chunks(SLICE_SIZE).enumerate() {
            let base = slice_idx * SLICE_SIZE;
            let chunk: Vec<SoundEntry> = chunk.to_vec();
            let params = params.clone();
            self.queue.submit(move |grid| {
                for (offset, entry) in chunk.into_iter().enumerate() {
                    let visible = params.matches(&entry);
                    let reveal = stagger(base + offset);
                    let mut tile = match grid.staging.remove(&entry.key()) {
                        Some(mut parked) => {
                            parked.snapshot = entry;
                            parked
                        }
                        None => Tile::new(entry, visible, reveal),
                    };
                    tile.visible = visible;
                    tile.reveal = reveal;
                    grid.tiles.push(tile);
                }
            });
        }

        // Anything still parked was removed from the catalog mid-flight.
        self.queue.submit(|grid| grid.staging.clear());
    }

    /// Re-patch one tile's snapshot after an edit event.
    pub fn patch_one(&mut self, grid: &mut TileGrid, entry: &SoundEntry, params: &ViewParameters) {
        Self::patch_now(grid, entry, params);
    }

    fn patch_now(grid: &mut TileGrid, entry: &SoundEntry, params: &ViewParameters) {
        let key = entry.key();
        if let Some(tile) = grid.tiles.iter_mut().find(|t| t.key == key) {
            tile.snapshot = entry.clone();
            tile.visible = params.matches(entry);
        } else if let Some(tile) = grid.staging.get_mut(&key) {
            tile.snapshot = entry.clone();
            tile.visible = params.matches(entry);
        }
    }

    /// Insert one tile at its ordered position under the current
    /// parameters. Linear scan against the comparator; insert rate is
    /// low-frequency relative to catalog size. While a render is still
    /// draining the insert is queued after the pending slices, so it
    /// orders against the fully-materialized grid rather than a prefix.
    pub fn insert_one(&mut self, grid: &mut TileGrid, entry: &SoundEntry, params: &ViewParameters) {
        if !self.queue.is_idle() {
            let entry = entry.clone();
            let params = params.clone();
            self.queue
                .submit(move |grid| Self::insert_now(grid, &entry, &params));
            return;
        }
        Self::insert_now(grid, entry, params);
    }

    fn insert_now(grid: &mut TileGrid, entry: &SoundEntry, params: &ViewParameters) {
        let key = entry.key();
        if grid.tiles.iter().any(|t| t.key == key) || grid.staging.contains_key(&key) {
            Self::patch_now(grid, entry, params);
            return;
        }
        let visible = params.matches(entry);
        let tile = Tile::new(entry.clone(), visible, 0);
        let position = grid
            .tiles
            .iter()
            .position(|t| params.compare(entry, &t.snapshot).is_lt())
            .unwrap_or(grid.tiles.len());
        grid.tiles.insert(position, tile);
    }

    /// Remove one tile. Any in-flight playback for the entry is untouched;
    /// playback lifecycle is independent of catalog membership.
    pub fn remove_one(&mut self, grid: &mut TileGrid, name: &str) {
        let key = canonical(name);
        grid.tiles.retain(|t| t.key != key);
        grid.staging.remove(&key);
    }

    /// Invalidate every queued-but-not-started slice.
    pub fn cancel_all(&mut self) {
        self.queue.cancel_all();
    }

    /// Run at most one queued slice. Returns whether one ran.
    pub fn pump(&mut self, grid: &mut TileGrid) -> bool {
        self.queue.pump(grid)
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{SortKey, SortOrder};

    fn entry(name: &str, count: u64) -> SoundEntry {
        SoundEntry {
            name: name.to_string(),
            asset_ref: format!("{name}.mp3"),
            last_modified: 0,
            play_count: count,
            tags: Vec::new(),
        }
    }

    fn params() -> ViewParameters {
        ViewParameters::default()
    }

    fn drain(renderer: &mut RenderScheduler, grid: &mut TileGrid) {
        while renderer.pump(grid) {}
    }

    fn names(grid: &TileGrid) -> Vec<String> {
        grid.tiles.iter().map(|t| t.snapshot.name.clone()).collect()
    }

    #[test]
    fn test_render_full_paints_in_slices() {
        let sequence: Vec<SoundEntry> =
            (0..120).map(|i| entry(&format!("s{i:03}"), 0)).collect();
        let mut renderer = RenderScheduler::new();
        let mut grid = TileGrid::new();

        renderer.render_full(&mut grid, &sequence, &params());
        assert!(grid.is_empty());

        assert!(renderer.pump(&mut grid));
        assert_eq!(grid.len(), SLICE_SIZE);
        assert!(renderer.pump(&mut grid));
        assert_eq!(grid.len(), 2 * SLICE_SIZE);
        assert!(renderer.pump(&mut grid));
        assert_eq!(grid.len(), 120);
        assert!(!renderer.pump(&mut grid));
    }

    #[test]
    fn test_stagger_grows_with_position_and_caps() {
        let sequence: Vec<SoundEntry> =
            (0..60).map(|i| entry(&format!("s{i:03}"), 0)).collect();
        let mut renderer = RenderScheduler::new();
        let mut grid = TileGrid::new();
        renderer.render_full(&mut grid, &sequence, &params());
        drain(&mut renderer, &mut grid);

        assert_eq!(grid.tiles[0].reveal, 0);
        assert!(grid.tiles[5].reveal > grid.tiles[1].reveal);
        assert_eq!(grid.tiles[59].reveal, STAGGER_CAP);
    }

    #[test]
    fn test_filter_patch_toggles_visibility_without_teardown() {
        let sequence = vec![entry("horn", 0), entry("drum", 0), entry("horn two", 0)];
        let mut renderer = RenderScheduler::new();
        let mut grid = TileGrid::new();
        renderer.render_full(&mut grid, &sequence, &params());
        drain(&mut renderer, &mut grid);
        grid.tiles[1].playing = true;

        let mut filtered = params();
        filtered.filter = "horn".to_string();
        renderer.render_patch(&mut grid, false, &sequence, &filtered);

        // Same tiles, no recreation: the playing flag survives
        assert_eq!(grid.len(), 3);
        assert!(grid.tiles[0].visible);
        assert!(!grid.tiles[1].visible);
        assert!(grid.tiles[1].playing);
        assert!(grid.tiles[2].visible);
    }

    #[test]
    fn test_reorder_preserves_tile_identity() {
        let mut sequence = vec![entry("a", 5), entry("b", 1), entry("c", 3)];
        let mut renderer = RenderScheduler::new();
        let mut grid = TileGrid::new();
        renderer.render_full(&mut grid, &sequence, &params());
        drain(&mut renderer, &mut grid);
        grid.tiles[0].playing = true; // "a" is playing

        let mut sorted = params();
        sorted.sort_key = SortKey::Count;
        sequence.sort_by(|x, y| sorted.compare(x, y));
        renderer.render_patch(&mut grid, true, &sequence, &sorted);
        drain(&mut renderer, &mut grid);

        assert_eq!(names(&grid), vec!["b", "c", "a"]);
        let a = grid.find("a").unwrap();
        assert!(a.playing, "reorder must not recreate tiles");
    }

    #[test]
    fn test_sort_change_while_draining_leaves_no_stale_order() {
        let sequence: Vec<SoundEntry> = (0..100)
            .map(|i| entry(&format!("s{i:03}"), (100 - i) as u64))
            .collect();
        let mut renderer = RenderScheduler::new();
        let mut grid = TileGrid::new();
        renderer.render_full(&mut grid, &sequence, &params());
        // Only the first slice of the old order lands
        renderer.pump(&mut grid);

        let mut sorted = params();
        sorted.sort_key = SortKey::Count;
        sorted.sort_order = SortOrder::Asc;
        let mut resorted = sequence.clone();
        resorted.sort_by(|x, y| sorted.compare(x, y));
        renderer.render_patch(&mut grid, true, &resorted, &sorted);
        drain(&mut renderer, &mut grid);

        let counts: Vec<u64> = grid.tiles.iter().map(|t| t.snapshot.play_count).collect();
        let mut expected = counts.clone();
        expected.sort_unstable();
        assert_eq!(counts, expected, "no stale-order tiles after the new render");
        assert_eq!(grid.len(), 100);
    }

    #[test]
    fn test_filter_change_while_draining_falls_back_to_full_render() {
        let sequence: Vec<SoundEntry> =
            (0..80).map(|i| entry(&format!("s{i:03}"), 0)).collect();
        let mut renderer = RenderScheduler::new();
        let mut grid = TileGrid::new();
        renderer.render_full(&mut grid, &sequence, &params());
        renderer.pump(&mut grid); // half-painted

        let mut filtered = params();
        filtered.filter = "s00".to_string();
        renderer.render_patch(&mut grid, false, &sequence, &filtered);
        drain(&mut renderer, &mut grid);

        assert_eq!(grid.len(), 80);
        assert_eq!(grid.tiles.iter().filter(|t| t.visible).count(), 10);
        // Staggers are still counting down; only the first tile is shown
        assert_eq!(grid.shown_indices().len(), 1);
        grid.tick_reveal();
        assert_eq!(grid.shown_indices().len(), 2);
    }

    #[test]
    fn test_insert_one_lands_at_ordered_position() {
        let mut sorted = params();
        sorted.sort_key = SortKey::Count;
        let sequence = vec![entry("low", 1), entry("mid", 5), entry("high", 9)];
        let mut renderer = RenderScheduler::new();
        let mut grid = TileGrid::new();
        renderer.render_full(&mut grid, &sequence, &sorted);
        drain(&mut renderer, &mut grid);

        renderer.insert_one(&mut grid, &entry("between", 4), &sorted);
        assert_eq!(names(&grid), vec!["low", "between", "mid", "high"]);
    }

    #[test]
    fn test_insert_during_draining_render_lands_in_order() {
        let mut sorted = params();
        sorted.sort_key = SortKey::Count;
        let sequence: Vec<SoundEntry> =
            (0..100).map(|i| entry(&format!("s{i:03}"), i as u64)).collect();
        let mut renderer = RenderScheduler::new();
        let mut grid = TileGrid::new();
        renderer.render_full(&mut grid, &sequence, &sorted);
        // Only the first slice has landed; count 75 belongs in a later one
        renderer.pump(&mut grid);

        renderer.insert_one(&mut grid, &entry("late arrival", 75), &sorted);
        drain(&mut renderer, &mut grid);

        assert_eq!(grid.len(), 101);
        let counts: Vec<u64> = grid.tiles.iter().map(|t| t.snapshot.play_count).collect();
        let mut expected = counts.clone();
        expected.sort_unstable();
        assert_eq!(counts, expected);
        assert_eq!(grid.tiles[76].snapshot.name, "late arrival");
    }

    #[test]
    fn test_insert_existing_key_patches_instead() {
        let sequence = vec![entry("horn", 1)];
        let mut renderer = RenderScheduler::new();
        let mut grid = TileGrid::new();
        renderer.render_full(&mut grid, &sequence, &params());
        drain(&mut renderer, &mut grid);

        renderer.insert_one(&mut grid, &entry("Horn", 9), &params());
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.tiles[0].snapshot.play_count, 9);
    }

    #[test]
    fn test_patch_one_updates_snapshot_and_visibility() {
        let sequence = vec![entry("horn", 1)];
        let mut renderer = RenderScheduler::new();
        let mut grid = TileGrid::new();
        renderer.render_full(&mut grid, &sequence, &params());
        drain(&mut renderer, &mut grid);

        let mut updated = entry("horn", 2);
        updated.last_modified = 42;
        renderer.patch_one(&mut grid, &updated, &params());
        assert_eq!(grid.tiles[0].snapshot.last_modified, 42);
    }

    #[test]
    fn test_remove_one_drops_only_that_tile() {
        let sequence = vec![entry("horn", 0), entry("drum", 0)];
        let mut renderer = RenderScheduler::new();
        let mut grid = TileGrid::new();
        renderer.render_full(&mut grid, &sequence, &params());
        drain(&mut renderer, &mut grid);

        renderer.remove_one(&mut grid, "HORN");
        assert_eq!(names(&grid), vec!["drum"]);
    }
}
