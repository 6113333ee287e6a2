//! Playback routing and bookkeeping
//!
//! The router owns every playback unit: one exclusive slot plus an
//! unbounded overlay set, tracked per entry so tiles can derive their
//! playing indicator. The engine does the mixing; the router decides
//! what plays, keeps the registries, clamps and persists the volume,
//! and periodically reconciles its overlay set against the engine's
//! live-unit ids (defensive cleanup against missed lifecycle events).

use std::collections::HashMap;
use std::io;
use std::path::Path;

use crate::audio::{decode_clip, ClipData, PlaybackError, PlaybackSink, UnitEvent, UnitId};
use crate::catalog::SoundEntry;
use crate::settings::Settings;

/// Per-unit gain before the global volume scalar is applied.
const UNIT_GAIN: f32 = 1.0;

/// One currently-active playback unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveUnit {
    pub id: UnitId,
    /// Canonical name of the entry this unit renders.
    pub key: String,
}

/// Owns all playback units; no other component mutates playback state.
pub struct AudioRouter {
    sink: Box<dyn PlaybackSink>,
    settings: Settings,
    /// Volume percent, 0-100. The only globally shared mutable value.
    volume: u8,
    next_id: UnitId,
    exclusive: Option<ActiveUnit>,
    overlays: Vec<ActiveUnit>,
    /// Decoded clips keyed by canonical name; the modified stamp busts
    /// the cache after an edit.
    clips: HashMap<String, (i64, ClipData)>,
}

impl AudioRouter {
    /// Create a router over a sink, restoring the persisted volume.
    pub fn new(sink: Box<dyn PlaybackSink>, settings: Settings) -> Self {
        let volume = settings.volume().min(100);
        sink.set_master_volume(volume as f32 / 100.0);
        Self {
            sink,
            settings,
            volume,
            next_id: 0,
            exclusive: None,
            overlays: Vec::new(),
            clips: HashMap::new(),
        }
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Clamp to 0-100, rescale every active unit immediately, persist.
    /// The volume applies even when persisting fails; the write error is
    /// returned for logging.
    pub fn set_volume(&mut self, percent: i64) -> (u8, io::Result<()>) {
        let clamped = percent.clamp(0, 100) as u8;
        self.volume = clamped;
        self.sink.set_master_volume(clamped as f32 / 100.0);
        let persisted = self.settings.set_volume(clamped);
        (clamped, persisted)
    }

    pub fn adjust_volume(&mut self, delta: i64) -> (u8, io::Result<()>) {
        self.set_volume(self.volume as i64 + delta)
    }

    /// Decode the entry's asset, serving from cache while the entry's
    /// modified stamp is unchanged.
    pub fn load_clip(&mut self, entry: &SoundEntry, path: &Path) -> Result<ClipData, PlaybackError> {
        let key = entry.key();
        if let Some((stamp, clip)) = self.clips.get(&key) {
            if *stamp == entry.last_modified {
                return Ok(clip.clone());
            }
        }
        let clip = decode_clip(path)?;
        self.clips
            .insert(key, (entry.last_modified, clip.clone()));
        Ok(clip)
    }

    /// Play in the exclusive slot, tearing down any current exclusive
    /// unit first. At most one exclusive unit exists at any instant.
    pub fn play_exclusive(&mut self, entry: &SoundEntry, clip: ClipData) -> UnitId {
        self.exclusive = None;
        let id = self.allocate();
        self.sink.play_exclusive(id, clip, UNIT_GAIN);
        self.exclusive = Some(ActiveUnit {
            id,
            key: entry.key(),
        });
        id
    }

    /// Start an independent overlay unit. N overlapping plays of the same
    /// or different clips proceed independently.
    pub fn play_overlay(&mut self, entry: &SoundEntry, clip: ClipData) -> UnitId {
        let id = self.allocate();
        self.sink.play_overlay(id, clip, UNIT_GAIN);
        self.overlays.push(ActiveUnit {
            id,
            key: entry.key(),
        });
        id
    }

    /// Idempotent; stopping when nothing is active is a no-op.
    pub fn stop_exclusive(&mut self) {
        self.sink.stop_exclusive();
        self.exclusive = None;
    }

    /// Idempotent; stopping when nothing is active is a no-op.
    pub fn stop_all_overlays(&mut self) {
        self.sink.stop_all_overlays();
        self.overlays.clear();
    }

    /// Currently active units, optionally filtered to one entry.
    pub fn active_units_for(&self, name: Option<&str>) -> Vec<&ActiveUnit> {
        let key = name.map(crate::catalog::canonical);
        self.exclusive
            .iter()
            .chain(self.overlays.iter())
            .filter(|u| key.as_deref().is_none_or(|k| u.key == k))
            .collect()
    }

    /// Whether any unit for this canonical key is active.
    pub fn is_playing(&self, key: &str) -> bool {
        self.exclusive.as_ref().is_some_and(|u| u.key == key)
            || self.overlays.iter().any(|u| u.key == key)
    }

    /// Apply one deferred lifecycle event from the engine.
    pub fn on_unit_event(&mut self, event: UnitEvent) {
        match event {
            UnitEvent::Started(_) => {}
            UnitEvent::Finished(id) | UnitEvent::Stopped(id) => {
                if self.exclusive.as_ref().is_some_and(|u| u.id == id) {
                    self.exclusive = None;
                }
                self.overlays.retain(|u| u.id != id);
            }
        }
    }

    /// Prune the registries to units the engine is actually still mixing.
    pub fn housekeep(&mut self) {
        let live = self.sink.live_units();
        if self.exclusive.as_ref().is_some_and(|u| !live.contains(&u.id)) {
            self.exclusive = None;
        }
        self.overlays.retain(|u| live.contains(&u.id));
    }

    fn allocate(&mut self) -> UnitId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
