//! Mock playback sink for testing
//!
//! Captures commands instead of sending them to a real audio engine, and
//! simulates the engine's live-unit bookkeeping. This enables testing the
//! router and app without audio hardware.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::{AudioCommand, ClipData, PlaybackSink, UnitId};

/// A command-capturing sink
#[derive(Clone, Default)]
pub struct MockSink {
    /// All captured commands (newest last)
    commands: Arc<Mutex<Vec<AudioCommand>>>,
    /// Simulated live-unit set
    live: Arc<Mutex<HashSet<UnitId>>>,
    /// The current exclusive unit, if any
    exclusive: Arc<Mutex<Option<UnitId>>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all captured commands
    pub fn commands(&self) -> Vec<AudioCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Get the last command sent (if any)
    pub fn last_command(&self) -> Option<AudioCommand> {
        self.commands.lock().unwrap().last().cloned()
    }

    /// Check if a specific command was sent
    pub fn has_command<F>(&self, predicate: F) -> bool
    where
        F: Fn(&AudioCommand) -> bool,
    {
        self.commands.lock().unwrap().iter().any(predicate)
    }

    pub fn command_count(&self) -> usize {
        self.commands.lock().unwrap().len()
    }

    /// Simulate a unit reaching the end of its clip.
    pub fn finish(&self, id: UnitId) {
        self.live.lock().unwrap().remove(&id);
        let mut exclusive = self.exclusive.lock().unwrap();
        if *exclusive == Some(id) {
            *exclusive = None;
        }
    }

    fn push_command(&self, cmd: AudioCommand) {
        self.commands.lock().unwrap().push(cmd);
    }
}

impl PlaybackSink for MockSink {
    fn play_exclusive(&self, id: UnitId, clip: ClipData, gain: f32) {
        let mut live = self.live.lock().unwrap();
        let mut exclusive = self.exclusive.lock().unwrap();
        if let Some(old) = exclusive.take() {
            live.remove(&old);
        }
        live.insert(id);
        *exclusive = Some(id);
        drop(exclusive);
        drop(live);
        self.push_command(AudioCommand::PlayExclusive { id, clip, gain });
    }

    fn play_overlay(&self, id: UnitId, clip: ClipData, gain: f32) {
        self.live.lock().unwrap().insert(id);
        self.push_command(AudioCommand::PlayOverlay { id, clip, gain });
    }

    fn stop_exclusive(&self) {
        let mut exclusive = self.exclusive.lock().unwrap();
        if let Some(old) = exclusive.take() {
            self.live.lock().unwrap().remove(&old);
        }
        drop(exclusive);
        self.push_command(AudioCommand::StopExclusive);
    }

    fn stop_all_overlays(&self) {
        let exclusive = *self.exclusive.lock().unwrap();
        let mut live = self.live.lock().unwrap();
        live.retain(|id| Some(*id) == exclusive);
        drop(live);
        self.push_command(AudioCommand::StopAllOverlays);
    }

    fn set_master_volume(&self, volume: f32) {
        self.push_command(AudioCommand::SetMasterVolume(volume));
    }

    fn live_units(&self) -> HashSet<UnitId> {
        self.live.lock().unwrap().clone()
    }
}
