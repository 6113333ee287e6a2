//! Audio engine for clip playback
//!
//! Uses cpal for low-level audio with support for:
//! - One exclusive playback unit (a new one tears down the old)
//! - Unbounded overlay units, each with its own gain stage
//! - Real-time mixing in the audio callback
//! - A global volume scalar applied uniformly to every unit
//!
//! Lifecycle changes (started/finished/stopped) are reported over a
//! channel and drained by the main loop, never dispatched from inside
//! the audio callback into UI code.

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{unbounded, Receiver, Sender};
use rodio::{Decoder, Source};

pub mod mock;

/// Identifier for one playback unit. Assigned by the router.
pub type UnitId = u64;

/// Ids of units the callback is actually mixing right now. Shared with
/// the main thread as ground truth for housekeeping.
pub type LiveUnits = Arc<Mutex<HashSet<UnitId>>>;

/// A decoded clip: interleaved f32 samples ready for mixing.
#[derive(Clone)]
pub struct ClipData {
    pub data: Arc<Vec<f32>>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl fmt::Debug for ClipData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipData")
            .field("samples", &self.data.len())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .finish()
    }
}

/// Commands sent to the audio engine
#[derive(Debug, Clone)]
pub enum AudioCommand {
    /// Play in the exclusive slot, tearing down any current exclusive unit
    PlayExclusive {
        id: UnitId,
        clip: ClipData,
        gain: f32,
    },
    /// Play as an independent overlay unit
    PlayOverlay {
        id: UnitId,
        clip: ClipData,
        gain: f32,
    },
    /// Stop the exclusive unit (no-op when idle)
    StopExclusive,
    /// Stop every overlay unit (no-op when idle)
    StopAllOverlays,
    /// Set the global volume scalar (0.0-1.0)
    SetMasterVolume(f32),
}

/// A lifecycle change for one unit, delivered to the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitEvent {
    Started(UnitId),
    /// Playback reached the end of the clip
    Finished(UnitId),
    /// Playback was explicitly torn down
    Stopped(UnitId),
}

impl UnitEvent {
    pub fn id(&self) -> UnitId {
        match self {
            UnitEvent::Started(id) | UnitEvent::Finished(id) | UnitEvent::Stopped(id) => *id,
        }
    }
}

/// A playing unit inside the callback
struct Voice {
    id: UnitId,
    clip: ClipData,
    /// Playback position in output frames
    position: usize,
    /// Private gain stage for this unit
    gain: f32,
    exclusive: bool,
}

/// Shared state between audio thread and main thread
struct AudioState {
    voices: Vec<Voice>,
    master_volume: f32,
    rx: Receiver<AudioCommand>,
    events_tx: Sender<UnitEvent>,
    live: LiveUnits,
    output_sample_rate: u32,
}

/// The control surface the router talks to. Implemented by the real
/// engine handle and by a command-capturing mock for tests.
pub trait PlaybackSink {
    fn play_exclusive(&self, id: UnitId, clip: ClipData, gain: f32);
    fn play_overlay(&self, id: UnitId, clip: ClipData, gain: f32);
    fn stop_exclusive(&self);
    fn stop_all_overlays(&self);
    fn set_master_volume(&self, volume: f32);
    /// Snapshot of the unit ids currently being mixed.
    fn live_units(&self) -> HashSet<UnitId>;
}

/// Handle for sending commands to the audio engine
#[derive(Clone)]
pub struct AudioHandle {
    tx: Sender<AudioCommand>,
    live: LiveUnits,
    sample_rate: u32,
}

impl AudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl PlaybackSink for AudioHandle {
    fn play_exclusive(&self, id: UnitId, clip: ClipData, gain: f32) {
        let _ = self.tx.send(AudioCommand::PlayExclusive { id, clip, gain });
    }

    fn play_overlay(&self, id: UnitId, clip: ClipData, gain: f32) {
        let _ = self.tx.send(AudioCommand::PlayOverlay { id, clip, gain });
    }

    fn stop_exclusive(&self) {
        let _ = self.tx.send(AudioCommand::StopExclusive);
    }

    fn stop_all_overlays(&self) {
        let _ = self.tx.send(AudioCommand::StopAllOverlays);
    }

    fn set_master_volume(&self, volume: f32) {
        let _ = self.tx.send(AudioCommand::SetMasterVolume(volume));
    }

    fn live_units(&self) -> HashSet<UnitId> {
        self.live.lock().map(|set| set.clone()).unwrap_or_default()
    }
}

/// Audio engine with cpal stream
pub struct AudioEngine {
    _stream: Stream,
}

impl AudioEngine {
    /// Create the engine. Returns the handle for sending commands and the
    /// receiver for lifecycle events.
    pub fn new() -> Result<(Self, AudioHandle, Receiver<UnitEvent>), PlaybackError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(PlaybackError::NoDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| PlaybackError::Stream(e.to_string()))?;
        let sample_rate = config.sample_rate().0;

        let (tx, rx) = unbounded();
        let (events_tx, events_rx) = unbounded();
        let live: LiveUnits = Arc::new(Mutex::new(HashSet::new()));

        let state = Arc::new(Mutex::new(AudioState {
            voices: Vec::new(),
            master_volume: 1.0,
            rx,
            events_tx,
            live: live.clone(),
            output_sample_rate: sample_rate,
        }));

        let stream = match config.sample_format() {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &config.into(), state),
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &config.into(), state),
            SampleFormat::U16 => Self::build_stream::<u16>(&device, &config.into(), state),
            _ => return Err(PlaybackError::Stream("Unsupported sample format".to_string())),
        }?;

        stream
            .play()
            .map_err(|e| PlaybackError::Stream(e.to_string()))?;

        let engine = Self { _stream: stream };
        let handle = AudioHandle {
            tx,
            live,
            sample_rate,
        };

        Ok((engine, handle, events_rx))
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32> + cpal::Sample>(
        device: &cpal::Device,
        config: &StreamConfig,
        state: Arc<Mutex<AudioState>>,
    ) -> Result<Stream, PlaybackError>
    where
        f32: cpal::FromSample<T>,
    {
        let channels = config.channels as usize;

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    Self::audio_callback(data, channels, &state);
                },
                |err| eprintln!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| PlaybackError::Stream(e.to_string()))?;

        Ok(stream)
    }

    fn audio_callback<T: cpal::SizedSample + cpal::FromSample<f32> + cpal::Sample>(
        data: &mut [T],
        channels: usize,
        state: &Arc<Mutex<AudioState>>,
    ) where
        f32: cpal::FromSample<T>,
    {
        // Try to lock state - if we can't, output silence
        let Ok(mut state) = state.try_lock() else {
            for sample in data.iter_mut() {
                *sample = T::EQUILIBRIUM;
            }
            return;
        };

        Self::process_commands(&mut state);

        let master_volume = state.master_volume;
        let output_sample_rate = state.output_sample_rate;

        // Clear output buffer
        for sample in data.iter_mut() {
            *sample = T::EQUILIBRIUM;
        }

        let num_frames = data.len() / channels;

        // Mix all active voices, removing the ones that finish
        let mut i = 0;
        while i < state.voices.len() {
            let voice = &mut state.voices[i];
            let clip = &voice.clip;
            let clip_channels = clip.channels as usize;
            let voice_volume = voice.gain * master_volume;

            // Simple resampling ratio (crude but sufficient for clips)
            let resample_ratio = clip.sample_rate as f32 / output_sample_rate as f32;

            let mut finished = false;

            for frame in 0..num_frames {
                let src_frame = (voice.position as f32 * resample_ratio) as usize;

                if src_frame * clip_channels >= clip.data.len() {
                    finished = true;
                    break;
                }

                let (left, right) = if clip_channels == 1 {
                    let s = clip.data[src_frame] * voice_volume;
                    (s, s)
                } else {
                    let idx = src_frame * 2;
                    if idx + 1 < clip.data.len() {
                        (clip.data[idx] * voice_volume, clip.data[idx + 1] * voice_volume)
                    } else {
                        (0.0, 0.0)
                    }
                };

                let out_idx = frame * channels;
                if channels >= 2 {
                    let current_left: f32 = data[out_idx].to_sample();
                    let current_right: f32 = data[out_idx + 1].to_sample();
                    data[out_idx] = T::from_sample(current_left + left);
                    data[out_idx + 1] = T::from_sample(current_right + right);
                } else if channels == 1 {
                    let current: f32 = data[out_idx].to_sample();
                    data[out_idx] = T::from_sample(current + (left + right) * 0.5);
                }

                voice.position += 1;
            }

            if finished {
                let voice = state.voices.remove(i);
                Self::retire(&state, voice.id, UnitEvent::Finished(voice.id));
            } else {
                i += 1;
            }
        }

        // Soft clip to prevent harsh distortion
        for sample in data.iter_mut() {
            let s: f32 = sample.to_sample();
            *sample = T::from_sample(s.clamp(-1.0, 1.0));
        }
    }

    fn process_commands(state: &mut AudioState) {
        while let Ok(cmd) = state.rx.try_recv() {
            match cmd {
                AudioCommand::PlayExclusive { id, clip, gain } => {
                    // Tear down any current exclusive unit before starting
                    Self::remove_voices(state, |v| v.exclusive);
                    Self::start_voice(state, id, clip, gain, true);
                }
                AudioCommand::PlayOverlay { id, clip, gain } => {
                    Self::start_voice(state, id, clip, gain, false);
                }
                AudioCommand::StopExclusive => {
                    Self::remove_voices(state, |v| v.exclusive);
                }
                AudioCommand::StopAllOverlays => {
                    Self::remove_voices(state, |v| !v.exclusive);
                }
                AudioCommand::SetMasterVolume(vol) => {
                    state.master_volume = vol.clamp(0.0, 1.0);
                }
            }
        }
    }

    fn start_voice(state: &mut AudioState, id: UnitId, clip: ClipData, gain: f32, exclusive: bool) {
        state.voices.push(Voice {
            id,
            clip,
            position: 0,
            gain,
            exclusive,
        });
        if let Ok(mut live) = state.live.lock() {
            live.insert(id);
        }
        let _ = state.events_tx.send(UnitEvent::Started(id));
    }

    fn remove_voices(state: &mut AudioState, which: impl Fn(&Voice) -> bool) {
        let mut removed = Vec::new();
        state.voices.retain(|v| {
            if which(v) {
                removed.push(v.id);
                false
            } else {
                true
            }
        });
        for id in removed {
            Self::retire(state, id, UnitEvent::Stopped(id));
        }
    }

    fn retire(state: &AudioState, id: UnitId, event: UnitEvent) {
        if let Ok(mut live) = state.live.lock() {
            live.remove(&id);
        }
        let _ = state.events_tx.send(event);
    }
}

/// Decode a clip file into interleaved f32 samples.
///
/// Failure is fatal to this attempt only; the engine's bookkeeping for
/// other units is untouched.
pub fn decode_clip(path: &Path) -> Result<ClipData, PlaybackError> {
    let file = File::open(path).map_err(|e| PlaybackError::AssetUnavailable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let decoder =
        Decoder::new(BufReader::new(file)).map_err(|e| PlaybackError::DecodeFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    let sample_rate = decoder.sample_rate();
    let channels = decoder.channels();
    let samples: Vec<f32> = decoder.convert_samples::<f32>().collect();

    if samples.is_empty() {
        return Err(PlaybackError::DecodeFailed {
            path: path.display().to_string(),
            reason: "no audio frames".to_string(),
        });
    }

    Ok(ClipData {
        data: Arc::new(samples),
        sample_rate,
        channels,
    })
}

/// Playback errors. Scoped to a single attempt or to engine startup.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("no audio output device found")]
    NoDevice,
    #[error("failed to create audio stream: {0}")]
    Stream(String),
    #[error("asset unavailable at {path}: {reason}")]
    AssetUnavailable { path: String, reason: String },
    #[error("could not decode {path}: {reason}")]
    DecodeFailed { path: String, reason: String },
}
