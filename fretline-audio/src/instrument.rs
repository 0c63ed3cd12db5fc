//! Instrument playback engine.
//!
//! Translates tab events into per-channel noteon/noteoff/pitch-bend
//! commands: weighted mixing across the normal/harmonic/muted channel
//! roles, monophonic discipline on fretted strings, strum spreading,
//! and legato/staccato duration rules. Everything time-delayed goes
//! through the scheduler; everything immediate goes straight to the
//! proxy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fretline_types::{
    delta, Articulation, BeatDuration, EffectChanges, Effects, EventKind, Note, NoteMixWeights,
    StrokeDirection, TabEvent, Tuning,
};

use crate::catalog::CustomInstrument;
use crate::channels::ChannelAllocator;
use crate::scheduler::{Scheduler, TimerId};
use crate::synth::{SynthCommand, SynthError, SynthProxy, SynthResult};

/// Channels backing the three note roles. The normal role always has a
/// channel; harmonic and muted are allocated only when their mix weight
/// is audible.
#[derive(Debug, Clone, Copy)]
struct RoleChannels {
    normal: u8,
    harmonic: Option<u8>,
    muted: Option<u8>,
}

impl RoleChannels {
    fn all(&self) -> Vec<u8> {
        let mut out = vec![self.normal];
        out.extend(self.harmonic);
        out.extend(self.muted);
        out
    }
}

/// A note currently held on one string: the (channel, key) pairs it
/// sounds on plus any in-flight timers for its future sub-events.
struct Sounding {
    keys: Vec<(u8, u8)>,
    timers: Vec<TimerId>,
}

/// One playing instrument bound to its synth channels.
pub struct Instrument {
    name: String,
    tuning: Tuning,
    mix: NoteMixWeights,
    channels: RoleChannels,
    one_note_per_string: bool,
    sounding: HashMap<usize, Sounding>,
    /// Every timer armed by a strike, whether or not the string tracks
    /// it. Drained on teardown so nothing fires on a reallocated channel.
    pending_timers: Vec<TimerId>,
    /// channel -> bend range currently programmed on it
    bend_range: HashMap<u8, u8>,
    effects: Effects,
    proxy: Arc<SynthProxy>,
    scheduler: Arc<Scheduler>,
}

/// Guitar-family naming heuristic deciding monophonic string
/// discipline. "Bassoon" contains "bass" but is not fretted.
fn enforces_one_note_per_string(name: &str) -> bool {
    let lower = name.to_lowercase();
    if lower.contains("bassoon") {
        return false;
    }
    ["guitar", "gtr", "bass"].iter().any(|k| lower.contains(k))
}

/// Pitch wheel value for a semitone offset given the channel bend range.
fn wheel_value(semitones: f32, range: u8) -> u16 {
    let range = f32::from(range.max(1));
    let value = 8192.0 + (semitones / range) * 8192.0;
    value.round().clamp(0.0, 16383.0) as u16
}

impl Instrument {
    /// Allocate channels for a binding and select its patches.
    ///
    /// Channels already allocated are returned to the pool when a later
    /// allocation in the same binding fails.
    pub fn create(
        binding: &CustomInstrument,
        tuning: Tuning,
        allocator: &mut ChannelAllocator,
        scheduler: Arc<Scheduler>,
    ) -> SynthResult<Self> {
        let proxy = allocator.proxy().clone();
        let mix = binding.weights;

        let normal = allocator.alloc(&binding.normal)?;

        let harmonic = if mix.harmonic > 0.0 {
            let name = binding.harmonic.as_deref().unwrap_or(&binding.normal);
            match allocator.alloc(name) {
                Ok(chan) => Some(chan),
                Err(e) => {
                    allocator.free(normal);
                    return Err(e);
                }
            }
        } else {
            None
        };

        let muted = if mix.muted > 0.0 {
            let name = binding.muted.as_deref().unwrap_or(&binding.normal);
            match allocator.alloc(name) {
                Ok(chan) => Some(chan),
                Err(e) => {
                    allocator.free(normal);
                    if let Some(chan) = harmonic {
                        allocator.free(chan);
                    }
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self {
            one_note_per_string: enforces_one_note_per_string(&binding.name),
            name: binding.name.clone(),
            tuning,
            mix,
            channels: RoleChannels { normal, harmonic, muted },
            sounding: HashMap::new(),
            pending_timers: Vec::new(),
            bend_range: HashMap::new(),
            effects: Effects::default(),
            proxy,
            scheduler,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channels(&self) -> Vec<u8> {
        self.channels.all()
    }

    pub fn effects(&self) -> &Effects {
        &self.effects
    }

    /// (channel, velocity) per role after normalizing the mix. A role
    /// whose effective velocity is zero gets no noteon at all.
    fn role_targets(&self, velocity: u8) -> Vec<(u8, u8)> {
        let mut targets = Vec::with_capacity(3);
        let vel = self.mix.role_velocity(self.mix.normal, velocity);
        if vel > 0 {
            targets.push((self.channels.normal, vel));
        }
        if let Some(chan) = self.channels.harmonic {
            let vel = self.mix.role_velocity(self.mix.harmonic, velocity);
            if vel > 0 {
                targets.push((chan, vel));
            }
        }
        if let Some(chan) = self.channels.muted {
            let vel = self.mix.role_velocity(self.mix.muted, velocity);
            if vel > 0 {
                targets.push((chan, vel));
            }
        }
        targets
    }

    /// Stop whatever is sounding on a string and cancel its pending
    /// sub-events, so a stale noteoff cannot silence a newer note.
    fn stop_string(&mut self, string: usize) -> SynthResult {
        if let Some(held) = self.sounding.remove(&string) {
            for timer in held.timers {
                self.scheduler.cancel(timer);
            }
            for (chan, key) in held.keys {
                self.proxy.transact(SynthCommand::NoteOff { chan, key })?;
            }
        }
        Ok(())
    }

    /// Program the bend range on every target channel, once per channel
    /// until a note asks for a different range.
    fn ensure_bend_range(&mut self, targets: &[(u8, u8)], semitones: u8) -> SynthResult {
        for &(chan, _) in targets {
            if self.bend_range.get(&chan) != Some(&semitones) {
                self.proxy
                    .transact(SynthCommand::PitchBendRange { chan, semitones })?;
                self.bend_range.insert(chan, semitones);
            }
        }
        Ok(())
    }

    /// Sound one note: noteon now (or at `start_offset` for strummed
    /// notes), pitch bends at their fractions of the duration, noteoff
    /// per the articulation. All delays are measured from this call.
    fn strike(
        &mut self,
        note: &Note,
        velocity: u8,
        start_offset: f64,
        duration_secs: f64,
        articulation: Articulation,
    ) -> SynthResult {
        let key = self
            .tuning
            .pitch(note.string, note.fret)
            .ok_or(SynthError::InvalidString(note.string))?;

        if self.one_note_per_string {
            self.stop_string(note.string)?;
        }

        let targets = self.role_targets(velocity);
        if targets.is_empty() {
            return Ok(());
        }

        if note.has_bends() {
            self.ensure_bend_range(&targets, note.pitch_range)?;
        }

        let mut timers = Vec::new();

        if start_offset <= 0.0 {
            for &(chan, vel) in &targets {
                self.proxy
                    .transact(SynthCommand::NoteOn { chan, key, vel })?;
            }
        } else {
            for &(chan, vel) in &targets {
                let proxy = self.proxy.clone();
                timers.push(self.scheduler.start(
                    Duration::from_secs_f64(start_offset),
                    move || {
                        if let Err(e) = proxy.transact(SynthCommand::NoteOn { chan, key, vel }) {
                            log::warn!(target: "synth", "deferred noteon failed: {}", e);
                        }
                    },
                ));
            }
        }

        for &(fraction, semitones) in &note.pitch_changes {
            let delay = f64::from(fraction.clamp(0.0, 1.0)) * duration_secs;
            let value = wheel_value(semitones, note.pitch_range);
            for &(chan, _) in &targets {
                let proxy = self.proxy.clone();
                timers.push(self.scheduler.start(
                    Duration::from_secs_f64(delay),
                    move || {
                        if let Err(e) = proxy.transact(SynthCommand::PitchBend { chan, value }) {
                            log::warn!(target: "synth", "pitch bend failed: {}", e);
                        }
                    },
                ));
            }
        }

        match articulation {
            // Legato rings until the next note on the string stops it.
            Articulation::Legato => {}
            Articulation::Normal | Articulation::Staccato => {
                let off_delay = if articulation == Articulation::Staccato {
                    start_offset + (duration_secs - start_offset) / 2.0
                } else {
                    duration_secs
                };
                for &(chan, _) in &targets {
                    let proxy = self.proxy.clone();
                    timers.push(self.scheduler.start(
                        Duration::from_secs_f64(off_delay.max(0.0)),
                        move || {
                            if let Err(e) = proxy.transact(SynthCommand::NoteOff { chan, key }) {
                                log::warn!(target: "synth", "scheduled noteoff failed: {}", e);
                            }
                        },
                    ));
                }
            }
        }

        self.pending_timers.extend_from_slice(&timers);
        if self.one_note_per_string {
            let keys = targets.iter().map(|&(chan, _)| (chan, key)).collect();
            self.sounding.insert(note.string, Sounding { keys, timers });
        }
        Ok(())
    }

    /// Sound a note immediately with no scheduled release (preview).
    pub fn note_event(&mut self, note: &Note, velocity: u8) -> SynthResult {
        let key = self
            .tuning
            .pitch(note.string, note.fret)
            .ok_or(SynthError::InvalidString(note.string))?;

        if self.one_note_per_string {
            self.stop_string(note.string)?;
        }

        let targets = self.role_targets(velocity);
        for &(chan, vel) in &targets {
            self.proxy
                .transact(SynthCommand::NoteOn { chan, key, vel })?;
        }

        if self.one_note_per_string {
            let keys = targets.iter().map(|&(chan, _)| (chan, key)).collect();
            self.sounding.insert(note.string, Sounding { keys, timers: Vec::new() });
        }
        Ok(())
    }

    /// Release a note started by `note_event` or a legato strike.
    pub fn noteoff_events(&mut self, note: &Note) -> SynthResult {
        if self.one_note_per_string {
            return self.stop_string(note.string);
        }
        let key = self
            .tuning
            .pitch(note.string, note.fret)
            .ok_or(SynthError::InvalidString(note.string))?;
        for chan in self.channels.all() {
            self.proxy.transact(SynthCommand::NoteOff { chan, key })?;
        }
        Ok(())
    }

    /// Move the pitch wheel immediately on every role channel.
    pub fn pitchwheel_event(&mut self, note: &Note, semitones: f32) -> SynthResult {
        let targets: Vec<u8> = self.channels.all();
        self.ensure_bend_range(
            &targets.iter().map(|&c| (c, 0)).collect::<Vec<_>>(),
            note.pitch_range,
        )?;
        let value = wheel_value(semitones, note.pitch_range);
        for chan in targets {
            self.proxy.transact(SynthCommand::PitchBend { chan, value })?;
        }
        Ok(())
    }

    /// Set the channel volume on every role channel, `gain` in 0.0..=1.0.
    pub fn set_gain(&mut self, gain: f32) -> SynthResult {
        for chan in self.channels.all() {
            self.proxy.transact(SynthCommand::ChannelGain { chan, gain })?;
        }
        Ok(())
    }

    /// Play one tab event and return its duration in seconds so the
    /// caller can advance its clock. Never blocks on the duration.
    pub fn tab_event(
        &mut self,
        event: &TabEvent,
        bpm: f64,
        beat_duration: BeatDuration,
    ) -> SynthResult<f64> {
        let duration_secs = event.seconds(bpm, beat_duration);
        let kind = event.classify();
        if kind == EventKind::Rest {
            return Ok(duration_secs);
        }

        let velocity = event.dynamic.unwrap_or_default().velocity();
        let articulation = event.articulation.unwrap_or_default();

        let mut notes: Vec<&Note> = event.notes.iter().collect();
        notes.sort_by_key(|n| n.string);
        if event.stroke == Some(StrokeDirection::Up) {
            notes.reverse();
        }

        // Only strummed chords spread their noteons; picked chords and
        // single notes strike together.
        let stroke_secs = if kind == EventKind::Chord && event.stroke.is_some() {
            event.stroke_beats / beat_duration.beats() * 60.0 / bpm
        } else {
            0.0
        };
        let step = if notes.len() > 1 {
            stroke_secs / notes.len() as f64
        } else {
            0.0
        };

        for (i, note) in notes.iter().enumerate() {
            self.strike(note, velocity, step * i as f64, duration_secs, articulation)?;
        }
        Ok(duration_secs)
    }

    /// Push a computed effect diff to the backend on every role channel.
    /// Order: add plugins, set changed controls, then enable/disable.
    pub fn effects_change(&mut self, changes: &EffectChanges) -> SynthResult {
        let channels = self.channels.all();

        for effect in &changes.added {
            for &chan in &channels {
                self.proxy.transact(SynthCommand::FilterAdd {
                    chan,
                    path: effect.path.clone(),
                    label: effect.label.clone(),
                })?;
            }
        }
        for change in &changes.controls {
            for &chan in &channels {
                self.proxy.transact(SynthCommand::FilterSetControl {
                    chan,
                    label: change.label.clone(),
                    control: change.control.clone(),
                    value: change.value,
                })?;
            }
        }
        for effect in &changes.added {
            for &chan in &channels {
                self.proxy.transact(SynthCommand::FilterEnable {
                    chan,
                    label: effect.label.clone(),
                })?;
            }
        }
        for label in &changes.removed {
            for &chan in &channels {
                self.proxy.transact(SynthCommand::FilterDisable {
                    chan,
                    label: label.clone(),
                })?;
            }
        }
        Ok(())
    }

    /// Diff a new effect chain against the held snapshot, apply the
    /// minimal update, and adopt the new chain as current.
    pub fn set_effects(&mut self, effects: &Effects) -> SynthResult {
        let changes = delta(&self.effects, effects);
        if !changes.is_empty() {
            self.effects_change(&changes)?;
        }
        self.effects = effects.clone();
        Ok(())
    }

    /// Silence everything, cancel in-flight timers, and return this
    /// instrument's channels to the pool.
    pub fn free_resources(&mut self, allocator: &mut ChannelAllocator) -> SynthResult {
        for timer in self.pending_timers.drain(..) {
            self.scheduler.cancel(timer);
        }
        let strings: Vec<usize> = self.sounding.keys().copied().collect();
        for string in strings {
            self.stop_string(string)?;
        }
        self.bend_range.clear();
        for chan in self.channels.all() {
            allocator.free(chan);
        }
        Ok(())
    }
}
