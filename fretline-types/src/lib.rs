//! # fretline-types
//!
//! Shared data model for the Fretline playback engine: durations and
//! dynamics, tunings, notes and tab events, note-mix weights, and the
//! effect parameter model with its diff rules.

pub mod effect;
pub mod mix;
pub mod music;
pub mod note;
pub mod track;

pub use effect::{delta, ControlChange, Effect, EffectChanges, EffectParam, Effects, ParamKind, PortSpec};
pub use mix::NoteMixWeights;
pub use music::{BeatDuration, DurationMod, Dynamic, Tuning};
pub use note::Note;
pub use track::{Articulation, EventKind, Measure, StrokeDirection, TabEvent, Track};

/// Unique identifier for a tablature track.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct TrackId(u32);

impl TrackId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
