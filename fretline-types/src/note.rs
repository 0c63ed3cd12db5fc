//! A single fretted note with its pitch-change curve.

use serde::{Deserialize, Serialize};

/// Full-scale pitch-bend width assumed when a note does not override it.
pub const DEFAULT_PITCH_RANGE: u8 = 2;

/// One sounding note: a string position plus optional pitch bends.
///
/// `pitch_changes` holds `(fraction, semitones)` pairs: the fraction is a
/// point in the note's duration in `0.0..=1.0`, the semitone offset is
/// relative to the fretted pitch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub string: usize,
    pub fret: u8,
    pub pitch_changes: Vec<(f32, f32)>,
    /// Semitone span of a full-scale bend on this note's channel.
    pub pitch_range: u8,
}

impl Note {
    pub fn new(string: usize, fret: u8) -> Self {
        Self {
            string,
            fret,
            pitch_changes: Vec::new(),
            pitch_range: DEFAULT_PITCH_RANGE,
        }
    }

    pub fn with_bends(string: usize, fret: u8, pitch_changes: Vec<(f32, f32)>) -> Self {
        Self {
            string,
            fret,
            pitch_changes,
            pitch_range: DEFAULT_PITCH_RANGE,
        }
    }

    pub fn has_bends(&self) -> bool {
        !self.pitch_changes.is_empty()
    }
}
