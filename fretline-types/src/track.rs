//! Tablature track model: tab events, measures, repeats.

use serde::{Deserialize, Serialize};

use crate::music::{BeatDuration, DurationMod, Dynamic, Tuning};
use crate::note::Note;

/// Default strum spread, in beats (a sixteenth).
pub const DEFAULT_STROKE_BEATS: f64 = 0.25;

/// Direction of a strummed stroke. Down iterates low string to high,
/// up reverses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrokeDirection {
    Down,
    Up,
}

/// How a note is held relative to its notated duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Articulation {
    #[default]
    Normal,
    /// Rings until explicitly stopped; no scheduled noteoff.
    Legato,
    /// Sounds for half the notated duration.
    Staccato,
}

/// What one tab event amounts to, by populated string count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Rest,
    Note,
    Chord,
}

/// One moment in a tablature track: a rest, a note, or a chord.
///
/// `dynamic` and `articulation` are `None` when the notation leaves them
/// unspecified; track compilation carries the previous value forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabEvent {
    pub notes: Vec<Note>,
    pub duration: BeatDuration,
    pub modifier: DurationMod,
    pub dynamic: Option<Dynamic>,
    pub articulation: Option<Articulation>,
    pub stroke: Option<StrokeDirection>,
    /// Beats the strum is spread across when `stroke` is set.
    pub stroke_beats: f64,
}

impl TabEvent {
    pub fn rest(duration: BeatDuration) -> Self {
        Self {
            notes: Vec::new(),
            duration,
            modifier: DurationMod::Plain,
            dynamic: None,
            articulation: None,
            stroke: None,
            stroke_beats: DEFAULT_STROKE_BEATS,
        }
    }

    pub fn note(note: Note, duration: BeatDuration) -> Self {
        Self { notes: vec![note], ..Self::rest(duration) }
    }

    pub fn chord(notes: Vec<Note>, duration: BeatDuration) -> Self {
        Self { notes, ..Self::rest(duration) }
    }

    pub fn classify(&self) -> EventKind {
        match self.notes.len() {
            0 => EventKind::Rest,
            1 => EventKind::Note,
            _ => EventKind::Chord,
        }
    }

    /// Event length in beats, quarter note = 1.0.
    pub fn beats(&self) -> f64 {
        self.duration.beats() * self.modifier.factor()
    }

    /// Event length in seconds at the given tempo, where `beat_duration`
    /// names the note value that carries the beat.
    pub fn seconds(&self, bpm: f64, beat_duration: BeatDuration) -> f64 {
        self.beats() / beat_duration.beats() * 60.0 / bpm
    }
}

/// A measure with optional repeat barlines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub events: Vec<TabEvent>,
    pub repeat_start: bool,
    pub repeat_end: bool,
    /// Total times the repeated span plays; meaningful with `repeat_end`.
    pub repeat_count: u32,
}

impl Measure {
    pub fn new(events: Vec<TabEvent>) -> Self {
        Self { events, repeat_start: false, repeat_end: false, repeat_count: 2 }
    }
}

/// A named track: a tuning plus its measures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    pub instrument: String,
    pub tuning: Tuning,
    pub measures: Vec<Measure>,
}

impl Track {
    pub fn new(name: impl Into<String>, instrument: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instrument: instrument.into(),
            tuning: Tuning::standard(),
            measures: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_string_count() {
        let rest = TabEvent::rest(BeatDuration::Quarter);
        assert_eq!(rest.classify(), EventKind::Rest);

        let single = TabEvent::note(Note::new(0, 3), BeatDuration::Quarter);
        assert_eq!(single.classify(), EventKind::Note);

        let chord = TabEvent::chord(
            vec![Note::new(0, 3), Note::new(1, 2), Note::new(2, 0)],
            BeatDuration::Half,
        );
        assert_eq!(chord.classify(), EventKind::Chord);
    }

    #[test]
    fn seconds_at_tempo() {
        // A quarter note at 120 bpm with the quarter carrying the beat.
        let e = TabEvent::rest(BeatDuration::Quarter);
        assert!((e.seconds(120.0, BeatDuration::Quarter) - 0.5).abs() < 1e-9);

        // Dotted half at 60 bpm is three seconds.
        let mut e = TabEvent::rest(BeatDuration::Half);
        e.modifier = DurationMod::Dotted;
        assert!((e.seconds(60.0, BeatDuration::Quarter) - 3.0).abs() < 1e-9);
    }
}
