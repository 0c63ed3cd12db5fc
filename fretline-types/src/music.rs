//! Musical constants: beat durations, dynamics, MIDI note codes, tunings.

use serde::{Deserialize, Serialize};

/// Base note duration, measured in beats with the quarter note at 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BeatDuration {
    Whole,
    Half,
    #[default]
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
}

impl BeatDuration {
    pub const ALL: [BeatDuration; 6] = [
        BeatDuration::Whole,
        BeatDuration::Half,
        BeatDuration::Quarter,
        BeatDuration::Eighth,
        BeatDuration::Sixteenth,
        BeatDuration::ThirtySecond,
    ];

    pub fn beats(self) -> f64 {
        match self {
            BeatDuration::Whole => 4.0,
            BeatDuration::Half => 2.0,
            BeatDuration::Quarter => 1.0,
            BeatDuration::Eighth => 0.5,
            BeatDuration::Sixteenth => 0.25,
            BeatDuration::ThirtySecond => 0.125,
        }
    }
}

/// Multiplier applied on top of a base duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DurationMod {
    #[default]
    Plain,
    Dotted,
    DoubleDotted,
    Triplet,
    Quintuplet,
}

impl DurationMod {
    pub fn factor(self) -> f64 {
        match self {
            DurationMod::Plain => 1.0,
            DurationMod::Dotted => 1.5,
            DurationMod::DoubleDotted => 1.75,
            DurationMod::Triplet => 2.0 / 3.0,
            DurationMod::Quintuplet => 0.2,
        }
    }
}

/// Notated loudness, mapped to MIDI velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Dynamic {
    Ppp,
    Pp,
    P,
    Mp,
    #[default]
    Mf,
    F,
    Ff,
    Fff,
}

impl Dynamic {
    pub fn velocity(self) -> u8 {
        match self {
            Dynamic::Ppp => 16,
            Dynamic::Pp => 32,
            Dynamic::P => 48,
            Dynamic::Mp => 64,
            Dynamic::Mf => 80,
            Dynamic::F => 96,
            Dynamic::Ff => 112,
            Dynamic::Fff => 127,
        }
    }
}

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Render a MIDI note code as a name with octave, e.g. 40 -> "E2".
pub fn note_name(code: u8) -> String {
    let octave = (code / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(code % 12) as usize], octave)
}

/// Parse a note name with octave ("E2", "C#4") into a MIDI code.
pub fn note_code(name: &str) -> Option<u8> {
    let split = name
        .find(|c: char| c.is_ascii_digit() || c == '-')
        .filter(|&i| i > 0)?;
    let (pitch, octave) = name.split_at(split);
    let index = NOTE_NAMES.iter().position(|n| *n == pitch)?;
    let octave: i32 = octave.parse().ok()?;
    let code = (octave + 1) * 12 + index as i32;
    u8::try_from(code).ok()
}

/// Open-string MIDI codes for a stringed instrument, lowest string first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuning {
    pub open_strings: Vec<u8>,
}

impl Tuning {
    /// Standard six-string guitar, E2 A2 D3 G3 B3 E4.
    pub fn standard() -> Self {
        Self { open_strings: vec![40, 45, 50, 55, 59, 64] }
    }

    /// Drop-D guitar, D2 A2 D3 G3 B3 E4.
    pub fn drop_d() -> Self {
        Self { open_strings: vec![38, 45, 50, 55, 59, 64] }
    }

    /// Four-string bass, E1 A1 D2 G2.
    pub fn bass() -> Self {
        Self { open_strings: vec![28, 33, 38, 43] }
    }

    pub fn string_count(&self) -> usize {
        self.open_strings.len()
    }

    /// MIDI code for a fretted position, or None for an out-of-range string.
    pub fn pitch(&self, string: usize, fret: u8) -> Option<u8> {
        self.open_strings
            .get(string)
            .and_then(|open| open.checked_add(fret))
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self::standard()
    }
}
