//! Synth backend trait: a semantic-level abstraction over synthesizer
//! operations.
//!
//! `SynthBackend` captures what the engine *means* to do (sound a note,
//! select a patch, wire a filter) independently of how it's done (shell
//! commands to a fluidsynth process). This enables unit testing of
//! playback logic without a running synthesizer.

use std::fmt;
use std::path::{Path, PathBuf};

use super::{SynthConfig, TimedEvent};

/// Result type for backend operations.
pub type BackendResult<T = ()> = Result<T, BackendError>;

/// Error from a backend operation.
#[derive(Debug, Clone)]
pub struct BackendError(pub String);

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError(e.to_string())
    }
}

impl From<String> for BackendError {
    fn from(s: String) -> Self {
        BackendError(s)
    }
}

/// Semantic-level synthesizer backend trait.
///
/// Each method represents one operation from the command protocol.
/// Implementations translate these into process-specific commands or
/// record them for testing.
pub trait SynthBackend: Send {
    /// Boot the synthesizer with the given configuration.
    fn start(&self, config: &SynthConfig) -> BackendResult;

    /// Tear the synthesizer down.
    fn stop(&self) -> BackendResult;

    fn note_on(&self, chan: u8, key: u8, vel: u8) -> BackendResult;

    fn note_off(&self, chan: u8, key: u8) -> BackendResult;

    /// Bind a channel to a soundfont/bank/preset triple.
    fn select(&self, chan: u8, sfont: u32, bank: u32, preset: u32) -> BackendResult;

    /// Set the semitone span of a full-scale pitch bend on a channel.
    fn pitch_bend_range(&self, chan: u8, semitones: u8) -> BackendResult;

    /// Move the pitch wheel; 8192 is center, 0..=16383 full scale.
    fn pitch_bend(&self, chan: u8, value: u16) -> BackendResult;

    /// Per-channel gain in 0.0..=1.0.
    fn channel_gain(&self, chan: u8, gain: f32) -> BackendResult;

    fn filter_add(&self, chan: u8, path: &Path, label: &str) -> BackendResult;

    fn filter_remove(&self, chan: u8, label: &str) -> BackendResult;

    fn filter_enable(&self, chan: u8, label: &str) -> BackendResult;

    fn filter_disable(&self, chan: u8, label: &str) -> BackendResult;

    fn filter_set_control(&self, chan: u8, label: &str, control: &str, value: f32) -> BackendResult;

    /// Execute a pre-scheduled command batch, honoring each offset.
    fn timer_events(&self, events: &[TimedEvent]) -> BackendResult;
}

// ─── Test Backend ───────────────────────────────────────────────────

use std::sync::{Arc, Mutex};

/// An operation recorded by `TestBackend` for assertion in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum TestOp {
    Start { soundfonts: Vec<PathBuf> },
    Stop,
    NoteOn { chan: u8, key: u8, vel: u8 },
    NoteOff { chan: u8, key: u8 },
    Select { chan: u8, sfont: u32, bank: u32, preset: u32 },
    PitchBendRange { chan: u8, semitones: u8 },
    PitchBend { chan: u8, value: u16 },
    ChannelGain { chan: u8, gain: f32 },
    FilterAdd { chan: u8, path: String, label: String },
    FilterRemove { chan: u8, label: String },
    FilterEnable { chan: u8, label: String },
    FilterDisable { chan: u8, label: String },
    FilterSetControl { chan: u8, label: String, control: String, value: f32 },
    TimerEvents { count: usize },
}

/// A test backend that records all operations into a vector for
/// assertions. All operations succeed by default; a panic can be armed
/// for fault-isolation tests. Uses `Mutex` for interior mutability so
/// the backend is `Send + Sync` (needed for `Arc<TestBackend>` sharing).
pub struct TestBackend {
    ops: Mutex<Vec<TestOp>>,
    panic_on_note_on: Mutex<bool>,
}

impl TestBackend {
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            panic_on_note_on: Mutex::new(false),
        }
    }

    /// Make the next `note_on` panic, simulating a native fault.
    pub fn arm_note_on_panic(&self) {
        *self.panic_on_note_on.lock().unwrap() = true;
    }

    /// Return all recorded operations.
    pub fn operations(&self) -> Vec<TestOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Clear recorded operations.
    pub fn clear(&self) {
        self.ops.lock().unwrap().clear();
    }

    /// Count operations matching a predicate.
    pub fn count<F: Fn(&TestOp) -> bool>(&self, f: F) -> usize {
        self.ops.lock().unwrap().iter().filter(|op| f(op)).count()
    }

    /// Find the first operation matching a predicate.
    pub fn find<F: Fn(&TestOp) -> bool>(&self, f: F) -> Option<TestOp> {
        self.ops.lock().unwrap().iter().find(|op| f(op)).cloned()
    }

    /// Return all NoteOn operations in issue order.
    pub fn notes_on(&self) -> Vec<(u8, u8, u8)> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                TestOp::NoteOn { chan, key, vel } => Some((*chan, *key, *vel)),
                _ => None,
            })
            .collect()
    }

    /// Return all NoteOff operations in issue order.
    pub fn notes_off(&self) -> Vec<(u8, u8)> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                TestOp::NoteOff { chan, key } => Some((*chan, *key)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, op: TestOp) {
        self.ops.lock().unwrap().push(op);
    }
}

impl SynthBackend for TestBackend {
    fn start(&self, config: &SynthConfig) -> BackendResult {
        self.push(TestOp::Start { soundfonts: config.soundfonts.clone() });
        Ok(())
    }

    fn stop(&self) -> BackendResult {
        self.push(TestOp::Stop);
        Ok(())
    }

    fn note_on(&self, chan: u8, key: u8, vel: u8) -> BackendResult {
        if std::mem::take(&mut *self.panic_on_note_on.lock().unwrap()) {
            panic!("simulated native fault in note_on");
        }
        self.push(TestOp::NoteOn { chan, key, vel });
        Ok(())
    }

    fn note_off(&self, chan: u8, key: u8) -> BackendResult {
        self.push(TestOp::NoteOff { chan, key });
        Ok(())
    }

    fn select(&self, chan: u8, sfont: u32, bank: u32, preset: u32) -> BackendResult {
        self.push(TestOp::Select { chan, sfont, bank, preset });
        Ok(())
    }

    fn pitch_bend_range(&self, chan: u8, semitones: u8) -> BackendResult {
        self.push(TestOp::PitchBendRange { chan, semitones });
        Ok(())
    }

    fn pitch_bend(&self, chan: u8, value: u16) -> BackendResult {
        self.push(TestOp::PitchBend { chan, value });
        Ok(())
    }

    fn channel_gain(&self, chan: u8, gain: f32) -> BackendResult {
        self.push(TestOp::ChannelGain { chan, gain });
        Ok(())
    }

    fn filter_add(&self, chan: u8, path: &Path, label: &str) -> BackendResult {
        self.push(TestOp::FilterAdd {
            chan,
            path: path.to_string_lossy().to_string(),
            label: label.to_string(),
        });
        Ok(())
    }

    fn filter_remove(&self, chan: u8, label: &str) -> BackendResult {
        self.push(TestOp::FilterRemove { chan, label: label.to_string() });
        Ok(())
    }

    fn filter_enable(&self, chan: u8, label: &str) -> BackendResult {
        self.push(TestOp::FilterEnable { chan, label: label.to_string() });
        Ok(())
    }

    fn filter_disable(&self, chan: u8, label: &str) -> BackendResult {
        self.push(TestOp::FilterDisable { chan, label: label.to_string() });
        Ok(())
    }

    fn filter_set_control(&self, chan: u8, label: &str, control: &str, value: f32) -> BackendResult {
        self.push(TestOp::FilterSetControl {
            chan,
            label: label.to_string(),
            control: control.to_string(),
            value,
        });
        Ok(())
    }

    fn timer_events(&self, events: &[TimedEvent]) -> BackendResult {
        self.push(TestOp::TimerEvents { count: events.len() });
        Ok(())
    }
}

impl Default for TestBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps `Arc<TestBackend>` to implement `SynthBackend` so the proxy can
/// own a `Box<dyn SynthBackend>` while tests retain an `Arc` for
/// assertions.
pub struct SharedTestBackend(pub Arc<TestBackend>);

impl SynthBackend for SharedTestBackend {
    fn start(&self, config: &SynthConfig) -> BackendResult {
        self.0.start(config)
    }
    fn stop(&self) -> BackendResult {
        self.0.stop()
    }
    fn note_on(&self, chan: u8, key: u8, vel: u8) -> BackendResult {
        self.0.note_on(chan, key, vel)
    }
    fn note_off(&self, chan: u8, key: u8) -> BackendResult {
        self.0.note_off(chan, key)
    }
    fn select(&self, chan: u8, sfont: u32, bank: u32, preset: u32) -> BackendResult {
        self.0.select(chan, sfont, bank, preset)
    }
    fn pitch_bend_range(&self, chan: u8, semitones: u8) -> BackendResult {
        self.0.pitch_bend_range(chan, semitones)
    }
    fn pitch_bend(&self, chan: u8, value: u16) -> BackendResult {
        self.0.pitch_bend(chan, value)
    }
    fn channel_gain(&self, chan: u8, gain: f32) -> BackendResult {
        self.0.channel_gain(chan, gain)
    }
    fn filter_add(&self, chan: u8, path: &Path, label: &str) -> BackendResult {
        self.0.filter_add(chan, path, label)
    }
    fn filter_remove(&self, chan: u8, label: &str) -> BackendResult {
        self.0.filter_remove(chan, label)
    }
    fn filter_enable(&self, chan: u8, label: &str) -> BackendResult {
        self.0.filter_enable(chan, label)
    }
    fn filter_disable(&self, chan: u8, label: &str) -> BackendResult {
        self.0.filter_disable(chan, label)
    }
    fn filter_set_control(&self, chan: u8, label: &str, control: &str, value: f32) -> BackendResult {
        self.0.filter_set_control(chan, label, control, value)
    }
    fn timer_events(&self, events: &[TimedEvent]) -> BackendResult {
        self.0.timer_events(events)
    }
}

// ─── NullBackend ────────────────────────────────────────────────────

/// A no-op backend that silently succeeds. Useful as a default when no
/// synthesizer is running.
pub struct NullBackend;

impl SynthBackend for NullBackend {
    fn start(&self, _: &SynthConfig) -> BackendResult { Ok(()) }
    fn stop(&self) -> BackendResult { Ok(()) }
    fn note_on(&self, _: u8, _: u8, _: u8) -> BackendResult { Ok(()) }
    fn note_off(&self, _: u8, _: u8) -> BackendResult { Ok(()) }
    fn select(&self, _: u8, _: u32, _: u32, _: u32) -> BackendResult { Ok(()) }
    fn pitch_bend_range(&self, _: u8, _: u8) -> BackendResult { Ok(()) }
    fn pitch_bend(&self, _: u8, _: u16) -> BackendResult { Ok(()) }
    fn channel_gain(&self, _: u8, _: f32) -> BackendResult { Ok(()) }
    fn filter_add(&self, _: u8, _: &Path, _: &str) -> BackendResult { Ok(()) }
    fn filter_remove(&self, _: u8, _: &str) -> BackendResult { Ok(()) }
    fn filter_enable(&self, _: u8, _: &str) -> BackendResult { Ok(()) }
    fn filter_disable(&self, _: u8, _: &str) -> BackendResult { Ok(()) }
    fn filter_set_control(&self, _: u8, _: &str, _: &str, _: f32) -> BackendResult { Ok(()) }
    fn timer_events(&self, _: &[TimedEvent]) -> BackendResult { Ok(()) }
}
