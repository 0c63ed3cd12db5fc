//! Audio runtime for the fretline tablature composer.
//!
//! The synth worker owns the external synthesizer behind a command
//! channel; the scheduler fires time-delayed note events; the channel
//! allocator hands out synth channels per instrument role; and the
//! instrument engine translates tab events into the channel-level
//! commands that make them sound.

pub mod catalog;
pub mod channels;
pub mod devices;
pub mod effect_repo;
pub mod instrument;
pub mod ladspa;
pub mod paths;
pub mod player;
pub mod scheduler;
pub mod sequencer;
pub mod synth;
pub mod telemetry;

pub use catalog::{Catalog, CustomInstrument, InstrumentSpec};
pub use channels::{ChannelAllocator, DEFAULT_CHANNEL_COUNT, PERCUSSION_CHANNEL, PREVIEW_CHANNEL};
pub use instrument::Instrument;
pub use player::{compile_track, DriftClock, Player};
pub use scheduler::{Scheduler, TimerId};
pub use sequencer::Sequencer;
pub use synth::{
    SynthBackend, SynthCommand, SynthConfig, SynthError, SynthProxy, SynthResult, TimedEvent,
};
