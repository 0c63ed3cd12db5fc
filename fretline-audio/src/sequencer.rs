//! Flattens per-track timed commands into one ordered batch for the
//! worker's batch executor.

use std::sync::Arc;

use crate::synth::{SynthCommand, SynthProxy, SynthResult, TimedEvent};

/// Accumulates (offset, command) pairs from any number of tracks and
/// hands the synth one merged, time-ordered batch.
#[derive(Debug, Default)]
pub struct Sequencer {
    events: Vec<TimedEvent>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, offset_secs: f64, command: SynthCommand) {
        self.events.push(TimedEvent { offset_secs, command });
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The merged batch in offset order. Events at equal offsets keep
    /// their insertion order.
    pub fn into_batch(mut self) -> Vec<TimedEvent> {
        self.events.sort_by(|a, b| {
            a.offset_secs
                .partial_cmp(&b.offset_secs)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.events
    }

    /// Submit the batch as a single transaction; the worker plays it
    /// out honoring the offsets.
    pub fn play(self, proxy: &Arc<SynthProxy>) -> SynthResult {
        if self.is_empty() {
            return Ok(());
        }
        proxy.transact(SynthCommand::TimerEvents(self.into_batch()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{SharedTestBackend, TestBackend, TestOp};
    use std::time::Duration;

    #[test]
    fn batch_is_ordered_by_offset_with_stable_ties() {
        let mut seq = Sequencer::new();
        seq.push(0.5, SynthCommand::NoteOff { chan: 1, key: 60 });
        seq.push(0.0, SynthCommand::NoteOn { chan: 1, key: 60, vel: 90 });
        seq.push(0.0, SynthCommand::NoteOn { chan: 2, key: 64, vel: 90 });

        let batch = seq.into_batch();
        assert_eq!(batch[0].command, SynthCommand::NoteOn { chan: 1, key: 60, vel: 90 });
        assert_eq!(batch[1].command, SynthCommand::NoteOn { chan: 2, key: 64, vel: 90 });
        assert_eq!(batch[2].command, SynthCommand::NoteOff { chan: 1, key: 60 });
    }

    #[test]
    fn play_submits_one_transaction() {
        let backend = std::sync::Arc::new(TestBackend::new());
        let proxy = Arc::new(SynthProxy::spawn(Box::new(SharedTestBackend(backend.clone()))));

        let mut seq = Sequencer::new();
        seq.push(0.0, SynthCommand::NoteOn { chan: 1, key: 60, vel: 90 });
        seq.push(0.25, SynthCommand::NoteOff { chan: 1, key: 60 });
        seq.play(&proxy).unwrap();

        assert_eq!(backend.operations(), vec![TestOp::TimerEvents { count: 2 }]);
        proxy.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn empty_sequencer_sends_nothing() {
        let backend = std::sync::Arc::new(TestBackend::new());
        let proxy = Arc::new(SynthProxy::spawn(Box::new(SharedTestBackend(backend.clone()))));

        Sequencer::new().play(&proxy).unwrap();
        assert!(backend.operations().is_empty());
        proxy.shutdown(Duration::from_secs(1));
    }
}
