//! Track playback: flattening measures into a resolved event stream and
//! driving an instrument through it on a dedicated thread.
//!
//! The play loop sleeps against an absolute expected-time clock rather
//! than the event duration, so scheduling overhead never accumulates
//! into drift.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use fretline_types::{Articulation, BeatDuration, Dynamic, TabEvent, Track};

use crate::instrument::Instrument;

/// Unravel a track into playback order: repeats expanded, and dynamics
/// and articulations carried forward so every event is fully resolved.
pub fn compile_track(track: &Track) -> Vec<TabEvent> {
    let mut order: Vec<usize> = Vec::new();
    let mut repeat_from = 0;
    for (i, measure) in track.measures.iter().enumerate() {
        if measure.repeat_start {
            repeat_from = i;
        }
        order.push(i);
        if measure.repeat_end {
            for _ in 1..measure.repeat_count.max(1) {
                order.extend(repeat_from..=i);
            }
        }
    }

    let mut events = Vec::new();
    let mut dynamic = Dynamic::default();
    let mut articulation = Articulation::default();
    for i in order {
        for event in &track.measures[i].events {
            let mut resolved = event.clone();
            match resolved.dynamic {
                Some(d) => dynamic = d,
                None => resolved.dynamic = Some(dynamic),
            }
            match resolved.articulation {
                Some(a) => articulation = a,
                None => resolved.articulation = Some(articulation),
            }
            events.push(resolved);
        }
    }
    events
}

/// Absolute clock for the play loop. Each event advances the expected
/// fire time by its duration; the next sleep is however far away that
/// expected time still is, so late wakeups shorten later sleeps instead
/// of pushing everything back.
pub struct DriftClock {
    expected: Instant,
}

impl DriftClock {
    pub fn start() -> Self {
        Self { expected: Instant::now() }
    }

    /// Advance by one event and return how long to sleep before the
    /// next one. Zero when the loop is already behind.
    pub fn next_delay(&mut self, duration: Duration) -> Duration {
        self.expected += duration;
        self.expected.saturating_duration_since(Instant::now())
    }
}

/// A track playing on its own thread. Dropping the player stops it.
pub struct Player {
    stop: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<Instrument>>>,
}

impl Player {
    /// Start playing the compiled events, taking the instrument for the
    /// duration of playback. `join` returns it when the run ends.
    pub fn spawn(
        mut instrument: Instrument,
        events: Vec<TabEvent>,
        bpm: f64,
        beat_duration: BeatDuration,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::spawn(move || {
            let mut clock = DriftClock::start();
            for event in &events {
                if stop_flag.load(Ordering::Relaxed) {
                    break;
                }
                match instrument.tab_event(event, bpm, beat_duration) {
                    Ok(secs) => {
                        thread::sleep(clock.next_delay(Duration::from_secs_f64(secs)));
                    }
                    Err(e) => {
                        log::error!(target: "player", "playback stopped: {}", e);
                        break;
                    }
                }
            }
            instrument
        });

        Self { stop, handle: Mutex::new(Some(handle)) }
    }

    /// Ask the play loop to stop after the current event.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Wait for the loop to exit and get the instrument back.
    pub fn join(&self) -> Option<Instrument> {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()?;
        handle.join().ok()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fretline_types::{Measure, Note};

    fn measure(events: Vec<TabEvent>) -> Measure {
        Measure::new(events)
    }

    fn quarter_note(string: usize, fret: u8) -> TabEvent {
        TabEvent::note(Note::new(string, fret), BeatDuration::Quarter)
    }

    #[test]
    fn compile_flattens_measures_in_order() {
        let track = Track {
            name: "lead".to_string(),
            instrument: "Steel Guitar".to_string(),
            tuning: fretline_types::Tuning::standard(),
            measures: vec![
                measure(vec![quarter_note(0, 0), quarter_note(0, 2)]),
                measure(vec![quarter_note(1, 0)]),
            ],
        };
        let events = compile_track(&track);
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].notes[0].string, 1);
    }

    #[test]
    fn compile_expands_repeats() {
        let mut first = measure(vec![quarter_note(0, 0)]);
        first.repeat_start = true;
        let mut second = measure(vec![quarter_note(0, 2)]);
        second.repeat_end = true;
        second.repeat_count = 3;

        let track = Track {
            name: "riff".to_string(),
            instrument: "Steel Guitar".to_string(),
            tuning: fretline_types::Tuning::standard(),
            measures: vec![first, second, measure(vec![quarter_note(0, 4)])],
        };
        let events = compile_track(&track);
        // Two measures played three times, then the coda measure.
        let frets: Vec<u8> = events.iter().map(|e| e.notes[0].fret).collect();
        assert_eq!(frets, vec![0, 2, 0, 2, 0, 2, 4]);
    }

    #[test]
    fn compile_carries_dynamics_and_articulations_forward() {
        let mut loud = quarter_note(0, 0);
        loud.dynamic = Some(Dynamic::Fff);
        loud.articulation = Some(Articulation::Staccato);

        let track = Track {
            name: "phrase".to_string(),
            instrument: "Steel Guitar".to_string(),
            tuning: fretline_types::Tuning::standard(),
            measures: vec![measure(vec![loud, quarter_note(0, 2), quarter_note(0, 4)])],
        };
        let events = compile_track(&track);
        assert_eq!(events[1].dynamic, Some(Dynamic::Fff));
        assert_eq!(events[2].dynamic, Some(Dynamic::Fff));
        assert_eq!(events[1].articulation, Some(Articulation::Staccato));
    }

    #[test]
    fn compile_starts_from_the_default_dynamic() {
        let track = Track {
            name: "plain".to_string(),
            instrument: "Steel Guitar".to_string(),
            tuning: fretline_types::Tuning::standard(),
            measures: vec![measure(vec![quarter_note(0, 0)])],
        };
        let events = compile_track(&track);
        assert_eq!(events[0].dynamic, Some(Dynamic::default()));
        assert_eq!(events[0].articulation, Some(Articulation::Normal));
    }

    #[test]
    fn drift_clock_absorbs_per_event_overhead() {
        let mut clock = DriftClock::start();
        let started = Instant::now();
        let step = Duration::from_millis(20);

        for _ in 0..10 {
            // Simulated per-event work that a naive duration sleep
            // would add on top of every step.
            thread::sleep(Duration::from_millis(5));
            thread::sleep(clock.next_delay(step));
        }

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "elapsed {:?}", elapsed);
        // Without compensation the overhead alone adds 50ms.
        assert!(elapsed < Duration::from_millis(245), "elapsed {:?}", elapsed);
    }

    #[test]
    fn drift_clock_returns_zero_when_behind() {
        let mut clock = DriftClock::start();
        thread::sleep(Duration::from_millis(15));
        assert_eq!(clock.next_delay(Duration::from_millis(5)), Duration::ZERO);
    }
}
