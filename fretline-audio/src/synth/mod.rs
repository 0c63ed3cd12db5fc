//! Command channel to the synthesizer worker.
//!
//! All synthesis operations run on one dedicated worker thread, which
//! isolates native faults from the controlling thread. Callers build a
//! `SynthCommand` and hand it to `SynthProxy::transact`, which sends it
//! over an unbounded channel and blocks on the single reply. The worker
//! dispatches each command to a `SynthBackend`.

pub mod backend;
pub mod fluid;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

pub use backend::{BackendError, BackendResult, NullBackend, SharedTestBackend, SynthBackend, TestBackend, TestOp};

/// Result type for proxy-boundary operations.
pub type SynthResult<T = ()> = Result<T, SynthError>;

/// Typed failure at the proxy boundary. Nothing crosses the worker
/// boundary as a raw panic or native error.
#[derive(Debug, Clone)]
pub enum SynthError {
    /// Worker-side failure while running a named operation.
    Backend { op: &'static str, message: String },
    /// The worker thread is no longer running.
    WorkerGone,
    /// Instrument name missing from the catalog.
    UnknownInstrument(String),
    /// The channel pool has no free general channel left.
    ChannelsExhausted,
    /// A note referenced a string the instrument's tuning lacks.
    InvalidString(usize),
}

impl std::fmt::Display for SynthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SynthError::Backend { op, message } => write!(f, "{} failed: {}", op, message),
            SynthError::WorkerGone => write!(f, "synth worker is not running"),
            SynthError::UnknownInstrument(name) => write!(f, "unknown instrument: {}", name),
            SynthError::ChannelsExhausted => write!(f, "no free synth channel"),
            SynthError::InvalidString(s) => write!(f, "no string {} in tuning", s),
        }
    }
}

impl std::error::Error for SynthError {}

/// Boot configuration for the synthesizer process.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SynthConfig {
    pub soundfonts: Vec<PathBuf>,
    pub gain: f32,
    pub sample_rate: u32,
}

/// One entry in a pre-scheduled command batch: seconds from batch start
/// plus the command to run.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub offset_secs: f64,
    pub command: SynthCommand,
}

/// The closed command set understood by the worker. Matched
/// exhaustively in the dispatch loop, so adding a variant is a
/// compile-time checklist.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthCommand {
    Start(SynthConfig),
    Stop,
    NoteOn { chan: u8, key: u8, vel: u8 },
    NoteOff { chan: u8, key: u8 },
    Select { chan: u8, sfont: u32, bank: u32, preset: u32 },
    PitchBendRange { chan: u8, semitones: u8 },
    PitchBend { chan: u8, value: u16 },
    ChannelGain { chan: u8, gain: f32 },
    FilterAdd { chan: u8, path: PathBuf, label: String },
    FilterRemove { chan: u8, label: String },
    FilterEnable { chan: u8, label: String },
    FilterDisable { chan: u8, label: String },
    FilterSetControl { chan: u8, label: String, control: String, value: f32 },
    TimerEvents(Vec<TimedEvent>),
}

impl SynthCommand {
    /// Operation name used in errors and logs.
    pub fn op_name(&self) -> &'static str {
        match self {
            SynthCommand::Start(_) => "start",
            SynthCommand::Stop => "stop",
            SynthCommand::NoteOn { .. } => "noteon",
            SynthCommand::NoteOff { .. } => "noteoff",
            SynthCommand::Select { .. } => "select",
            SynthCommand::PitchBendRange { .. } => "pitch_bend_range",
            SynthCommand::PitchBend { .. } => "pitch_bend",
            SynthCommand::ChannelGain { .. } => "channel_gain",
            SynthCommand::FilterAdd { .. } => "filter_add",
            SynthCommand::FilterRemove { .. } => "filter_remove",
            SynthCommand::FilterEnable { .. } => "filter_enable",
            SynthCommand::FilterDisable { .. } => "filter_disable",
            SynthCommand::FilterSetControl { .. } => "filter_set_control",
            SynthCommand::TimerEvents(_) => "timer_events",
        }
    }
}

enum Request {
    Command(SynthCommand),
    Shutdown,
}

/// Synchronous proxy to the synth worker thread.
///
/// The protocol is single-in-flight: one request, one reply. An
/// internal mutex serializes concurrent callers so replies cannot be
/// interleaved across threads.
pub struct SynthProxy {
    transact_lock: Mutex<()>,
    req_tx: Sender<Request>,
    resp_rx: Receiver<BackendResult>,
    alive: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SynthProxy {
    /// Spawn the worker thread around a backend.
    pub fn spawn(backend: Box<dyn SynthBackend>) -> Self {
        let (req_tx, req_rx) = unbounded();
        let (resp_tx, resp_rx) = unbounded();
        let alive = Arc::new(AtomicBool::new(true));
        let alive_worker = alive.clone();
        let worker = thread::Builder::new()
            .name("fretline-synth".to_string())
            .spawn(move || {
                worker_loop(backend, req_rx, resp_tx);
                alive_worker.store(false, Ordering::Release);
            })
            .ok();
        if worker.is_none() {
            alive.store(false, Ordering::Release);
        }
        Self {
            transact_lock: Mutex::new(()),
            req_tx,
            resp_rx,
            alive,
            worker: Mutex::new(worker),
        }
    }

    /// Run one command on the worker and wait for its reply.
    ///
    /// Fails fast with `WorkerGone` when the worker thread has exited,
    /// rather than blocking on a reply that will never come.
    pub fn transact(&self, command: SynthCommand) -> SynthResult {
        let _guard = self
            .transact_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !self.alive.load(Ordering::Acquire) {
            return Err(SynthError::WorkerGone);
        }

        let op = command.op_name();
        self.req_tx
            .send(Request::Command(command))
            .map_err(|_| SynthError::WorkerGone)?;

        match self.resp_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SynthError::Backend { op, message: e.0 }),
            Err(_) => Err(SynthError::WorkerGone),
        }
    }

    /// Whether the worker thread is still running.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Push the shutdown sentinel and join the worker with a bounded
    /// timeout. Returns false if the worker did not exit in time.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let _ = self.req_tx.send(Request::Shutdown);

        // The worker never sends on resp after the sentinel; its side of
        // the channel dropping is the exit signal.
        let exited = match self.resp_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
            // A stray reply means a caller raced shutdown; drain it and
            // wait once more.
            Ok(_) => matches!(
                self.resp_rx.recv_timeout(timeout),
                Err(RecvTimeoutError::Disconnected)
            ),
        };

        if exited {
            if let Ok(mut guard) = self.worker.lock() {
                if let Some(handle) = guard.take() {
                    let _ = handle.join();
                }
            }
        }
        exited
    }
}

fn worker_loop(backend: Box<dyn SynthBackend>, req_rx: Receiver<Request>, resp_tx: Sender<BackendResult>) {
    for request in req_rx.iter() {
        let command = match request {
            Request::Shutdown => break,
            Request::Command(command) => command,
        };

        let op = command.op_name();
        // Panics from the backend (native library faults) are contained
        // here and surfaced as ordinary errors.
        let result = catch_unwind(AssertUnwindSafe(|| dispatch(backend.as_ref(), &command)))
            .unwrap_or_else(|_| Err(BackendError(format!("{} panicked", op))));

        if let Err(ref e) = result {
            log::warn!(target: "synth", "{} failed: {}", op, e);
        }
        if resp_tx.send(result).is_err() {
            break;
        }
    }
    log::debug!(target: "synth", "worker exiting");
}

fn dispatch(backend: &dyn SynthBackend, command: &SynthCommand) -> BackendResult {
    match command {
        SynthCommand::Start(config) => backend.start(config),
        SynthCommand::Stop => backend.stop(),
        SynthCommand::NoteOn { chan, key, vel } => backend.note_on(*chan, *key, *vel),
        SynthCommand::NoteOff { chan, key } => backend.note_off(*chan, *key),
        SynthCommand::Select { chan, sfont, bank, preset } => {
            backend.select(*chan, *sfont, *bank, *preset)
        }
        SynthCommand::PitchBendRange { chan, semitones } => {
            backend.pitch_bend_range(*chan, *semitones)
        }
        SynthCommand::PitchBend { chan, value } => backend.pitch_bend(*chan, *value),
        SynthCommand::ChannelGain { chan, gain } => backend.channel_gain(*chan, *gain),
        SynthCommand::FilterAdd { chan, path, label } => backend.filter_add(*chan, path, label),
        SynthCommand::FilterRemove { chan, label } => backend.filter_remove(*chan, label),
        SynthCommand::FilterEnable { chan, label } => backend.filter_enable(*chan, label),
        SynthCommand::FilterDisable { chan, label } => backend.filter_disable(*chan, label),
        SynthCommand::FilterSetControl { chan, label, control, value } => {
            backend.filter_set_control(*chan, label, control, *value)
        }
        SynthCommand::TimerEvents(events) => backend.timer_events(events),
    }
}
