//! Backend implementation that drives an external fluidsynth process
//! over its TCP shell.
//!
//! `start` spawns the process with its shell bound to a local port,
//! redirects its output to a log file for crash diagnostics, and
//! connects with a retry loop while the process boots. Every operation
//! after that is one text command line on the socket.

use std::fs;
use std::io::Write;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use super::backend::{BackendError, BackendResult, SynthBackend};
use super::{SynthCommand, SynthConfig, TimedEvent};
use crate::paths;

const SHELL_PORT: u16 = 9800;
const CONNECT_ATTEMPTS: u32 = 40;
const CONNECT_RETRY: Duration = Duration::from_millis(50);

/// MIDI CC number for channel volume.
const CC_VOLUME: u8 = 7;

pub struct FluidBackend {
    process: Mutex<Option<Child>>,
    stream: Mutex<Option<TcpStream>>,
}

impl FluidBackend {
    pub fn new() -> Self {
        Self {
            process: Mutex::new(None),
            stream: Mutex::new(None),
        }
    }

    fn send_line(&self, line: &str) -> BackendResult {
        let mut guard = self
            .stream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let stream = guard
            .as_mut()
            .ok_or_else(|| BackendError("fluidsynth not connected".to_string()))?;
        log::debug!(target: "synth", "-> {}", line);
        stream.write_all(line.as_bytes())?;
        stream.write_all(b"\n")?;
        Ok(())
    }

    /// Re-dispatch a command locally; used by `timer_events` to execute
    /// batch entries through the same code paths.
    fn run(&self, command: &SynthCommand) -> BackendResult {
        match command {
            SynthCommand::Start(config) => self.start(config),
            SynthCommand::Stop => self.stop(),
            SynthCommand::NoteOn { chan, key, vel } => self.note_on(*chan, *key, *vel),
            SynthCommand::NoteOff { chan, key } => self.note_off(*chan, *key),
            SynthCommand::Select { chan, sfont, bank, preset } => {
                self.select(*chan, *sfont, *bank, *preset)
            }
            SynthCommand::PitchBendRange { chan, semitones } => {
                self.pitch_bend_range(*chan, *semitones)
            }
            SynthCommand::PitchBend { chan, value } => self.pitch_bend(*chan, *value),
            SynthCommand::ChannelGain { chan, gain } => self.channel_gain(*chan, *gain),
            SynthCommand::FilterAdd { chan, path, label } => self.filter_add(*chan, path, label),
            SynthCommand::FilterRemove { chan, label } => self.filter_remove(*chan, label),
            SynthCommand::FilterEnable { chan, label } => self.filter_enable(*chan, label),
            SynthCommand::FilterDisable { chan, label } => self.filter_disable(*chan, label),
            SynthCommand::FilterSetControl { chan, label, control, value } => {
                self.filter_set_control(*chan, label, control, *value)
            }
            SynthCommand::TimerEvents(events) => self.timer_events(events),
        }
    }
}

impl Default for FluidBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_fluidsynth(config: &SynthConfig) -> Result<Child, BackendError> {
    let fluidsynth_paths = [
        "fluidsynth",
        "/usr/bin/fluidsynth",
        "/usr/local/bin/fluidsynth",
        "/opt/homebrew/bin/fluidsynth",
    ];

    let mut args: Vec<String> = vec![
        "-is".to_string(),
        "-g".to_string(),
        format!("{}", config.gain),
        "-o".to_string(),
        format!("shell.port={}", SHELL_PORT),
    ];
    if config.sample_rate > 0 {
        args.push("-r".to_string());
        args.push(config.sample_rate.to_string());
    }
    for sf in &config.soundfonts {
        args.push(sf.to_string_lossy().to_string());
    }

    // Redirect fluidsynth output to a log file for crash diagnostics
    let log_path = paths::synth_log_file();
    if let Some(parent) = log_path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let stdout_file = fs::File::create(&log_path).ok();
    let stderr_file = stdout_file.as_ref().and_then(|f| f.try_clone().ok());

    let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();

    for path in &fluidsynth_paths {
        match Command::new(path)
            .args(&arg_refs)
            .stdout(stdout_file.as_ref()
                .and_then(|f| f.try_clone().ok())
                .map(Stdio::from)
                .unwrap_or_else(Stdio::null))
            .stderr(stderr_file.as_ref()
                .and_then(|f| f.try_clone().ok())
                .map(Stdio::from)
                .unwrap_or_else(Stdio::null))
            .spawn()
        {
            Ok(child) => return Ok(child),
            Err(_) => continue,
        }
    }

    Err(BackendError("Could not find fluidsynth. Install fluidsynth.".to_string()))
}

fn connect_shell() -> Result<TcpStream, BackendError> {
    let addr = ("127.0.0.1", SHELL_PORT);
    let mut last_err = None;
    for _ in 0..CONNECT_ATTEMPTS {
        match TcpStream::connect(addr) {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                return Ok(stream);
            }
            Err(e) => {
                last_err = Some(e);
                thread::sleep(CONNECT_RETRY);
            }
        }
    }
    Err(BackendError(format!(
        "fluidsynth shell did not come up on port {}: {}",
        SHELL_PORT,
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

impl SynthBackend for FluidBackend {
    fn start(&self, config: &SynthConfig) -> BackendResult {
        {
            let guard = self
                .process
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if guard.is_some() {
                return Err(BackendError("fluidsynth already running".to_string()));
            }
        }

        let child = spawn_fluidsynth(config)?;
        log::info!(target: "synth", "fluidsynth started (pid {})", child.id());
        *self
            .process
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(child);

        let stream = connect_shell()?;
        *self
            .stream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(stream);
        Ok(())
    }

    fn stop(&self) -> BackendResult {
        *self
            .stream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        let child = self
            .process
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(child) = child {
            // kill+wait can block, so run it off the worker thread
            thread::spawn(move || {
                let mut child = child;
                let _ = child.kill();
                let _ = child.wait();
            });
        }
        Ok(())
    }

    fn note_on(&self, chan: u8, key: u8, vel: u8) -> BackendResult {
        self.send_line(&format!("noteon {} {} {}", chan, key, vel))
    }

    fn note_off(&self, chan: u8, key: u8) -> BackendResult {
        self.send_line(&format!("noteoff {} {}", chan, key))
    }

    fn select(&self, chan: u8, sfont: u32, bank: u32, preset: u32) -> BackendResult {
        self.send_line(&format!("select {} {} {} {}", chan, sfont, bank, preset))
    }

    fn pitch_bend_range(&self, chan: u8, semitones: u8) -> BackendResult {
        self.send_line(&format!("pitch_bend_range {} {}", chan, semitones))
    }

    fn pitch_bend(&self, chan: u8, value: u16) -> BackendResult {
        self.send_line(&format!("pitch_bend {} {}", chan, value))
    }

    fn channel_gain(&self, chan: u8, gain: f32) -> BackendResult {
        let value = (gain.clamp(0.0, 1.0) * 127.0).round() as u8;
        self.send_line(&format!("cc {} {} {}", chan, CC_VOLUME, value))
    }

    fn filter_add(&self, chan: u8, path: &Path, label: &str) -> BackendResult {
        self.send_line(&format!("ladspa_effect {} {}", label, path.display()))?;
        self.send_line(&format!("ladspa_link {} Input Out{}", label, chan))
    }

    fn filter_remove(&self, chan: u8, label: &str) -> BackendResult {
        let _ = chan;
        self.send_line(&format!("ladspa_remove {}", label))
    }

    fn filter_enable(&self, chan: u8, label: &str) -> BackendResult {
        let _ = (chan, label);
        self.send_line("ladspa_start")
    }

    fn filter_disable(&self, chan: u8, label: &str) -> BackendResult {
        let _ = (chan, label);
        self.send_line("ladspa_stop")
    }

    fn filter_set_control(&self, chan: u8, label: &str, control: &str, value: f32) -> BackendResult {
        let _ = chan;
        self.send_line(&format!("ladspa_set {} {} {}", label, control, value))
    }

    /// Execute a batch in offset order, sleeping between entries. The
    /// worker thread is busy for the whole batch, which is what keeps
    /// batch playback serialized against ad-hoc commands.
    fn timer_events(&self, events: &[TimedEvent]) -> BackendResult {
        let mut ordered: Vec<&TimedEvent> = events.iter().collect();
        ordered.sort_by(|a, b| {
            a.offset_secs
                .partial_cmp(&b.offset_secs)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut elapsed = 0.0_f64;
        for event in ordered {
            let wait = event.offset_secs - elapsed;
            if wait > 0.0 {
                thread::sleep(Duration::from_secs_f64(wait));
                elapsed = event.offset_secs;
            }
            self.run(&event.command)?;
        }
        Ok(())
    }
}

impl Drop for FluidBackend {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Conventional soundfont load order for a config built from a data dir
/// scan: sort for a stable soundfont id assignment (ids are 1-based in
/// scan order).
pub fn soundfont_paths(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .map(|e| e.eq_ignore_ascii_case("sf2"))
                        .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default();
    paths.sort();
    paths
}
