use std::path::PathBuf;

/// Resolve the data directory holding soundfonts, instrument bindings,
/// and the effect configuration.
///
/// Fallback chain:
/// 1. `FRETLINE_DATA_DIR` env var (runtime override)
/// 2. platform data dir (`~/.local/share/fretline`)
/// 3. `./data` relative to CWD
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FRETLINE_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(base) = dirs::data_dir() {
        return base.join("fretline");
    }

    PathBuf::from("data")
}

/// Directory scanned for soundfont files and their listing sidecars.
pub fn soundfont_dir() -> PathBuf {
    data_dir().join("soundfonts")
}

/// Custom instrument bindings (role sub-instruments and mix weights).
pub fn custom_instruments_file() -> PathBuf {
    data_dir().join("instruments").join("custom_instruments.json")
}

/// Persisted effect chain configuration.
pub fn effects_config_file() -> PathBuf {
    data_dir().join("effects.json")
}

/// Directory scanned for LADSPA plugins.
///
/// `FRETLINE_LADSPA_PATH` overrides the conventional system location.
pub fn plugin_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FRETLINE_LADSPA_PATH") {
        return PathBuf::from(dir);
    }
    PathBuf::from("/usr/lib/ladspa")
}

/// Log file capturing the synth process stdout/stderr.
pub fn synth_log_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fretline")
        .join("fluidsynth.log")
}

/// Audio device configuration file.
pub fn device_config_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fretline")
        .join("audio_devices.json")
}

/// Whether timer latency summaries should be logged.
pub fn timer_log_enabled() -> bool {
    std::env::var_os("FRETLINE_TIMER_LOG").is_some()
}
