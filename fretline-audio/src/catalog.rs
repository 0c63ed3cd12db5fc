//! Instrument catalog: soundfont listings and custom instrument
//! bindings.
//!
//! Each soundfont file gets a plain-text listing sidecar (the output of
//! the synth's inst command), one `bank-preset name` line per patch.
//! Custom instruments layer role sub-instruments and mix weights over
//! the catalog and are persisted as JSON in the data directory.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use fretline_types::NoteMixWeights;

/// Soundfont addressing triple for one instrument patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentSpec {
    pub sfont: u32,
    pub bank: u32,
    pub preset: u32,
}

/// Name-ordered instrument lookup built from soundfont listings.
#[derive(Debug, Default)]
pub struct Catalog {
    names: Vec<String>,
    by_name: HashMap<String, InstrumentSpec>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<(String, InstrumentSpec)>) -> Self {
        let mut catalog = Self::new();
        for (name, spec) in entries {
            catalog.insert(name, spec);
        }
        catalog
    }

    fn insert(&mut self, name: String, spec: InstrumentSpec) {
        if !self.by_name.contains_key(&name) {
            self.names.push(name.clone());
        }
        self.by_name.insert(name, spec);
    }

    /// Parse one soundfont listing, adding its patches under `sfont`.
    pub fn add_listing(&mut self, sfont: u32, listing: &str) {
        // Listing lines look like "000-024 Nylon Guitar"
        static LISTING_RE: OnceLock<Regex> = OnceLock::new();
        let re = LISTING_RE.get_or_init(|| {
            Regex::new(r"(?m)^([0-9]+)-([0-9]+) ([^\n]+)").expect("listing pattern")
        });
        for caps in re.captures_iter(listing) {
            let bank = caps.get(1).and_then(|m| m.as_str().parse().ok());
            let preset = caps.get(2).and_then(|m| m.as_str().parse().ok());
            let name = caps.get(3).map(|m| m.as_str().trim().to_string());
            if let (Some(bank), Some(preset), Some(name)) = (bank, preset, name) {
                if name.is_empty() {
                    continue;
                }
                self.insert(name, InstrumentSpec { sfont, bank, preset });
            }
        }
    }

    /// Build a catalog from a soundfont directory: every `.sf2` gets a
    /// 1-based soundfont id in sorted order, and its `.txt` sidecar (if
    /// present) supplies the patch listing.
    pub fn load(dir: &Path) -> io::Result<Self> {
        let mut catalog = Self::new();
        for (index, sf_path) in crate::synth::fluid::soundfont_paths(dir).iter().enumerate() {
            let listing_path = sf_path.with_extension("txt");
            match fs::read_to_string(&listing_path) {
                Ok(listing) => catalog.add_listing(index as u32 + 1, &listing),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    log::warn!(target: "synth", "no listing for {}", sf_path.display());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(catalog)
    }

    pub fn lookup(&self, name: &str) -> Option<InstrumentSpec> {
        self.by_name.get(name).copied()
    }

    /// Instrument names in listing order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A user-defined instrument: catalog patches for each channel role
/// plus the velocity mix between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomInstrument {
    pub name: String,
    /// Catalog name sounding the plain role.
    pub normal: String,
    pub harmonic: Option<String>,
    pub muted: Option<String>,
    pub weights: NoteMixWeights,
}

impl CustomInstrument {
    /// The default binding plays the named patch on the normal role only.
    pub fn plain(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            normal: name.clone(),
            name,
            harmonic: None,
            muted: None,
            weights: NoteMixWeights::default(),
        }
    }
}

/// Load custom instrument bindings; a missing file is an empty list.
pub fn load_custom_instruments(path: &Path) -> Vec<CustomInstrument> {
    let content = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    match serde_json::from_str(&content) {
        Ok(list) => list,
        Err(e) => {
            log::warn!(target: "synth", "bad custom instruments file {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Persist custom instrument bindings as pretty JSON.
pub fn save_custom_instruments(path: &Path, instruments: &[CustomInstrument]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(instruments)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
000-024 Nylon Guitar
000-025 Steel Guitar
008-025 12-String Guitar
000-033 Fingered Bass
";

    #[test]
    fn listing_parses_bank_preset_and_name() {
        let mut catalog = Catalog::new();
        catalog.add_listing(1, LISTING);

        assert_eq!(
            catalog.lookup("Steel Guitar"),
            Some(InstrumentSpec { sfont: 1, bank: 0, preset: 25 })
        );
        assert_eq!(
            catalog.lookup("12-String Guitar"),
            Some(InstrumentSpec { sfont: 1, bank: 8, preset: 25 })
        );
        assert_eq!(catalog.lookup("Accordion"), None);
        assert_eq!(catalog.names().len(), 4);
        assert_eq!(catalog.names()[0], "Nylon Guitar");
    }

    #[test]
    fn listing_entries_match_only_at_line_start() {
        let mut catalog = Catalog::new();
        // A patch name containing a bank-preset shaped substring must not
        // produce a second entry.
        catalog.add_listing(1, "Warm Pad 000-089 alias\n000-089 Warm Pad\n");

        assert_eq!(catalog.names().len(), 1);
        assert_eq!(
            catalog.lookup("Warm Pad"),
            Some(InstrumentSpec { sfont: 1, bank: 0, preset: 89 })
        );
        assert_eq!(catalog.lookup("alias"), None);
    }

    #[test]
    fn later_soundfonts_shadow_duplicate_names() {
        let mut catalog = Catalog::new();
        catalog.add_listing(1, "000-024 Nylon Guitar\n");
        catalog.add_listing(2, "000-001 Nylon Guitar\n");

        assert_eq!(
            catalog.lookup("Nylon Guitar"),
            Some(InstrumentSpec { sfont: 2, bank: 0, preset: 1 })
        );
        // The name list does not grow for shadowed entries.
        assert_eq!(catalog.names().len(), 1);
    }

    #[test]
    fn load_reads_sidecar_listings() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("guitars.sf2"), b"").unwrap();
        fs::write(dir.path().join("guitars.txt"), LISTING).unwrap();
        fs::write(dir.path().join("orphan.sf2"), b"").unwrap();

        let catalog = Catalog::load(dir.path()).unwrap();
        assert_eq!(
            catalog.lookup("Nylon Guitar"),
            Some(InstrumentSpec { sfont: 1, bank: 0, preset: 24 })
        );
    }

    #[test]
    fn custom_instruments_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instruments").join("custom_instruments.json");

        let instruments = vec![
            CustomInstrument::plain("Steel Guitar"),
            CustomInstrument {
                name: "Layered Steel".to_string(),
                normal: "Steel Guitar".to_string(),
                harmonic: Some("Guitar Harmonics".to_string()),
                muted: Some("Muted Guitar".to_string()),
                weights: NoteMixWeights { normal: 0.5, harmonic: 0.3, muted: 0.2 },
            },
        ];
        save_custom_instruments(&path, &instruments).unwrap();

        let loaded = load_custom_instruments(&path);
        assert_eq!(loaded, instruments);
    }

    #[test]
    fn missing_custom_instruments_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_custom_instruments(&dir.path().join("nope.json")).is_empty());
    }
}
