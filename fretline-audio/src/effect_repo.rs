//! Effect repository: LADSPA plugin discovery merged with the persisted
//! chain configuration.
//!
//! Discovery scans the plugin directory and builds a default `Effect`
//! per plugin; the saved configuration then re-applies the user's enable
//! flags and control values. Saved entries whose plugin has disappeared
//! are dropped.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use fretline_types::{Effect, EffectParam, Effects};

use crate::ladspa;

/// Persisted per-effect state, keyed by plugin label in the file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SavedEffect {
    pub selected: bool,
    #[serde(default)]
    pub controls: BTreeMap<String, f32>,
}

/// Scan a directory of LADSPA shared objects into default effects,
/// sorted by label. Unreadable files are skipped with a warning.
pub fn discover(dir: &Path, sample_rate: f32) -> Vec<Effect> {
    let mut effects = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!(target: "synth", "cannot scan plugin dir {}: {}", dir.display(), e);
            return effects;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("so") {
            continue;
        }
        match ladspa::read_plugins(&path, sample_rate) {
            Ok(plugins) => {
                for plugin in plugins {
                    effects.push(Effect {
                        name: plugin.name,
                        label: plugin.label,
                        path: path.clone(),
                        enabled: false,
                        params: plugin.ports.iter().map(EffectParam::from_spec).collect(),
                    });
                }
            }
            Err(e) => log::warn!(target: "synth", "skipping {}: {}", path.display(), e),
        }
    }

    effects.sort_by(|a, b| a.label.cmp(&b.label));
    effects
}

/// Overlay saved state onto discovered effects. Saved controls that the
/// plugin no longer declares are ignored; saved labels with no matching
/// plugin are dropped.
pub fn merge(discovered: Vec<Effect>, saved: &BTreeMap<String, SavedEffect>) -> Effects {
    let mut effects = discovered;
    for effect in &mut effects {
        if let Some(state) = saved.get(&effect.label) {
            effect.enabled = state.selected;
            for (control, value) in &state.controls {
                effect.set_value(control, *value);
            }
        }
    }
    Effects { effects }
}

/// Load the persisted chain state; a missing file is an empty map.
pub fn load_saved(path: &Path) -> BTreeMap<String, SavedEffect> {
    let content = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return BTreeMap::new(),
    };
    match serde_json::from_str(&content) {
        Ok(map) => map,
        Err(e) => {
            log::warn!(target: "synth", "bad effects file {}: {}", path.display(), e);
            BTreeMap::new()
        }
    }
}

/// Persist the chain state: enable flags plus every control value, so a
/// later merge restores the chain exactly.
pub fn save(path: &Path, effects: &Effects) -> io::Result<()> {
    let mut map: BTreeMap<String, SavedEffect> = BTreeMap::new();
    for effect in &effects.effects {
        let controls = effect
            .params
            .iter()
            .map(|p| (p.name.clone(), p.value))
            .collect();
        map.insert(
            effect.label.clone(),
            SavedEffect { selected: effect.enabled, controls },
        );
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&map)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fretline_types::PortSpec;

    fn plugin_effect(label: &str, params: &[(&str, f32, f32)]) -> Effect {
        Effect {
            name: label.to_string(),
            label: label.to_string(),
            path: Path::new("/usr/lib/ladspa").join(format!("{}.so", label)),
            enabled: false,
            params: params
                .iter()
                .map(|(name, lower, upper)| {
                    EffectParam::from_spec(&PortSpec {
                        name: name.to_string(),
                        lower: Some(*lower),
                        upper: Some(*upper),
                        ..PortSpec::default()
                    })
                })
                .collect(),
        }
    }

    #[test]
    fn merge_applies_saved_selection_and_controls() {
        let discovered = vec![
            plugin_effect("amp", &[("gain", 0.0, 2.0)]),
            plugin_effect("reverb", &[("room", 0.0, 1.0)]),
        ];
        let mut saved = BTreeMap::new();
        saved.insert(
            "amp".to_string(),
            SavedEffect {
                selected: true,
                controls: [("gain".to_string(), 1.5)].into_iter().collect(),
            },
        );

        let chain = merge(discovered, &saved);
        let amp = chain.get("amp").unwrap();
        assert!(amp.enabled);
        assert_eq!(amp.param("gain").unwrap().value, 1.5);
        assert!(!chain.get("reverb").unwrap().enabled);
    }

    #[test]
    fn merge_drops_saved_labels_without_a_plugin() {
        let discovered = vec![plugin_effect("amp", &[("gain", 0.0, 2.0)])];
        let mut saved = BTreeMap::new();
        saved.insert("ghost".to_string(), SavedEffect { selected: true, controls: BTreeMap::new() });

        let chain = merge(discovered, &saved);
        assert_eq!(chain.effects.len(), 1);
        assert!(chain.get("ghost").is_none());
    }

    #[test]
    fn merge_ignores_stale_control_names() {
        let discovered = vec![plugin_effect("amp", &[("gain", 0.0, 2.0)])];
        let mut saved = BTreeMap::new();
        saved.insert(
            "amp".to_string(),
            SavedEffect {
                selected: false,
                controls: [("warmth".to_string(), 0.9)].into_iter().collect(),
            },
        );

        let chain = merge(discovered, &saved);
        assert!(chain.get("amp").unwrap().param("warmth").is_none());
    }

    #[test]
    fn saved_state_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("effects.json");

        let mut effect = plugin_effect("amp", &[("gain", 0.0, 2.0)]);
        effect.enabled = true;
        effect.set_value("gain", 0.25);
        let chain = Effects { effects: vec![effect] };

        save(&path, &chain).unwrap();
        let saved = load_saved(&path);

        let restored = merge(vec![plugin_effect("amp", &[("gain", 0.0, 2.0)])], &saved);
        assert_eq!(restored, chain);
    }

    #[test]
    fn missing_saved_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_saved(&dir.path().join("nope.json")).is_empty());
    }
}
