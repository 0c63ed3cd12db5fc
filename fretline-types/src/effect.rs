//! Effect parameter model: classification, quantization, and the diff
//! used to push minimal updates to the synth backend.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Number of evenly spaced steps for a bounded control (101 choices).
const QUANTIZE_STEPS: u32 = 100;

/// Raw description of one plugin control port, as read from the plugin.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PortSpec {
    pub name: String,
    pub toggled: bool,
    pub integer: bool,
    pub logarithmic: bool,
    pub lower: Option<f32>,
    pub upper: Option<f32>,
    pub default: Option<f32>,
}

/// Presentation type of a control. Toggle wins over everything; a port
/// bounded on both sides is Bounded, otherwise Unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    Toggle,
    BoundedInteger,
    BoundedReal,
    UnboundedInteger,
    UnboundedReal,
}

impl ParamKind {
    pub fn classify(spec: &PortSpec) -> ParamKind {
        if spec.toggled {
            ParamKind::Toggle
        } else if spec.lower.is_some() && spec.upper.is_some() {
            if spec.integer {
                ParamKind::BoundedInteger
            } else {
                ParamKind::BoundedReal
            }
        } else if spec.integer {
            ParamKind::UnboundedInteger
        } else {
            ParamKind::UnboundedReal
        }
    }
}

/// One effect control with its resolved default, current value, and (for
/// bounded kinds) the discrete choice list offered to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectParam {
    pub name: String,
    pub kind: ParamKind,
    pub default: f32,
    pub value: f32,
    pub choices: Vec<f32>,
}

impl EffectParam {
    pub fn from_spec(spec: &PortSpec) -> Self {
        let kind = ParamKind::classify(spec);
        let default = resolve_default(spec, kind);
        let choices = quantize(spec, kind, default);
        Self {
            name: spec.name.clone(),
            kind,
            default,
            value: default,
            choices,
        }
    }
}

/// Default value for a port: the declared default if present, the range
/// midpoint for bounded ports without one, otherwise zero.
fn resolve_default(spec: &PortSpec, kind: ParamKind) -> f32 {
    if let Some(d) = spec.default {
        return d;
    }
    match kind {
        ParamKind::BoundedInteger | ParamKind::BoundedReal => {
            match (spec.lower, spec.upper) {
                (Some(lo), Some(hi)) => {
                    let mid = (lo + hi) / 2.0;
                    if spec.integer { mid.round() } else { mid }
                }
                _ => 0.0,
            }
        }
        _ => 0.0,
    }
}

/// Discretize a bounded port into evenly spaced candidate values. The
/// default is inserted if the spacing would skip it, so `default` is
/// always a member of the returned list.
fn quantize(spec: &PortSpec, kind: ParamKind, default: f32) -> Vec<f32> {
    match kind {
        ParamKind::Toggle => vec![0.0, 1.0],
        ParamKind::BoundedInteger | ParamKind::BoundedReal => {
            let (lo, hi) = match (spec.lower, spec.upper) {
                (Some(lo), Some(hi)) if hi >= lo => (lo, hi),
                _ => return Vec::new(),
            };
            let step = (hi - lo) / QUANTIZE_STEPS as f32;
            let mut choices: Vec<f32> = Vec::with_capacity(QUANTIZE_STEPS as usize + 1);
            for i in 0..=QUANTIZE_STEPS {
                let mut v = lo + step * i as f32;
                if spec.integer {
                    v = v.round();
                }
                if choices.last() != Some(&v) {
                    choices.push(v);
                }
            }
            if !choices.contains(&default) {
                let at = choices.partition_point(|c| *c < default);
                choices.insert(at, default);
            }
            choices
        }
        ParamKind::UnboundedInteger | ParamKind::UnboundedReal => Vec::new(),
    }
}

/// A named plugin instance in a chain: enable flag plus ordered controls.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Effect {
    pub name: String,
    /// Unique plugin label, used to address the backend filter.
    pub label: String,
    pub path: PathBuf,
    pub enabled: bool,
    pub params: Vec<EffectParam>,
}

impl Effect {
    pub fn param(&self, name: &str) -> Option<&EffectParam> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Set a control by name; returns false if the control is unknown.
    pub fn set_value(&mut self, name: &str, value: f32) -> bool {
        match self.params.iter_mut().find(|p| p.name == name) {
            Some(p) => {
                p.value = value;
                true
            }
            None => false,
        }
    }
}

/// An ordered effect chain; the unit of snapshot used for diffing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Effects {
    pub effects: Vec<Effect>,
}

impl Effects {
    pub fn get(&self, label: &str) -> Option<&Effect> {
        self.effects.iter().find(|e| e.label == label)
    }

    pub fn get_mut(&mut self, label: &str) -> Option<&mut Effect> {
        self.effects.iter_mut().find(|e| e.label == label)
    }
}

/// One control write destined for the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlChange {
    pub label: String,
    pub control: String,
    pub value: f32,
}

/// Minimal update set between two effect-chain snapshots. Applied in
/// order: add plugins, set changed controls, then enable/disable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EffectChanges {
    /// Newly enabled effects that need a filter added and enabled.
    pub added: Vec<Effect>,
    /// Labels of effects that turned off.
    pub removed: Vec<String>,
    pub controls: Vec<ControlChange>,
}

impl EffectChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.controls.is_empty()
    }
}

/// Diff two effect-chain snapshots into the minimal backend update.
///
/// Per effect (matched by label): disabled->enabled re-applies every
/// control; enabled->disabled pushes only the disable; enabled->enabled
/// pushes controls whose value differs; disabled->disabled is a no-op.
pub fn delta(old: &Effects, new: &Effects) -> EffectChanges {
    let mut changes = EffectChanges::default();

    for effect in &new.effects {
        let was_enabled = old.get(&effect.label).map(|e| e.enabled).unwrap_or(false);
        match (was_enabled, effect.enabled) {
            (false, true) => {
                changes.added.push(effect.clone());
                for p in &effect.params {
                    changes.controls.push(ControlChange {
                        label: effect.label.clone(),
                        control: p.name.clone(),
                        value: p.value,
                    });
                }
            }
            (true, false) => changes.removed.push(effect.label.clone()),
            (true, true) => {
                let prev = old.get(&effect.label);
                for p in &effect.params {
                    let prev_value = prev.and_then(|e| e.param(&p.name)).map(|p| p.value);
                    if prev_value != Some(p.value) {
                        changes.controls.push(ControlChange {
                            label: effect.label.clone(),
                            control: p.name.clone(),
                            value: p.value,
                        });
                    }
                }
            }
            (false, false) => {}
        }
    }

    // Effects dropped from the chain entirely still need disabling.
    for effect in &old.effects {
        if effect.enabled && new.get(&effect.label).is_none() {
            changes.removed.push(effect.label.clone());
        }
    }

    changes
}
