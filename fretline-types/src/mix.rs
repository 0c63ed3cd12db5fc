//! Per-role velocity weights for layered note playback.

use serde::{Deserialize, Serialize};

/// Weights for the three channel roles a note can sound on at once.
///
/// Weights need not sum to 1.0; they are normalized at note time. The
/// default plays only the normal role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteMixWeights {
    pub normal: f32,
    pub harmonic: f32,
    pub muted: f32,
}

impl Default for NoteMixWeights {
    fn default() -> Self {
        Self { normal: 1.0, harmonic: 0.0, muted: 0.0 }
    }
}

impl NoteMixWeights {
    pub fn sum(&self) -> f32 {
        self.normal + self.harmonic + self.muted
    }

    /// Effective velocity for one role: `velocity * weight / sum`.
    /// Returns 0 when the mix is empty.
    pub fn role_velocity(&self, weight: f32, velocity: u8) -> u8 {
        let total = self.sum();
        if total <= 0.0 || weight <= 0.0 {
            return 0;
        }
        let v = (f32::from(velocity) * weight / total).round();
        v.clamp(0.0, 127.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mix_is_all_normal() {
        let mix = NoteMixWeights::default();
        assert_eq!(mix.role_velocity(mix.normal, 100), 100);
        assert_eq!(mix.role_velocity(mix.harmonic, 100), 0);
    }

    #[test]
    fn weights_normalize_at_note_time() {
        let mix = NoteMixWeights { normal: 0.5, harmonic: 0.3, muted: 0.2 };
        assert_eq!(mix.role_velocity(mix.normal, 100), 50);
        assert_eq!(mix.role_velocity(mix.harmonic, 100), 30);
        assert_eq!(mix.role_velocity(mix.muted, 100), 20);
    }

    #[test]
    fn unnormalized_weights_scale_by_total() {
        let mix = NoteMixWeights { normal: 2.0, harmonic: 1.0, muted: 1.0 };
        assert_eq!(mix.role_velocity(mix.normal, 100), 50);
        assert_eq!(mix.role_velocity(mix.muted, 100), 25);
    }

    #[test]
    fn empty_mix_yields_zero() {
        let mix = NoteMixWeights { normal: 0.0, harmonic: 0.0, muted: 0.0 };
        assert_eq!(mix.role_velocity(mix.normal, 127), 0);
    }
}
