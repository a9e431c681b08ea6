// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! EOM mode: per-channel state and the permitted off-detuning choice.
//!
//! While a channel is in EOM mode its pulses are constant at `amp_on` /
//! `detuning_on`. Between pulses the channel idles at `detuning_off`, which
//! must come from a small set of values the hardware can realise for the
//! given `amp_on`. That set is supplied through [`DetuningOffOptions`].

use serde::{Deserialize, Serialize};

use crate::error::{BuildErrorKind, KindResult};

/// EOM state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EomState {
    #[default]
    Off,
    On {
        amp_on: f64,
        detuning_on: f64,
        detuning_off: f64,
    },
}

impl EomState {
    pub fn is_on(&self) -> bool {
        matches!(self, EomState::On { .. })
    }
}

/// Time span during which a channel was in EOM mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EomInterval {
    pub start_ns: u64,
    pub end_ns: u64,
}

/// Source of the off-detunings a device permits for an EOM setting.
pub trait DetuningOffOptions: Send + Sync + std::fmt::Debug {
    /// Permitted `detuning_off` values for the given on-state.
    fn detuning_off_options(&self, amp_on: f64, detuning_on: f64) -> Vec<f64>;
}

/// A fixed list of permitted off-detunings, independent of the on-state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedDetuningOffs(pub Vec<f64>);

impl DetuningOffOptions for FixedDetuningOffs {
    fn detuning_off_options(&self, _amp_on: f64, _detuning_on: f64) -> Vec<f64> {
        self.0.clone()
    }
}

/// One of the two beams of a two-photon Rydberg excitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RydbergBeam {
    Red,
    Blue,
}

impl RydbergBeam {
    fn other(self) -> Self {
        match self {
            RydbergBeam::Red => RydbergBeam::Blue,
            RydbergBeam::Blue => RydbergBeam::Red,
        }
    }
}

/// Two-beam light-shift model of a Rydberg EOM.
///
/// The effective Rabi frequency is `Ω = Ω_red Ω_blue / (2Δ)` with `Δ` the
/// intermediate detuning. Each beam shifts the transition by `±Ω_beam² / 4Δ`.
/// Switching a controlled beam off removes its light shift, so the
/// off-detuning options are the on-detuning corrected by the shift of each
/// reachable off-configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RydbergEom {
    /// Largest Rabi frequency the limiting beam can reach (rad/µs).
    pub max_limiting_amp: f64,
    /// Detuning from the intermediate state (rad/µs).
    pub intermediate_detuning: f64,
    pub limiting_beam: RydbergBeam,
    /// Beams the EOM switches (one or both).
    pub controlled_beams: Vec<RydbergBeam>,
}

impl RydbergEom {
    fn beam_amps(&self, rabi: f64) -> (f64, f64) {
        let limit = self.max_limiting_amp.powi(2) / (2.0 * self.intermediate_detuning);
        if rabi <= limit {
            let amp = (2.0 * rabi * self.intermediate_detuning).sqrt();
            return (amp, amp);
        }
        let other = 2.0 * self.intermediate_detuning * rabi / self.max_limiting_amp;
        match self.limiting_beam {
            RydbergBeam::Red => (self.max_limiting_amp, other),
            RydbergBeam::Blue => (other, self.max_limiting_amp),
        }
    }

    fn lightshift(&self, rabi: f64, beams_on: &[RydbergBeam]) -> f64 {
        let (red, blue) = self.beam_amps(rabi);
        let shift: f64 = beams_on
            .iter()
            .map(|beam| match beam {
                RydbergBeam::Red => -red * red,
                RydbergBeam::Blue => blue * blue,
            })
            .sum();
        shift / (4.0 * self.intermediate_detuning)
    }
}

impl DetuningOffOptions for RydbergEom {
    fn detuning_off_options(&self, amp_on: f64, detuning_on: f64) -> Vec<f64> {
        let offset = detuning_on - self.lightshift(amp_on, &[RydbergBeam::Red, RydbergBeam::Blue]);
        let shifts = match self.controlled_beams.as_slice() {
            [beam] => vec![self.lightshift(amp_on, &[beam.other()])],
            [_, _] => vec![
                self.lightshift(amp_on, &[RydbergBeam::Red]),
                self.lightshift(amp_on, &[RydbergBeam::Blue]),
                0.0,
            ],
            _ => Vec::new(),
        };
        shifts.into_iter().map(|s| offset + s).collect()
    }
}

/// Pick the option closest to `optimal`.
///
/// Ties go to the smaller magnitude, then to the lower value, so the choice
/// never depends on the order of `options`.
pub fn select_detuning_off(options: &[f64], optimal: f64) -> KindResult<f64> {
    options
        .iter()
        .copied()
        .filter(|x| x.is_finite())
        .min_by(|a, b| {
            (a - optimal)
                .abs()
                .total_cmp(&(b - optimal).abs())
                .then(a.abs().total_cmp(&b.abs()))
                .then(a.total_cmp(b))
        })
        .ok_or_else(|| {
            BuildErrorKind::EomUnavailable(format!(
                "no permitted detuning_off near {}",
                optimal
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // =========================================================================
    // Nearest-value selection
    // =========================================================================

    #[test]
    fn test_select_nearest() {
        assert_eq!(select_detuning_off(&[-10.0, -2.0, 0.0, 5.0], -3.0).unwrap(), -2.0);
        assert_eq!(select_detuning_off(&[-10.0, -2.0, 0.0], -100.0).unwrap(), -10.0);
    }

    #[test]
    fn test_select_tie_prefers_smaller_magnitude() {
        assert_eq!(select_detuning_off(&[-4.0, 2.0], -1.0).unwrap(), 2.0);
        assert_eq!(select_detuning_off(&[2.0, -4.0], -1.0).unwrap(), 2.0);
    }

    #[test]
    fn test_select_tie_same_magnitude_prefers_lower() {
        assert_eq!(select_detuning_off(&[1.0, -1.0], 0.0).unwrap(), -1.0);
        assert_eq!(select_detuning_off(&[-1.0, 1.0], 0.0).unwrap(), -1.0);
    }

    #[test]
    fn test_select_empty_is_unavailable() {
        assert!(matches!(
            select_detuning_off(&[], 0.0),
            Err(BuildErrorKind::EomUnavailable(_))
        ));
    }

    // =========================================================================
    // Providers
    // =========================================================================

    #[test]
    fn test_fixed_options() {
        let fixed = FixedDetuningOffs(vec![0.0, -5.0]);
        assert_eq!(fixed.detuning_off_options(3.0, 1.0), vec![0.0, -5.0]);
    }

    fn rydberg(controlled: Vec<RydbergBeam>) -> RydbergEom {
        RydbergEom {
            max_limiting_amp: 100.0,
            intermediate_detuning: 5000.0,
            limiting_beam: RydbergBeam::Red,
            controlled_beams: controlled,
        }
    }

    #[test]
    fn test_rydberg_balanced_beams() {
        // Below the limiting Rabi frequency both beams have equal amplitude,
        // so the two-beam light shift cancels.
        let eom = rydberg(vec![RydbergBeam::Blue]);
        let rabi = 1.0;
        let opts = eom.detuning_off_options(rabi, 0.0);
        assert_eq!(opts.len(), 1);
        // Only the red beam stays on: shift = -Ω_red² / 4Δ = -(2ΩΔ) / 4Δ = -Ω/2.
        assert_relative_eq!(opts[0], -rabi / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rydberg_both_beams_controlled() {
        let eom = rydberg(vec![RydbergBeam::Red, RydbergBeam::Blue]);
        let opts = eom.detuning_off_options(1.0, 2.0);
        assert_eq!(opts.len(), 3);
        assert_relative_eq!(opts[0], 2.0 - 0.5, epsilon = 1e-12);
        assert_relative_eq!(opts[1], 2.0 + 0.5, epsilon = 1e-12);
        assert_relative_eq!(opts[2], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rydberg_limited_beam() {
        let eom = rydberg(vec![RydbergBeam::Blue]);
        // limit = 100² / (2 * 5000) = 1.0, so 4.0 saturates the red beam.
        let (red, blue) = eom.beam_amps(4.0);
        assert_eq!(red, 100.0);
        assert_relative_eq!(red * blue / (2.0 * 5000.0), 4.0, epsilon = 1e-12);
    }
}
