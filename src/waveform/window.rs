// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Window shapes (Blackman, Kaiser), area scaling, and the peak-limited
//! duration search used by the `*_max` waveform variants.

use super::{SampleClock, NS_TO_US};
use crate::error::{BuildErrorKind, KindResult};

/// Upper bound on a duration derived from a peak constraint.
const MAX_SOLVED_DURATION_NS: u64 = 10_000_000;

/// Windows whose sample sum falls below this carry no usable area.
const MIN_WINDOW_SUM: f64 = 1e-9;

/// Blackman window of `n` points, clipped at zero.
pub fn blackman_window(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let m = (n - 1) as f64;
            (0..n)
                .map(|k| {
                    let x = 2.0 * std::f64::consts::PI * k as f64 / m;
                    (0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()).max(0.0)
                })
                .collect()
        }
    }
}

/// Kaiser window of `n` points with shape parameter `beta`.
pub fn kaiser_window(n: usize, beta: f64) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let alpha = (n - 1) as f64 / 2.0;
            let norm = bessel_i0(beta);
            (0..n)
                .map(|k| {
                    let r = (k as f64 - alpha) / alpha;
                    bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / norm
                })
                .collect()
        }
    }
}

/// Modified Bessel function of the first kind, order zero (power series).
pub fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut term = 1.0;
    let mut sum = 1.0;
    for k in 1..500 {
        let f = half / k as f64;
        term *= f * f;
        sum += term;
        if term < sum * 1e-17 {
            break;
        }
    }
    sum
}

/// Mean sample value of a window, i.e. its area per unit duration at unit peak.
pub fn mean_window_value(window: Vec<f64>) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    window.iter().sum::<f64>() / window.len() as f64
}

/// Scale `window` so its integral over `clock` equals `area`.
pub fn scale_to_area(mut window: Vec<f64>, area: f64, clock: &SampleClock) -> KindResult<Vec<f64>> {
    let sum: f64 = window.iter().sum();
    if sum < MIN_WINDOW_SUM {
        if area == 0.0 {
            return Ok(vec![0.0; window.len()]);
        }
        return Err(BuildErrorKind::InvalidWaveformParams(format!(
            "a {}-sample window cannot carry a non-zero area",
            window.len()
        )));
    }
    let scale = area / (sum * clock.sample_period_ns() * NS_TO_US);
    for w in &mut window {
        *w *= scale;
    }
    Ok(window)
}

fn peak_abs(samples: &[f64]) -> f64 {
    samples.iter().fold(0.0, |acc: f64, s| acc.max(s.abs()))
}

/// Smallest duration (ns) for which a window of the given `area` keeps its
/// peak magnitude within `|max_val|`.
///
/// `fill` is the mean value of the unit-peak window shape; it gives the
/// starting guess `|area| / (fill * |max_val|)`. The search then walks up
/// until the peak fits and back down while a shorter duration still fits,
/// so the same `(max_val, area)` pair always gives the same duration.
pub fn solve_duration_for_peak(
    max_val: f64,
    area: f64,
    fill: f64,
    clock: &SampleClock,
    window: impl Fn(usize) -> Vec<f64>,
) -> KindResult<u64> {
    if !(max_val.is_finite() && area.is_finite()) || max_val == 0.0 || area == 0.0 {
        return Err(BuildErrorKind::InvalidWaveformParams(format!(
            "max_val and area must be finite and non-zero, got max_val={} area={}",
            max_val, area
        )));
    }
    if max_val.signum() != area.signum() {
        return Err(BuildErrorKind::InvalidWaveformParams(format!(
            "max_val ({}) and area ({}) must have the same sign",
            max_val, area
        )));
    }
    let target = max_val.abs();
    let guess = (area.abs() / (fill * target * NS_TO_US)).ceil();
    if !guess.is_finite() || guess > MAX_SOLVED_DURATION_NS as f64 {
        return Err(BuildErrorKind::InvalidWaveformParams(format!(
            "area {} at peak {} needs a duration beyond {} ns",
            area, max_val, MAX_SOLVED_DURATION_NS
        )));
    }

    let fits = |duration: u64| -> bool {
        clock
            .num_samples(duration)
            .and_then(|n| scale_to_area(window(n), area, clock))
            .map(|samples| peak_abs(&samples) <= target)
            .unwrap_or(false)
    };

    let mut duration = (guess as u64).max(1);
    while !fits(duration) {
        duration += 1;
        if duration > MAX_SOLVED_DURATION_NS {
            return Err(BuildErrorKind::InvalidWaveformParams(format!(
                "no duration up to {} ns keeps the peak within {}",
                MAX_SOLVED_DURATION_NS, max_val
            )));
        }
    }
    while duration > 1 && fits(duration - 1) {
        duration -= 1;
    }
    Ok(duration)
}
