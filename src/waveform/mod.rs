// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Waveform descriptors and their materialization into sample sequences.
//!
//! Durations are integer nanoseconds. Amplitudes and detunings are in
//! rad/µs, so the area of a shape is `sum(samples) * sample_period_ns * 1e-3`
//! (in rad).
//!
//! [`WaveformTemplate`] is the parametrized form found in a sequence
//! document; [`WaveformTemplate::resolve`] turns it into a concrete
//! [`Waveform`], and [`Waveform::samples`] materializes it on a
//! [`SampleClock`].

pub mod interpolate;
pub mod window;

use serde::{Deserialize, Serialize};

use crate::error::{BuildErrorKind, KindResult};
use crate::expr::{eval_array, eval_int, eval_scalar, Bindings, Expr};

use self::interpolate::Pchip;
use self::window::{blackman_window, kaiser_window, scale_to_area, solve_duration_for_peak};

/// Nanoseconds to microseconds.
pub(crate) const NS_TO_US: f64 = 1e-3;

/// Default Kaiser window shape parameter.
pub const DEFAULT_KAISER_BETA: f64 = 14.0;

/// Hard ceiling on the samples of one materialized waveform.
pub const MAX_WAVEFORM_SAMPLES: usize = 1 << 30;

/// Sampling grid shared by every waveform in a program.
///
/// # Invariants
///
/// - `samples_per_ns >= 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleClock {
    /// Samples per nanosecond.
    pub samples_per_ns: u32,
}

impl Default for SampleClock {
    fn default() -> Self {
        Self { samples_per_ns: 1 }
    }
}

impl SampleClock {
    /// Create a clock, rejecting a zero rate.
    pub fn new(samples_per_ns: u32) -> Result<Self, String> {
        if samples_per_ns == 0 {
            return Err("samples_per_ns must be at least 1".into());
        }
        Ok(Self { samples_per_ns })
    }

    /// Sample period in nanoseconds.
    pub fn sample_period_ns(&self) -> f64 {
        1.0 / self.samples_per_ns as f64
    }

    /// Number of samples spanning `duration_ns`.
    ///
    /// # Errors
    ///
    /// `InvalidWaveformParams` when the count does not fit in memory
    /// addressing.
    pub fn num_samples(&self, duration_ns: u64) -> KindResult<usize> {
        duration_ns
            .checked_mul(self.samples_per_ns as u64)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| {
                BuildErrorKind::InvalidWaveformParams(format!(
                    "{} ns at {} samples/ns overflows the sample count",
                    duration_ns, self.samples_per_ns
                ))
            })
    }

    /// Duration covered by `num_samples` samples.
    ///
    /// # Errors
    ///
    /// Returns `InvalidWaveformParams` unless the count is a whole number of
    /// nanoseconds on this clock.
    pub fn duration_ns(&self, num_samples: usize) -> KindResult<u64> {
        let rate = self.samples_per_ns as usize;
        if num_samples % rate != 0 {
            return Err(BuildErrorKind::InvalidWaveformParams(format!(
                "{} samples is not a whole number of nanoseconds at {} samples/ns",
                num_samples, rate
            )));
        }
        Ok((num_samples / rate) as u64)
    }
}

/// A concrete waveform with every parameter resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Waveform {
    /// Flat value.
    Constant { duration: i64, value: f64 },
    /// Linear ramp, both endpoints included.
    Ramp { duration: i64, start: f64, stop: f64 },
    /// Blackman window with the given area.
    Blackman { duration: i64, area: f64 },
    /// Shortest Blackman window of the given area whose peak stays within `max_val`.
    BlackmanMax { max_val: f64, area: f64 },
    /// Kaiser window with the given area.
    Kaiser { duration: i64, area: f64, beta: f64 },
    /// Shortest Kaiser window of the given area whose peak stays within `max_val`.
    KaiserMax { max_val: f64, area: f64, beta: f64 },
    /// Monotone cubic interpolation through control points.
    Interpolated {
        duration: i64,
        values: Vec<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        times: Option<Vec<f64>>,
    },
    /// Literal samples.
    Custom { samples: Vec<f64> },
    /// Concatenation of sub-waveforms.
    Composite { waveforms: Vec<Waveform> },
}

impl Waveform {
    pub fn constant(duration: i64, value: f64) -> Self {
        Waveform::Constant { duration, value }
    }

    pub fn ramp(duration: i64, start: f64, stop: f64) -> Self {
        Waveform::Ramp {
            duration,
            start,
            stop,
        }
    }

    pub fn blackman(duration: i64, area: f64) -> Self {
        Waveform::Blackman { duration, area }
    }

    /// Materialize onto `clock`.
    ///
    /// # Errors
    ///
    /// `InvalidWaveformParams` for a negative duration, malformed
    /// interpolation points, an impossible max/area pair, or non-finite
    /// samples.
    pub fn samples(&self, clock: &SampleClock) -> KindResult<Vec<f64>> {
        let n = self.sample_count(clock)?;
        if n > MAX_WAVEFORM_SAMPLES {
            return Err(BuildErrorKind::InvalidWaveformParams(format!(
                "{} waveform needs {} samples, more than the {} a waveform may hold",
                self.kind_name(),
                n,
                MAX_WAVEFORM_SAMPLES
            )));
        }
        let samples = match self {
            Waveform::Constant { duration, value } => {
                vec![*value; clock.num_samples(check_duration(*duration)?)?]
            }
            Waveform::Ramp {
                duration,
                start,
                stop,
            } => linspace(*start, *stop, clock.num_samples(check_duration(*duration)?)?),
            Waveform::Blackman { duration, area } => {
                let n = clock.num_samples(check_duration(*duration)?)?;
                scale_to_area(blackman_window(n), *area, clock)?
            }
            Waveform::Kaiser {
                duration,
                area,
                beta,
            } => {
                check_beta(*beta)?;
                let n = clock.num_samples(check_duration(*duration)?)?;
                scale_to_area(kaiser_window(n, *beta), *area, clock)?
            }
            Waveform::BlackmanMax { max_val, area } => {
                let duration = solve_duration_for_peak(*max_val, *area, 0.42, clock, blackman_window)?;
                scale_to_area(blackman_window(clock.num_samples(duration)?), *area, clock)?
            }
            Waveform::KaiserMax {
                max_val,
                area,
                beta,
            } => {
                check_beta(*beta)?;
                let beta = *beta;
                let fill = window::mean_window_value(kaiser_window(1001, beta));
                let duration = solve_duration_for_peak(*max_val, *area, fill, clock, |n| {
                    kaiser_window(n, beta)
                })?;
                scale_to_area(kaiser_window(clock.num_samples(duration)?, beta), *area, clock)?
            }
            Waveform::Interpolated {
                duration,
                values,
                times,
            } => {
                let n = clock.num_samples(check_duration(*duration)?)?;
                interpolated_samples(n, values, times.as_deref())?
            }
            Waveform::Custom { samples } => {
                clock.duration_ns(samples.len())?;
                samples.clone()
            }
            Waveform::Composite { waveforms } => {
                if waveforms.is_empty() {
                    return Err(BuildErrorKind::InvalidWaveformParams(
                        "composite waveform needs at least one child".into(),
                    ));
                }
                let mut out = Vec::new();
                for child in waveforms {
                    out.extend(child.samples(clock)?);
                }
                out
            }
        };
        check_finite(self.kind_name(), &samples)?;
        Ok(samples)
    }

    /// Number of samples [`samples`](Waveform::samples) would produce,
    /// computed without materializing.
    ///
    /// Parameters are checked only as far as the count needs them.
    pub fn sample_count(&self, clock: &SampleClock) -> KindResult<usize> {
        match self {
            Waveform::Constant { duration, .. }
            | Waveform::Ramp { duration, .. }
            | Waveform::Blackman { duration, .. }
            | Waveform::Kaiser { duration, .. }
            | Waveform::Interpolated { duration, .. } => {
                clock.num_samples(check_duration(*duration)?)
            }
            Waveform::BlackmanMax { max_val, area } => clock.num_samples(
                solve_duration_for_peak(*max_val, *area, 0.42, clock, blackman_window)?,
            ),
            Waveform::KaiserMax {
                max_val,
                area,
                beta,
            } => {
                check_beta(*beta)?;
                let beta = *beta;
                let fill = window::mean_window_value(kaiser_window(1001, beta));
                clock.num_samples(solve_duration_for_peak(*max_val, *area, fill, clock, |n| {
                    kaiser_window(n, beta)
                })?)
            }
            Waveform::Custom { samples } => Ok(samples.len()),
            Waveform::Composite { waveforms } => {
                waveforms.iter().try_fold(0usize, |total, child| {
                    total.checked_add(child.sample_count(clock)?).ok_or_else(|| {
                        BuildErrorKind::InvalidWaveformParams(
                            "composite waveform sample count overflows".into(),
                        )
                    })
                })
            }
        }
    }

    /// Materialized duration in nanoseconds.
    pub fn duration_ns(&self, clock: &SampleClock) -> KindResult<u64> {
        clock.duration_ns(self.sample_count(clock)?)
    }

    /// Descriptor name as used in sequence documents.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Waveform::Constant { .. } => "constant",
            Waveform::Ramp { .. } => "ramp",
            Waveform::Blackman { .. } => "blackman",
            Waveform::BlackmanMax { .. } => "blackman_max",
            Waveform::Kaiser { .. } => "kaiser",
            Waveform::KaiserMax { .. } => "kaiser_max",
            Waveform::Interpolated { .. } => "interpolated",
            Waveform::Custom { .. } => "custom",
            Waveform::Composite { .. } => "composite",
        }
    }
}

fn check_duration(duration: i64) -> KindResult<u64> {
    if duration < 0 {
        return Err(BuildErrorKind::InvalidWaveformParams(format!(
            "duration must be non-negative, got {}",
            duration
        )));
    }
    Ok(duration as u64)
}

fn check_beta(beta: f64) -> KindResult<()> {
    if !(beta.is_finite() && beta >= 0.0) {
        return Err(BuildErrorKind::InvalidWaveformParams(format!(
            "Kaiser beta must be a non-negative number, got {}",
            beta
        )));
    }
    Ok(())
}

fn check_finite(kind: &str, samples: &[f64]) -> KindResult<()> {
    if let Some((i, x)) = samples.iter().enumerate().find(|(_, x)| !x.is_finite()) {
        return Err(BuildErrorKind::InvalidWaveformParams(format!(
            "{} waveform has non-finite sample {} at index {}",
            kind, x, i
        )));
    }
    Ok(())
}

fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n)
                .map(|k| if k == n - 1 { stop } else { start + step * k as f64 })
                .collect()
        }
    }
}

fn interpolated_samples(n: usize, values: &[f64], times: Option<&[f64]>) -> KindResult<Vec<f64>> {
    if values.len() < 2 {
        return Err(BuildErrorKind::InvalidWaveformParams(format!(
            "interpolation needs at least 2 values, got {}",
            values.len()
        )));
    }
    let times = match times {
        Some(times) => {
            if times.len() != values.len() {
                return Err(BuildErrorKind::InvalidWaveformParams(format!(
                    "{} times given for {} values",
                    times.len(),
                    values.len()
                )));
            }
            if times.iter().any(|t| !(0.0..=1.0).contains(t)) {
                return Err(BuildErrorKind::InvalidWaveformParams(
                    "interpolation times must lie in [0, 1]".into(),
                ));
            }
            if times.windows(2).any(|w| w[1] <= w[0]) {
                return Err(BuildErrorKind::InvalidWaveformParams(
                    "interpolation times must be strictly increasing".into(),
                ));
            }
            times.to_vec()
        }
        None => linspace(0.0, 1.0, values.len()),
    };
    let curve = Pchip::new(&times, values)?;
    Ok(match n {
        0 => Vec::new(),
        1 => vec![curve.eval(0.0)],
        _ => (0..n)
            .map(|k| curve.eval(k as f64 / (n - 1) as f64))
            .collect(),
    })
}

fn default_beta() -> Expr {
    Expr::scalar(DEFAULT_KAISER_BETA)
}

/// Parametrized waveform descriptor as written in a sequence document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaveformTemplate {
    Constant {
        duration: Expr,
        value: Expr,
    },
    Ramp {
        duration: Expr,
        start: Expr,
        stop: Expr,
    },
    Blackman {
        duration: Expr,
        area: Expr,
    },
    BlackmanMax {
        max_val: Expr,
        area: Expr,
    },
    Kaiser {
        duration: Expr,
        area: Expr,
        #[serde(default = "default_beta")]
        beta: Expr,
    },
    KaiserMax {
        max_val: Expr,
        area: Expr,
        #[serde(default = "default_beta")]
        beta: Expr,
    },
    Interpolated {
        duration: Expr,
        values: Expr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        times: Option<Expr>,
    },
    Custom {
        samples: Expr,
    },
    Composite {
        waveforms: Vec<WaveformTemplate>,
    },
}

impl WaveformTemplate {
    /// Evaluate every parametrized field; the waveform is not materialized.
    pub fn resolve(&self, bindings: &Bindings) -> KindResult<Waveform> {
        let duration = |e: &Expr| eval_int(e, bindings, "waveform duration");
        Ok(match self {
            WaveformTemplate::Constant { duration: d, value } => Waveform::Constant {
                duration: duration(d)?,
                value: eval_scalar(value, bindings, "constant value")?,
            },
            WaveformTemplate::Ramp {
                duration: d,
                start,
                stop,
            } => Waveform::Ramp {
                duration: duration(d)?,
                start: eval_scalar(start, bindings, "ramp start")?,
                stop: eval_scalar(stop, bindings, "ramp stop")?,
            },
            WaveformTemplate::Blackman { duration: d, area } => Waveform::Blackman {
                duration: duration(d)?,
                area: eval_scalar(area, bindings, "blackman area")?,
            },
            WaveformTemplate::BlackmanMax { max_val, area } => Waveform::BlackmanMax {
                max_val: eval_scalar(max_val, bindings, "blackman max_val")?,
                area: eval_scalar(area, bindings, "blackman area")?,
            },
            WaveformTemplate::Kaiser {
                duration: d,
                area,
                beta,
            } => Waveform::Kaiser {
                duration: duration(d)?,
                area: eval_scalar(area, bindings, "kaiser area")?,
                beta: eval_scalar(beta, bindings, "kaiser beta")?,
            },
            WaveformTemplate::KaiserMax {
                max_val,
                area,
                beta,
            } => Waveform::KaiserMax {
                max_val: eval_scalar(max_val, bindings, "kaiser max_val")?,
                area: eval_scalar(area, bindings, "kaiser area")?,
                beta: eval_scalar(beta, bindings, "kaiser beta")?,
            },
            WaveformTemplate::Interpolated {
                duration: d,
                values,
                times,
            } => Waveform::Interpolated {
                duration: duration(d)?,
                values: eval_array(values, bindings)?,
                times: times
                    .as_ref()
                    .map(|t| eval_array(t, bindings))
                    .transpose()?,
            },
            WaveformTemplate::Custom { samples } => Waveform::Custom {
                samples: eval_array(samples, bindings)?,
            },
            WaveformTemplate::Composite { waveforms } => Waveform::Composite {
                waveforms: waveforms
                    .iter()
                    .map(|w| w.resolve(bindings))
                    .collect::<KindResult<_>>()?,
            },
        })
    }

    /// Add the names of all variables this descriptor references to `out`.
    pub fn collect_variables(&self, out: &mut std::collections::BTreeSet<String>) {
        let fields: Vec<&Expr> = match self {
            WaveformTemplate::Constant { duration, value } => vec![duration, value],
            WaveformTemplate::Ramp {
                duration,
                start,
                stop,
            } => vec![duration, start, stop],
            WaveformTemplate::Blackman { duration, area } => vec![duration, area],
            WaveformTemplate::BlackmanMax { max_val, area } => vec![max_val, area],
            WaveformTemplate::Kaiser {
                duration,
                area,
                beta,
            } => vec![duration, area, beta],
            WaveformTemplate::KaiserMax {
                max_val,
                area,
                beta,
            } => vec![max_val, area, beta],
            WaveformTemplate::Interpolated {
                duration,
                values,
                times,
            } => {
                let mut v = vec![duration, values];
                v.extend(times.iter());
                v
            }
            WaveformTemplate::Custom { samples } => vec![samples],
            WaveformTemplate::Composite { waveforms } => {
                for w in waveforms {
                    w.collect_variables(out);
                }
                Vec::new()
            }
        };
        for e in fields {
            e.collect_variables(out);
        }
    }
}
