// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Piecewise cubic Hermite interpolation with Fritsch–Carlson slopes (PCHIP).
//!
//! The interpolant never overshoots the data between control points and is
//! monotone wherever the data is.

use crate::error::{BuildErrorKind, KindResult};

/// A PCHIP curve through `(xs[i], ys[i])`.
#[derive(Debug, Clone)]
pub struct Pchip {
    xs: Vec<f64>,
    ys: Vec<f64>,
    slopes: Vec<f64>,
}

impl Pchip {
    /// Fit the curve. `xs` must be strictly increasing with at least two points.
    pub fn new(xs: &[f64], ys: &[f64]) -> KindResult<Self> {
        if xs.len() != ys.len() || xs.len() < 2 {
            return Err(BuildErrorKind::InvalidWaveformParams(format!(
                "interpolation needs matching point lists of length >= 2, got {} and {}",
                xs.len(),
                ys.len()
            )));
        }
        if xs.windows(2).any(|w| w[1] <= w[0]) {
            return Err(BuildErrorKind::InvalidWaveformParams(
                "interpolation abscissae must be strictly increasing".into(),
            ));
        }
        Ok(Self {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            slopes: slopes(xs, ys),
        })
    }

    /// Evaluate at `x`. Outside the data range the edge polynomial is extended.
    pub fn eval(&self, x: f64) -> f64 {
        let last = self.xs.len() - 2;
        let i = self
            .xs
            .partition_point(|&v| v <= x)
            .saturating_sub(1)
            .min(last);
        let h = self.xs[i + 1] - self.xs[i];
        let t = (x - self.xs[i]) / h;
        let t2 = t * t;
        let t3 = t2 * t;
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;
        h00 * self.ys[i]
            + h10 * h * self.slopes[i]
            + h01 * self.ys[i + 1]
            + h11 * h * self.slopes[i + 1]
    }
}

fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

fn slopes(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let m: Vec<f64> = (0..n - 1).map(|k| (ys[k + 1] - ys[k]) / h[k]).collect();

    if n == 2 {
        return vec![m[0], m[0]];
    }

    let mut d = vec![0.0; n];
    for k in 1..n - 1 {
        if sign(m[k - 1]) * sign(m[k]) <= 0 {
            continue;
        }
        let w1 = 2.0 * h[k] + h[k - 1];
        let w2 = h[k] + 2.0 * h[k - 1];
        d[k] = (w1 + w2) / (w1 / m[k - 1] + w2 / m[k]);
    }
    d[0] = edge_slope(h[0], h[1], m[0], m[1]);
    d[n - 1] = edge_slope(h[n - 2], h[n - 3], m[n - 2], m[n - 3]);
    d
}

/// One-sided three-point slope, limited to keep the end segment shape-preserving.
fn edge_slope(h0: f64, h1: f64, m0: f64, m1: f64) -> f64 {
    let d = ((2.0 * h0 + h1) * m0 - h0 * m1) / (h0 + h1);
    if sign(d) != sign(m0) {
        0.0
    } else if sign(m0) != sign(m1) && d.abs() > 3.0 * m0.abs() {
        3.0 * m0
    } else {
        d
    }
}
