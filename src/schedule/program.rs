// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scheduled program: the concrete, time-stamped output of the scheduler.

use std::collections::BTreeMap;

use serde::Serialize;

use super::channel::{ChannelState, Segment};
use super::eom::EomInterval;
use crate::error::{Error, KindResult, Result};
use crate::sequence::{Addressing, Basis, ChannelSpec, ProgramExtras, Protocol};
use crate::waveform::SampleClock;

/// Timeline of one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelProgram {
    /// Hardware channel id, e.g. `rydberg_global`.
    pub id: String,
    pub basis: Basis,
    #[serde(flatten)]
    pub addressing: Addressing,
    /// Segments in start order, never overlapping.
    pub segments: Vec<Segment>,
    /// Channel end time.
    pub duration_ns: u64,
    pub eom_intervals: Vec<EomInterval>,
}

impl ChannelProgram {
    pub(crate) fn from_state(state: ChannelState) -> Self {
        let ChannelState {
            spec,
            cursor,
            segments,
            eom_intervals,
            ..
        } = state;
        let ChannelSpec { id, addressing, .. } = spec;
        Self {
            id: id.to_string(),
            basis: id.line.basis(),
            addressing,
            segments,
            duration_ns: cursor,
            eom_intervals,
        }
    }

    /// Full sampled timeline over `[0, duration_ns)`, zero between segments.
    ///
    /// Returns `(amplitude, detuning, phase)` with one entry per sample.
    pub fn sampled(
        &self,
        clock: &SampleClock,
        duration_ns: u64,
    ) -> KindResult<(Vec<f64>, Vec<f64>, Vec<f64>)> {
        let n = clock.num_samples(duration_ns)?;
        let mut amplitude = vec![0.0; n];
        let mut detuning = vec![0.0; n];
        let mut phase = vec![0.0; n];
        for segment in &self.segments {
            let offset = clock.num_samples(segment.start_ns)?;
            for (k, (a, d)) in segment.amplitude.iter().zip(&segment.detuning).enumerate() {
                let i = offset + k;
                if i >= n {
                    break;
                }
                amplitude[i] = *a;
                detuning[i] = *d;
                phase[i] = segment.phase;
            }
        }
        Ok((amplitude, detuning, phase))
    }
}

/// The scheduled program for a whole sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledProgram {
    /// Register atom ids, in order.
    pub atoms: Vec<String>,
    pub channels: BTreeMap<String, ChannelProgram>,
    /// Final phase reference of each atom, per addressed basis.
    pub phase_references: BTreeMap<Basis, BTreeMap<String, f64>>,
    /// Largest channel end time.
    pub total_duration_ns: u64,
    #[serde(flatten)]
    pub extras: ProgramExtras,
}

impl ScheduledProgram {
    pub fn channel(&self, name: &str) -> Option<&ChannelProgram> {
        self.channels.get(name)
    }

    /// Number of segments over all channels.
    pub fn segment_count(&self) -> usize {
        self.channels.values().map(|c| c.segments.len()).sum()
    }

    /// Largest sample count of any segment.
    pub fn max_segment_samples(&self) -> usize {
        self.channels
            .values()
            .flat_map(|c| c.segments.iter())
            .map(|s| s.amplitude.len())
            .max()
            .unwrap_or(0)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let out = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        out.map_err(Error::from)
    }

    /// Check the timeline for conflicts.
    ///
    /// Reports segments that overlap on the same channel, and segments of
    /// different channels that overlap on a shared atom when the later of
    /// the two was placed with `min-delay`. Empty means no issues.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        for (name, channel) in &self.channels {
            let mut sorted: Vec<&Segment> = channel.segments.iter().collect();
            sorted.sort_by_key(|s| s.start_ns);
            for pair in sorted.windows(2) {
                if pair[0].overlaps(pair[1]) {
                    issues.push(format!(
                        "OVERLAP: channel '{}' segments [{}-{} ns] and [{}-{} ns]",
                        name,
                        pair[0].start_ns,
                        pair[0].end_ns(),
                        pair[1].start_ns,
                        pair[1].end_ns(),
                    ));
                }
            }
            if let Some(last) = channel.segments.iter().map(Segment::end_ns).max() {
                if last > channel.duration_ns {
                    issues.push(format!(
                        "DURATION: channel '{}' ends at {} ns but has a segment ending at {} ns",
                        name, channel.duration_ns, last
                    ));
                }
            }
        }

        let tagged: Vec<(&str, &Segment)> = self
            .channels
            .iter()
            .flat_map(|(name, c)| c.segments.iter().map(move |s| (name.as_str(), s)))
            .collect();
        for (i, (ca, a)) in tagged.iter().enumerate() {
            for (cb, b) in &tagged[i + 1..] {
                if ca == cb || !a.overlaps(b) || a.targets.is_disjoint(&b.targets) {
                    continue;
                }
                let later = if a.order > b.order { a } else { b };
                if later.protocol == Some(Protocol::MinDelay) {
                    let shared: Vec<&String> = a.targets.intersection(&b.targets).collect();
                    issues.push(format!(
                        "CONFLICT: '{}' [{}-{} ns] and '{}' [{}-{} ns] overlap on atom(s) {:?}",
                        ca,
                        a.start_ns,
                        a.end_ns(),
                        cb,
                        b.start_ns,
                        b.end_ns(),
                        shared,
                    ));
                }
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ScheduleOptions;
    use crate::test_utils::build_ops;

    fn program(ops: serde_json::Value) -> ScheduledProgram {
        build_ops(ops).schedule(&ScheduleOptions::default()).unwrap()
    }

    fn constant(channel: &str, duration: u64, value: f64, protocol: &str) -> serde_json::Value {
        serde_json::json!({
            "op": "pulse",
            "channel": channel,
            "protocol": protocol,
            "amplitude": {"kind": "constant", "duration": duration, "value": value},
            "detuning": {"kind": "constant", "duration": duration, "value": -value}
        })
    }

    #[test]
    fn test_sampled_timeline_fills_gaps() {
        let p = program(serde_json::json!([
            constant("ryd", 3, 1.0, "no-delay"),
            {"op": "delay", "channel": "ryd", "time": 2},
            constant("ryd", 2, 2.0, "no-delay")
        ]));
        let ryd = p.channel("ryd").unwrap();
        let (amp, det, _) = ryd
            .sampled(&SampleClock::default(), p.total_duration_ns)
            .unwrap();
        assert_eq!(amp, vec![1.0, 1.0, 1.0, 0.0, 0.0, 2.0, 2.0]);
        assert_eq!(det, vec![-1.0, -1.0, -1.0, 0.0, 0.0, -2.0, -2.0]);
        assert!(p.channel("missing").is_none());
    }

    #[test]
    fn test_sampled_rejects_overflowing_duration() {
        let p = program(serde_json::json!([constant("ryd", 3, 1.0, "no-delay")]));
        let clock = SampleClock::new(4).unwrap();
        assert!(p.channels["ryd"].sampled(&clock, u64::MAX).is_err());
    }

    #[test]
    fn test_validate_flags_min_delay_conflict() {
        let mut p = program(serde_json::json!([
            {"op": "target", "channel": "ram", "target": "q0"},
            constant("ryd", 100, 1.0, "no-delay"),
            constant("ram", 50, 1.0, "min-delay")
        ]));
        assert!(p.validate().is_empty());

        // Force the min-delay pulse back onto the busy interval.
        let ram = p.channels.get_mut("ram").unwrap();
        ram.segments[0].start_ns = 20;
        let issues = p.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].starts_with("CONFLICT"));
    }

    #[test]
    fn test_validate_flags_same_channel_overlap() {
        let mut p = program(serde_json::json!([
            constant("ryd", 100, 1.0, "no-delay"),
            constant("ryd", 100, 1.0, "no-delay")
        ]));
        p.channels.get_mut("ryd").unwrap().segments[1].start_ns = 50;
        assert!(p.validate().iter().any(|i| i.starts_with("OVERLAP")));
    }

    #[test]
    fn test_program_json_shape() {
        let p = program(serde_json::json!([constant("ryd", 4, 1.0, "no-delay")]));
        let json: serde_json::Value = serde_json::from_str(&p.to_json(false).unwrap()).unwrap();
        assert_eq!(json["total_duration_ns"], 4);
        assert_eq!(json["channels"]["ryd"]["id"], "rydberg_global");
        assert_eq!(json["channels"]["ryd"]["addressing"], "global");
        assert_eq!(json["channels"]["ram"]["max_targets"], 1);
        assert_eq!(json["channels"]["ryd"]["segments"][0]["protocol"], "no-delay");
        assert!(json["phase_references"]["ground-rydberg"]["q0"].is_number());
        assert_eq!(p.segment_count(), 1);
        assert_eq!(p.max_segment_samples(), 4);
    }
}
