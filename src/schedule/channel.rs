// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-channel timeline state.

use std::collections::BTreeSet;

use serde::Serialize;

use super::eom::{EomInterval, EomState};
use super::ScheduleLimits;
use crate::error::KindResult;
use crate::sequence::{ChannelSpec, Protocol};
use crate::waveform::SampleClock;

/// A waveform placed on a channel timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub start_ns: u64,
    pub duration_ns: u64,
    pub amplitude: Vec<f64>,
    pub detuning: Vec<f64>,
    /// Carrier phase (rad, in `[0, 2π)`), phase reference included.
    pub phase: f64,
    pub targets: BTreeSet<String>,
    /// Emitted while the channel was in EOM mode.
    pub eom: bool,
    /// Placement protocol, `None` for idle segments (detuned delays).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    /// Global placement order across all channels.
    #[serde(skip)]
    pub order: usize,
}

impl Segment {
    pub fn end_ns(&self) -> u64 {
        self.start_ns.saturating_add(self.duration_ns)
    }

    /// Half-open time intervals intersect.
    pub fn overlaps(&self, other: &Segment) -> bool {
        self.start_ns < other.end_ns() && other.start_ns < self.end_ns()
    }

    pub fn shares_atoms(&self, atoms: &BTreeSet<String>) -> bool {
        !self.targets.is_disjoint(atoms)
    }

    /// Detuned delay emitted while idling in EOM mode.
    pub fn is_detuned_delay(&self) -> bool {
        self.eom && self.protocol.is_none()
    }
}

/// Mutable scheduling state of one declared channel.
#[derive(Debug, Clone)]
pub struct ChannelState {
    pub name: String,
    pub spec: ChannelSpec,
    /// End of the last operation on this channel.
    pub cursor: u64,
    /// Current targets; `None` until a local channel is first targeted.
    pub targets: Option<BTreeSet<String>>,
    /// Every atom this channel has targeted so far.
    pub footprint: BTreeSet<String>,
    pub segments: Vec<Segment>,
    pub eom: EomState,
    /// Closed EOM intervals, plus the start of an open one.
    pub eom_intervals: Vec<EomInterval>,
    pub eom_open_since: Option<u64>,
}

impl ChannelState {
    /// Fresh state; global channels target the whole `register`.
    pub fn new<'a>(
        name: &str,
        spec: &ChannelSpec,
        register: impl Iterator<Item = &'a str>,
    ) -> Self {
        let targets: Option<BTreeSet<String>> = if spec.is_local() {
            spec.initial_target
                .as_ref()
                .map(|ids| ids.iter().cloned().collect())
        } else {
            Some(register.map(str::to_string).collect())
        };
        Self {
            name: name.to_string(),
            spec: spec.clone(),
            cursor: 0,
            footprint: targets.clone().unwrap_or_default(),
            targets,
            segments: Vec::new(),
            eom: EomState::Off,
            eom_intervals: Vec::new(),
            eom_open_since: None,
        }
    }

    pub fn set_targets(&mut self, targets: BTreeSet<String>) {
        self.footprint.extend(targets.iter().cloned());
        self.targets = Some(targets);
    }

    /// Append a segment and move the cursor to its end.
    pub fn push(&mut self, segment: Segment) {
        self.footprint.extend(segment.targets.iter().cloned());
        self.cursor = self.cursor.max(segment.end_ns());
        self.segments.push(segment);
    }

    /// Move the cursor forward to `time`.
    ///
    /// In EOM mode with a non-zero `detuning_off` the idle span becomes a
    /// detuned-delay segment at zero amplitude, subject to the sample limit.
    pub fn advance_to(
        &mut self,
        time: u64,
        clock: &SampleClock,
        limits: &ScheduleLimits,
        order: usize,
    ) -> KindResult<()> {
        if time <= self.cursor {
            return Ok(());
        }
        if let EomState::On { detuning_off, .. } = self.eom {
            if detuning_off != 0.0 {
                let duration_ns = time - self.cursor;
                let n = clock.num_samples(duration_ns)?;
                limits.check_samples(&self.name, n)?;
                let segment = Segment {
                    start_ns: self.cursor,
                    duration_ns,
                    amplitude: vec![0.0; n],
                    detuning: vec![detuning_off; n],
                    phase: 0.0,
                    targets: self.targets.clone().unwrap_or_default(),
                    eom: true,
                    protocol: None,
                    order,
                };
                self.push(segment);
                return Ok(());
            }
        }
        self.cursor = time;
        Ok(())
    }

    /// Close any open EOM interval at the channel's final cursor.
    pub fn close_eom_interval(&mut self) {
        if let Some(start_ns) = self.eom_open_since.take() {
            self.eom_intervals.push(EomInterval {
                start_ns,
                end_ns: self.cursor,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::{Addressing, ChannelDecl};

    fn local_spec() -> ChannelSpec {
        ChannelSpec::from_decl(&ChannelDecl::Id("raman_local".into()), 2).unwrap()
    }

    fn segment(start: u64, duration: u64, atoms: &[&str]) -> Segment {
        Segment {
            start_ns: start,
            duration_ns: duration,
            amplitude: vec![1.0; duration as usize],
            detuning: vec![0.0; duration as usize],
            phase: 0.0,
            targets: atoms.iter().map(|a| a.to_string()).collect(),
            eom: false,
            protocol: Some(Protocol::NoDelay),
            order: 0,
        }
    }

    #[test]
    fn test_segment_overlap_is_half_open() {
        let a = segment(0, 100, &["q0"]);
        assert!(!a.overlaps(&segment(100, 50, &["q0"])));
        assert!(a.overlaps(&segment(99, 50, &["q0"])));
    }

    #[test]
    fn test_global_channel_targets_register() {
        let spec = ChannelSpec::from_decl(&ChannelDecl::Id("rydberg_global".into()), 1).unwrap();
        let state = ChannelState::new("ryd", &spec, ["q0", "q1"].into_iter());
        assert_eq!(state.targets.as_ref().map(|t| t.len()), Some(2));
        assert_eq!(spec.addressing, Addressing::Global);
    }

    #[test]
    fn test_local_channel_starts_untargeted() {
        let state = ChannelState::new("ram", &local_spec(), ["q0"].into_iter());
        assert!(state.targets.is_none());
        assert!(state.footprint.is_empty());
    }

    #[test]
    fn test_push_moves_cursor_and_footprint() {
        let mut state = ChannelState::new("ram", &local_spec(), std::iter::empty());
        state.push(segment(40, 60, &["q1"]));
        assert_eq!(state.cursor, 100);
        assert!(state.footprint.contains("q1"));
    }

    #[test]
    fn test_detuned_delay_respects_sample_limit() {
        let clock = SampleClock::default();
        let limits = ScheduleLimits {
            max_samples_per_waveform: 10,
            ..ScheduleLimits::default()
        };
        let mut state = ChannelState::new("ram", &local_spec(), std::iter::empty());
        state.eom = EomState::On {
            amp_on: 1.0,
            detuning_on: 0.0,
            detuning_off: -2.0,
        };
        assert!(state.advance_to(10, &clock, &limits, 0).is_ok());
        assert!(matches!(
            state.advance_to(21, &clock, &limits, 1),
            Err(crate::error::BuildErrorKind::LimitExceeded { requested: 11, .. })
        ));
        assert_eq!(state.cursor, 10);
    }

    #[test]
    fn test_segment_end_saturates() {
        let s = segment(u64::MAX - 1, 5, &["q0"]);
        assert_eq!(s.end_ns(), u64::MAX);
    }

    #[test]
    fn test_advance_emits_detuned_delay_in_eom() {
        let clock = SampleClock::default();
        let mut state = ChannelState::new("ram", &local_spec(), std::iter::empty());
        state.set_targets(["q0".to_string()].into_iter().collect());
        state.eom = EomState::On {
            amp_on: 1.0,
            detuning_on: 0.0,
            detuning_off: -2.0,
        };
        let limits = ScheduleLimits::default();
        state.advance_to(50, &clock, &limits, 0).unwrap();
        assert_eq!(state.cursor, 50);
        assert_eq!(state.segments.len(), 1);
        assert!(state.segments[0].is_detuned_delay());
        assert!(state.segments[0].detuning.iter().all(|&d| d == -2.0));

        state.eom = EomState::Off;
        state.advance_to(80, &clock, &limits, 1).unwrap();
        assert_eq!(state.cursor, 80);
        assert_eq!(state.segments.len(), 1);
    }
}
