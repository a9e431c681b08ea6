// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Channel timeline scheduler.
//!
//! Operations are applied strictly in list order. Each channel keeps a
//! cursor (end of its last operation) that never moves backwards; a pulse
//! starts at or after its channel's cursor, at a time chosen by its
//! [`Protocol`]:
//!
//! - `no-delay`: at the cursor.
//! - `wait-for-all`: once every other channel that has touched one of the
//!   pulse's atoms has reached its own cursor.
//! - `min-delay`: in the first gap, at or after the cursor, long enough to
//!   hold the pulse without overlapping any segment of another channel on a
//!   shared atom.

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::TAU;

use tracing::{debug, info, warn};

use super::channel::{ChannelState, Segment};
use super::eom::{select_detuning_off, EomState};
use super::program::{ChannelProgram, ScheduledProgram};
use super::ScheduleOptions;
use crate::error::{BuildError, BuildErrorKind, KindResult};
use crate::register::Register;
use crate::sequence::{Addressing, AtomRef, Basis, BuiltSequence, Operation, Protocol};
use crate::waveform::Waveform;

/// Phase references closer than this are treated as equal.
const PHASE_TOLERANCE: f64 = 1e-9;

impl BuiltSequence {
    /// Place every operation on its channel timeline.
    ///
    /// # Errors
    ///
    /// The first operation that cannot be placed aborts the call; the error
    /// carries its position.
    pub fn schedule(&self, options: &ScheduleOptions) -> Result<ScheduledProgram, BuildError> {
        schedule(self, options)
    }
}

/// Schedule a built sequence. See [`BuiltSequence::schedule`].
pub fn schedule(
    built: &BuiltSequence,
    options: &ScheduleOptions,
) -> Result<ScheduledProgram, BuildError> {
    let mut scheduler = Scheduler::new(built, options);
    for (pos, op) in built.operations.iter().enumerate() {
        if let Err(kind) = scheduler.apply(op) {
            debug!(position = pos, op = op.name(), error = %kind, "Operation rejected");
            return Err(BuildError::at(pos, kind));
        }
    }
    let program = scheduler.finish(built);
    info!(
        channels = program.channels.len(),
        total_duration_ns = program.total_duration_ns,
        "Sequence scheduled"
    );
    Ok(program)
}

/// Wrap a phase into `[0, 2π)`.
pub(crate) fn wrap_phase(phase: f64) -> f64 {
    let wrapped = phase.rem_euclid(TAU);
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

fn channel_mut<'m>(
    channels: &'m mut BTreeMap<String, ChannelState>,
    name: &str,
) -> KindResult<&'m mut ChannelState> {
    channels
        .get_mut(name)
        .ok_or_else(|| BuildErrorKind::UnknownChannel(name.to_string()))
}

struct Scheduler<'a> {
    register: &'a Register,
    options: &'a ScheduleOptions,
    channels: BTreeMap<String, ChannelState>,
    phases: BTreeMap<Basis, BTreeMap<String, f64>>,
    placed: usize,
}

impl<'a> Scheduler<'a> {
    fn new(built: &'a BuiltSequence, options: &'a ScheduleOptions) -> Self {
        let channels: BTreeMap<String, ChannelState> = built
            .channels
            .iter()
            .map(|(name, spec)| {
                (
                    name.clone(),
                    ChannelState::new(name, spec, built.register.ids()),
                )
            })
            .collect();
        let phases: BTreeMap<Basis, BTreeMap<String, f64>> = channels
            .values()
            .map(|c| {
                let atoms: BTreeMap<String, f64> = built
                    .register
                    .ids()
                    .map(|id| (id.to_string(), 0.0))
                    .collect();
                (c.spec.basis(), atoms)
            })
            .collect();
        Self {
            register: &built.register,
            options,
            channels,
            phases,
            placed: 0,
        }
    }

    fn next_order(&mut self) -> usize {
        self.placed += 1;
        self.placed
    }

    fn apply(&mut self, op: &Operation) -> KindResult<()> {
        match op {
            Operation::Align { channels } => self.align(channels),
            Operation::Delay { channel, time } => self.delay(channel, *time),
            Operation::Target { channel, targets } => self.target(channel, targets),
            Operation::Pulse {
                channel,
                amplitude,
                detuning,
                phase,
                post_phase_shift,
                protocol,
            } => {
                if channel_mut(&mut self.channels, channel)?.eom.is_on() {
                    return Err(BuildErrorKind::EomModeActive(channel.clone()));
                }
                let amplitude = self.sample(channel, amplitude)?;
                let detuning = self.sample(channel, detuning)?;
                self.place(
                    channel,
                    amplitude,
                    detuning,
                    *phase,
                    *post_phase_shift,
                    *protocol,
                    false,
                )
            }
            Operation::PhaseShift {
                phi,
                targets,
                basis,
            } => self.phase_shift(*phi, targets, *basis),
            Operation::EnableEomMode {
                channel,
                amp_on,
                detuning_on,
                optimal_detuning_off,
            } => self.enable_eom(channel, *amp_on, *detuning_on, *optimal_detuning_off),
            Operation::DisableEomMode { channel } => self.disable_eom(channel),
            Operation::AddEomPulse {
                channel,
                duration,
                phase,
                post_phase_shift,
                protocol,
            } => {
                let (amp_on, detuning_on) = match channel_mut(&mut self.channels, channel)?.eom {
                    EomState::On {
                        amp_on,
                        detuning_on,
                        ..
                    } => (amp_on, detuning_on),
                    EomState::Off => return Err(BuildErrorKind::EomModeNotActive(channel.clone())),
                };
                let amplitude = self.sample(channel, &Waveform::constant(*duration, amp_on))?;
                let detuning =
                    self.sample(channel, &Waveform::constant(*duration, detuning_on))?;
                self.place(
                    channel,
                    amplitude,
                    detuning,
                    *phase,
                    *post_phase_shift,
                    *protocol,
                    true,
                )
            }
        }
    }

    /// Sample `waveform` once its size is known to be within limits.
    fn sample(&self, channel: &str, waveform: &Waveform) -> KindResult<Vec<f64>> {
        let clock = self.options.clock;
        self.options
            .limits
            .check_samples(channel, waveform.sample_count(&clock)?)?;
        waveform.samples(&clock)
    }

    // =========================================================================
    // Timing
    // =========================================================================

    fn align(&mut self, names: &[String]) -> KindResult<()> {
        if names.is_empty() {
            return Err(BuildErrorKind::EmptyAlign);
        }
        let mut latest: u64 = 0;
        for name in names {
            latest = latest.max(channel_mut(&mut self.channels, name)?.cursor);
        }
        let clock = self.options.clock;
        let limits = self.options.limits;
        for name in names {
            let order = self.next_order();
            channel_mut(&mut self.channels, name)?.advance_to(latest, &clock, &limits, order)?;
        }
        debug!(channels = ?names, time_ns = latest, "Channels aligned");
        Ok(())
    }

    fn delay(&mut self, name: &str, time: i64) -> KindResult<()> {
        if time < 0 {
            return Err(BuildErrorKind::InvalidDelay(time));
        }
        let clock = self.options.clock;
        let limits = self.options.limits;
        let order = self.next_order();
        let ch = channel_mut(&mut self.channels, name)?;
        let until = limits.end_time(name, ch.cursor, time as u64)?;
        ch.advance_to(until, &clock, &limits, order)?;
        debug!(channel = name, delay_ns = time, cursor_ns = ch.cursor, "Delay");
        Ok(())
    }

    fn start_time(
        &self,
        name: &str,
        targets: &BTreeSet<String>,
        duration: u64,
        cursor: u64,
        protocol: Protocol,
    ) -> u64 {
        let others = self.channels.values().filter(|c| c.name != name);
        match protocol {
            Protocol::NoDelay => cursor,
            Protocol::WaitForAll => others
                .filter(|c| !c.footprint.is_disjoint(targets))
                .map(|c| c.cursor)
                .fold(cursor, u64::max),
            Protocol::MinDelay => {
                let mut busy: Vec<(u64, u64)> = others
                    .flat_map(|c| c.segments.iter())
                    .filter(|s| s.duration_ns > 0 && s.shares_atoms(targets))
                    .map(|s| (s.start_ns, s.end_ns()))
                    .collect();
                busy.sort_unstable();
                let mut start = cursor;
                for (s, e) in busy {
                    if e <= start {
                        continue;
                    }
                    if s >= start.saturating_add(duration) {
                        break;
                    }
                    start = e;
                }
                start
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn place(
        &mut self,
        name: &str,
        amplitude: Vec<f64>,
        detuning: Vec<f64>,
        phase: f64,
        post_phase_shift: f64,
        protocol: Protocol,
        eom: bool,
    ) -> KindResult<()> {
        if amplitude.len() != detuning.len() {
            return Err(BuildErrorKind::WaveformLengthMismatch {
                amplitude: amplitude.len(),
                detuning: detuning.len(),
            });
        }
        if let Some(a) = amplitude.iter().find(|a| **a < 0.0) {
            return Err(BuildErrorKind::InvalidWaveformParams(format!(
                "amplitude must be non-negative, got {}",
                a
            )));
        }
        let clock = self.options.clock;
        let duration = clock.duration_ns(amplitude.len())?;
        if duration == 0 {
            warn!(channel = name, "Zero-duration pulse");
        }

        let (cursor, targets, basis) = {
            let ch = channel_mut(&mut self.channels, name)?;
            let targets = ch
                .targets
                .clone()
                .ok_or_else(|| BuildErrorKind::UnresolvedTarget(name.to_string()))?;
            (ch.cursor, targets, ch.spec.basis())
        };
        let reference = self.phase_reference(name, basis, &targets)?;
        let start = self.start_time(name, &targets, duration, cursor, protocol);
        let limits = self.options.limits;
        limits.end_time(name, start, duration)?;

        let filler_order = self.next_order();
        let order = self.next_order();
        let ch = channel_mut(&mut self.channels, name)?;
        ch.advance_to(start, &clock, &limits, filler_order)?;
        ch.push(Segment {
            start_ns: start,
            duration_ns: duration,
            amplitude,
            detuning,
            phase: wrap_phase(phase + reference),
            targets: targets.clone(),
            eom,
            protocol: Some(protocol),
            order,
        });
        debug!(
            channel = name,
            start_ns = start,
            duration_ns = duration,
            waited_ns = start - cursor,
            protocol = %protocol,
            eom,
            "Pulse placed"
        );

        if post_phase_shift != 0.0 {
            self.shift_phases(basis, &targets, post_phase_shift);
        }
        Ok(())
    }

    // =========================================================================
    // Targets and phases
    // =========================================================================

    fn resolve_atoms(&self, refs: &[AtomRef]) -> KindResult<BTreeSet<String>> {
        refs.iter()
            .map(|r| match r {
                AtomRef::Id(id) if self.register.contains(id) => Ok(id.clone()),
                AtomRef::Id(id) => Err(BuildErrorKind::UnknownAtom(id.clone())),
                AtomRef::Index(i) => self.register.id_at(*i).map(str::to_string).ok_or_else(|| {
                    BuildErrorKind::UnknownAtom(format!(
                        "index {} (register has {} atoms)",
                        i,
                        self.register.len()
                    ))
                }),
            })
            .collect()
    }

    fn target(&mut self, name: &str, refs: &[AtomRef]) -> KindResult<()> {
        let atoms = self.resolve_atoms(refs)?;
        let ch = channel_mut(&mut self.channels, name)?;
        if ch.eom.is_on() {
            return Err(BuildErrorKind::EomModeActive(name.to_string()));
        }
        let max_targets = match ch.spec.addressing {
            Addressing::Global => {
                return Err(BuildErrorKind::InvalidTarget(format!(
                    "channel '{}' is global and always targets the whole register",
                    name
                )))
            }
            Addressing::Local { max_targets } => max_targets,
        };
        if atoms.is_empty() {
            return Err(BuildErrorKind::InvalidTarget(format!(
                "channel '{}' needs at least one target",
                name
            )));
        }
        if atoms.len() > max_targets {
            return Err(BuildErrorKind::InvalidTarget(format!(
                "channel '{}' can target at most {} atom(s), got {}",
                name,
                max_targets,
                atoms.len()
            )));
        }
        debug!(channel = name, targets = ?atoms, "Channel retargeted");
        ch.set_targets(atoms);
        Ok(())
    }

    fn phase_reference(&self, name: &str, basis: Basis, targets: &BTreeSet<String>) -> KindResult<f64> {
        let refs = self.phases.get(&basis);
        let mut values = targets
            .iter()
            .map(|a| refs.and_then(|m| m.get(a)).copied().unwrap_or(0.0));
        let first = values.next().unwrap_or(0.0);
        if values.any(|v| (v - first).abs() > PHASE_TOLERANCE) {
            return Err(BuildErrorKind::PhaseMismatch(format!(
                "targets of channel '{}' have different phase references in basis '{}'",
                name, basis
            )));
        }
        Ok(first)
    }

    fn shift_phases(&mut self, basis: Basis, atoms: &BTreeSet<String>, phi: f64) {
        let refs = self.phases.entry(basis).or_default();
        for atom in atoms {
            let value = refs.entry(atom.clone()).or_insert(0.0);
            *value = wrap_phase(*value + phi);
        }
    }

    fn phase_shift(&mut self, phi: f64, refs: &[AtomRef], basis: Basis) -> KindResult<()> {
        if !self.channels.values().any(|c| c.spec.basis() == basis) {
            return Err(BuildErrorKind::UnaddressedBasis(basis.to_string()));
        }
        let atoms = self.resolve_atoms(refs)?;
        if atoms.is_empty() {
            return Err(BuildErrorKind::InvalidTarget(
                "phase_shift needs at least one target".into(),
            ));
        }
        if wrap_phase(phi) == 0.0 {
            debug!(phi, "Phase shift is a multiple of 2π; ignored");
            return Ok(());
        }
        self.shift_phases(basis, &atoms, phi);
        debug!(phi, basis = %basis, targets = ?atoms, "Phase shifted");
        Ok(())
    }

    // =========================================================================
    // EOM mode
    // =========================================================================

    fn enable_eom(
        &mut self,
        name: &str,
        amp_on: f64,
        detuning_on: f64,
        optimal_detuning_off: f64,
    ) -> KindResult<()> {
        let provider = &self.options.eom;
        let ch = channel_mut(&mut self.channels, name)?;
        if ch.eom.is_on() {
            return Err(BuildErrorKind::EomModeActive(name.to_string()));
        }
        if ch.targets.is_none() {
            return Err(BuildErrorKind::UnresolvedTarget(name.to_string()));
        }
        if !(amp_on.is_finite() && amp_on > 0.0) || !detuning_on.is_finite() {
            return Err(BuildErrorKind::InvalidWaveformParams(format!(
                "EOM needs a positive amp_on and a finite detuning_on, got {} and {}",
                amp_on, detuning_on
            )));
        }
        let options = provider.detuning_off_options(amp_on, detuning_on);
        let detuning_off = select_detuning_off(&options, optimal_detuning_off)?;
        ch.eom = EomState::On {
            amp_on,
            detuning_on,
            detuning_off,
        };
        ch.eom_open_since = Some(ch.cursor);
        info!(
            channel = name,
            amp_on,
            detuning_on,
            detuning_off,
            start_ns = ch.cursor,
            "EOM mode enabled"
        );
        Ok(())
    }

    fn disable_eom(&mut self, name: &str) -> KindResult<()> {
        let ch = channel_mut(&mut self.channels, name)?;
        if !ch.eom.is_on() {
            return Err(BuildErrorKind::EomModeNotActive(name.to_string()));
        }
        ch.close_eom_interval();
        ch.eom = EomState::Off;
        info!(channel = name, end_ns = ch.cursor, "EOM mode disabled");
        Ok(())
    }

    fn finish(mut self, built: &BuiltSequence) -> ScheduledProgram {
        let total_duration_ns = self.channels.values().map(|c| c.cursor).max().unwrap_or(0);
        let channels = std::mem::take(&mut self.channels)
            .into_iter()
            .map(|(name, mut state)| {
                state.close_eom_interval();
                (name, ChannelProgram::from_state(state))
            })
            .collect();
        ScheduledProgram {
            atoms: built.register.ids().map(str::to_string).collect(),
            channels,
            phase_references: self.phases,
            total_duration_ns,
            extras: built.extras.clone(),
        }
    }
}
