// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Channel timeline scheduling.
//!
//! Turns a [`BuiltSequence`] into a [`ScheduledProgram`]: every pulse gets a
//! start time on its channel, local channels track their targets, phase
//! references accumulate per atom and basis, and channels may enter EOM
//! mode.

pub mod channel;
pub mod eom;
pub mod program;
mod scheduler;

use std::sync::Arc;

use tracing::{info, warn};

pub use channel::{ChannelState, Segment};
pub use eom::{
    select_detuning_off, DetuningOffOptions, EomInterval, EomState, FixedDetuningOffs,
    RydbergBeam, RydbergEom,
};
pub use program::{ChannelProgram, ScheduledProgram};
pub use scheduler::schedule;

use crate::config::{Config, EomConfig, ResourceLimits};
use crate::error::{BuildErrorKind, Error, KindResult, Result, ValidationError};
use crate::expr::Bindings;
use crate::sequence::{BuiltSequence, SequenceDocument, SequenceTemplate};
use crate::validation::{validate_document, validate_program};
use crate::waveform::SampleClock;

/// Bounds enforced while placing segments, before any samples are allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleLimits {
    pub max_samples_per_waveform: usize,
    pub max_total_duration_ns: u64,
}

impl Default for ScheduleLimits {
    fn default() -> Self {
        Self::from(&ResourceLimits::default())
    }
}

impl From<&ResourceLimits> for ScheduleLimits {
    fn from(limits: &ResourceLimits) -> Self {
        Self {
            max_samples_per_waveform: limits.max_samples_per_waveform as usize,
            max_total_duration_ns: limits.max_total_duration_ns,
        }
    }
}

impl ScheduleLimits {
    /// Reject a segment of `n` samples on `channel`.
    pub fn check_samples(&self, channel: &str, n: usize) -> KindResult<()> {
        if n > self.max_samples_per_waveform {
            return Err(BuildErrorKind::LimitExceeded {
                resource: format!("samples per waveform on '{}'", channel),
                limit: self.max_samples_per_waveform as u64,
                requested: n as u64,
            });
        }
        Ok(())
    }

    /// End of a span starting at `start_ns` on `channel`.
    ///
    /// Overflow is reported with `requested == u64::MAX`.
    pub fn end_time(&self, channel: &str, start_ns: u64, duration_ns: u64) -> KindResult<u64> {
        let end = start_ns.checked_add(duration_ns).unwrap_or(u64::MAX);
        if end == u64::MAX || end > self.max_total_duration_ns {
            return Err(BuildErrorKind::LimitExceeded {
                resource: format!("timeline of channel '{}'", channel),
                limit: self.max_total_duration_ns,
                requested: end,
            });
        }
        Ok(end)
    }
}

/// Settings shared by every scheduling run.
#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    pub clock: SampleClock,
    /// Permitted EOM off-detunings.
    pub eom: Arc<dyn DetuningOffOptions>,
    pub limits: ScheduleLimits,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            clock: SampleClock::default(),
            eom: Arc::new(FixedDetuningOffs(vec![0.0])),
            limits: ScheduleLimits::default(),
        }
    }
}

impl ScheduleOptions {
    /// Options described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let clock = SampleClock::new(config.sampling.samples_per_ns).map_err(Error::Config)?;
        let eom: Arc<dyn DetuningOffOptions> = match &config.eom {
            EomConfig::Fixed { detunings_off } => {
                Arc::new(FixedDetuningOffs(detunings_off.clone()))
            }
            EomConfig::Rydberg(model) => Arc::new(model.clone()),
        };
        Ok(Self {
            clock,
            eom,
            limits: ScheduleLimits::from(&config.validation.limits),
        })
    }

    pub fn with_clock(mut self, clock: SampleClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_eom(mut self, eom: impl DetuningOffOptions + 'static) -> Self {
        self.eom = Arc::new(eom);
        self
    }

    pub fn with_limits(mut self, limits: ScheduleLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Check, build and schedule a document in one go.
///
/// Applies the resource limits of `config` to both the document and the
/// resulting program. With strict validation, timeline conflicts reported by
/// [`ScheduledProgram::validate`] are an error; otherwise they are logged.
pub fn build_and_schedule(
    doc: &SequenceDocument,
    values: &Bindings,
    config: &Config,
) -> Result<ScheduledProgram> {
    validate_document(doc, &config.validation.limits)?;

    let template = SequenceTemplate::from_document_with(doc, config.scheduler.default_max_targets)?;
    let built: BuiltSequence = template.build(values)?;
    let options = ScheduleOptions::from_config(config)?;
    let program = built.schedule(&options)?;
    check_program(&program, config)?;

    info!(
        duration_ns = program.total_duration_ns,
        segments = program.segment_count(),
        "Sequence scheduled"
    );
    Ok(program)
}

/// Checks applied to every scheduled program: the resource limits of
/// `config`, then the timeline conflicts of [`ScheduledProgram::validate`],
/// which fail only under strict validation.
pub fn check_program(program: &ScheduledProgram, config: &Config) -> Result<()> {
    validate_program(program, &config.validation.limits)?;

    let issues = program.validate();
    if issues.is_empty() {
        return Ok(());
    }
    if config.validation.strict {
        return Err(ValidationError::Field {
            field: "timeline".into(),
            message: issues.join("; "),
        }
        .into());
    }
    for issue in &issues {
        warn!(issue = %issue, "Timeline check");
    }
    Ok(())
}
