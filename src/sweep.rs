// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Parameter sweeps: one template, many binding sets.
//!
//! A [`SequenceTemplate`] is immutable once checked, so builds for different
//! binding sets share it across rayon worker threads. Results keep the order
//! of the input bindings.

use rayon::prelude::*;
use tracing::debug;

use crate::config::Config;
use crate::error::{BuildError, Result};
use crate::expr::Bindings;
use crate::schedule::{check_program, ScheduleOptions, ScheduledProgram};
use crate::sequence::{BuiltSequence, SequenceTemplate};
use crate::validation::validate_batch_size;

/// Build `template` once per binding set, in parallel.
pub fn build_all(
    template: &SequenceTemplate,
    sweep: &[Bindings],
) -> Vec<std::result::Result<BuiltSequence, BuildError>> {
    debug!(builds = sweep.len(), "Building sweep");
    sweep.par_iter().map(|values| template.build(values)).collect()
}

/// Build, schedule and check `template` once per binding set, in parallel.
///
/// Every point goes through the same program checks as
/// [`build_and_schedule`](crate::schedule::build_and_schedule).
///
/// # Errors
///
/// Fails up front when the sweep is empty or larger than the configured
/// batch size, or when `config` describes no valid scheduling options.
/// Per-point failures are returned in place.
pub fn schedule_all(
    template: &SequenceTemplate,
    sweep: &[Bindings],
    config: &Config,
) -> Result<Vec<Result<ScheduledProgram>>> {
    validate_batch_size(sweep.len(), &config.validation.limits)?;
    let options = ScheduleOptions::from_config(config)?;
    debug!(points = sweep.len(), "Scheduling sweep");
    Ok(sweep
        .par_iter()
        .map(|values| -> Result<ScheduledProgram> {
            let program = template.build(values)?.schedule(&options)?;
            check_program(&program, config)?;
            Ok(program)
        })
        .collect())
}
