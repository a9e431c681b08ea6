// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Resource-limit and sample checks for documents and scheduled programs.

use crate::config::ResourceLimits;
use crate::error::{Result, ValidationError};
use crate::schedule::ScheduledProgram;
use crate::sequence::SequenceDocument;

/// Validate the size of a sequence document before it is built.
pub fn validate_document(doc: &SequenceDocument, limits: &ResourceLimits) -> Result<()> {
    if doc.operations.len() > limits.max_operations as usize {
        return Err(ValidationError::ResourceLimit {
            resource: "operations".into(),
            limit: limits.max_operations as u64,
            requested: doc.operations.len() as u64,
        }
        .into());
    }

    if doc.register.len() > limits.max_register_size as usize {
        return Err(ValidationError::ResourceLimit {
            resource: "register_size".into(),
            limit: limits.max_register_size as u64,
            requested: doc.register.len() as u64,
        }
        .into());
    }

    Ok(())
}

/// Validate a scheduled program against `limits`.
///
/// Every sample must be finite, and no segment may exceed the per-waveform
/// sample limit.
pub fn validate_program(program: &ScheduledProgram, limits: &ResourceLimits) -> Result<()> {
    if program.total_duration_ns > limits.max_total_duration_ns {
        return Err(ValidationError::ResourceLimit {
            resource: "total_duration_ns".into(),
            limit: limits.max_total_duration_ns,
            requested: program.total_duration_ns,
        }
        .into());
    }

    for (name, channel) in &program.channels {
        for (k, segment) in channel.segments.iter().enumerate() {
            let n = segment.amplitude.len();
            if n > limits.max_samples_per_waveform as usize {
                return Err(ValidationError::ResourceLimit {
                    resource: format!("{}.segments[{}].samples", name, k),
                    limit: limits.max_samples_per_waveform as u64,
                    requested: n as u64,
                }
                .into());
            }
            check_finite(&format!("{}.segments[{}].amplitude", name, k), &segment.amplitude)?;
            check_finite(&format!("{}.segments[{}].detuning", name, k), &segment.detuning)?;
        }
    }

    Ok(())
}

fn check_finite(field: &str, samples: &[f64]) -> Result<()> {
    for (i, val) in samples.iter().enumerate() {
        if val.is_nan() {
            return Err(ValidationError::Field {
                field: field.into(),
                message: format!("contains NaN at index {}", i),
            }
            .into());
        }
        if val.is_infinite() {
            return Err(ValidationError::Field {
                field: field.into(),
                message: format!("contains Inf at index {}", i),
            }
            .into());
        }
    }
    Ok(())
}

/// Validate the number of binding sets in a sweep.
pub fn validate_batch_size(batch_size: usize, limits: &ResourceLimits) -> Result<()> {
    if batch_size == 0 {
        return Err(ValidationError::Field {
            field: "bindings".into(),
            message: "sweep cannot be empty".into(),
        }
        .into());
    }

    if batch_size > limits.max_batch_size as usize {
        return Err(ValidationError::ResourceLimit {
            resource: "batch_size".into(),
            limit: limits.max_batch_size as u64,
            requested: batch_size as u64,
        }
        .into());
    }

    Ok(())
}
