// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! QubitOS Sequencer
//!
//! Parametrized pulse sequences for neutral-atom devices, and the scheduler
//! that places them on per-channel timelines.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        SequenceDocument (JSON/YAML)     │
//! ├─────────────────────────────────────────┤
//! │   SequenceTemplate  (checked, immutable)│
//! │        │  build(bindings)   ┌─────────┐ │
//! │        ▼                    │  sweep  │ │
//! │   BuiltSequence             │ (rayon) │ │
//! │        │  schedule(options) └─────────┘ │
//! │        ▼                                │
//! │   ScheduledProgram (segments, phases)   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`expr`]: Parametrized values and their evaluation
//! - [`waveform`]: Waveform kinds and sampling
//! - [`register`]: Atom registers
//! - [`sequence`]: Documents, templates and the build step
//! - [`schedule`]: Channel timelines, protocols and EOM mode
//! - [`sweep`]: Parallel builds over many binding sets
//! - [`config`]: Configuration management
//! - [`validation`]: Resource-limit checks
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use qubit_os_sequencer::{build_and_schedule, Bindings, Config, SequenceDocument};
//!
//! let doc = SequenceDocument::from_file("sequence.yaml")?;
//! let values = Bindings::new().with("t", vec![2.0, 3.0]);
//! let program = build_and_schedule(&doc, &values, &Config::default())?;
//! println!("{}", program.to_json(true)?);
//! # Ok::<(), qubit_os_sequencer::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod expr;
pub mod register;
pub mod schedule;
pub mod sequence;
pub mod sweep;
pub mod validation;
pub mod waveform;

pub use config::Config;
pub use error::{BuildError, BuildErrorKind, Error, Result};
pub use expr::{Bindings, Expr};
pub use register::Register;
pub use schedule::{build_and_schedule, ScheduleLimits, ScheduleOptions, ScheduledProgram};
pub use sequence::{BuiltSequence, SequenceDocument, SequenceTemplate};
pub use waveform::{SampleClock, Waveform};

#[cfg(test)]
pub mod test_utils;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
