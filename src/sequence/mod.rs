// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Parametrized sequences: documents, declarations, and the build step.
//!
//! A [`SequenceDocument`] is checked once into an immutable
//! [`SequenceTemplate`]. Each [`SequenceTemplate::build`] call binds a set
//! of variable values and yields a [`BuiltSequence`] whose operations carry
//! only concrete numbers.

pub mod build;
pub mod document;
pub mod operation;
pub mod variable;

pub use build::{BuiltSequence, ProgramExtras, SequenceTemplate};
pub use document::{Addressing, ChannelDecl, ChannelId, ChannelSpec, Line, SequenceDocument};
pub use operation::{AtomRef, Basis, Operation, OperationTemplate, Protocol, TargetSpec};
pub use variable::{VarKind, Variable, VariableDecl};
