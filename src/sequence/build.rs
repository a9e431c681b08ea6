// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Binding variable values into a sequence template.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info};

use super::document::{ChannelSpec, SequenceDocument};
use super::operation::{Basis, Operation, OperationTemplate};
use super::variable::Variable;
use crate::error::{BuildError, BuildErrorKind, Result, ValidationError};
use crate::expr::Bindings;
use crate::register::Register;

/// A checked, immutable sequence with unresolved parameters.
///
/// Templates are `Sync`: any number of [`build`](SequenceTemplate::build)
/// calls may run against the same template concurrently.
#[derive(Debug, Clone)]
pub struct SequenceTemplate {
    register: Register,
    channels: BTreeMap<String, ChannelSpec>,
    variables: BTreeMap<String, Variable>,
    operations: Vec<OperationTemplate>,
    extras: ProgramExtras,
}

/// Document fields carried through to the scheduled program untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgramExtras {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_basis: Option<Basis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub magnetic_field: Option<[f64; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slm_mask_targets: Option<Vec<String>>,
}

/// A sequence with every parameter resolved, ready to schedule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuiltSequence {
    pub register: Register,
    #[serde(skip)]
    pub channels: BTreeMap<String, ChannelSpec>,
    pub operations: Vec<Operation>,
    pub bindings: Bindings,
    #[serde(flatten)]
    pub extras: ProgramExtras,
}

fn field_error(field: impl Into<String>, message: impl Into<String>) -> crate::error::Error {
    ValidationError::Field {
        field: field.into(),
        message: message.into(),
    }
    .into()
}

impl SequenceTemplate {
    /// Check a document with the default local-channel target limit of 1.
    pub fn from_document(doc: &SequenceDocument) -> Result<Self> {
        Self::from_document_with(doc, 1)
    }

    /// Check a document.
    ///
    /// # Errors
    ///
    /// - invalid register, channel or variable declarations (`Validation`)
    /// - an operation naming an undeclared channel (`UnknownChannel`) or an
    ///   undeclared variable (`UnboundVariable`), with its position
    pub fn from_document_with(doc: &SequenceDocument, default_max_targets: usize) -> Result<Self> {
        let register = Register::from_decls(&doc.register, doc.layout.clone())?;

        let mut channels = BTreeMap::new();
        for (name, decl) in &doc.channels {
            let spec = ChannelSpec::from_decl(decl, default_max_targets)
                .map_err(|msg| field_error(format!("channels.{}", name), msg))?;
            if let Some(unknown) = spec
                .initial_target
                .iter()
                .flatten()
                .find(|id| !register.contains(id))
            {
                return Err(field_error(
                    format!("channels.{}", name),
                    format!("initial_target '{}' is not in the register", unknown),
                ));
            }
            channels.insert(name.clone(), spec);
        }

        let mut variables = BTreeMap::new();
        for (name, decl) in &doc.variables {
            let var = Variable::from_decl(name, decl)
                .map_err(|msg| field_error(format!("variables.{}", name), msg))?;
            variables.insert(name.clone(), var);
        }

        for (pos, op) in doc.operations.iter().enumerate() {
            if let Some(unknown) = op.channels().into_iter().find(|c| !channels.contains_key(*c)) {
                return Err(BuildError::at(pos, BuildErrorKind::UnknownChannel(unknown.into())).into());
            }
            let mut names = BTreeSet::new();
            op.collect_variables(&mut names);
            if let Some(unbound) = names.into_iter().find(|n| !variables.contains_key(n)) {
                return Err(BuildError::at(pos, BuildErrorKind::UnboundVariable(unbound)).into());
            }
        }

        if let Some(basis) = doc.measurement {
            if !channels.values().any(|c| c.basis() == basis) {
                return Err(field_error(
                    "measurement",
                    format!("no declared channel addresses basis '{}'", basis),
                ));
            }
        }

        if let Some(mask) = &doc.slm_mask_targets {
            if register.is_mappable() {
                return Err(field_error(
                    "slm_mask_targets",
                    "an SLM mask cannot be combined with a mappable register",
                ));
            }
            if let Some(unknown) = mask.iter().find(|id| !register.contains(id)) {
                return Err(field_error(
                    "slm_mask_targets",
                    format!("'{}' is not in the register", unknown),
                ));
            }
        }

        debug!(
            atoms = register.len(),
            channels = channels.len(),
            variables = variables.len(),
            operations = doc.operations.len(),
            "Sequence template checked"
        );

        Ok(Self {
            register,
            channels,
            variables,
            operations: doc.operations.clone(),
            extras: ProgramExtras {
                device: doc.device.clone(),
                measurement_basis: doc.measurement,
                magnetic_field: doc.magnetic_field,
                slm_mask_targets: doc.slm_mask_targets.clone(),
            },
        })
    }

    pub fn register(&self) -> &Register {
        &self.register
    }

    pub fn channels(&self) -> &BTreeMap<String, ChannelSpec> {
        &self.channels
    }

    pub fn variables(&self) -> &BTreeMap<String, Variable> {
        &self.variables
    }

    pub fn operations(&self) -> &[OperationTemplate] {
        &self.operations
    }

    /// True when any operation depends on a variable.
    pub fn is_parametrized(&self) -> bool {
        !self.variables.is_empty()
    }

    /// Complete `values` with declared defaults and check every assignment.
    pub fn bind(&self, values: &Bindings) -> std::result::Result<Bindings, BuildError> {
        if let Some((name, _)) = values.iter().find(|(n, _)| !self.variables.contains_key(*n)) {
            return Err(BuildErrorKind::UnknownVariable(name.to_string()).into());
        }
        let mut bound = Bindings::new();
        for (name, var) in &self.variables {
            let assigned = match values.get(name) {
                Some(v) => v,
                None => var
                    .default
                    .as_deref()
                    .ok_or_else(|| BuildErrorKind::MissingBinding(name.clone()))?,
            };
            var.check(assigned)?;
            bound.insert(name.clone(), assigned.to_vec());
        }
        Ok(bound)
    }

    /// Resolve every operation against `values`.
    ///
    /// The template is left untouched; repeated builds with the same values
    /// give identical results.
    pub fn build(&self, values: &Bindings) -> std::result::Result<BuiltSequence, BuildError> {
        let bindings = self.bind(values)?;
        let operations = self
            .operations
            .iter()
            .enumerate()
            .map(|(pos, op)| op.resolve(&bindings).map_err(|kind| BuildError::at(pos, kind)))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        info!(
            operations = operations.len(),
            variables = bindings.len(),
            "Sequence built"
        );

        Ok(BuiltSequence {
            register: self.register.clone(),
            channels: self.channels.clone(),
            operations,
            bindings,
            extras: self.extras.clone(),
        })
    }
}
