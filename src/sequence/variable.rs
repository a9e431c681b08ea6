// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Variable declarations.

use serde::{Deserialize, Serialize};

use crate::error::{BuildErrorKind, KindResult};
use crate::expr::Value;

/// Numeric kind of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarKind {
    Int,
    #[default]
    Float,
}

/// A variable as declared in a sequence document.
///
/// The array length comes from `value` when present, otherwise from `size`.
/// A declared `value` also serves as the default binding.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VariableDecl {
    #[serde(rename = "type", default)]
    pub kind: VarKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

/// A checked variable declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    pub len: usize,
    pub default: Option<Vec<f64>>,
}

impl Variable {
    /// Check a document declaration.
    pub fn from_decl(name: &str, decl: &VariableDecl) -> Result<Self, String> {
        let default = decl.value.clone().map(Value::into_vec);
        let len = match (&default, decl.size) {
            (Some(values), Some(size)) if values.len() != size => {
                return Err(format!(
                    "declared size {} but default value has {} element(s)",
                    size,
                    values.len()
                ))
            }
            (Some(values), _) => values.len(),
            (None, Some(size)) => size,
            (None, None) => return Err("needs either a default value or a size".into()),
        };
        if len == 0 {
            return Err("size must be at least 1".into());
        }
        let var = Self {
            name: name.to_string(),
            kind: decl.kind,
            len,
            default: None,
        };
        if let Some(values) = &default {
            var.check(values).map_err(|e| e.to_string())?;
        }
        Ok(Self { default, ..var })
    }

    /// Check that `values` is a valid assignment.
    pub fn check(&self, values: &[f64]) -> KindResult<()> {
        if values.len() != self.len {
            return Err(BuildErrorKind::VariableLengthMismatch {
                variable: self.name.clone(),
                expected: self.len,
                actual: values.len(),
            });
        }
        if let Some(bad) = values.iter().find(|x| !x.is_finite()) {
            return Err(BuildErrorKind::TypeMismatch(format!(
                "variable '{}' received non-finite value {}",
                self.name, bad
            )));
        }
        if self.kind == VarKind::Int {
            if let Some(bad) = values.iter().find(|x| x.fract() != 0.0) {
                return Err(BuildErrorKind::TypeMismatch(format!(
                    "int variable '{}' received non-integral value {}",
                    self.name, bad
                )));
            }
        }
        Ok(())
    }
}
