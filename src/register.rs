// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Atom register: the ordered, immutable set of addressable atom ids.
//!
//! A register comes in two forms:
//!
//! - **placed**: every atom has an `(x, y)` position (µm);
//! - **mappable**: atoms are bare qubit ids and positions are picked later
//!   from the trap `layout`.
//!
//! Scheduling only needs ids and their order, so both forms behave the same
//! downstream.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};

/// One register entry as written in a sequence document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AtomDecl {
    /// Atom with a fixed position.
    Placed { name: String, x: f64, y: f64 },
    /// Qubit id of a mappable register.
    Mappable { qid: String },
}

impl AtomDecl {
    fn id(&self) -> &str {
        match self {
            AtomDecl::Placed { name, .. } => name,
            AtomDecl::Mappable { qid } => qid,
        }
    }
}

/// Trap layout backing a mappable register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    /// Trap coordinates (µm).
    pub coordinates: Vec<[f64; 2]>,
}

/// An atom of the register.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Atom {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<[f64; 2]>,
}

/// Ordered set of atoms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Register {
    atoms: Vec<Atom>,
    #[serde(skip_serializing_if = "Option::is_none")]
    layout: Option<Layout>,
}

impl Register {
    /// Build a register from document entries.
    ///
    /// # Errors
    ///
    /// Rejects an empty register, duplicate ids, mixing placed and mappable
    /// entries, and a mappable register without a layout large enough to
    /// hold it.
    pub fn from_decls(decls: &[AtomDecl], layout: Option<Layout>) -> Result<Self> {
        if decls.is_empty() {
            return Err(field_error("register", "must contain at least one atom"));
        }

        let mut seen = BTreeSet::new();
        for decl in decls {
            if !seen.insert(decl.id()) {
                return Err(field_error(
                    "register",
                    format!("duplicate atom id '{}'", decl.id()),
                ));
            }
        }

        let mappable = decls
            .iter()
            .filter(|d| matches!(d, AtomDecl::Mappable { .. }))
            .count();
        if mappable != 0 && mappable != decls.len() {
            return Err(field_error(
                "register",
                "cannot mix positioned atoms and bare qubit ids",
            ));
        }

        if mappable > 0 {
            let traps = layout.as_ref().map_or(0, |l| l.coordinates.len());
            if layout.is_none() {
                return Err(field_error("layout", "a mappable register needs a trap layout"));
            }
            if traps < decls.len() {
                return Err(field_error(
                    "layout",
                    format!("{} traps cannot hold {} qubits", traps, decls.len()),
                ));
            }
        }

        let atoms = decls
            .iter()
            .map(|d| match d {
                AtomDecl::Placed { name, x, y } => Atom {
                    id: name.clone(),
                    position: Some([*x, *y]),
                },
                AtomDecl::Mappable { qid } => Atom {
                    id: qid.clone(),
                    position: None,
                },
            })
            .collect();

        Ok(Self { atoms, layout })
    }

    /// Register of unplaced atoms, in the given order.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            atoms: ids
                .into_iter()
                .map(|id| Atom {
                    id: id.into(),
                    position: None,
                })
                .collect(),
            layout: None,
        }
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Atom ids in register order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.atoms.iter().map(|a| a.id.as_str())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.atoms.iter().any(|a| a.id == id)
    }

    /// Id of the atom at `index`, if in range.
    pub fn id_at(&self, index: i64) -> Option<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.atoms.get(i))
            .map(|a| a.id.as_str())
    }

    /// Whether positions are deferred to a layout.
    pub fn is_mappable(&self) -> bool {
        self.layout.is_some() && self.atoms.iter().all(|a| a.position.is_none())
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }
}

fn field_error(field: &str, message: impl Into<String>) -> crate::error::Error {
    ValidationError::Field {
        field: field.into(),
        message: message.into(),
    }
    .into()
}
