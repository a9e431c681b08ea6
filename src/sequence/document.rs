// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Sequence documents (JSON or YAML) and channel declarations.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::operation::{Basis, OperationTemplate};
use super::variable::VariableDecl;
use crate::error::{Error, Result};
use crate::register::{AtomDecl, Layout};

/// Whether a channel addresses chosen atoms or the whole register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "addressing", rename_all = "snake_case")]
pub enum Addressing {
    Global,
    Local { max_targets: usize },
}

/// Hardware line of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    Rydberg,
    Raman,
    Microwave,
}

impl Line {
    /// Basis driven by this line.
    pub fn basis(&self) -> Basis {
        match self {
            Line::Rydberg => Basis::GroundRydberg,
            Line::Raman => Basis::Digital,
            Line::Microwave => Basis::XY,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Line::Rydberg => "rydberg",
            Line::Raman => "raman",
            Line::Microwave => "mw",
        }
    }
}

/// Parsed hardware channel id such as `rydberg_global` or `raman_local`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelId {
    pub line: Line,
    pub local: bool,
}

impl FromStr for ChannelId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (line, addressing) = s
            .rsplit_once('_')
            .ok_or_else(|| format!("channel id '{}' is not of the form <line>_<addressing>", s))?;
        let line = match line {
            "rydberg" => Line::Rydberg,
            "raman" => Line::Raman,
            "mw" => Line::Microwave,
            other => return Err(format!("unknown channel line '{}' in '{}'", other, s)),
        };
        let local = match addressing {
            "local" => true,
            "global" => false,
            other => return Err(format!("unknown addressing '{}' in '{}'", other, s)),
        };
        Ok(Self { line, local })
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}",
            self.line.name(),
            if self.local { "local" } else { "global" }
        )
    }
}

/// A channel declaration: a bare hardware id or a detailed form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelDecl {
    Id(String),
    Detailed {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_targets: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        initial_target: Option<InitialTarget>,
    },
}

/// Initial target of a local channel: one id or several.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitialTarget {
    One(String),
    Many(Vec<String>),
}

impl InitialTarget {
    pub fn ids(&self) -> Vec<String> {
        match self {
            InitialTarget::One(id) => vec![id.clone()],
            InitialTarget::Many(ids) => ids.clone(),
        }
    }
}

/// A checked channel declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpec {
    pub id: ChannelId,
    pub addressing: Addressing,
    pub initial_target: Option<Vec<String>>,
}

impl ChannelSpec {
    /// Check a declaration; `default_max_targets` applies to local channels
    /// that do not set their own limit.
    pub fn from_decl(
        decl: &ChannelDecl,
        default_max_targets: usize,
    ) -> std::result::Result<Self, String> {
        let (id, max_targets, initial_target) = match decl {
            ChannelDecl::Id(id) => (id, None, None),
            ChannelDecl::Detailed {
                id,
                max_targets,
                initial_target,
            } => (id, *max_targets, initial_target.as_ref().map(InitialTarget::ids)),
        };
        let id: ChannelId = id.parse()?;
        if !id.local {
            if max_targets.is_some() || initial_target.is_some() {
                return Err(format!(
                    "global channel '{}' takes no max_targets or initial_target",
                    id
                ));
            }
            return Ok(Self {
                id,
                addressing: Addressing::Global,
                initial_target: None,
            });
        }
        let max_targets = max_targets.unwrap_or(default_max_targets);
        if max_targets == 0 {
            return Err("max_targets must be at least 1".into());
        }
        if let Some(targets) = &initial_target {
            if targets.is_empty() || targets.len() > max_targets {
                return Err(format!(
                    "initial_target names {} atom(s), allowed 1..={}",
                    targets.len(),
                    max_targets
                ));
            }
        }
        Ok(Self {
            id,
            addressing: Addressing::Local { max_targets },
            initial_target,
        })
    }

    pub fn basis(&self) -> Basis {
        self.id.line.basis()
    }

    pub fn is_local(&self) -> bool {
        self.id.local
    }
}

/// A parametrized sequence as read from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceDocument {
    /// Informational device name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub register: Vec<AtomDecl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
    pub channels: BTreeMap<String, ChannelDecl>,
    #[serde(default)]
    pub variables: BTreeMap<String, VariableDecl>,
    #[serde(default)]
    pub operations: Vec<OperationTemplate>,
    /// Basis measured at the end of the sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement: Option<Basis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnetic_field: Option<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slm_mask_targets: Option<Vec<String>>,
}

impl SequenceDocument {
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_yaml(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Load from a file; `.json` files are parsed as JSON, anything else as YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        debug!(path = %path.display(), json = is_json, "Loading sequence document");
        if is_json {
            Self::from_json(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Error::from)
    }
}
