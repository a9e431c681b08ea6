// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Sequence operations, in parametrized ([`OperationTemplate`]) and
//! resolved ([`Operation`]) form.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::KindResult;
use crate::expr::{eval_int, eval_int_array, eval_scalar, Bindings, Expr};
use crate::waveform::{Waveform, WaveformTemplate};

/// How a pulse start time is chosen relative to other channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// Earliest start that overlaps nothing touching the same atoms.
    #[default]
    MinDelay,
    /// Start at the channel cursor, ignoring every other channel.
    NoDelay,
    /// Start once every channel touching the same atoms is idle.
    WaitForAll,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::MinDelay => "min-delay",
            Protocol::NoDelay => "no-delay",
            Protocol::WaitForAll => "wait-for-all",
        })
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "min-delay" => Ok(Protocol::MinDelay),
            "no-delay" => Ok(Protocol::NoDelay),
            "wait-for-all" => Ok(Protocol::WaitForAll),
            other => Err(format!(
                "unknown protocol '{}' (expected min-delay, no-delay or wait-for-all)",
                other
            )),
        }
    }
}

/// Pair of levels a channel drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Basis {
    #[serde(rename = "ground-rydberg")]
    GroundRydberg,
    #[default]
    #[serde(rename = "digital")]
    Digital,
    #[serde(rename = "XY")]
    XY,
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Basis::GroundRydberg => "ground-rydberg",
            Basis::Digital => "digital",
            Basis::XY => "XY",
        })
    }
}

/// Reference to an atom, by id or by register index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AtomRef {
    Id(String),
    Index(i64),
}

impl fmt::Display for AtomRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomRef::Id(id) => write!(f, "{}", id),
            AtomRef::Index(i) => write!(f, "#{}", i),
        }
    }
}

/// Target list as written in a document: one id, several ids, or an
/// integer expression giving register indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    Id(String),
    Ids(Vec<String>),
    Indices(Expr),
}

impl TargetSpec {
    fn resolve(&self, bindings: &Bindings) -> KindResult<Vec<AtomRef>> {
        Ok(match self {
            TargetSpec::Id(id) => vec![AtomRef::Id(id.clone())],
            TargetSpec::Ids(ids) => ids.iter().cloned().map(AtomRef::Id).collect(),
            TargetSpec::Indices(expr) => eval_int_array(expr, bindings, "target index")?
                .into_iter()
                .map(AtomRef::Index)
                .collect(),
        })
    }

    fn collect_variables(&self, out: &mut BTreeSet<String>) {
        if let TargetSpec::Indices(expr) = self {
            expr.collect_variables(out);
        }
    }
}

/// A fully resolved operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Align {
        channels: Vec<String>,
    },
    Delay {
        channel: String,
        time: i64,
    },
    Target {
        channel: String,
        targets: Vec<AtomRef>,
    },
    Pulse {
        channel: String,
        amplitude: Waveform,
        detuning: Waveform,
        phase: f64,
        post_phase_shift: f64,
        protocol: Protocol,
    },
    PhaseShift {
        phi: f64,
        targets: Vec<AtomRef>,
        basis: Basis,
    },
    EnableEomMode {
        channel: String,
        amp_on: f64,
        detuning_on: f64,
        optimal_detuning_off: f64,
    },
    DisableEomMode {
        channel: String,
    },
    AddEomPulse {
        channel: String,
        duration: i64,
        phase: f64,
        post_phase_shift: f64,
        protocol: Protocol,
    },
}

impl Operation {
    /// Operation name as used in documents.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Align { .. } => "align",
            Operation::Delay { .. } => "delay",
            Operation::Target { .. } => "target",
            Operation::Pulse { .. } => "pulse",
            Operation::PhaseShift { .. } => "phase_shift",
            Operation::EnableEomMode { .. } => "enable_eom_mode",
            Operation::DisableEomMode { .. } => "disable_eom_mode",
            Operation::AddEomPulse { .. } => "add_eom_pulse",
        }
    }
}

/// A parametrized operation as written in a sequence document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperationTemplate {
    Align {
        channels: Vec<String>,
    },
    Delay {
        channel: String,
        time: Expr,
    },
    Target {
        channel: String,
        target: TargetSpec,
    },
    Pulse {
        channel: String,
        amplitude: WaveformTemplate,
        detuning: WaveformTemplate,
        #[serde(default)]
        phase: Expr,
        #[serde(default)]
        post_phase_shift: Expr,
        #[serde(default)]
        protocol: Protocol,
    },
    PhaseShift {
        phi: Expr,
        targets: TargetSpec,
        #[serde(default)]
        basis: Basis,
    },
    EnableEomMode {
        channel: String,
        amp_on: Expr,
        detuning_on: Expr,
        #[serde(default)]
        optimal_detuning_off: Expr,
    },
    DisableEomMode {
        channel: String,
    },
    AddEomPulse {
        channel: String,
        duration: Expr,
        #[serde(default)]
        phase: Expr,
        #[serde(default)]
        post_phase_shift: Expr,
        #[serde(default)]
        protocol: Protocol,
    },
}

impl OperationTemplate {
    /// Channels this operation names.
    pub fn channels(&self) -> Vec<&str> {
        match self {
            OperationTemplate::Align { channels } => channels.iter().map(String::as_str).collect(),
            OperationTemplate::PhaseShift { .. } => Vec::new(),
            OperationTemplate::Delay { channel, .. }
            | OperationTemplate::Target { channel, .. }
            | OperationTemplate::Pulse { channel, .. }
            | OperationTemplate::EnableEomMode { channel, .. }
            | OperationTemplate::DisableEomMode { channel }
            | OperationTemplate::AddEomPulse { channel, .. } => vec![channel.as_str()],
        }
    }

    /// Add the names of all variables this operation references to `out`.
    pub fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            OperationTemplate::Align { .. } | OperationTemplate::DisableEomMode { .. } => {}
            OperationTemplate::Delay { time, .. } => time.collect_variables(out),
            OperationTemplate::Target { target, .. } => target.collect_variables(out),
            OperationTemplate::Pulse {
                amplitude,
                detuning,
                phase,
                post_phase_shift,
                ..
            } => {
                amplitude.collect_variables(out);
                detuning.collect_variables(out);
                phase.collect_variables(out);
                post_phase_shift.collect_variables(out);
            }
            OperationTemplate::PhaseShift { phi, targets, .. } => {
                phi.collect_variables(out);
                targets.collect_variables(out);
            }
            OperationTemplate::EnableEomMode {
                amp_on,
                detuning_on,
                optimal_detuning_off,
                ..
            } => {
                amp_on.collect_variables(out);
                detuning_on.collect_variables(out);
                optimal_detuning_off.collect_variables(out);
            }
            OperationTemplate::AddEomPulse {
                duration,
                phase,
                post_phase_shift,
                ..
            } => {
                duration.collect_variables(out);
                phase.collect_variables(out);
                post_phase_shift.collect_variables(out);
            }
        }
    }

    /// Evaluate every parametrized field against `bindings`.
    pub fn resolve(&self, bindings: &Bindings) -> KindResult<Operation> {
        Ok(match self {
            OperationTemplate::Align { channels } => Operation::Align {
                channels: channels.clone(),
            },
            OperationTemplate::Delay { channel, time } => Operation::Delay {
                channel: channel.clone(),
                time: eval_int(time, bindings, "delay time")?,
            },
            OperationTemplate::Target { channel, target } => Operation::Target {
                channel: channel.clone(),
                targets: target.resolve(bindings)?,
            },
            OperationTemplate::Pulse {
                channel,
                amplitude,
                detuning,
                phase,
                post_phase_shift,
                protocol,
            } => Operation::Pulse {
                channel: channel.clone(),
                amplitude: amplitude.resolve(bindings)?,
                detuning: detuning.resolve(bindings)?,
                phase: eval_scalar(phase, bindings, "pulse phase")?,
                post_phase_shift: eval_scalar(post_phase_shift, bindings, "post_phase_shift")?,
                protocol: *protocol,
            },
            OperationTemplate::PhaseShift {
                phi,
                targets,
                basis,
            } => Operation::PhaseShift {
                phi: eval_scalar(phi, bindings, "phase shift")?,
                targets: targets.resolve(bindings)?,
                basis: *basis,
            },
            OperationTemplate::EnableEomMode {
                channel,
                amp_on,
                detuning_on,
                optimal_detuning_off,
            } => Operation::EnableEomMode {
                channel: channel.clone(),
                amp_on: eval_scalar(amp_on, bindings, "amp_on")?,
                detuning_on: eval_scalar(detuning_on, bindings, "detuning_on")?,
                optimal_detuning_off: eval_scalar(
                    optimal_detuning_off,
                    bindings,
                    "optimal_detuning_off",
                )?,
            },
            OperationTemplate::DisableEomMode { channel } => Operation::DisableEomMode {
                channel: channel.clone(),
            },
            OperationTemplate::AddEomPulse {
                channel,
                duration,
                phase,
                post_phase_shift,
                protocol,
            } => Operation::AddEomPulse {
                channel: channel.clone(),
                duration: eval_int(duration, bindings, "EOM pulse duration")?,
                phase: eval_scalar(phase, bindings, "EOM pulse phase")?,
                post_phase_shift: eval_scalar(post_phase_shift, bindings, "post_phase_shift")?,
                protocol: *protocol,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_defaults() {
        let json = r#"{
            "op": "pulse",
            "channel": "ryd",
            "amplitude": {"kind": "constant", "duration": 100, "value": 1},
            "detuning": {"kind": "constant", "duration": 100, "value": 0}
        }"#;
        let op: OperationTemplate = serde_json::from_str(json).unwrap();
        match op.resolve(&Bindings::new()).unwrap() {
            Operation::Pulse {
                phase,
                post_phase_shift,
                protocol,
                ..
            } => {
                assert_eq!(phase, 0.0);
                assert_eq!(post_phase_shift, 0.0);
                assert_eq!(protocol, Protocol::MinDelay);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_target_forms() {
        let by_id: OperationTemplate =
            serde_json::from_str(r#"{"op": "target", "channel": "c", "target": "q0"}"#).unwrap();
        let by_ids: OperationTemplate =
            serde_json::from_str(r#"{"op": "target", "channel": "c", "target": ["q0", "q1"]}"#)
                .unwrap();
        let by_index: OperationTemplate = serde_json::from_str(
            r#"{"op": "target", "channel": "c",
                "target": {"expression": "add", "lhs": {"variable": "idx"}, "rhs": 1}}"#,
        )
        .unwrap();

        let b = Bindings::new().with("idx", vec![0.0, 2.0]);
        assert_eq!(
            by_id.resolve(&b).unwrap(),
            Operation::Target {
                channel: "c".into(),
                targets: vec![AtomRef::Id("q0".into())]
            }
        );
        match by_ids.resolve(&b).unwrap() {
            Operation::Target { targets, .. } => assert_eq!(targets.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            by_index.resolve(&b).unwrap(),
            Operation::Target {
                channel: "c".into(),
                targets: vec![AtomRef::Index(1), AtomRef::Index(3)]
            }
        );
    }

    #[test]
    fn test_protocol_and_basis_names() {
        let p: Protocol = serde_json::from_str(r#""wait-for-all""#).unwrap();
        assert_eq!(p, Protocol::WaitForAll);
        assert_eq!("no-delay".parse::<Protocol>().unwrap(), Protocol::NoDelay);
        assert!("fastest".parse::<Protocol>().is_err());

        let b: Basis = serde_json::from_str(r#""ground-rydberg""#).unwrap();
        assert_eq!(b, Basis::GroundRydberg);
        assert_eq!(Basis::XY.to_string(), "XY");
        assert_eq!(Basis::default(), Basis::Digital);
    }

    #[test]
    fn test_collect_variables() {
        let json = r#"{
            "op": "add_eom_pulse",
            "channel": "ryd",
            "duration": {"variable": "t"},
            "phase": {"expression": "mul", "lhs": {"variable": "phi"}, "rhs": 2}
        }"#;
        let op: OperationTemplate = serde_json::from_str(json).unwrap();
        let mut names = BTreeSet::new();
        op.collect_variables(&mut names);
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["phi", "t"]);
        assert_eq!(op.channels(), vec!["ryd"]);
    }

    #[test]
    fn test_unknown_op_rejected() {
        let res: Result<OperationTemplate, _> =
            serde_json::from_str(r#"{"op": "teleport", "channel": "c"}"#);
        assert!(res.is_err());
    }
}
