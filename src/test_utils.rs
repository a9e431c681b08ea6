// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures for sequencer tests.

use crate::expr::Bindings;
use crate::sequence::{BuiltSequence, SequenceDocument, SequenceTemplate};

/// Three-atom document with one global channel and a defaulted variable.
pub fn sample_document_json() -> &'static str {
    r#"{
        "device": "test-device",
        "register": [
            {"name": "q0", "x": 0.0, "y": 0.0},
            {"name": "q1", "x": 5.0, "y": 0.0},
            {"name": "q2", "x": 0.0, "y": 5.0}
        ],
        "channels": {"ryd": "rydberg_global"},
        "variables": {
            "t": {"type": "int", "size": 2, "value": [2, 3]}
        },
        "operations": [
            {
                "op": "pulse",
                "channel": "ryd",
                "amplitude": {
                    "kind": "blackman",
                    "duration": {"expression": "mul", "lhs": {"expression": "index", "lhs": {"variable": "t"}, "rhs": 0}, "rhs": 100},
                    "area": 3.14159
                },
                "detuning": {
                    "kind": "constant",
                    "duration": {"expression": "mul", "lhs": {"expression": "index", "lhs": {"variable": "t"}, "rhs": 0}, "rhs": 100},
                    "value": 0.0
                }
            },
            {"op": "delay", "channel": "ryd", "time": 20}
        ],
        "measurement": "ground-rydberg"
    }"#
}

pub fn sample_document() -> SequenceDocument {
    SequenceDocument::from_json(sample_document_json()).expect("sample document parses")
}

fn constant_pulse(index: usize) -> serde_json::Value {
    let duration = serde_json::json!({
        "expression": "mul",
        "lhs": {"expression": "index", "lhs": {"variable": "t"}, "rhs": index},
        "rhs": 1000
    });
    serde_json::json!({
        "op": "pulse",
        "channel": "ryd",
        "amplitude": {"kind": "constant", "duration": duration, "value": 1.0},
        "detuning": {"kind": "constant", "duration": duration, "value": 0.0}
    })
}

/// Two constant pulses on `ryd` lasting `t[0]` and `t[1]` µs; `t` defaults
/// to zero.
pub fn two_pulse_document() -> SequenceDocument {
    let doc = serde_json::json!({
        "register": [
            {"name": "q0", "x": 0.0, "y": 0.0},
            {"name": "q1", "x": 5.0, "y": 0.0}
        ],
        "channels": {"ryd": "rydberg_global"},
        "variables": {"t": {"type": "int", "size": 2, "value": [0, 0]}},
        "operations": [constant_pulse(0), constant_pulse(1)]
    });
    serde_json::from_value(doc).expect("two-pulse document parses")
}

/// Unparametrized sequence over q0..q2 with a global Rydberg channel `ryd`
/// and a single-target local Raman channel `ram`.
pub fn build_ops(operations: serde_json::Value) -> BuiltSequence {
    let doc: SequenceDocument = serde_json::from_value(serde_json::json!({
        "register": [
            {"name": "q0", "x": 0.0, "y": 0.0},
            {"name": "q1", "x": 5.0, "y": 0.0},
            {"name": "q2", "x": 10.0, "y": 0.0}
        ],
        "channels": {
            "ryd": "rydberg_global",
            "ram": {"id": "raman_local", "max_targets": 1}
        },
        "operations": operations
    }))
    .expect("operations parse");
    SequenceTemplate::from_document(&doc)
        .expect("template checks")
        .build(&Bindings::new())
        .expect("build succeeds")
}
