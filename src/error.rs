// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types for the sequencer.

use std::fmt;

/// Result type alias for sequencer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error types.
#[derive(Debug)]
pub enum Error {
    /// Configuration error
    Config(String),
    /// Sequence build or scheduling error
    Build(BuildError),
    /// Validation error
    Validation(ValidationError),
    /// IO error
    Io(std::io::Error),
    /// Serialization error
    Serialization(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Build(e) => write!(f, "Build error: {}", e),
            Error::Validation(e) => write!(f, "Validation error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Build(e) => Some(e),
            Error::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<BuildError> for Error {
    fn from(e: BuildError) -> Self {
        Error::Build(e)
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Validation(e)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type for the evaluator, materializer and scheduler internals,
/// before an operation position is attached.
pub type KindResult<T> = std::result::Result<T, BuildErrorKind>;

/// The reason a build or schedule call failed.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildErrorKind {
    /// Expression references a variable with no binding
    UnboundVariable(String),
    /// A value was supplied for a variable that was never declared
    UnknownVariable(String),
    /// Supplied value length differs from the declared length
    VariableLengthMismatch {
        variable: String,
        expected: usize,
        actual: usize,
    },
    /// Declared variable received no value and has no default
    MissingBinding(String),
    /// Scalar/array or integer/real mismatch
    TypeMismatch(String),
    /// Element-wise operands of different lengths
    LengthMismatch { lhs: usize, rhs: usize },
    /// Index outside the bound length of a variable
    IndexOutOfRange {
        variable: String,
        index: i64,
        len: usize,
    },
    /// Waveform parameters cannot produce a waveform
    InvalidWaveformParams(String),
    /// Amplitude and detuning waveforms differ in sample count
    WaveformLengthMismatch { amplitude: usize, detuning: usize },
    /// Local channel used before any target was set
    UnresolvedTarget(String),
    /// Target request the channel cannot honour
    InvalidTarget(String),
    /// Negative delay
    InvalidDelay(i64),
    /// `align` named no channel
    EmptyAlign,
    /// Operation rejected while the channel is in EOM mode
    EomModeActive(String),
    /// EOM operation issued while the channel is not in EOM mode
    EomModeNotActive(String),
    /// No permitted off-detuning exists for the requested EOM settings
    EomUnavailable(String),
    /// Channel name not declared
    UnknownChannel(String),
    /// Atom id or register index not in the register
    UnknownAtom(String),
    /// No declared channel addresses the basis
    UnaddressedBasis(String),
    /// Pulse targets carry different phase references
    PhaseMismatch(String),
    /// A segment or the timeline would exceed a scheduling limit
    LimitExceeded {
        resource: String,
        limit: u64,
        requested: u64,
    },
}

impl fmt::Display for BuildErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildErrorKind::UnboundVariable(name) => write!(f, "Unbound variable '{}'", name),
            BuildErrorKind::UnknownVariable(name) => {
                write!(f, "Value supplied for undeclared variable '{}'", name)
            }
            BuildErrorKind::VariableLengthMismatch {
                variable,
                expected,
                actual,
            } => write!(
                f,
                "Variable '{}' expects {} value(s), got {}",
                variable, expected, actual
            ),
            BuildErrorKind::MissingBinding(name) => {
                write!(f, "No value supplied for variable '{}'", name)
            }
            BuildErrorKind::TypeMismatch(msg) => write!(f, "Type mismatch: {}", msg),
            BuildErrorKind::LengthMismatch { lhs, rhs } => {
                write!(f, "Operand length mismatch: {} vs {}", lhs, rhs)
            }
            BuildErrorKind::IndexOutOfRange {
                variable,
                index,
                len,
            } => write!(
                f,
                "Index {} out of range for variable '{}' of length {}",
                index, variable, len
            ),
            BuildErrorKind::InvalidWaveformParams(msg) => {
                write!(f, "Invalid waveform parameters: {}", msg)
            }
            BuildErrorKind::WaveformLengthMismatch {
                amplitude,
                detuning,
            } => write!(
                f,
                "Amplitude has {} samples but detuning has {}",
                amplitude, detuning
            ),
            BuildErrorKind::UnresolvedTarget(channel) => {
                write!(f, "Channel '{}' has no target", channel)
            }
            BuildErrorKind::InvalidTarget(msg) => write!(f, "Invalid target: {}", msg),
            BuildErrorKind::InvalidDelay(time) => {
                write!(f, "Delay must be non-negative, got {}", time)
            }
            BuildErrorKind::EmptyAlign => write!(f, "Align requires at least one channel"),
            BuildErrorKind::EomModeActive(channel) => {
                write!(f, "Channel '{}' is in EOM mode", channel)
            }
            BuildErrorKind::EomModeNotActive(channel) => {
                write!(f, "Channel '{}' is not in EOM mode", channel)
            }
            BuildErrorKind::EomUnavailable(msg) => write!(f, "EOM mode unavailable: {}", msg),
            BuildErrorKind::UnknownChannel(name) => write!(f, "Unknown channel '{}'", name),
            BuildErrorKind::UnknownAtom(id) => write!(f, "Unknown atom '{}'", id),
            BuildErrorKind::UnaddressedBasis(basis) => {
                write!(f, "No declared channel addresses basis '{}'", basis)
            }
            BuildErrorKind::PhaseMismatch(msg) => write!(f, "Phase mismatch: {}", msg),
            BuildErrorKind::LimitExceeded {
                resource,
                limit,
                requested,
            } if *requested == u64::MAX => {
                write!(f, "{} overflows (limit {})", resource, limit)
            }
            BuildErrorKind::LimitExceeded {
                resource,
                limit,
                requested,
            } => write!(f, "{} of {} exceeds limit {}", resource, requested, limit),
        }
    }
}

/// A build or schedule failure, with the position of the offending
/// operation when one is known.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildError {
    /// Index of the operation in the sequence (None for sequence-level errors).
    pub position: Option<usize>,
    /// What went wrong.
    pub kind: BuildErrorKind,
}

impl BuildError {
    /// Error attached to the operation at `position`.
    pub fn at(position: usize, kind: BuildErrorKind) -> Self {
        Self {
            position: Some(position),
            kind,
        }
    }
}

impl From<BuildErrorKind> for BuildError {
    fn from(kind: BuildErrorKind) -> Self {
        Self {
            position: None,
            kind,
        }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "operation #{}: {}", pos, self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for BuildError {}

/// Validation errors.
#[derive(Debug)]
pub enum ValidationError {
    /// Field validation failed
    Field { field: String, message: String },
    /// Resource limit exceeded
    ResourceLimit {
        resource: String,
        limit: u64,
        requested: u64,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Field { field, message } => {
                write!(f, "Field '{}': {}", field, message)
            }
            ValidationError::ResourceLimit {
                resource,
                limit,
                requested,
            } => {
                write!(
                    f,
                    "Resource limit exceeded for {}: limit={}, requested={}",
                    resource, limit, requested
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    // =========================================================================
    // Error Display tests
    // =========================================================================

    #[test]
    fn test_error_display_config() {
        let e = Error::Config("bad sample rate".into());
        assert_eq!(e.to_string(), "Configuration error: bad sample rate");
    }

    #[test]
    fn test_error_display_build_with_position() {
        let e = Error::Build(BuildError::at(
            3,
            BuildErrorKind::UnknownChannel("ch9".into()),
        ));
        assert_eq!(
            e.to_string(),
            "Build error: operation #3: Unknown channel 'ch9'"
        );
    }

    #[test]
    fn test_error_display_build_without_position() {
        let e: Error = BuildError::from(BuildErrorKind::MissingBinding("t".into())).into();
        assert_eq!(e.to_string(), "Build error: No value supplied for variable 't'");
    }

    #[test]
    fn test_error_display_io() {
        let e = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(e.to_string(), "IO error: gone");
    }

    #[test]
    fn test_error_display_serialization() {
        let e = Error::Serialization("invalid yaml".into());
        assert_eq!(e.to_string(), "Serialization error: invalid yaml");
    }

    // =========================================================================
    // BuildErrorKind Display tests
    // =========================================================================

    #[test]
    fn test_kind_display_length_mismatch() {
        let e = BuildErrorKind::LengthMismatch { lhs: 2, rhs: 3 };
        assert_eq!(e.to_string(), "Operand length mismatch: 2 vs 3");
    }

    #[test]
    fn test_kind_display_index_out_of_range() {
        let e = BuildErrorKind::IndexOutOfRange {
            variable: "t".into(),
            index: 5,
            len: 3,
        };
        assert_eq!(
            e.to_string(),
            "Index 5 out of range for variable 't' of length 3"
        );
    }

    #[test]
    fn test_kind_display_variable_length_mismatch() {
        let e = BuildErrorKind::VariableLengthMismatch {
            variable: "t".into(),
            expected: 2,
            actual: 1,
        };
        assert_eq!(e.to_string(), "Variable 't' expects 2 value(s), got 1");
    }

    #[test]
    fn test_kind_display_waveform_length_mismatch() {
        let e = BuildErrorKind::WaveformLengthMismatch {
            amplitude: 100,
            detuning: 50,
        };
        assert_eq!(e.to_string(), "Amplitude has 100 samples but detuning has 50");
    }

    #[test]
    fn test_kind_display_eom() {
        assert_eq!(
            BuildErrorKind::EomModeActive("ch0".into()).to_string(),
            "Channel 'ch0' is in EOM mode"
        );
        assert_eq!(
            BuildErrorKind::EomModeNotActive("ch0".into()).to_string(),
            "Channel 'ch0' is not in EOM mode"
        );
    }

    #[test]
    fn test_kind_display_limit_exceeded() {
        let e = BuildErrorKind::LimitExceeded {
            resource: "samples".into(),
            limit: 10,
            requested: 12,
        };
        assert_eq!(e.to_string(), "samples of 12 exceeds limit 10");
        let e = BuildErrorKind::LimitExceeded {
            resource: "channel 'ryd' end time".into(),
            limit: 10,
            requested: u64::MAX,
        };
        assert_eq!(e.to_string(), "channel 'ryd' end time overflows (limit 10)");
    }

    #[test]
    fn test_kind_display_invalid_delay() {
        assert_eq!(
            BuildErrorKind::InvalidDelay(-4).to_string(),
            "Delay must be non-negative, got -4"
        );
    }

    // =========================================================================
    // ValidationError Display tests
    // =========================================================================

    #[test]
    fn test_validation_error_display_field() {
        let e = ValidationError::Field {
            field: "register".into(),
            message: "must not be empty".into(),
        };
        assert_eq!(e.to_string(), "Field 'register': must not be empty");
    }

    #[test]
    fn test_validation_error_display_resource_limit() {
        let e = ValidationError::ResourceLimit {
            resource: "operations".into(),
            limit: 1000,
            requested: 2000,
        };
        assert_eq!(
            e.to_string(),
            "Resource limit exceeded for operations: limit=1000, requested=2000"
        );
    }

    // =========================================================================
    // Error::source() tests
    // =========================================================================

    #[test]
    fn test_error_source_io() {
        let e = Error::Io(std::io::Error::other("disk"));
        assert!(e.source().is_some());
    }

    #[test]
    fn test_error_source_build() {
        let e = Error::Build(BuildErrorKind::EmptyAlign.into());
        assert!(e.source().is_some());
    }

    #[test]
    fn test_error_source_none_for_config() {
        let e = Error::Config("x".into());
        assert!(e.source().is_none());
    }

    // =========================================================================
    // From impls
    // =========================================================================

    #[test]
    fn test_from_build_error() {
        let be = BuildError::at(0, BuildErrorKind::EmptyAlign);
        let e: Error = be.into();
        assert!(matches!(
            e,
            Error::Build(BuildError {
                position: Some(0),
                kind: BuildErrorKind::EmptyAlign
            })
        ));
    }

    #[test]
    fn test_from_serde_yaml_error() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("{{{{").unwrap_err();
        let e: Error = yaml_err.into();
        assert!(matches!(e, Error::Serialization(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let e: Error = json_err.into();
        assert!(matches!(e, Error::Serialization(_)));
    }
}
