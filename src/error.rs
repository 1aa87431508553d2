//! Error types for layout validation, header parsing and block access.
//!
//! Observer errors live separately in [`observers`](crate::observers) so
//! that the exporters can be compiled out without touching this module.

use thiserror::Error;

use crate::layout::SlotKind;

/// Errors raised when addressing the counter block or its layout.
#[derive(Debug, Error)]
pub enum PerfError {
    /// No slot carries this symbolic name.
    #[error("unknown counter `{0}`")]
    UnknownCounter(String),

    /// The offset is odd, out of range, or otherwise not a slot.
    #[error("no counter at offset {0}")]
    UnknownOffset(u16),

    /// The operation does not apply to this kind of slot.
    #[error("{counter} is a {actual} slot, expected a {expected} slot")]
    WrongKind {
        counter: &'static str,
        expected: SlotKind,
        actual: SlotKind,
    },

    /// Category name not recognised.
    #[error("unknown category `{0}`")]
    UnknownCategory(String),

    /// Timer unit not recognised.
    #[error("invalid timer unit `{0}`, expected `us` or `ms`")]
    InvalidTimerUnit(String),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Header(#[from] HeaderError),
}

/// Result type for block and layout operations.
pub type Result<T> = std::result::Result<T, PerfError>;

/// A counter table violates the offset contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("layout has no slots")]
    Empty,

    #[error("{name} has odd offset {offset}")]
    OddOffset { name: String, offset: u16 },

    #[error("{name} offset {offset} exceeds the declared maximum {max}")]
    OutOfRange { name: String, offset: u16, max: u16 },

    #[error("{name} is declared twice")]
    DuplicateName { name: String },

    #[error("{first} and {second} share offset {offset}")]
    DuplicateOffset {
        first: String,
        second: String,
        offset: u16,
    },

    #[error("{name} at offset {offset} does not follow offset {previous} by 2")]
    BadStep {
        name: String,
        offset: u16,
        previous: u16,
    },

    #[error("declared maximum {declared} does not match highest offset {actual}")]
    MaxMismatch { declared: u16, actual: u16 },

    #[error("{name} appears outside the run of its category base {base}")]
    OutsideCategory { name: String, base: String },
}

/// The offset header could not be read, or disagrees with the built-in table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("line {line}: `{name}` has invalid value `{value}`")]
    InvalidValue {
        line: usize,
        name: String,
        value: String,
    },

    #[error("line {line}: unknown counter `{name}`")]
    UnknownName { line: usize, name: String },

    #[error("header does not define PERF_MAX_COUNTER")]
    MissingBound,

    #[error("{name} is at offset {found}, expected {expected}")]
    OffsetMismatch {
        name: String,
        expected: u16,
        found: u16,
    },

    #[error("header does not define {name}")]
    MissingCounter { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_kind_display() {
        let err = PerfError::WrongKind {
            counter: "MMSPERF_HS_STAGE_TIMER",
            expected: SlotKind::Counter,
            actual: SlotKind::Timer,
        };
        assert_eq!(
            err.to_string(),
            "MMSPERF_HS_STAGE_TIMER is a timer slot, expected a counter slot"
        );
    }

    #[test]
    fn test_layout_error_is_transparent() {
        let err: PerfError = LayoutError::MaxMismatch {
            declared: 110,
            actual: 108,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "declared maximum 110 does not match highest offset 108"
        );
    }

    #[test]
    fn test_header_error_display() {
        let err = HeaderError::InvalidValue {
            line: 3,
            name: "PRFOBJ_MMS_CS".to_string(),
            value: "x".to_string(),
        };
        assert_eq!(err.to_string(), "line 3: `PRFOBJ_MMS_CS` has invalid value `x`");
    }
}
