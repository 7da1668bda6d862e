//! # Field Values
//!
//! Decoded output values. Every converter widens to one of these variants
//! so measurements carry a small, fixed set of types.

use std::fmt;

/// A decoded field value.
///
/// # Output Mapping
///
/// | Variant | Output type | Produced by |
/// |---------|-------------|-------------|
/// | Bool | `BOOL` | coils, discrete inputs, `BIT` |
/// | Int | `INT64` | signed integer inputs |
/// | Uint | `UINT64` | unsigned integer inputs, bits |
/// | Float | `FLOAT64` | float inputs, fixed-point and any scaled value |
/// | Str | `STRING` | `STRING` inputs |
///
/// # Example
///
/// ```rust
/// use modbus_planner::FieldValue;
///
/// let temp = FieldValue::from(25.5);
/// assert_eq!(temp, FieldValue::Float(25.5));
/// assert_eq!(FieldValue::Uint(3).to_string(), "3u");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Boolean value
    Bool(bool),
    /// Signed integer widened to 64 bits
    Int(i64),
    /// Unsigned integer widened to 64 bits
    Uint(u64),
    /// 64-bit floating point
    Float(f64),
    /// Null-terminated string
    Str(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Int(v) => write!(f, "{v}i"),
            FieldValue::Uint(v) => write!(f, "{v}u"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Str(v) => write!(f, "{v:?}"),
        }
    }
}

// ============================================================================
// From implementations for ergonomic construction
// ============================================================================

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Uint(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

// ============================================================================
// Tests
// ============================================================================
