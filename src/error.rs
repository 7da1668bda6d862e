//! # Error Types
//!
//! Error taxonomy of the planner and poller:
//!
//! | Type | Raised | Effect |
//! |------|--------|--------|
//! | [`ConfigError`] | while building the plan | fatal, the poller refuses to start |
//! | [`ModbusError`] | by the transport | scoped to one slave for one cycle |
//! | [`DecodeError`] | while decoding a response | the field is dropped, the error reported |
//! | [`PollError`] | by the poller | handed to the accumulator |

use thiserror::Error;

use crate::constants::{
    exception_name, EXCEPTION_GATEWAY_PATH_UNAVAILABLE, EXCEPTION_GATEWAY_TARGET_FAILED,
    EXCEPTION_SERVER_DEVICE_BUSY,
};
use crate::field::RegisterKind;

/// Result type for transport operations.
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Result type for configuration and planning.
pub type ConfigResult<T> = Result<T, ConfigError>;

// ============================================================================
// Transport errors
// ============================================================================

/// Errors reported by a [`ModbusTransport`](crate::transport::ModbusTransport).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModbusError {
    /// Underlying I/O failure.
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Could not establish or keep the connection.
    #[error("connection error: {message}")]
    Connection { message: String },

    /// Operation did not complete in time.
    #[error("timeout after {timeout_ms}ms during {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Device answered with a Modbus exception.
    #[error("modbus exception {code:#04x} ({message}) for function {function:#04x}")]
    Exception {
        function: u8,
        code: u8,
        message: String,
    },

    /// Malformed or unexpected response.
    #[error("protocol error: {message}")]
    Protocol { message: String },
}

impl ModbusError {
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Build an exception error with the standard description of `code`.
    pub fn exception(function: u8, code: u8) -> Self {
        Self::Exception {
            function,
            code,
            message: exception_name(code).to_string(),
        }
    }

    /// Exception code, if the device answered with one.
    #[inline]
    pub fn exception_code(&self) -> Option<u8> {
        match self {
            Self::Exception { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The device asked us to come back later.
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.exception_code() == Some(EXCEPTION_SERVER_DEVICE_BUSY)
    }

    /// A gateway could not reach the addressed slave.
    #[inline]
    pub fn is_gateway_unavailable(&self) -> bool {
        matches!(
            self.exception_code(),
            Some(EXCEPTION_GATEWAY_PATH_UNAVAILABLE | EXCEPTION_GATEWAY_TARGET_FAILED)
        )
    }

    /// Whether the connection should be torn down after this error.
    ///
    /// Exceptions are answers from a live device, everything else leaves
    /// the link in an unknown state.
    #[inline]
    pub fn requires_reconnect(&self) -> bool {
        !matches!(self, Self::Exception { .. })
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

// ============================================================================
// Configuration errors
// ============================================================================

/// Fatal errors found while validating configuration and building the plan.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error("unknown configuration type {0:?}")]
    UnknownConfigurationType(String),

    #[error("device name is empty")]
    MissingDeviceName,

    #[error("invalid controller {0:?}")]
    InvalidController(String),

    #[error("invalid transmission mode {0:?}")]
    UnknownTransmissionMode(String),

    #[error("unknown input data-type {0:?}")]
    UnknownInputType(String),

    #[error("unknown byte-order {0:?}")]
    UnknownByteOrder(String),

    #[error("unknown output data-type {0:?}")]
    UnknownOutputType(String),

    #[error("output data-type {output} is not compatible with input data-type {input}")]
    IncompatibleOutput { input: String, output: String },

    #[error("scale cannot be used with input data-type {0}")]
    ScaleNotAllowed(String),

    #[error("unknown register-type {0:?}")]
    UnknownRegisterKind(String),

    #[error("unknown optimization {0:?}")]
    UnknownOptimization(String),

    #[error("optimization_max_register_fill has to be between 1 and {max}")]
    MaxRegisterFill { value: u16, max: u16 },

    #[error("found {0} section without fields")]
    EmptyBlock(&'static str),

    #[error("empty field name in {context}")]
    EmptyFieldName { context: String },

    #[error("field {name:?} duplicated in measurement {measurement:?} (slave {slave}/\"{kind}\")")]
    DuplicateField {
        name: String,
        measurement: String,
        slave: u8,
        kind: RegisterKind,
    },

    #[error("address {address} with length {length} exceeds the 16-bit address space")]
    AddressOverflow { address: u16, length: u16 },

    #[error("length {length} exceeds the maximum of {max} for a single read")]
    FieldTooLarge { length: u16, max: u16 },

    #[error("bit index {0} is out of range, must be 0..=15")]
    InvalidBit(u8),

    #[error("STRING requires a length of at least one register")]
    MissingLength,

    #[error("length cannot be used with input data-type {0}")]
    LengthNotAllowed(String),

    #[error("type cannot be used with register-type {0}")]
    TypeNotAllowed(RegisterKind),

    #[error("initializing field {field:?} failed: {source}")]
    FieldInit {
        field: String,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("invalid address count {count} for field {name:?}")]
    InvalidAddressCount { name: String, count: usize },

    #[error("addresses of field {0:?} are not consecutive")]
    NonConsecutiveAddresses(String),

    #[error("{kind} address {address} is already used by another field")]
    DuplicateAddress { kind: RegisterKind, address: u16 },

    #[error("byte order {byte_order:?} of field {name:?} does not match {count} address(es)")]
    ByteOrderLength {
        name: String,
        byte_order: String,
        count: usize,
    },

    #[error("scale of field {0:?} must not be zero")]
    ZeroScale(String),

    #[error("name {name:?} is duplicated in measurement {measurement:?} of {kind}")]
    DuplicateName {
        name: String,
        measurement: String,
        kind: RegisterKind,
    },
}

impl ConfigError {
    /// Attach the name of the field being initialized.
    pub fn in_field(self, field: impl Into<String>) -> Self {
        Self::FieldInit {
            field: field.into(),
            source: Box::new(self),
        }
    }
}

// ============================================================================
// Decode and poll errors
// ============================================================================

/// A response span did not hold what the plan expected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected {expected} byte(s) but only {actual} available")]
    ShortSpan { expected: usize, actual: usize },
}

/// Errors accumulated during one poll cycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PollError {
    #[error("slave {slave}: {source}")]
    Slave {
        slave: u8,
        #[source]
        source: ModbusError,
    },

    #[error("slave {slave}: decoding field {field:?} failed: {source}")]
    Decode {
        slave: u8,
        field: String,
        #[source]
        source: DecodeError,
    },
}

impl PollError {
    /// Slave the error is attributed to.
    pub fn slave(&self) -> u8 {
        match self {
            Self::Slave { slave, .. } | Self::Decode { slave, .. } => *slave,
        }
    }
}
