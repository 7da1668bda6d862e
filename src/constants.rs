//! Modbus protocol and planning constants
//!
//! Read limits are derived from the Modbus PDU size (253 bytes); the
//! remaining values are planner defaults shared by the configuration dialects.

// ============================================================================
// Read Limits
// ============================================================================

/// Maximum number of registers for FC03/FC04 (Read Holding/Input Registers)
///
/// Response PDU: function code (1) + byte count (1) + N × 2 ≤ 253,
/// therefore N ≤ 125.
pub const MAX_READ_REGISTERS: u16 = 125;

/// Maximum number of coils for FC01/FC02 (Read Coils/Discrete Inputs)
///
/// Response PDU: function code (1) + byte count (1) + ceil(N / 8) ≤ 253.
/// Modbus Application Protocol v1.1b caps it at 2000 (0x7D0).
pub const MAX_READ_COILS: u16 = 2000;

/// Highest address a field may reach (exclusive end of the address space
/// as checked by the planner).
pub const MAX_ADDRESS: u16 = u16::MAX;

// ============================================================================
// Read Function Codes
// ============================================================================

pub const FC_READ_COILS: u8 = 0x01;
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

// ============================================================================
// Planner Defaults
// ============================================================================

/// Measurement name used when a block or field does not name one.
pub const DEFAULT_MEASUREMENT: &str = "modbus";

/// Default filler register budget for the `max_insert` optimization.
pub const DEFAULT_MAX_REGISTER_FILL: u16 = 50;

/// Longest bit index accepted for `BIT` fields.
pub const MAX_BIT_INDEX: u8 = 15;

// ============================================================================
// Modbus Exception Codes
// ============================================================================

/// Illegal Function
pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;

/// Illegal Data Address
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;

/// Illegal Data Value
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;

/// Server Device Failure
pub const EXCEPTION_SERVER_DEVICE_FAILURE: u8 = 0x04;

/// Acknowledge
pub const EXCEPTION_ACKNOWLEDGE: u8 = 0x05;

/// Server Device Busy
pub const EXCEPTION_SERVER_DEVICE_BUSY: u8 = 0x06;

/// Memory Parity Error
pub const EXCEPTION_MEMORY_PARITY_ERROR: u8 = 0x08;

/// Gateway Path Unavailable
pub const EXCEPTION_GATEWAY_PATH_UNAVAILABLE: u8 = 0x0A;

/// Gateway Target Device Failed to Respond
pub const EXCEPTION_GATEWAY_TARGET_FAILED: u8 = 0x0B;

/// Human readable name of an exception code.
pub fn exception_name(code: u8) -> &'static str {
    match code {
        EXCEPTION_ILLEGAL_FUNCTION => "illegal function",
        EXCEPTION_ILLEGAL_DATA_ADDRESS => "illegal data address",
        EXCEPTION_ILLEGAL_DATA_VALUE => "illegal data value",
        EXCEPTION_SERVER_DEVICE_FAILURE => "server device failure",
        EXCEPTION_ACKNOWLEDGE => "acknowledge",
        EXCEPTION_SERVER_DEVICE_BUSY => "server device busy",
        EXCEPTION_MEMORY_PARITY_ERROR => "memory parity error",
        EXCEPTION_GATEWAY_PATH_UNAVAILABLE => "gateway path unavailable",
        EXCEPTION_GATEWAY_TARGET_FAILED => "gateway target device failed to respond",
        _ => "unknown exception",
    }
}
