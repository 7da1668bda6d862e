//! # Device Limits Configuration
//!
//! Per-device burst sizes and quirk workarounds consulted by the grouping
//! engine.
//!
//! ## Modbus Specification Limits
//!
//! - **Read Holding/Input Registers (FC03/04)**: Max 125 registers per request
//! - **Read Coils/Discrete Inputs (FC01/02)**: Max 2000 bits per request
//!
//! Some devices accept less. The `one_request_per_field` workaround forces a
//! burst size of one so every field is fetched on its own, and
//! `read_coils_starting_at_zero` makes the first coil request start at
//! address 0.

use crate::field::RegisterKind;

/// Device-specific read limits.
///
/// # Example
///
/// ```rust
/// use modbus_planner::{DeviceLimits, RegisterKind};
///
/// let limits = DeviceLimits::new().with_one_request_per_field(true);
/// assert_eq!(limits.burst_size(RegisterKind::Holding), 1);
/// assert_eq!(limits.max_field_length(RegisterKind::Coil), 2000);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Read each field with its own request.
    pub one_request_per_field: bool,
    /// Start the first coil request at address 0.
    pub read_coils_starting_at_zero: bool,
}

impl DeviceLimits {
    /// Create new device limits with default (Modbus spec) values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_one_request_per_field(mut self, enabled: bool) -> Self {
        self.one_request_per_field = enabled;
        self
    }

    pub fn with_read_coils_starting_at_zero(mut self, enabled: bool) -> Self {
        self.read_coils_starting_at_zero = enabled;
        self
    }

    /// Largest request the grouping engine may build for `kind`.
    pub fn burst_size(&self, kind: RegisterKind) -> u16 {
        if self.one_request_per_field {
            return 1;
        }
        self.max_field_length(kind)
    }

    /// Longest single field accepted for `kind`.
    ///
    /// Unlike [`burst_size`](Self::burst_size) this ignores
    /// `one_request_per_field`: a multi-register field is still one read.
    #[inline]
    pub fn max_field_length(&self, kind: RegisterKind) -> u16 {
        kind.max_read()
    }

    /// Whether the first request of `kind` must start at address 0.
    #[inline]
    pub fn enforce_from_zero(&self, kind: RegisterKind) -> bool {
        self.read_coils_starting_at_zero && kind == RegisterKind::Coil
    }
}

// ============================================================================
// Tests
// ============================================================================
