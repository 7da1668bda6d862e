//! # Fields and Requests
//!
//! Planning records shared by the configuration front-ends, the grouping
//! engine and the poller, plus the address-range arithmetic they rely on.
//!
//! Fields and requests are built once while planning and read-only
//! afterwards; a [`SlavePlan`] is shared behind an `Arc` by every poll.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::warn;

use crate::codec::Converter;
use crate::constants::{
    FC_READ_COILS, FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
    MAX_ADDRESS, MAX_READ_COILS, MAX_READ_REGISTERS,
};
use crate::error::ConfigError;

/// Tags attached to every request of a configuration block.
pub type Tags = Arc<BTreeMap<String, String>>;

// ============================================================================
// Register Kinds
// ============================================================================

/// Modbus address space a field lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegisterKind {
    Coil,
    Discrete,
    Holding,
    Input,
}

impl RegisterKind {
    pub const ALL: [RegisterKind; 4] = [Self::Coil, Self::Discrete, Self::Holding, Self::Input];

    /// Configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coil => "coil",
            Self::Discrete => "discrete",
            Self::Holding => "holding",
            Self::Input => "input",
        }
    }

    /// Value of the `type` tag on emitted measurements.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Coil => "coil",
            Self::Discrete => "discrete_input",
            Self::Holding => "holding_register",
            Self::Input => "input_register",
        }
    }

    /// Coils and discrete inputs address single bits.
    #[inline]
    pub fn is_bit(&self) -> bool {
        matches!(self, Self::Coil | Self::Discrete)
    }

    /// Function code reading this kind.
    pub fn read_function(&self) -> u8 {
        match self {
            Self::Coil => FC_READ_COILS,
            Self::Discrete => FC_READ_DISCRETE_INPUTS,
            Self::Holding => FC_READ_HOLDING_REGISTERS,
            Self::Input => FC_READ_INPUT_REGISTERS,
        }
    }

    /// Protocol limit for a single read of this kind.
    #[inline]
    pub fn max_read(&self) -> u16 {
        if self.is_bit() {
            MAX_READ_COILS
        } else {
            MAX_READ_REGISTERS
        }
    }
}

impl FromStr for RegisterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coil" => Ok(Self::Coil),
            "discrete" => Ok(Self::Discrete),
            "holding" => Ok(Self::Holding),
            "input" => Ok(Self::Input),
            _ => Err(ConfigError::UnknownRegisterKind(s.to_string())),
        }
    }
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Address Ranges
// ============================================================================

/// Anything covering `[address, address + length)`.
pub trait AddressRange {
    fn address(&self) -> u16;
    fn length(&self) -> u16;

    /// Exclusive end; computed wide so it never wraps.
    #[inline]
    fn end(&self) -> u32 {
        u32::from(self.address()) + u32::from(self.length())
    }
}

/// `b` starts exactly where `a` ends.
#[inline]
pub fn consecutive_with(a: &impl AddressRange, b: &impl AddressRange) -> bool {
    u32::from(b.address()) == a.end()
}

/// The two half-open ranges intersect.
#[inline]
pub fn overlaps(a: &impl AddressRange, b: &impl AddressRange) -> bool {
    u32::from(a.address()) < b.end() && u32::from(b.address()) < a.end()
}

/// `address + length` stays inside the 16-bit address space.
#[inline]
pub fn within_address_space(address: u16, length: u16) -> bool {
    u32::from(address) + u32::from(length) <= u32::from(MAX_ADDRESS)
}

// ============================================================================
// Field
// ============================================================================

/// One named value read from a device.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub measurement: String,
    pub address: u16,
    /// Registers (or bits) occupied.
    pub length: u16,
    /// Reserves address space without producing a value.
    pub omit: bool,
    /// `None` only for omitted fields.
    pub converter: Option<Converter>,
}

impl Field {
    pub fn new(
        name: impl Into<String>,
        measurement: impl Into<String>,
        address: u16,
        length: u16,
        converter: Converter,
    ) -> Self {
        Self {
            name: name.into(),
            measurement: measurement.into(),
            address,
            length,
            omit: false,
            converter: Some(converter),
        }
    }

    /// Placeholder covering `length` registers at `address`.
    pub fn omitted(address: u16, length: u16) -> Self {
        Self {
            name: String::new(),
            measurement: String::new(),
            address,
            length,
            omit: true,
            converter: None,
        }
    }
}

impl AddressRange for Field {
    fn address(&self) -> u16 {
        self.address
    }

    fn length(&self) -> u16 {
        self.length
    }
}

// ============================================================================
// Request
// ============================================================================

/// One planned read operation.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub address: u16,
    pub length: u16,
    /// Non-omitted fields, address ascending.
    pub fields: Vec<Field>,
    pub tags: Tags,
}

impl Request {
    pub fn new(address: u16, tags: Tags) -> Self {
        Self {
            address,
            length: 0,
            fields: Vec::new(),
            tags,
        }
    }
}

impl AddressRange for Request {
    fn address(&self) -> u16 {
        self.address
    }

    fn length(&self) -> u16 {
        self.length
    }
}

/// Planned requests of one slave, by register kind.
#[derive(Debug, Clone, Default)]
pub struct RequestSet {
    pub coil: Vec<Request>,
    pub discrete: Vec<Request>,
    pub holding: Vec<Request>,
    pub input: Vec<Request>,
}

impl RequestSet {
    pub fn get(&self, kind: RegisterKind) -> &[Request] {
        match kind {
            RegisterKind::Coil => &self.coil,
            RegisterKind::Discrete => &self.discrete,
            RegisterKind::Holding => &self.holding,
            RegisterKind::Input => &self.input,
        }
    }

    pub fn get_mut(&mut self, kind: RegisterKind) -> &mut Vec<Request> {
        match kind {
            RegisterKind::Coil => &mut self.coil,
            RegisterKind::Discrete => &mut self.discrete,
            RegisterKind::Holding => &mut self.holding,
            RegisterKind::Input => &mut self.input,
        }
    }

    pub fn is_empty(&self) -> bool {
        RegisterKind::ALL.iter().all(|k| self.get(*k).is_empty())
    }

    /// Registers (or bits) touched by the requests of `kind`.
    pub fn register_count(&self, kind: RegisterKind) -> usize {
        self.get(kind).iter().map(|r| usize::from(r.length)).sum()
    }

    /// Output fields read by the requests of `kind`.
    pub fn field_count(&self, kind: RegisterKind) -> usize {
        self.get(kind).iter().map(|r| r.fields.len()).sum()
    }
}

/// Request plan of every configured slave.
pub type SlavePlan = BTreeMap<u8, RequestSet>;

/// Warn about every pair of overlapping requests; returns how many were found.
///
/// Overlaps never stop collection, they point at a planning defect.
pub fn check_request_overlaps(slave: u8, kind: RegisterKind, requests: &[Request]) -> usize {
    let mut sorted: Vec<&Request> = requests.iter().collect();
    sorted.sort_by_key(|r| (r.address, r.length));

    let mut found = 0;
    for (i, current) in sorted.iter().enumerate() {
        for next in sorted[i + 1..].iter().take_while(|n| u32::from(n.address) < current.end()) {
            if overlaps(*current, *next) {
                warn!(
                    slave,
                    kind = %kind,
                    "Request at {} with length {} overlaps with request at {} with length {}",
                    current.address,
                    current.length,
                    next.address,
                    next.length
                );
                found += 1;
            }
        }
    }
    found
}
