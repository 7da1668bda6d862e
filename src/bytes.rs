//! # Byte Order Handling for Modbus
//!
//! Byte order families used to reassemble multi-register values, plus the
//! packing helpers that turn register and coil reads into raw byte spans.
//!
//! ## Naming Convention
//!
//! Uses ABCD notation where:
//! - A = Most significant byte (MSB)
//! - B = Second byte
//! - C = Third byte
//! - D = Least significant byte (LSB)
//!
//! For a response carrying bytes `[0xAA, 0xBB, 0xCC, 0xDD]`:
//! - `BigEndian (ABCD)`: 0xAABBCCDD
//! - `LittleEndian (DCBA)`: 0xDDCCBBAA
//! - `BigEndianSwap (CDAB)`: 0xCCDDAABB (Modbus common)
//! - `LittleEndianSwap (BADC)`: 0xBBAADDCC
//!
//! ## Aliases
//!
//! | Alias | Canonical |
//! |-------|-----------|
//! | `AB`, `ABCDEFGH`, `MSW-BE`, `MSW` | `ABCD` |
//! | `BA`, `HGFEDCBA`, `LSW-LE`, `LSW` | `DCBA` |
//! | `MSW-LE`, `BADCFEHG` | `BADC` |
//! | `LSW-BE`, `GHEFCDAB` | `CDAB` |

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ConfigError;

/// Canonical byte/word order for 16/32/64-bit values.
///
/// # Example
///
/// ```rust
/// use modbus_planner::ByteOrder;
///
/// let order: ByteOrder = "LSW-BE".parse().unwrap();
/// assert_eq!(order, ByteOrder::BigEndianSwap);
/// assert!(order.is_big_endian());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ByteOrder {
    /// Big-endian: ABCD (most significant byte first)
    #[default]
    BigEndian,

    /// Little-endian: DCBA (least significant byte first)
    LittleEndian,

    /// Big-endian with swapped words: CDAB
    BigEndianSwap,

    /// Little-endian with swapped words: BADC
    LittleEndianSwap,
}

impl ByteOrder {
    /// All canonical orders.
    pub const ALL: [ByteOrder; 4] = [
        Self::BigEndian,
        Self::LittleEndian,
        Self::BigEndianSwap,
        Self::LittleEndianSwap,
    ];

    /// Canonical four-letter name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BigEndian => "ABCD",
            Self::LittleEndian => "DCBA",
            Self::BigEndianSwap => "CDAB",
            Self::LittleEndianSwap => "BADC",
        }
    }

    /// Check if this is a big-endian variant.
    ///
    /// Single registers are read big-endian for `ABCD` and `CDAB`.
    #[inline]
    pub fn is_big_endian(&self) -> bool {
        matches!(self, Self::BigEndian | Self::BigEndianSwap)
    }

}

impl FromStr for ByteOrder {
    type Err = ConfigError;

    /// Parse a canonical order or one of its aliases.
    ///
    /// Matching ignores case, hyphens and underscores; anything else is
    /// rejected rather than falling back to a default.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        match normalized.as_str() {
            "ABCD" | "AB" | "ABCDEFGH" | "MSWBE" | "MSW" => Ok(Self::BigEndian),
            "DCBA" | "BA" | "HGFEDCBA" | "LSWLE" | "LSW" => Ok(Self::LittleEndian),
            "BADC" | "BADCFEHG" | "MSWLE" => Ok(Self::LittleEndianSwap),
            "CDAB" | "GHEFCDAB" | "LSWBE" => Ok(Self::BigEndianSwap),
            _ => Err(ConfigError::UnknownByteOrder(s.to_string())),
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Byte Span Reassembly
// ============================================================================

/// Rearrange 4 wire bytes into big-endian value order.
///
/// Every arrangement is its own inverse, so the same call converts a
/// big-endian value back into wire order.
///
/// # Example
///
/// ```rust
/// use modbus_planner::bytes::{reorder_4, ByteOrder};
///
/// let wire = [0xAA, 0xBB, 0xCC, 0xDD];
/// assert_eq!(reorder_4(wire, ByteOrder::BigEndianSwap), [0xCC, 0xDD, 0xAA, 0xBB]);
/// ```
#[inline]
pub fn reorder_4(bytes: [u8; 4], order: ByteOrder) -> [u8; 4] {
    reorder_4_fn(order)(bytes)
}

/// Rearrange 8 wire bytes into big-endian value order.
#[inline]
pub fn reorder_8(bytes: [u8; 8], order: ByteOrder) -> [u8; 8] {
    reorder_8_fn(order)(bytes)
}

/// Single-register reader for `order`, selected once.
pub fn word_fn(order: ByteOrder) -> fn([u8; 2]) -> u16 {
    if order.is_big_endian() {
        u16::from_be_bytes
    } else {
        u16::from_le_bytes
    }
}

/// Two-register reassembly for `order`, selected once.
pub fn reorder_4_fn(order: ByteOrder) -> fn([u8; 4]) -> [u8; 4] {
    match order {
        ByteOrder::BigEndian => |b| b, // ABCD
        ByteOrder::LittleEndian => |[a, b, c, d]| [d, c, b, a], // DCBA
        ByteOrder::BigEndianSwap => |[a, b, c, d]| [c, d, a, b], // CDAB
        ByteOrder::LittleEndianSwap => |[a, b, c, d]| [b, a, d, c], // BADC
    }
}

/// Four-register reassembly for `order`, selected once.
pub fn reorder_8_fn(order: ByteOrder) -> fn([u8; 8]) -> [u8; 8] {
    match order {
        ByteOrder::BigEndian => |b| b, // ABCDEFGH
        ByteOrder::LittleEndian => |[a, b, c, d, e, f, g, h]| [h, g, f, e, d, c, b, a], // HGFEDCBA
        ByteOrder::BigEndianSwap => |[a, b, c, d, e, f, g, h]| [g, h, e, f, c, d, a, b], // GHEFCDAB
        ByteOrder::LittleEndianSwap => |[a, b, c, d, e, f, g, h]| [b, a, d, c, f, e, h, g], // BADCFEHG
    }
}

// ============================================================================
// Response Packing
// ============================================================================

/// Pack register values into wire-order (big-endian) bytes.
pub fn pack_registers(registers: &[u16]) -> Bytes {
    let mut buf = BytesMut::with_capacity(registers.len() * 2);
    for &reg in registers {
        buf.put_u16(reg);
    }
    buf.freeze()
}

/// Pack coil states into bytes, LSB first within each byte.
pub fn pack_bits(bits: &[bool]) -> Bytes {
    let mut buf = BytesMut::zeroed(bits.len().div_ceil(8));
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            buf[i / 8] |= 1 << (i % 8);
        }
    }
    buf.freeze()
}

/// Extract bit `offset` from a packed coil span.
#[inline]
pub fn bit_at(bytes: &[u8], offset: usize) -> Option<u8> {
    bytes.get(offset / 8).map(|b| (b >> (offset % 8)) & 0x01)
}

// ============================================================================
// Tests
// ============================================================================
