//! # Value Conversion
//!
//! Builds per-field decoders that turn a raw response byte span into a
//! [`FieldValue`]. All type, byte-order and output decisions are made once
//! in [`build_converter`]; the returned [`Converter`] is a single call on the
//! polling path.
//!
//! ## Supported Input Types
//!
//! | Type | Registers | Default output |
//! |------|-----------|----------------|
//! | INT8L, INT8H | 1 | INT64 |
//! | UINT8L, UINT8H | 1 | UINT64 |
//! | INT16 / UINT16 | 1 | INT64 / UINT64 |
//! | INT32 / UINT32 | 2 | INT64 / UINT64 |
//! | INT64 / UINT64 | 4 | INT64 / UINT64 |
//! | FLOAT16 / FLOAT32 / FLOAT64 | 1 / 2 / 4 | FLOAT64 |
//! | FIXED / UFIXED | 1, 2 or 4 | FLOAT64 |
//! | BIT | 1 | UINT64 |
//! | STRING | n | STRING |
//!
//! A non-zero scale turns every numeric output into FLOAT64: the raw value
//! is decoded, widened, then multiplied.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use half::f16;

use crate::bytes::{reorder_4_fn, reorder_8_fn, word_fn, ByteOrder};
use crate::constants::MAX_BIT_INDEX;
use crate::error::{ConfigError, ConfigResult, DecodeError};
use crate::value::FieldValue;

// ============================================================================
// Input and Output Types
// ============================================================================

/// Register layout of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputType {
    Int8L,
    Int8H,
    Uint8L,
    Uint8H,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float16,
    Float32,
    Float64,
    /// Signed fixed-point (pre-scaled integer), 1 register
    Fixed16,
    Fixed32,
    Fixed64,
    /// Unsigned fixed-point (pre-scaled integer), 1 register
    Ufixed16,
    Ufixed32,
    Ufixed64,
    /// Single bit of one register
    Bit(u8),
    /// Null-terminated string spanning the given number of registers
    String(u16),
}

/// Decides which outputs an input may widen to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputClass {
    Signed,
    Unsigned,
    Float,
    Fixed,
    Bit,
    String,
}

impl InputType {
    /// Parse a type name as used by the block dialects.
    ///
    /// `bit` is only consulted for `BIT`, `length` (in registers) only for
    /// `STRING`; a non-zero length on any other type is rejected.
    pub fn from_name(name: &str, bit: u8, length: u16) -> ConfigResult<Self> {
        let input = match name.trim().to_ascii_uppercase().as_str() {
            "INT8L" => Self::Int8L,
            "INT8H" => Self::Int8H,
            "UINT8L" => Self::Uint8L,
            "UINT8H" => Self::Uint8H,
            "INT16" => Self::Int16,
            "UINT16" => Self::Uint16,
            "INT32" => Self::Int32,
            "UINT32" => Self::Uint32,
            "INT64" => Self::Int64,
            "UINT64" => Self::Uint64,
            "FLOAT16" | "FLOAT16-IEEE" => Self::Float16,
            "FLOAT32" | "FLOAT32-IEEE" => Self::Float32,
            "FLOAT64" | "FLOAT64-IEEE" => Self::Float64,
            "BIT" => {
                if bit > MAX_BIT_INDEX {
                    return Err(ConfigError::InvalidBit(bit));
                }
                Self::Bit(bit)
            }
            "STRING" => {
                if length == 0 {
                    return Err(ConfigError::MissingLength);
                }
                return Ok(Self::String(length));
            }
            _ => return Err(ConfigError::UnknownInputType(name.to_string())),
        };
        if length != 0 {
            return Err(ConfigError::LengthNotAllowed(input.name().to_string()));
        }
        Ok(input)
    }

    /// Fixed-point value spanning `registers` registers.
    pub fn fixed(signed: bool, registers: usize) -> Option<Self> {
        match (signed, registers) {
            (true, 1) => Some(Self::Fixed16),
            (true, 2) => Some(Self::Fixed32),
            (true, 4) => Some(Self::Fixed64),
            (false, 1) => Some(Self::Ufixed16),
            (false, 2) => Some(Self::Ufixed32),
            (false, 4) => Some(Self::Ufixed64),
            _ => None,
        }
    }

    /// Number of registers the value occupies.
    #[inline]
    pub fn registers(&self) -> u16 {
        match self {
            Self::Int8L
            | Self::Int8H
            | Self::Uint8L
            | Self::Uint8H
            | Self::Int16
            | Self::Uint16
            | Self::Float16
            | Self::Fixed16
            | Self::Ufixed16
            | Self::Bit(_) => 1,
            Self::Int32 | Self::Uint32 | Self::Float32 | Self::Fixed32 | Self::Ufixed32 => 2,
            Self::Int64 | Self::Uint64 | Self::Float64 | Self::Fixed64 | Self::Ufixed64 => 4,
            Self::String(registers) => *registers,
        }
    }

    pub fn class(&self) -> InputClass {
        match self {
            Self::Int8L | Self::Int8H | Self::Int16 | Self::Int32 | Self::Int64 => InputClass::Signed,
            Self::Uint8L | Self::Uint8H | Self::Uint16 | Self::Uint32 | Self::Uint64 => {
                InputClass::Unsigned
            }
            Self::Float16 | Self::Float32 | Self::Float64 => InputClass::Float,
            Self::Fixed16
            | Self::Fixed32
            | Self::Fixed64
            | Self::Ufixed16
            | Self::Ufixed32
            | Self::Ufixed64 => InputClass::Fixed,
            Self::Bit(_) => InputClass::Bit,
            Self::String(_) => InputClass::String,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Int8L => "INT8L",
            Self::Int8H => "INT8H",
            Self::Uint8L => "UINT8L",
            Self::Uint8H => "UINT8H",
            Self::Int16 => "INT16",
            Self::Uint16 => "UINT16",
            Self::Int32 => "INT32",
            Self::Uint32 => "UINT32",
            Self::Int64 => "INT64",
            Self::Uint64 => "UINT64",
            Self::Float16 => "FLOAT16",
            Self::Float32 => "FLOAT32",
            Self::Float64 => "FLOAT64",
            Self::Fixed16 | Self::Fixed32 | Self::Fixed64 => "FIXED",
            Self::Ufixed16 | Self::Ufixed32 | Self::Ufixed64 => "UFIXED",
            Self::Bit(_) => "BIT",
            Self::String(_) => "STRING",
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Type of the emitted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputType {
    Int64,
    Uint64,
    Float64,
    Bool,
    String,
}

impl OutputType {
    /// Parse an output name where an empty string selects the default.
    pub fn parse_optional(name: &str) -> ConfigResult<Option<Self>> {
        if name.trim().is_empty() {
            Ok(None)
        } else {
            name.parse().map(Some)
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Int64 => "INT64",
            Self::Uint64 => "UINT64",
            Self::Float64 => "FLOAT64",
            Self::Bool => "BOOL",
            Self::String => "STRING",
        }
    }
}

impl FromStr for OutputType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INT64" => Ok(Self::Int64),
            "UINT64" => Ok(Self::Uint64),
            "FLOAT64" => Ok(Self::Float64),
            "BOOL" => Ok(Self::Bool),
            "STRING" => Ok(Self::String),
            _ => Err(ConfigError::UnknownOutputType(s.to_string())),
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Converter
// ============================================================================

type DecodeFn = dyn Fn(&[u8]) -> Result<FieldValue, DecodeError> + Send + Sync;

/// Decoder for one field, built at configuration time.
#[derive(Clone)]
pub struct Converter {
    input: Option<InputType>,
    output: OutputType,
    decode: Arc<DecodeFn>,
}

impl Converter {
    /// Decode a field's byte span.
    ///
    /// For registers the span starts at the field's first register; for
    /// coils it is a single byte holding 0 or 1.
    #[inline]
    pub fn decode(&self, span: &[u8]) -> Result<FieldValue, DecodeError> {
        (self.decode)(span)
    }

    /// Input type, `None` for coil and discrete input converters.
    pub fn input(&self) -> Option<InputType> {
        self.input
    }

    pub fn output(&self) -> OutputType {
        self.output
    }

    /// Converter for a coil or discrete input bit.
    ///
    /// Emits `UINT64` (0/1) by default, or `BOOL`.
    pub fn coil(output: Option<OutputType>) -> ConfigResult<Self> {
        let output = match output {
            None | Some(OutputType::Uint64) => OutputType::Uint64,
            Some(OutputType::Bool) => OutputType::Bool,
            Some(other) => {
                return Err(ConfigError::IncompatibleOutput {
                    input: "COIL".to_string(),
                    output: other.name().to_string(),
                })
            }
        };
        Ok(Self {
            input: None,
            output,
            decode: bit_decoder(|s: &[u8]| Ok(take::<1>(s)?[0] != 0), output),
        })
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("input", &self.input)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

/// Build the decoder for `input` read with `order`.
///
/// `output` of `None` selects the default widening; a zero scale counts as
/// no scale. Every invalid combination is rejected here so decoding can only
/// fail on a short span.
///
/// # Example
///
/// ```rust
/// use modbus_planner::{build_converter, ByteOrder, FieldValue, InputType};
///
/// let conv = build_converter(InputType::Uint16, ByteOrder::BigEndian, None, Some(0.1)).unwrap();
/// assert_eq!(conv.decode(&[0x08, 0x98]).unwrap(), FieldValue::Float(220.0));
/// ```
pub fn build_converter(
    input: InputType,
    order: ByteOrder,
    output: Option<OutputType>,
    scale: Option<f64>,
) -> ConfigResult<Converter> {
    let scale = scale.filter(|s| *s != 0.0);
    let output = resolve_output(input, output, scale)?;

    let word = word_fn(order);
    let dword = reorder_4_fn(order);
    let qword = reorder_8_fn(order);
    let fixed_scale = Some(scale.unwrap_or(1.0));

    let decode = match input {
        InputType::Int8L => signed(move |s| Ok(i64::from(word(take(s)?) as u8 as i8)), output, scale),
        InputType::Int8H => signed(
            move |s| Ok(i64::from((word(take(s)?) >> 8) as u8 as i8)),
            output,
            scale,
        ),
        InputType::Int16 => signed(move |s| Ok(i64::from(word(take(s)?) as i16)), output, scale),
        InputType::Int32 => signed(
            move |s| Ok(i64::from(i32::from_be_bytes(dword(take(s)?)))),
            output,
            scale,
        ),
        InputType::Int64 => signed(move |s| Ok(i64::from_be_bytes(qword(take(s)?))), output, scale),
        InputType::Uint8L => unsigned(move |s| Ok(u64::from(word(take(s)?) & 0x00ff)), output, scale),
        InputType::Uint8H => unsigned(move |s| Ok(u64::from(word(take(s)?) >> 8)), output, scale),
        InputType::Uint16 => unsigned(move |s| Ok(u64::from(word(take(s)?))), output, scale),
        InputType::Uint32 => unsigned(
            move |s| Ok(u64::from(u32::from_be_bytes(dword(take(s)?)))),
            output,
            scale,
        ),
        InputType::Uint64 => unsigned(move |s| Ok(u64::from_be_bytes(qword(take(s)?))), output, scale),
        InputType::Float16 => float(move |s| Ok(f16::from_bits(word(take(s)?)).to_f64()), scale),
        InputType::Float32 => float(
            move |s| Ok(f64::from(f32::from_be_bytes(dword(take(s)?)))),
            scale,
        ),
        InputType::Float64 => float(move |s| Ok(f64::from_be_bytes(qword(take(s)?))), scale),
        InputType::Fixed16 => signed(move |s| Ok(i64::from(word(take(s)?) as i16)), output, fixed_scale),
        InputType::Fixed32 => signed(
            move |s| Ok(i64::from(i32::from_be_bytes(dword(take(s)?)))),
            output,
            fixed_scale,
        ),
        InputType::Fixed64 => signed(
            move |s| Ok(i64::from_be_bytes(qword(take(s)?))),
            output,
            fixed_scale,
        ),
        InputType::Ufixed16 => unsigned(move |s| Ok(u64::from(word(take(s)?))), output, fixed_scale),
        InputType::Ufixed32 => unsigned(
            move |s| Ok(u64::from(u32::from_be_bytes(dword(take(s)?)))),
            output,
            fixed_scale,
        ),
        InputType::Ufixed64 => unsigned(
            move |s| Ok(u64::from_be_bytes(qword(take(s)?))),
            output,
            fixed_scale,
        ),
        InputType::Bit(bit) => bit_decoder(move |s| Ok((word(take(s)?) >> bit) & 0x01 == 1), output),
        InputType::String(registers) => string_decoder(word, registers),
    };

    Ok(Converter {
        input: Some(input),
        output,
        decode,
    })
}

/// Pick the output for `input`, or reject the pairing.
fn resolve_output(
    input: InputType,
    requested: Option<OutputType>,
    scale: Option<f64>,
) -> ConfigResult<OutputType> {
    let class = input.class();
    if scale.is_some() && matches!(class, InputClass::Bit | InputClass::String) {
        return Err(ConfigError::ScaleNotAllowed(input.name().to_string()));
    }

    let scaled = scale.is_some();
    let default = match class {
        InputClass::Signed if !scaled => OutputType::Int64,
        InputClass::Unsigned if !scaled => OutputType::Uint64,
        InputClass::Signed | InputClass::Unsigned | InputClass::Float | InputClass::Fixed => {
            OutputType::Float64
        }
        InputClass::Bit => OutputType::Uint64,
        InputClass::String => OutputType::String,
    };
    let Some(output) = requested else {
        return Ok(default);
    };

    let legal = match class {
        InputClass::Signed | InputClass::Unsigned if scaled => output == OutputType::Float64,
        InputClass::Signed | InputClass::Unsigned => matches!(
            output,
            OutputType::Int64 | OutputType::Uint64 | OutputType::Float64
        ),
        InputClass::Float | InputClass::Fixed => output == OutputType::Float64,
        InputClass::Bit => matches!(output, OutputType::Uint64 | OutputType::Bool),
        InputClass::String => output == OutputType::String,
    };
    if legal {
        Ok(output)
    } else {
        Err(ConfigError::IncompatibleOutput {
            input: input.name().to_string(),
            output: output.name().to_string(),
        })
    }
}

// ============================================================================
// Decoder Builders
// ============================================================================

#[inline]
fn take<const N: usize>(span: &[u8]) -> Result<[u8; N], DecodeError> {
    span.first_chunk::<N>()
        .copied()
        .ok_or(DecodeError::ShortSpan {
            expected: N,
            actual: span.len(),
        })
}

fn decoder<F>(f: F) -> Arc<DecodeFn>
where
    F: Fn(&[u8]) -> Result<FieldValue, DecodeError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn signed<R>(read: R, output: OutputType, scale: Option<f64>) -> Arc<DecodeFn>
where
    R: Fn(&[u8]) -> Result<i64, DecodeError> + Send + Sync + 'static,
{
    match (scale, output) {
        (Some(scale), _) => decoder(move |s| read(s).map(|v| FieldValue::Float(v as f64 * scale))),
        (None, OutputType::Uint64) => decoder(move |s| read(s).map(|v| FieldValue::Uint(v as u64))),
        (None, OutputType::Float64) => decoder(move |s| read(s).map(|v| FieldValue::Float(v as f64))),
        (None, _) => decoder(move |s| read(s).map(FieldValue::from)),
    }
}

fn unsigned<R>(read: R, output: OutputType, scale: Option<f64>) -> Arc<DecodeFn>
where
    R: Fn(&[u8]) -> Result<u64, DecodeError> + Send + Sync + 'static,
{
    match (scale, output) {
        (Some(scale), _) => decoder(move |s| read(s).map(|v| FieldValue::Float(v as f64 * scale))),
        (None, OutputType::Int64) => decoder(move |s| read(s).map(|v| FieldValue::Int(v as i64))),
        (None, OutputType::Float64) => decoder(move |s| read(s).map(|v| FieldValue::Float(v as f64))),
        (None, _) => decoder(move |s| read(s).map(FieldValue::from)),
    }
}

fn float<R>(read: R, scale: Option<f64>) -> Arc<DecodeFn>
where
    R: Fn(&[u8]) -> Result<f64, DecodeError> + Send + Sync + 'static,
{
    match scale {
        Some(scale) => decoder(move |s| read(s).map(|v| FieldValue::Float(v * scale))),
        None => decoder(move |s| read(s).map(FieldValue::from)),
    }
}

fn bit_decoder<R>(read: R, output: OutputType) -> Arc<DecodeFn>
where
    R: Fn(&[u8]) -> Result<bool, DecodeError> + Send + Sync + 'static,
{
    match output {
        OutputType::Bool => decoder(move |s| read(s).map(FieldValue::from)),
        _ => decoder(move |s| read(s).map(|v| FieldValue::Uint(u64::from(v)))),
    }
}

fn string_decoder(word: fn([u8; 2]) -> u16, registers: u16) -> Arc<DecodeFn> {
    let expected = usize::from(registers) * 2;
    decoder(move |s| {
        let raw = s.get(..expected).ok_or(DecodeError::ShortSpan {
            expected,
            actual: s.len(),
        })?;
        let mut out = Vec::with_capacity(expected);
        for pair in raw.chunks_exact(2) {
            out.extend_from_slice(&word([pair[0], pair[1]]).to_be_bytes());
        }
        if let Some(end) = out.iter().position(|&b| b == 0) {
            out.truncate(end);
        }
        Ok(FieldValue::from(String::from_utf8_lossy(&out).into_owned()))
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::{reorder_4, reorder_8};
    use proptest::prelude::*;

    fn decode(input: InputType, order: &str, output: Option<OutputType>, scale: Option<f64>, span: &[u8]) -> FieldValue {
        let order: ByteOrder = order.parse().unwrap();
        build_converter(input, order, output, scale)
            .unwrap()
            .decode(span)
            .unwrap()
    }

    #[test]
    fn test_float32_pi() {
        let value = decode(InputType::Float32, "ABCD", None, None, &[0x40, 0x49, 0x0f, 0xdb]);
        assert_eq!(value, FieldValue::Float(3.1415927410125732421875));
    }

    #[test]
    fn test_uint16_scaled() {
        let value = decode(InputType::Uint16, "AB", None, Some(0.1), &[0x08, 0x98]);
        assert_eq!(value, FieldValue::Float(220.0));
    }

    #[test]
    fn test_sub_register_bytes() {
        let span = [0x18, 0x0d];
        assert_eq!(decode(InputType::Uint8L, "ABCD", None, None, &span), FieldValue::Uint(13));
        assert_eq!(decode(InputType::Uint8H, "ABCD", None, None, &span), FieldValue::Uint(24));
        assert_eq!(decode(InputType::Uint8L, "DCBA", None, None, &span), FieldValue::Uint(24));
        assert_eq!(decode(InputType::Int8L, "ABCD", None, None, &[0x00, 0xfe]), FieldValue::Int(-2));
        assert_eq!(decode(InputType::Int8H, "ABCD", None, None, &[0x80, 0x00]), FieldValue::Int(-128));
    }

    #[test]
    fn test_bit_extraction() {
        let span = [0x18, 0x0d];
        assert_eq!(decode(InputType::Bit(3), "ABCD", None, None, &span), FieldValue::Uint(1));
        assert_eq!(decode(InputType::Bit(14), "ABCD", None, None, &span), FieldValue::Uint(0));
        assert_eq!(
            decode(InputType::Bit(12), "ABCD", Some(OutputType::Bool), None, &span),
            FieldValue::Bool(true)
        );
    }

    #[test]
    fn test_int16_orders() {
        assert_eq!(decode(InputType::Int16, "ABCD", None, None, &[0xff, 0xfe]), FieldValue::Int(-2));
        assert_eq!(decode(InputType::Int16, "BA", None, None, &[0xfe, 0xff]), FieldValue::Int(-2));
        assert_eq!(decode(InputType::Int16, "CDAB", None, None, &[0xff, 0xfe]), FieldValue::Int(-2));
        assert_eq!(decode(InputType::Int16, "BADC", None, None, &[0xfe, 0xff]), FieldValue::Int(-2));
    }

    #[test]
    fn test_int32_all_orders() {
        let be = (-123_456i32).to_be_bytes();
        for order in ByteOrder::ALL {
            let wire = reorder_4(be, order);
            let conv = build_converter(InputType::Int32, order, None, None).unwrap();
            assert_eq!(conv.decode(&wire).unwrap(), FieldValue::Int(-123_456), "{order}");
        }
    }

    #[test]
    fn test_uint64_word_swapped() {
        let wire = [0xDE, 0xF0, 0x9A, 0xBC, 0x56, 0x78, 0x12, 0x34];
        assert_eq!(
            decode(InputType::Uint64, "GHEFCDAB", None, None, &wire),
            FieldValue::Uint(0x123456789ABCDEF0)
        );
    }

    #[test]
    fn test_float64_little_endian() {
        let wire = reorder_8(std::f64::consts::E.to_be_bytes(), ByteOrder::LittleEndian);
        assert_eq!(
            decode(InputType::Float64, "HGFEDCBA", None, None, &wire),
            FieldValue::Float(std::f64::consts::E)
        );
    }

    #[test]
    fn test_float16() {
        assert_eq!(decode(InputType::Float16, "ABCD", None, None, &[0xb8, 0x14]), FieldValue::Float(-0.509765625));
        assert_eq!(decode(InputType::Float16, "ABCD", None, None, &[0x3c, 0x00]), FieldValue::Float(1.0));
        assert_eq!(decode(InputType::Float16, "ABCD", None, None, &[0x7c, 0x00]), FieldValue::Float(f64::INFINITY));
        assert_eq!(
            decode(InputType::Float16, "ABCD", None, None, &[0x00, 0x01]),
            FieldValue::Float(2f64.powi(-24))
        );
        assert_eq!(
            decode(InputType::Float16, "BA", None, None, &[0x14, 0xb8]),
            FieldValue::Float(-0.509765625)
        );
        assert!(matches!(
            decode(InputType::Float16, "ABCD", None, None, &[0x7e, 0x00]),
            FieldValue::Float(v) if v.is_nan()
        ));
    }

    #[test]
    fn test_string_truncates_at_nul() {
        let span = b"hello\0\0\0";
        assert_eq!(
            decode(InputType::String(4), "ABCD", None, None, span),
            FieldValue::Str("hello".into())
        );
        let swapped = b"ehll\0o\0\0";
        assert_eq!(
            decode(InputType::String(4), "DCBA", None, None, swapped),
            FieldValue::Str("hello".into())
        );
    }

    #[test]
    fn test_explicit_widening() {
        let span = [0xff, 0xfe];
        assert_eq!(
            decode(InputType::Int16, "ABCD", Some(OutputType::Float64), None, &span),
            FieldValue::Float(-2.0)
        );
        assert_eq!(
            decode(InputType::Int16, "ABCD", Some(OutputType::Uint64), None, &span),
            FieldValue::Uint(u64::MAX - 1)
        );
        assert_eq!(
            decode(InputType::Uint16, "ABCD", Some(OutputType::Int64), None, &span),
            FieldValue::Int(0xfffe)
        );
    }

    #[test]
    fn test_fixed_point_is_float() {
        assert_eq!(
            decode(InputType::Fixed16, "AB", None, Some(0.01), &[0xff, 0x9c]),
            FieldValue::Float(-1.0)
        );
        assert_eq!(
            decode(InputType::Ufixed32, "ABCD", None, None, &[0x00, 0x00, 0x01, 0x00]),
            FieldValue::Float(256.0)
        );
    }

    #[test]
    fn test_zero_scale_means_unscaled() {
        assert_eq!(decode(InputType::Int16, "ABCD", None, Some(0.0), &[0x00, 0x05]), FieldValue::Int(5));
    }

    #[test]
    fn test_incompatible_outputs_rejected() {
        let order = ByteOrder::BigEndian;
        assert!(matches!(
            build_converter(InputType::Float32, order, Some(OutputType::Uint64), None),
            Err(ConfigError::IncompatibleOutput { .. })
        ));
        assert!(matches!(
            build_converter(InputType::Int32, order, Some(OutputType::Int64), Some(2.0)),
            Err(ConfigError::IncompatibleOutput { .. })
        ));
        assert!(matches!(
            build_converter(InputType::Uint16, order, Some(OutputType::Bool), None),
            Err(ConfigError::IncompatibleOutput { .. })
        ));
        assert_eq!(
            build_converter(InputType::Bit(2), order, None, Some(2.0)).unwrap_err(),
            ConfigError::ScaleNotAllowed("BIT".into())
        );
        assert_eq!(
            build_converter(InputType::String(2), order, None, Some(2.0)).unwrap_err(),
            ConfigError::ScaleNotAllowed("STRING".into())
        );
    }

    #[test]
    fn test_input_names() {
        assert_eq!(InputType::from_name("uint32", 0, 0), Ok(InputType::Uint32));
        assert_eq!(InputType::from_name("FLOAT32-IEEE", 0, 0), Ok(InputType::Float32));
        assert_eq!(InputType::from_name("BIT", 7, 0), Ok(InputType::Bit(7)));
        assert_eq!(InputType::from_name("STRING", 0, 5), Ok(InputType::String(5)));
        assert_eq!(InputType::from_name("BIT", 16, 0), Err(ConfigError::InvalidBit(16)));
        assert_eq!(InputType::from_name("STRING", 0, 0), Err(ConfigError::MissingLength));
        assert_eq!(
            InputType::from_name("INT16", 0, 2),
            Err(ConfigError::LengthNotAllowed("INT16".into()))
        );
        assert_eq!(
            InputType::from_name("", 0, 0),
            Err(ConfigError::UnknownInputType(String::new()))
        );
        assert_eq!(InputType::fixed(true, 2), Some(InputType::Fixed32));
        assert_eq!(InputType::fixed(false, 3), None);
    }

    #[test]
    fn test_output_names() {
        assert_eq!(OutputType::parse_optional(""), Ok(None));
        assert_eq!(OutputType::parse_optional("float64"), Ok(Some(OutputType::Float64)));
        assert_eq!(
            "UINT8".parse::<OutputType>(),
            Err(ConfigError::UnknownOutputType("UINT8".into()))
        );
    }

    #[test]
    fn test_coil_converter() {
        let conv = Converter::coil(None).unwrap();
        assert_eq!(conv.decode(&[1]).unwrap(), FieldValue::Uint(1));
        let conv = Converter::coil(Some(OutputType::Bool)).unwrap();
        assert_eq!(conv.decode(&[0]).unwrap(), FieldValue::Bool(false));
        assert!(Converter::coil(Some(OutputType::Float64)).is_err());
    }

    #[test]
    fn test_short_span_is_decode_error() {
        let conv = build_converter(InputType::Uint32, ByteOrder::BigEndian, None, None).unwrap();
        assert_eq!(
            conv.decode(&[0x00, 0x01]),
            Err(DecodeError::ShortSpan { expected: 4, actual: 2 })
        );
        let conv = build_converter(InputType::String(3), ByteOrder::BigEndian, None, None).unwrap();
        assert!(conv.decode(b"ab").is_err());
    }

    proptest! {
        #[test]
        fn prop_uint32_survives_every_order(value: u32, idx in 0usize..4) {
            let order = ByteOrder::ALL[idx];
            let wire = reorder_4(value.to_be_bytes(), order);
            let conv = build_converter(InputType::Uint32, order, None, None).unwrap();
            prop_assert_eq!(conv.decode(&wire).unwrap(), FieldValue::Uint(u64::from(value)));
        }

        #[test]
        fn prop_int64_survives_every_order(value: i64, idx in 0usize..4) {
            let order = ByteOrder::ALL[idx];
            let wire = reorder_8(value.to_be_bytes(), order);
            let conv = build_converter(InputType::Int64, order, None, None).unwrap();
            prop_assert_eq!(conv.decode(&wire).unwrap(), FieldValue::Int(value));
        }

        #[test]
        fn prop_scaled_equals_widened_times_scale(raw: i16, scale in -1000.0f64..1000.0) {
            prop_assume!(scale != 0.0);
            let conv = build_converter(InputType::Int16, ByteOrder::BigEndian, None, Some(scale)).unwrap();
            prop_assert_eq!(
                conv.decode(&raw.to_be_bytes()).unwrap(),
                FieldValue::Float(f64::from(raw) * scale)
            );
        }
    }
}
