//! Fuzz target for field converters
//!
//! Builds a converter from an arbitrary type description and decodes an
//! arbitrary span with it. Building may fail, decoding may only fail with
//! a short span; neither may panic.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use modbus_planner::{build_converter, ByteOrder, DecodeError, InputType, OutputType};

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    type_name: u8,
    bit: u8,
    length: u8,
    order: u8,
    output: u8,
    scale: Option<f64>,
    span: &'a [u8],
}

const NAMES: [&str; 19] = [
    "INT8L", "INT8H", "UINT8L", "UINT8H", "INT16", "UINT16", "INT32", "UINT32", "INT64",
    "UINT64", "FLOAT16", "FLOAT32", "FLOAT64", "BIT", "STRING", "FIXED", "UFIXED", "", "BOGUS",
];

const OUTPUTS: [Option<OutputType>; 6] = [
    None,
    Some(OutputType::Int64),
    Some(OutputType::Uint64),
    Some(OutputType::Float64),
    Some(OutputType::Bool),
    Some(OutputType::String),
];

fuzz_target!(|input: Input<'_>| {
    let name = NAMES[usize::from(input.type_name) % NAMES.len()];
    let Ok(input_type) = InputType::from_name(name, input.bit, u16::from(input.length)) else {
        return;
    };
    let order = ByteOrder::ALL[usize::from(input.order) % ByteOrder::ALL.len()];
    let output = OUTPUTS[usize::from(input.output) % OUTPUTS.len()];

    let Ok(converter) = build_converter(input_type, order, output, input.scale) else {
        return;
    };
    match converter.decode(input.span) {
        Ok(_) => {}
        Err(DecodeError::ShortSpan { expected, actual }) => {
            assert!(actual < expected);
            assert_eq!(actual, input.span.len());
        }
    }
});
