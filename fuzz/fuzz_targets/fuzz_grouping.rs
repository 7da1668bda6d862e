//! Fuzz target for request grouping
//!
//! Groups an arbitrary field list with every policy and checks that each
//! real field is read exactly once, inside a request that covers it.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use modbus_planner::{
    build_converter, group_fields_to_requests, ByteOrder, Field, GroupingParams, InputType,
    Optimization,
};

#[derive(Debug, Arbitrary)]
struct RawField {
    address: u16,
    length: u8,
    omit: bool,
}

#[derive(Debug, Arbitrary)]
struct Input {
    fields: Vec<RawField>,
    burst: u8,
    max_extra: u8,
    from_zero: bool,
}

const POLICIES: [Optimization; 5] = [
    Optimization::None,
    Optimization::Shrink,
    Optimization::Rearrange,
    Optimization::Aggressive,
    Optimization::MaxInsert,
];

fuzz_target!(|input: Input| {
    let burst = u16::from(input.burst).clamp(1, 125);
    let Ok(converter) = build_converter(InputType::Uint16, ByteOrder::BigEndian, None, None) else {
        return;
    };

    let mut fields = Vec::new();
    for (i, raw) in input.fields.iter().take(64).enumerate() {
        let length = u16::from(raw.length).clamp(1, burst);
        if u32::from(raw.address) + u32::from(length) > 65535 {
            continue;
        }
        if raw.omit {
            fields.push(Field::omitted(raw.address, length));
        } else {
            fields.push(Field::new(format!("f{i}"), "fuzz", raw.address, length, converter.clone()));
        }
    }
    let real = fields.iter().filter(|f| !f.omit).count();

    for optimization in POLICIES {
        let params = GroupingParams {
            max_batch_size: burst,
            optimization,
            enforce_from_zero: input.from_zero,
            max_extra_registers: u16::from(input.max_extra).clamp(1, 125),
            ..Default::default()
        };
        let requests = group_fields_to_requests(fields.clone(), &params);

        let read: usize = requests.iter().map(|r| r.fields.len()).sum();
        assert_eq!(read, real, "{optimization}");
        for request in &requests {
            for field in &request.fields {
                assert!(field.address >= request.address);
                assert!(
                    u32::from(field.address) + u32::from(field.length)
                        <= u32::from(request.address) + u32::from(request.length)
                );
            }
        }
    }
});
