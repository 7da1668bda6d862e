//! Fixed-layout dialect.
//!
//! The original configuration style: one slave, four lists of fields at the
//! top level, each field listing every register address it spans.
//!
//! ```toml
//! slave_id = 1
//! coils = [{ name = "start", address = [0] }]
//! holding_registers = [
//!     { name = "voltage", byte_order = "AB", data_type = "FIXED", scale = 0.1, address = [0] },
//!     { name = "energy", byte_order = "ABCD", data_type = "UINT32", scale = 1.0, address = [1, 2] },
//! ]
//! ```
//!
//! `FIXED` is a signed and `UFIXED`/`FLOAT32` an unsigned integer of one, two
//! or four registers, always emitted as a scaled float. `BIT` reads bit `bit`
//! of a single register, `STRING` spans every listed address and takes a
//! two-letter byte order. Requests are never optimized beyond splitting at the
//! burst size.

use std::collections::HashSet;

use serde::Deserialize;

use super::check_field_range;
use crate::bytes::ByteOrder;
use crate::codec::{build_converter, Converter, InputType};
use crate::constants::DEFAULT_MEASUREMENT;
use crate::device_limits::DeviceLimits;
use crate::error::{ConfigError, ConfigResult};
use crate::field::{Field, RegisterKind, SlavePlan, Tags};
use crate::grouping::{group_fields_to_requests, GroupingParams, Optimization};

const BYTE_ORDERS: [&str; 10] = [
    "AB", "BA", "ABCD", "CDAB", "BADC", "DCBA", "ABCDEFGH", "HGFEDCBA", "BADCFEHG", "GHEFCDAB",
];

/// One entry of `coils`, `discrete_inputs`, `holding_registers` or
/// `input_registers`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegisterField {
    pub measurement: String,
    pub name: String,
    pub byte_order: String,
    pub data_type: String,
    pub scale: f64,
    pub bit: u8,
    pub address: Vec<u16>,
}

impl Default for RegisterField {
    fn default() -> Self {
        Self {
            measurement: String::new(),
            name: String::new(),
            byte_order: String::new(),
            data_type: String::new(),
            scale: 1.0,
            bit: 0,
            address: Vec::new(),
        }
    }
}

/// The fixed-layout field lists of one slave.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegisterDefinition {
    pub slave_id: u8,
    pub coils: Vec<RegisterField>,
    pub discrete_inputs: Vec<RegisterField>,
    pub holding_registers: Vec<RegisterField>,
    pub input_registers: Vec<RegisterField>,
}

impl RegisterDefinition {
    fn fields(&self, kind: RegisterKind) -> &[RegisterField] {
        match kind {
            RegisterKind::Coil => &self.coils,
            RegisterKind::Discrete => &self.discrete_inputs,
            RegisterKind::Holding => &self.holding_registers,
            RegisterKind::Input => &self.input_registers,
        }
    }

    pub(crate) fn process(&self, limits: &DeviceLimits) -> ConfigResult<SlavePlan> {
        if RegisterKind::ALL.iter().all(|k| self.fields(*k).is_empty()) {
            return Err(ConfigError::EmptyBlock("register"));
        }

        let mut plan = SlavePlan::new();
        for kind in RegisterKind::ALL {
            let definitions = self.fields(kind);
            if definitions.is_empty() {
                continue;
            }
            let fields = validate_fields(kind, definitions, limits)?;
            let params = GroupingParams {
                max_batch_size: limits.burst_size(kind),
                optimization: Optimization::None,
                enforce_from_zero: limits.enforce_from_zero(kind),
                max_extra_registers: 0,
                tags: Tags::default(),
            };
            let requests = group_fields_to_requests(fields, &params);
            if !requests.is_empty() {
                plan.entry(self.slave_id).or_default().get_mut(kind).extend(requests);
            }
        }
        Ok(plan)
    }
}

fn validate_fields(
    kind: RegisterKind,
    definitions: &[RegisterField],
    limits: &DeviceLimits,
) -> ConfigResult<Vec<Field>> {
    let mut names = HashSet::new();
    let mut addresses = HashSet::new();
    let mut fields = Vec::with_capacity(definitions.len());

    for def in definitions {
        if def.name.is_empty() {
            return Err(ConfigError::EmptyFieldName {
                context: format!("{kind} definition"),
            });
        }
        let measurement = if def.measurement.is_empty() {
            DEFAULT_MEASUREMENT
        } else {
            def.measurement.as_str()
        };
        if !names.insert((measurement, def.name.as_str())) {
            return Err(ConfigError::DuplicateName {
                name: def.name.clone(),
                measurement: measurement.to_string(),
                kind,
            });
        }

        let count = def.address.len();
        let valid_count = match def.data_type.as_str() {
            _ if kind.is_bit() => count == 1,
            "STRING" => count >= 1,
            "BIT" => count == 1,
            _ => matches!(count, 1 | 2 | 4),
        };
        let length = match u16::try_from(count) {
            Ok(length) if valid_count => length,
            _ => {
                return Err(ConfigError::InvalidAddressCount {
                    name: def.name.clone(),
                    count,
                })
            }
        };
        if def.address.windows(2).any(|w| u32::from(w[1]) != u32::from(w[0]) + 1) {
            return Err(ConfigError::NonConsecutiveAddresses(def.name.clone()));
        }
        for address in &def.address {
            if !addresses.insert(*address) {
                return Err(ConfigError::DuplicateAddress {
                    kind,
                    address: *address,
                });
            }
        }

        let address = def.address[0];
        check_field_range(address, length, kind, limits)?;

        let converter = if kind.is_bit() {
            Converter::coil(None)?
        } else {
            register_converter(def, length)?
        };
        fields.push(Field::new(&def.name, measurement, address, length, converter));
    }
    Ok(fields)
}

fn register_converter(def: &RegisterField, length: u16) -> ConfigResult<Converter> {
    let count = usize::from(length);
    if !BYTE_ORDERS.contains(&def.byte_order.as_str()) {
        return Err(ConfigError::UnknownByteOrder(def.byte_order.clone()));
    }
    // Strings are ordered per word whatever their length.
    let order_registers = if def.data_type == "STRING" { 1 } else { count };
    if def.byte_order.len() != 2 * order_registers {
        return Err(ConfigError::ByteOrderLength {
            name: def.name.clone(),
            byte_order: def.byte_order.clone(),
            count: order_registers,
        });
    }
    if def.scale == 0.0 {
        return Err(ConfigError::ZeroScale(def.name.clone()));
    }
    let order: ByteOrder = def.byte_order.parse()?;

    let input = match def.data_type.as_str() {
        "FIXED" => InputType::fixed(true, count),
        "UFIXED" | "FLOAT32" => InputType::fixed(false, count),
        "UINT8L" | "UINT8H" | "UINT16" | "UINT32" | "UINT64" | "INT8L" | "INT8H" | "INT16"
        | "INT32" | "INT64" | "FLOAT16-IEEE" | "FLOAT32-IEEE" | "FLOAT64-IEEE" => {
            let input = InputType::from_name(&def.data_type, 0, 0)?;
            (usize::from(input.registers()) == count).then_some(input)
        }
        "BIT" => {
            let input = InputType::from_name("BIT", def.bit, 0).map_err(|e| e.in_field(&def.name))?;
            Some(input)
        }
        "STRING" => Some(InputType::from_name("STRING", 0, length)?),
        _ => return Err(ConfigError::UnknownInputType(def.data_type.clone())),
    };
    let Some(input) = input else {
        return Err(ConfigError::InvalidAddressCount {
            name: def.name.clone(),
            count,
        });
    };

    // A unit scale keeps integer types integral; fixed-point is always float.
    let scale = match input {
        InputType::Fixed16
        | InputType::Fixed32
        | InputType::Fixed64
        | InputType::Ufixed16
        | InputType::Ufixed32
        | InputType::Ufixed64 => Some(def.scale),
        _ if def.scale == 1.0 => None,
        _ => Some(def.scale),
    };
    build_converter(input, order, None, scale).map_err(|e| e.in_field(&def.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::value::FieldValue;

    fn register(name: &str, data_type: &str, byte_order: &str, address: &[u16]) -> RegisterField {
        RegisterField {
            name: name.to_string(),
            data_type: data_type.to_string(),
            byte_order: byte_order.to_string(),
            address: address.to_vec(),
            ..Default::default()
        }
    }

    fn coil(name: &str, address: u16) -> RegisterField {
        RegisterField {
            name: name.to_string(),
            address: vec![address],
            ..Default::default()
        }
    }

    fn holding(fields: Vec<RegisterField>) -> ConfigResult<SlavePlan> {
        RegisterDefinition {
            slave_id: 1,
            holding_registers: fields,
            ..Default::default()
        }
        .process(&DeviceLimits::default())
    }

    fn decode(field: &Field, span: &[u8]) -> FieldValue {
        field.converter.as_ref().unwrap().decode(span).unwrap()
    }

    #[test]
    fn test_every_list_from_toml() {
        let config = Config::from_toml_str(
            r#"
            name = "device"
            slave_id = 1
            coils = [{ name = "coil", address = [0] }]
            discrete_inputs = [{ name = "discrete", address = [0] }]
            holding_registers = [
                { name = "holding", data_type = "INT16", byte_order = "AB", scale = 1.0, address = [0] },
            ]
            input_registers = [
                { name = "input", data_type = "INT16", byte_order = "AB", address = [0] },
            ]
            "#,
        )
        .unwrap();
        let plan = config.build_plan().unwrap();
        let set = &plan[&1];
        for kind in RegisterKind::ALL {
            assert_eq!(set.get(kind).len(), 1, "{kind}");
        }
    }

    #[test]
    fn test_data_type_mapping() {
        let mut scaled = register("voltage", "UINT16", "AB", &[0]);
        scaled.scale = 0.1;
        let mut fixed = register("fixed", "FIXED", "ABCD", &[1, 2]);
        fixed.scale = 0.5;
        let plan = holding(vec![
            scaled,
            fixed,
            register("float32", "FLOAT32", "AB", &[3]),
            register("ieee", "FLOAT32-IEEE", "CDAB", &[4, 5]),
            register("plain", "INT16", "BA", &[6]),
        ])
        .unwrap();

        let request = &plan[&1].holding[0];
        assert_eq!((request.address, request.length), (0, 7));
        let fields = &request.fields;
        assert_eq!(decode(&fields[0], &[0x08, 0x98]), FieldValue::Float(220.0));
        assert_eq!(fields[1].converter.as_ref().unwrap().input(), Some(InputType::Fixed32));
        assert_eq!(decode(&fields[1], &[0xff, 0xff, 0xff, 0xfc]), FieldValue::Float(-2.0));
        assert_eq!(fields[2].converter.as_ref().unwrap().input(), Some(InputType::Ufixed16));
        assert_eq!(decode(&fields[2], &[0x00, 0x07]), FieldValue::Float(7.0));
        assert_eq!(decode(&fields[3], &[0x0f, 0xdb, 0x40, 0x49]), FieldValue::Float(3.1415927410125732));
        assert_eq!(decode(&fields[4], &[0xfe, 0xff]), FieldValue::Int(-2));
    }

    #[test]
    fn test_address_rules() {
        assert_eq!(
            holding(vec![register("a", "UINT32", "ABCD", &[1, 3])]).unwrap_err(),
            ConfigError::NonConsecutiveAddresses("a".into())
        );
        assert_eq!(
            holding(vec![register("a", "UINT16", "ABCDEF", &[1, 2, 3])]).unwrap_err(),
            ConfigError::InvalidAddressCount { name: "a".into(), count: 3 }
        );
        assert_eq!(
            holding(vec![register("a", "UINT16", "ABCD", &[1, 2])]).unwrap_err(),
            ConfigError::InvalidAddressCount { name: "a".into(), count: 2 }
        );
        assert_eq!(
            holding(vec![register("a", "UINT16", "AB", &[1]), register("b", "UINT32", "ABCD", &[0, 1])])
                .unwrap_err(),
            ConfigError::DuplicateAddress { kind: RegisterKind::Holding, address: 1 }
        );

        let coils = RegisterDefinition {
            slave_id: 1,
            coils: vec![RegisterField { address: vec![0, 1], ..coil("c", 0) }],
            ..Default::default()
        };
        assert!(matches!(
            coils.process(&DeviceLimits::default()),
            Err(ConfigError::InvalidAddressCount { count: 2, .. })
        ));
    }

    #[test]
    fn test_byte_order_rules() {
        assert_eq!(
            holding(vec![register("a", "UINT32", "AB", &[0, 1])]).unwrap_err(),
            ConfigError::ByteOrderLength { name: "a".into(), byte_order: "AB".into(), count: 2 }
        );
        assert_eq!(
            holding(vec![register("a", "UINT16", "MSW-BE", &[0])]).unwrap_err(),
            ConfigError::UnknownByteOrder("MSW-BE".into())
        );
        assert!(holding(vec![register("a", "UINT64", "GHEFCDAB", &[0, 1, 2, 3])]).is_ok());
    }

    #[test]
    fn test_scale_and_type_rules() {
        let mut zero = register("a", "UINT16", "AB", &[0]);
        zero.scale = 0.0;
        assert_eq!(holding(vec![zero]).unwrap_err(), ConfigError::ZeroScale("a".into()));

        let mut bit = register("a", "BIT", "AB", &[0]);
        bit.bit = 16;
        assert_eq!(
            holding(vec![bit]).unwrap_err(),
            ConfigError::InvalidBit(16).in_field("a")
        );
        let mut scaled = register("a", "STRING", "AB", &[0, 1]);
        scaled.scale = 0.5;
        assert_eq!(
            holding(vec![scaled]).unwrap_err(),
            ConfigError::ScaleNotAllowed("STRING".into()).in_field("a")
        );
        assert_eq!(
            holding(vec![register("a", "FLOAT64", "ABCDEFGH", &[0, 1, 2, 3])]).unwrap_err(),
            ConfigError::UnknownInputType("FLOAT64".into())
        );
    }

    #[test]
    fn test_bit_fields() {
        let mut low = register("register5_bit3", "BIT", "AB", &[5]);
        low.bit = 3;
        let mut high = register("register5_bit14", "BIT", "AB", &[5]);
        high.bit = 14;
        let plan = RegisterDefinition {
            slave_id: 1,
            input_registers: vec![low, high],
            ..Default::default()
        }
        .process(&DeviceLimits::default())
        .unwrap();

        let request = &plan[&1].input[0];
        assert_eq!((request.address, request.length), (5, 1));
        assert_eq!(decode(&request.fields[0], &[0x18, 0x0d]), FieldValue::Uint(1));
        assert_eq!(decode(&request.fields[1], &[0x18, 0x0d]), FieldValue::Uint(0));

        assert_eq!(
            holding(vec![register("wide", "BIT", "ABCD", &[5, 6])]).unwrap_err(),
            ConfigError::InvalidAddressCount { name: "wide".into(), count: 2 }
        );
    }

    #[test]
    fn test_string_fields() {
        let name: Vec<u16> = (250..257).collect();
        let plan = holding(vec![
            register("register250_abcd_string", "STRING", "AB", &name),
            register("register257_dcba_string", "STRING", "BA", &[257, 258, 259, 260, 261, 262, 263]),
        ])
        .unwrap();

        let request = &plan[&1].holding[0];
        assert_eq!((request.address, request.length), (250, 14));
        let ab = b"Modbus String\0";
        let ba = [
            0x6f, 0x4d, 0x62, 0x64, 0x73, 0x75, 0x53, 0x20, 0x72, 0x74, 0x6e, 0x69, 0x00, 0x67,
        ];
        assert_eq!(decode(&request.fields[0], ab), FieldValue::Str("Modbus String".into()));
        assert_eq!(decode(&request.fields[1], &ba), FieldValue::Str("Modbus String".into()));

        assert_eq!(
            holding(vec![register("name", "STRING", "ABCD", &[0, 1])]).unwrap_err(),
            ConfigError::ByteOrderLength { name: "name".into(), byte_order: "ABCD".into(), count: 1 }
        );
        assert_eq!(
            holding(vec![register("name", "STRING", "AB", &[0, 2])]).unwrap_err(),
            ConfigError::NonConsecutiveAddresses("name".into())
        );
    }

    #[test]
    fn test_string_at_top_of_address_space() {
        let name: Vec<u16> = (65524..65534).collect();
        let plan = holding(vec![
            register("DeviceName", "STRING", "AB", &name),
            register("DeviceConnectionStatus", "UINT16", "AB", &[65534]),
        ])
        .unwrap();

        let request = &plan[&1].holding[0];
        assert_eq!((request.address, request.length), (65524, 11));
        let mut span = b"Modbus String Hello\0".to_vec();
        span.extend_from_slice(&[0x10, 0x92]);
        assert_eq!(
            decode(&request.fields[0], &span[..20]),
            FieldValue::Str("Modbus String Hello".into())
        );
        assert_eq!(decode(&request.fields[1], &span[20..]), FieldValue::Uint(4242));

        let beyond: Vec<u16> = (65530..=65535).collect();
        assert_eq!(
            holding(vec![register("tail", "STRING", "AB", &beyond)]).unwrap_err(),
            ConfigError::AddressOverflow { address: 65530, length: 6 }
        );
        let long: Vec<u16> = (0..126).collect();
        assert_eq!(
            holding(vec![register("long", "STRING", "AB", &long)]).unwrap_err(),
            ConfigError::FieldTooLarge { length: 126, max: 125 }
        );
    }

    #[test]
    fn test_duplicate_names_per_measurement() {
        assert!(matches!(
            holding(vec![register("a", "UINT16", "AB", &[0]), register("a", "UINT16", "AB", &[1])]),
            Err(ConfigError::DuplicateName { .. })
        ));

        let mut other = register("a", "UINT16", "AB", &[1]);
        other.measurement = "other".to_string();
        assert!(holding(vec![register("a", "UINT16", "AB", &[0]), other]).is_ok());
    }

    #[test]
    fn test_empty_definitions() {
        assert_eq!(
            RegisterDefinition::default().process(&DeviceLimits::default()).unwrap_err(),
            ConfigError::EmptyBlock("register")
        );
        assert_eq!(
            holding(vec![register("", "UINT16", "AB", &[0])]).unwrap_err().to_string(),
            "empty field name in holding definition"
        );
    }

    #[test]
    fn test_coils_split_at_burst_size() {
        let coils: Vec<RegisterField> = (0..4000).map(|i| coil(&format!("coil-{i}"), i)).collect();
        let plan = RegisterDefinition {
            slave_id: 1,
            coils,
            ..Default::default()
        }
        .process(&DeviceLimits::default())
        .unwrap();
        let ranges: Vec<(u16, u16)> = plan[&1].coil.iter().map(|r| (r.address, r.length)).collect();
        assert_eq!(ranges, vec![(0, 2000), (2000, 2000)]);
    }

    #[test]
    fn test_workarounds() {
        let definition = RegisterDefinition {
            slave_id: 1,
            coils: vec![coil("late", 8), coil("far", 2000)],
            holding_registers: vec![
                register("a", "UINT16", "AB", &[0]),
                register("b", "UINT16", "AB", &[1]),
            ],
            ..Default::default()
        };
        let limits = DeviceLimits::new()
            .with_one_request_per_field(true)
            .with_read_coils_starting_at_zero(true);
        let plan = definition.process(&limits).unwrap();
        assert_eq!(plan[&1].holding.len(), 2);

        let limits = DeviceLimits::new().with_read_coils_starting_at_zero(true);
        let plan = definition.process(&limits).unwrap();
        let ranges: Vec<(u16, u16)> = plan[&1].coil.iter().map(|r| (r.address, r.length)).collect();
        assert_eq!(ranges, vec![(0, 9), (2000, 1)]);
    }
}
