//! Per-request dialect.
//!
//! Each `[[request]]` block targets one slave and one register kind and is
//! grouped with its own optimization policy and tags. Blocks for the same
//! slave and kind are appended to each other.
//!
//! ```toml
//! [[request]]
//! slave_id = 1
//! byte_order = "ABCD"
//! register = "holding"
//! optimization = "max_insert"
//! optimization_max_register_fill = 10
//! tags = { location = "roof" }
//! fields = [
//!     { address = 0, name = "voltage", type = "UINT16", scale = 0.1 },
//!     { address = 1, type = "UINT16", omit = true },
//!     { address = 2, name = "energy", type = "UINT32", output = "FLOAT64" },
//! ]
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;

use super::{
    block_tags, check_field_range, check_register_fill, default_register_fill,
    parse_block_byte_order, DuplicateCheck, FieldType,
};
use crate::constants::DEFAULT_MEASUREMENT;
use crate::device_limits::DeviceLimits;
use crate::error::{ConfigError, ConfigResult};
use crate::field::{Field, RegisterKind, SlavePlan};
use crate::grouping::{group_fields_to_requests, GroupingParams, Optimization};

/// One field of a request block.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RequestField {
    pub address: u16,
    pub name: String,
    #[serde(rename = "type")]
    pub input_type: String,
    /// Registers of a `STRING` field.
    pub length: u16,
    /// Bit index of a `BIT` field.
    pub bit: u8,
    pub scale: f64,
    #[serde(rename = "output")]
    pub output_type: String,
    /// Overrides the block measurement.
    pub measurement: String,
    /// Read but never emitted; used to bridge gaps.
    pub omit: bool,
}

/// One `[[request]]` block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RequestDefinition {
    pub slave_id: u8,
    pub byte_order: String,
    #[serde(rename = "register")]
    pub register_type: String,
    pub measurement: String,
    pub optimization: String,
    #[serde(rename = "optimization_max_register_fill")]
    pub max_extra_registers: u16,
    pub tags: BTreeMap<String, String>,
    pub fields: Vec<RequestField>,
}

impl Default for RequestDefinition {
    fn default() -> Self {
        Self {
            slave_id: 0,
            byte_order: "ABCD".to_string(),
            register_type: "holding".to_string(),
            measurement: DEFAULT_MEASUREMENT.to_string(),
            optimization: "none".to_string(),
            max_extra_registers: default_register_fill(),
            tags: BTreeMap::new(),
            fields: Vec::new(),
        }
    }
}

/// Validate every block and group its fields.
pub(crate) fn process(
    definitions: &[RequestDefinition],
    limits: &DeviceLimits,
) -> ConfigResult<SlavePlan> {
    let mut plan = SlavePlan::new();
    let mut duplicates = DuplicateCheck::default();

    for definition in definitions {
        let (kind, fields, params) = definition.prepare(limits, &mut duplicates)?;
        let requests = group_fields_to_requests(fields, &params);
        if !requests.is_empty() {
            plan.entry(definition.slave_id)
                .or_default()
                .get_mut(kind)
                .extend(requests);
        }
    }
    Ok(plan)
}

impl RequestDefinition {
    fn register_kind(&self) -> ConfigResult<RegisterKind> {
        if self.register_type.is_empty() {
            Ok(RegisterKind::Holding)
        } else {
            self.register_type.parse()
        }
    }

    fn prepare(
        &self,
        limits: &DeviceLimits,
        duplicates: &mut DuplicateCheck,
    ) -> ConfigResult<(RegisterKind, Vec<Field>, GroupingParams)> {
        let order = parse_block_byte_order(&self.byte_order)?;
        let optimization: Optimization = self.optimization.parse()?;
        let max_extra_registers = match optimization {
            Optimization::MaxInsert => check_register_fill(self.max_extra_registers)?,
            _ => 0,
        };
        let kind = self.register_kind()?;
        if self.fields.is_empty() {
            return Err(ConfigError::EmptyBlock("request"));
        }

        let tags = block_tags(&self.tags);
        let block_measurement = if self.measurement.is_empty() {
            DEFAULT_MEASUREMENT
        } else {
            self.measurement.as_str()
        };

        let mut fields = Vec::with_capacity(self.fields.len());
        for def in &self.fields {
            let field_type = FieldType {
                input: &def.input_type,
                length: def.length,
                bit: def.bit,
                scale: def.scale,
                output: &def.output_type,
            };

            if def.omit {
                let length = field_type
                    .registers(kind)
                    .map_err(|e| e.in_field(&def.name))?;
                check_field_range(def.address, length, kind, limits)?;
                fields.push(Field::omitted(def.address, length));
                continue;
            }

            if def.name.is_empty() {
                return Err(ConfigError::EmptyFieldName {
                    context: format!("request for slave {}", self.slave_id),
                });
            }
            let measurement = if def.measurement.is_empty() {
                block_measurement
            } else {
                def.measurement.as_str()
            };

            let converter = field_type
                .converter(kind, order)
                .map_err(|e| e.in_field(&def.name))?;
            let length = converter.input().map_or(1, |input| input.registers());
            check_field_range(def.address, length, kind, limits)?;
            duplicates.insert(self.slave_id, kind, measurement, &def.name, &tags)?;

            fields.push(Field::new(&def.name, measurement, def.address, length, converter));
        }

        let params = GroupingParams {
            max_batch_size: limits.burst_size(kind),
            optimization,
            enforce_from_zero: limits.enforce_from_zero(kind),
            max_extra_registers,
            tags,
        };
        Ok((kind, fields, params))
    }
}
