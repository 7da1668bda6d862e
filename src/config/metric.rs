//! Per-metric dialect.
//!
//! A `[[metric]]` block describes one measurement of one slave; every field
//! names the register kind it lives in. Fields are grouped per kind with the
//! block's tags.
//!
//! ```toml
//! [[metric]]
//! slave_id = 1
//! measurement = "sensors"
//! tags = { machine = "impresser" }
//! fields = [
//!     { register = "coil", address = 0, name = "motor_on" },
//!     { register = "input", address = 3, name = "temperature", type = "INT16", scale = 0.1 },
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

/// One field of a metric block.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MetricField {
    /// Register kind, `holding` when empty.
    #[serde(rename = "register")]
    pub register_type: String,
    pub address: u16,
    /// Registers of a `STRING` field.
    pub length: u16,
    pub name: String,
    #[serde(rename = "type")]
    pub input_type: String,
    pub scale: f64,
    #[serde(rename = "output")]
    pub output_type: String,
    pub bit: u8,
}

/// One `[[metric]]` block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MetricDefinition {
    pub slave_id: u8,
    pub byte_order: String,
    pub measurement: String,
    /// `none` or `max_insert`.
    pub optimization: String,
    #[serde(rename = "optimization_max_register_fill")]
    pub max_extra_registers: u16,
    pub tags: BTreeMap<String, String>,
    pub fields: Vec<MetricField>,
}

impl Default for MetricDefinition {
    fn default() -> Self {
        Self {
            slave_id: 0,
            byte_order: "ABCD".to_string(),
            measurement: DEFAULT_MEASUREMENT.to_string(),
            optimization: "none".to_string(),
            max_extra_registers: default_register_fill(),
            tags: BTreeMap::new(),
            fields: Vec::new(),
        }
    }
}

pub(crate) fn process(
    definitions: &[MetricDefinition],
    limits: &DeviceLimits,
) -> ConfigResult<SlavePlan> {
    let mut plan = SlavePlan::new();
    let mut duplicates = DuplicateCheck::default();

    for definition in definitions {
        let optimization = definition.optimization()?;
        let max_extra_registers = match optimization {
            Optimization::MaxInsert => check_register_fill(definition.max_extra_registers)?,
            _ => 0,
        };
        let tags = block_tags(&definition.tags);

        for (kind, fields) in definition.fields_by_kind(limits, &mut duplicates)? {
            let params = GroupingParams {
                max_batch_size: limits.burst_size(kind),
                optimization,
                enforce_from_zero: limits.enforce_from_zero(kind),
                max_extra_registers,
                tags: tags.clone(),
            };
            let requests = group_fields_to_requests(fields, &params);
            if !requests.is_empty() {
                plan.entry(definition.slave_id)
                    .or_default()
                    .get_mut(kind)
                    .extend(requests);
            }
        }
    }
    Ok(plan)
}

impl MetricDefinition {
    fn optimization(&self) -> ConfigResult<Optimization> {
        match self.optimization.parse::<Optimization>()? {
            optimization @ (Optimization::None | Optimization::MaxInsert) => Ok(optimization),
            _ => Err(ConfigError::UnknownOptimization(self.optimization.clone())),
        }
    }

    fn fields_by_kind(
        &self,
        limits: &DeviceLimits,
        duplicates: &mut DuplicateCheck,
    ) -> ConfigResult<BTreeMap<RegisterKind, Vec<Field>>> {
        let order = parse_block_byte_order(&self.byte_order)?;
        if self.fields.is_empty() {
            return Err(ConfigError::EmptyBlock("metric"));
        }
        let measurement = if self.measurement.is_empty() {
            DEFAULT_MEASUREMENT
        } else {
            self.measurement.as_str()
        };
        let tags = block_tags(&self.tags);

        let mut by_kind: BTreeMap<RegisterKind, Vec<Field>> = BTreeMap::new();
        for def in &self.fields {
            if def.name.is_empty() {
                return Err(ConfigError::EmptyFieldName {
                    context: format!("metric for slave {}", self.slave_id),
                });
            }
            let kind = if def.register_type.is_empty() {
                RegisterKind::Holding
            } else {
                def.register_type
                    .parse::<RegisterKind>()
                    .map_err(|e| e.in_field(&def.name))?
            };

            let field_type = FieldType {
                input: &def.input_type,
                length: def.length,
                bit: def.bit,
                scale: def.scale,
                output: &def.output_type,
            };
            let converter = field_type
                .converter(kind, order)
                .map_err(|e| e.in_field(&def.name))?;
            let length = converter.input().map_or(1, |input| input.registers());
            check_field_range(def.address, length, kind, limits)?;
            duplicates.insert(self.slave_id, kind, measurement, &def.name, &tags)?;

            by_kind
                .entry(kind)
                .or_default()
                .push(Field::new(&def.name, measurement, def.address, length, converter));
        }
        Ok(by_kind)
    }
}
