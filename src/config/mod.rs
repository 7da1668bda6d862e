//! # Configuration
//!
//! Loads the poller configuration from TOML (plus `MODBUS_*` environment
//! overrides) and turns one of the three field dialects into a
//! [`SlavePlan`]:
//!
//! | `configuration_type` | Dialect | Module |
//! |----------------------|---------|--------|
//! | `register` (default) | fixed-layout lists at the top level | [`register`] |
//! | `metric` | `[[metric]]` blocks, fields pick their register | [`metric`] |
//! | `request` | `[[request]]` blocks, one register kind each | [`request`] |
//!
//! ## Example
//!
//! ```rust
//! use modbus_planner::Config;
//!
//! let config = Config::from_toml_str(r#"
//!     name = "inverter"
//!     controller = "tcp://192.168.1.10:502"
//!     configuration_type = "request"
//!
//!     [[request]]
//!     slave_id = 1
//!     register = "input"
//!     fields = [
//!         { address = 0, name = "voltage", type = "UINT16", scale = 0.1 },
//!         { address = 1, name = "current", type = "INT16", scale = 0.01 },
//!     ]
//! "#).unwrap();
//!
//! let plan = config.build_plan().unwrap();
//! assert_eq!(plan[&1].input.len(), 1);
//! ```

pub mod metric;
pub mod register;
pub mod request;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use tracing::debug;

use crate::bytes::ByteOrder;
use crate::codec::{build_converter, Converter, InputType, OutputType};
use crate::constants::DEFAULT_MAX_REGISTER_FILL;
use crate::device_limits::DeviceLimits;
use crate::error::{ConfigError, ConfigResult};
use crate::field::{check_request_overlaps, within_address_space, RegisterKind, SlavePlan, Tags};
use crate::poller::PollOptions;
use crate::transport::TransportConfig;

pub use metric::{MetricDefinition, MetricField};
pub use register::{RegisterDefinition, RegisterField};
pub use request::{RequestDefinition, RequestField};

/// Prefix of environment variables overriding file settings.
pub const ENV_PREFIX: &str = "MODBUS_";

/// Byte orders accepted by the block dialects.
const BLOCK_BYTE_ORDERS: [&str; 8] = [
    "ABCD", "DCBA", "BADC", "CDAB", "MSW-BE", "MSW-LE", "LSW-LE", "LSW-BE",
];

// ============================================================================
// Top-level configuration
// ============================================================================

/// Field dialect selected by `configuration_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigurationType {
    #[default]
    Register,
    Metric,
    Request,
}

impl FromStr for ConfigurationType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "register" => Ok(Self::Register),
            "metric" => Ok(Self::Metric),
            "request" => Ok(Self::Request),
            _ => Err(ConfigError::UnknownConfigurationType(s.to_string())),
        }
    }
}

impl fmt::Display for ConfigurationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Register => "register",
            Self::Metric => "metric",
            Self::Request => "request",
        })
    }
}

/// Device quirks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Workarounds {
    /// Wait after establishing a connection before the first request.
    pub pause_after_connect_ms: u64,
    /// Minimum gap between two consecutive requests.
    pub pause_between_requests_ms: u64,
    /// Disconnect at the end of every poll cycle.
    pub close_connection_after_gather: bool,
    pub one_request_per_field: bool,
    /// First coil request starts at address 0 (coils only).
    pub read_coils_starting_at_zero: bool,
}

impl Workarounds {
    pub fn device_limits(&self) -> DeviceLimits {
        DeviceLimits::new()
            .with_one_request_per_field(self.one_request_per_field)
            .with_read_coils_starting_at_zero(self.read_coils_starting_at_zero)
    }
}

/// Complete poller configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Device name, emitted as the `name` tag.
    #[serde(default)]
    pub name: String,
    /// `tcp://host:port`, `file:///dev/ttyUSB0` or a bare serial device path.
    #[serde(default = "default_controller")]
    pub controller: String,
    /// `auto`, `TCP`, `RTUoverTCP` or `RTU`.
    #[serde(default)]
    pub transmission_mode: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_parity")]
    pub parity: String,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries of a request answered with "server device busy".
    #[serde(default)]
    pub busy_retries: u32,
    #[serde(default = "default_busy_retries_wait_ms")]
    pub busy_retries_wait_ms: u64,
    /// Slaves polled concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub configuration_type: String,
    #[serde(default)]
    pub workarounds: Workarounds,

    #[serde(flatten)]
    pub register: RegisterDefinition,
    #[serde(default, rename = "metric")]
    pub metrics: Vec<MetricDefinition>,
    #[serde(default, rename = "request")]
    pub requests: Vec<RequestDefinition>,
}

fn default_controller() -> String {
    "tcp://localhost:502".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "N".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_busy_retries_wait_ms() -> u64 {
    100
}

fn default_workers() -> usize {
    1
}

impl Config {
    /// Load from a TOML file, then apply `MODBUS_*` environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::extract(
            Figment::new()
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed(ENV_PREFIX)),
        )
    }

    /// Load from a TOML document.
    pub fn from_toml_str(toml: &str) -> ConfigResult<Self> {
        Self::extract(Figment::new().merge(Toml::string(toml)))
    }

    fn extract(figment: Figment) -> ConfigResult<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the device-level settings. Field definitions are checked by
    /// [`build_plan`](Self::build_plan).
    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.is_empty() {
            return Err(ConfigError::MissingDeviceName);
        }
        self.configuration_type()?;
        self.transport_config()?;
        Ok(())
    }

    pub fn configuration_type(&self) -> ConfigResult<ConfigurationType> {
        self.configuration_type.parse()
    }

    pub fn device_limits(&self) -> DeviceLimits {
        self.workarounds.device_limits()
    }

    /// Validate the selected dialect and group its fields into requests.
    pub fn build_plan(&self) -> ConfigResult<SlavePlan> {
        let limits = self.device_limits();
        let plan = match self.configuration_type()? {
            ConfigurationType::Register => self.register.process(&limits)?,
            ConfigurationType::Metric => metric::process(&self.metrics, &limits)?,
            ConfigurationType::Request => request::process(&self.requests, &limits)?,
        };
        summarize_plan(&plan);
        Ok(plan)
    }

    /// Connection settings for [`TokioModbusTransport`](crate::transport::TokioModbusTransport).
    pub fn transport_config(&self) -> ConfigResult<TransportConfig> {
        let mut config = TransportConfig::new(&self.controller, &self.transmission_mode)?;
        config.timeout = Duration::from_millis(self.timeout_ms);
        config.pause_after_connect = Duration::from_millis(self.workarounds.pause_after_connect_ms);
        config.serial.baud_rate = self.baud_rate;
        config.serial.data_bits = self.data_bits;
        config.serial.parity = self.parity.clone();
        config.serial.stop_bits = self.stop_bits;
        Ok(config)
    }

    pub fn poll_options(&self) -> PollOptions {
        PollOptions {
            device_name: self.name.clone(),
            busy_retries: self.busy_retries,
            busy_retries_wait: Duration::from_millis(self.busy_retries_wait_ms),
            pause_between_requests: Duration::from_millis(
                self.workarounds.pause_between_requests_ms,
            ),
            close_connection_after_gather: self.workarounds.close_connection_after_gather,
            workers: self.workers.max(1),
        }
    }
}

/// Log the per-slave request summary and warn about overlapping requests.
fn summarize_plan(plan: &SlavePlan) {
    for (slave, set) in plan {
        for kind in RegisterKind::ALL {
            let requests = set.get(kind);
            if requests.is_empty() {
                continue;
            }
            debug!(
                "Got {} request(s) touching {} {} registers for {} fields (slave {})",
                requests.len(),
                set.register_count(kind),
                kind,
                set.field_count(kind),
                slave
            );
            check_request_overlaps(*slave, kind, requests);
        }
    }
}

// ============================================================================
// Helpers shared by the block dialects
// ============================================================================

/// Identity of an emitted field; two fields with the same identity would
/// produce the same series key.
#[derive(Debug, PartialEq, Eq, Hash)]
struct FieldIdentity {
    slave: u8,
    kind: RegisterKind,
    measurement: String,
    name: String,
    tags: Tags,
}

/// Rejects fields whose identity was already seen, across all blocks.
#[derive(Debug, Default)]
pub(crate) struct DuplicateCheck {
    seen: HashSet<FieldIdentity>,
}

impl DuplicateCheck {
    pub(crate) fn insert(
        &mut self,
        slave: u8,
        kind: RegisterKind,
        measurement: &str,
        name: &str,
        tags: &Tags,
    ) -> ConfigResult<()> {
        let identity = FieldIdentity {
            slave,
            kind,
            measurement: measurement.to_string(),
            name: name.to_string(),
            tags: tags.clone(),
        };
        if self.seen.insert(identity) {
            Ok(())
        } else {
            Err(ConfigError::DuplicateField {
                name: name.to_string(),
                measurement: measurement.to_string(),
                slave,
                kind,
            })
        }
    }
}

/// Parse a block-level byte order. `AB` and the 8-byte spellings are only
/// accepted by the fixed-layout dialect.
pub(crate) fn parse_block_byte_order(value: &str) -> ConfigResult<ByteOrder> {
    if BLOCK_BYTE_ORDERS.contains(&value) {
        value.parse()
    } else {
        Err(ConfigError::UnknownByteOrder(value.to_string()))
    }
}

/// `optimization_max_register_fill` must stay inside one read.
pub(crate) fn check_register_fill(value: u16) -> ConfigResult<u16> {
    let max = crate::constants::MAX_READ_REGISTERS;
    if (1..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::MaxRegisterFill { value, max })
    }
}

pub(crate) fn default_register_fill() -> u16 {
    DEFAULT_MAX_REGISTER_FILL
}

pub(crate) fn block_tags(tags: &BTreeMap<String, String>) -> Tags {
    Arc::new(tags.clone())
}

/// Settings of one block-dialect field that decide its decoder.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldType<'a> {
    pub input: &'a str,
    pub length: u16,
    pub bit: u8,
    pub scale: f64,
    pub output: &'a str,
}

impl FieldType<'_> {
    /// Registers (or bits) occupied by a field of this type in `kind`.
    pub(crate) fn registers(&self, kind: RegisterKind) -> ConfigResult<u16> {
        if kind.is_bit() {
            return Ok(1);
        }
        Ok(InputType::from_name(self.input, self.bit, self.length)?.registers())
    }

    /// Build the decoder for a field of this type in `kind`.
    pub(crate) fn converter(&self, kind: RegisterKind, order: ByteOrder) -> ConfigResult<Converter> {
        if kind.is_bit() {
            if !self.input.is_empty() {
                return Err(ConfigError::TypeNotAllowed(kind));
            }
            if self.length != 0 {
                return Err(ConfigError::LengthNotAllowed(kind.as_str().to_string()));
            }
            if self.scale != 0.0 {
                return Err(ConfigError::ScaleNotAllowed(kind.as_str().to_string()));
            }
            // UINT16 is an alias of the default 0/1 integer output.
            let output = match self.output.trim().to_ascii_uppercase().as_str() {
                "UINT16" => None,
                _ => OutputType::parse_optional(self.output)?,
            };
            return Converter::coil(output);
        }

        let input = InputType::from_name(self.input, self.bit, self.length)?;
        let output = OutputType::parse_optional(self.output)?;
        let scale = Some(self.scale).filter(|s| *s != 0.0);
        build_converter(input, order, output, scale)
    }
}

/// Reject fields leaving the address space or exceeding a single read.
pub(crate) fn check_field_range(
    address: u16,
    length: u16,
    kind: RegisterKind,
    limits: &DeviceLimits,
) -> ConfigResult<()> {
    if !within_address_space(address, length) {
        return Err(ConfigError::AddressOverflow { address, length });
    }
    let max = limits.max_field_length(kind);
    if length > max {
        return Err(ConfigError::FieldTooLarge { length, max });
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
