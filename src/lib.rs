//! # Modbus Planner - Register Planning and Decoding Engine
//!
//! Turns declarative field definitions into a minimal set of Modbus read
//! requests, and decodes the responses into typed values.
//!
//! ## Features
//!
//! - **Three configuration dialects**: per register kind, per metric and per request
//! - **Request optimization**: `none`, `shrink`, `rearrange`, `aggressive`, `max_insert`
//! - **Typed decoding**: integers, floats (including half precision), fixed point,
//!   bits and strings in every byte order
//! - **Poll driver**: busy retries, per-slave failure isolation, bounded fan-out
//! - **Device workarounds**: one request per field, coils from zero, pauses
//!
//! ## Read Function Codes
//!
//! | Code | Function | Register kind |
//! |------|----------|---------------|
//! | 0x01 | Read Coils | `coil` |
//! | 0x02 | Read Discrete Inputs | `discrete` |
//! | 0x03 | Read Holding Registers | `holding` |
//! | 0x04 | Read Input Registers | `input` |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modbus_planner::{Config, MemoryAccumulator, Poller, TokioModbusTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("modbus.toml")?;
//!     let transport = TokioModbusTransport::new(config.transport_config()?);
//!     let poller = Poller::from_config(&config, transport)?;
//!
//!     let mut acc = MemoryAccumulator::new();
//!     poller.poll(&mut acc).await;
//!     for m in &acc.measurements {
//!         println!("{} {:?} {:?}", m.name, m.tags, m.fields);
//!     }
//!     Ok(())
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Error types and result aliases
pub mod error;

/// Modbus protocol constants based on official specification
pub mod constants;

/// Decoded field values
pub mod value;

/// Byte order handling for multi-register data types
pub mod bytes;

/// Per-field converters built at configuration time
pub mod codec;

/// Fields, requests and address ranges
pub mod field;

/// Device-specific protocol limits configuration
pub mod device_limits;

// ============================================================================
// Planning and polling
// ============================================================================

/// Grouping of fields into read requests
pub mod grouping;

/// Configuration loading and the field definition dialects
pub mod config;

/// Transport boundary and the tokio-modbus adapter
pub mod transport;

/// Measurements and accumulators
pub mod measurement;

/// Poll cycle driver
pub mod poller;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use modbus_planner::tokio) ===
pub use tokio;

// === Error handling ===
pub use error::{ConfigError, ConfigResult, DecodeError, ModbusError, ModbusResult, PollError};

// === Core types ===
pub use bytes::ByteOrder;
pub use codec::{build_converter, Converter, InputType, OutputType};
pub use field::{Field, RegisterKind, Request, RequestSet, SlavePlan, Tags};
pub use value::FieldValue;

// === Planning ===
pub use config::{Config, ConfigurationType, Workarounds};
pub use device_limits::DeviceLimits;
pub use grouping::{group_fields_to_requests, GroupingParams, Optimization};

// === Polling ===
pub use measurement::{Accumulator, MemoryAccumulator, Measurement};
pub use poller::{PollOptions, Poller};
pub use transport::{Controller, ModbusTransport, TokioModbusTransport, TransmissionMode, TransportConfig};

// === Protocol limits (commonly needed constants) ===
pub use constants::{MAX_READ_COILS, MAX_READ_REGISTERS};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
