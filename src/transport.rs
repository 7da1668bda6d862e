//! # Transport Layer
//!
//! The poller talks to devices through [`ModbusTransport`]: four read
//! operations returning raw response data, plus connection management.
//!
//! - Register reads return the register bytes in wire (big-endian) order.
//! - Coil and discrete input reads return the bits packed LSB-first.
//!
//! [`TokioModbusTransport`] implements the trait on top of `tokio-modbus`
//! for Modbus TCP, RTU over TCP and (with the `rtu` feature) RTU over a
//! serial line. The connection is opened lazily on the first request and
//! dropped by [`reset`](ModbusTransport::reset) after a failure.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio_modbus::prelude::*;
use tokio_modbus::ExceptionCode;
use tracing::debug;

use crate::bytes::{pack_bits, pack_registers};
use crate::constants::{
    EXCEPTION_ACKNOWLEDGE, EXCEPTION_GATEWAY_PATH_UNAVAILABLE, EXCEPTION_GATEWAY_TARGET_FAILED,
    EXCEPTION_ILLEGAL_DATA_ADDRESS, EXCEPTION_ILLEGAL_DATA_VALUE, EXCEPTION_ILLEGAL_FUNCTION,
    EXCEPTION_MEMORY_PARITY_ERROR, EXCEPTION_SERVER_DEVICE_BUSY, EXCEPTION_SERVER_DEVICE_FAILURE,
};
use crate::error::{ConfigError, ConfigResult, ModbusError, ModbusResult};
use crate::field::RegisterKind;

// ============================================================================
// Transport trait
// ============================================================================

/// Raw read access to Modbus devices.
pub trait ModbusTransport: Send {
    /// Read coils (function code 0x01).
    fn read_coils(
        &mut self,
        slave: u8,
        address: u16,
        quantity: u16,
    ) -> impl Future<Output = ModbusResult<Bytes>> + Send;

    /// Read discrete inputs (function code 0x02).
    fn read_discrete_inputs(
        &mut self,
        slave: u8,
        address: u16,
        quantity: u16,
    ) -> impl Future<Output = ModbusResult<Bytes>> + Send;

    /// Read holding registers (function code 0x03).
    fn read_holding_registers(
        &mut self,
        slave: u8,
        address: u16,
        quantity: u16,
    ) -> impl Future<Output = ModbusResult<Bytes>> + Send;

    /// Read input registers (function code 0x04).
    fn read_input_registers(
        &mut self,
        slave: u8,
        address: u16,
        quantity: u16,
    ) -> impl Future<Output = ModbusResult<Bytes>> + Send;

    /// Drop the connection after a failure; the next request reconnects.
    fn reset(&mut self) -> impl Future<Output = ()> + Send;

    /// Close the connection gracefully.
    fn close(&mut self) -> impl Future<Output = ModbusResult<()>> + Send;

    /// Dispatch a read by register kind.
    #[inline]
    fn read(
        &mut self,
        kind: RegisterKind,
        slave: u8,
        address: u16,
        quantity: u16,
    ) -> impl Future<Output = ModbusResult<Bytes>> + Send {
        async move {
            match kind {
                RegisterKind::Coil => self.read_coils(slave, address, quantity).await,
                RegisterKind::Discrete => self.read_discrete_inputs(slave, address, quantity).await,
                RegisterKind::Holding => self.read_holding_registers(slave, address, quantity).await,
                RegisterKind::Input => self.read_input_registers(slave, address, quantity).await,
            }
        }
    }
}

// ============================================================================
// Connection settings
// ============================================================================

/// Where the device is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Controller {
    /// `host:port` from a `tcp://host:port` URL.
    Tcp(String),
    /// Serial device path, from `file://` URLs or given bare.
    Serial(String),
}

impl FromStr for Controller {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidController(s.to_string());

        if let Some(rest) = s.strip_prefix("tcp://") {
            let address = rest.trim_end_matches('/');
            return match address.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                    Ok(Self::Tcp(address.to_string()))
                }
                _ => Err(invalid()),
            };
        }
        let path = s.strip_prefix("file://").unwrap_or(s);
        if path.is_empty() || path.contains("://") {
            return Err(invalid());
        }
        Ok(Self::Serial(path.to_string()))
    }
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(address) => write!(f, "tcp://{address}"),
            Self::Serial(path) => write!(f, "file://{path}"),
        }
    }
}

/// Framing used on the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransmissionMode {
    /// TCP for network controllers, RTU for serial ones.
    #[default]
    Auto,
    Tcp,
    RtuOverTcp,
    Rtu,
}

impl FromStr for TransmissionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "auto" => Ok(Self::Auto),
            "TCP" => Ok(Self::Tcp),
            "RTUoverTCP" => Ok(Self::RtuOverTcp),
            "RTU" => Ok(Self::Rtu),
            _ => Err(ConfigError::UnknownTransmissionMode(s.to_string())),
        }
    }
}

impl fmt::Display for TransmissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Tcp => "TCP",
            Self::RtuOverTcp => "RTUoverTCP",
            Self::Rtu => "RTU",
        })
    }
}

/// Serial line parameters for RTU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    /// `N`, `E` or `O`.
    pub parity: String,
    pub stop_bits: u8,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: 8,
            parity: "N".to_string(),
            stop_bits: 1,
        }
    }
}

/// Settings for [`TokioModbusTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub controller: Controller,
    /// Resolved mode, never [`TransmissionMode::Auto`].
    pub mode: TransmissionMode,
    /// Per-exchange timeout, also applied to connecting.
    pub timeout: Duration,
    pub pause_after_connect: Duration,
    pub serial: SerialSettings,
}

impl TransportConfig {
    /// Parse the controller and resolve `auto` against it.
    pub fn new(controller: &str, mode: &str) -> ConfigResult<Self> {
        let controller: Controller = controller.parse()?;
        let requested: TransmissionMode = mode.parse()?;
        let mode = match (&controller, requested) {
            (Controller::Tcp(_), TransmissionMode::Auto | TransmissionMode::Tcp) => TransmissionMode::Tcp,
            (Controller::Tcp(_), TransmissionMode::RtuOverTcp) => TransmissionMode::RtuOverTcp,
            (Controller::Serial(_), TransmissionMode::Auto | TransmissionMode::Rtu) => TransmissionMode::Rtu,
            _ => {
                return Err(ConfigError::UnknownTransmissionMode(format!(
                    "{requested} for {controller}"
                )))
            }
        };
        Ok(Self {
            controller,
            mode,
            timeout: Duration::from_secs(1),
            pause_after_connect: Duration::ZERO,
            serial: SerialSettings::default(),
        })
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

// ============================================================================
// tokio-modbus transport
// ============================================================================

/// [`ModbusTransport`] backed by a `tokio-modbus` client context.
pub struct TokioModbusTransport {
    config: TransportConfig,
    context: Option<client::Context>,
}

impl fmt::Debug for TokioModbusTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioModbusTransport")
            .field("config", &self.config)
            .field("connected", &self.context.is_some())
            .finish()
    }
}

impl TokioModbusTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            context: None,
        }
    }

    async fn connect_tcp(config: &TransportConfig, address: &str) -> ModbusResult<TcpStream> {
        tokio::time::timeout(config.timeout, TcpStream::connect(address))
            .await
            .map_err(|_| ModbusError::timeout(format!("connecting to {address}"), config.timeout_ms()))?
            .map_err(|e| ModbusError::connection(format!("{address}: {e}")))
    }

    async fn connect(config: &TransportConfig, slave: Slave) -> ModbusResult<client::Context> {
        match (&config.controller, config.mode) {
            (Controller::Tcp(address), TransmissionMode::Tcp) => {
                let stream = Self::connect_tcp(config, address).await?;
                Ok(tcp::attach_slave(stream, slave))
            }
            #[cfg(feature = "rtu")]
            (Controller::Tcp(address), TransmissionMode::RtuOverTcp) => {
                let stream = Self::connect_tcp(config, address).await?;
                Ok(rtu::attach_slave(stream, slave))
            }
            #[cfg(feature = "rtu")]
            (Controller::Serial(path), TransmissionMode::Rtu) => {
                let port = serial::open(path, &config.serial, config.timeout)?;
                Ok(rtu::attach_slave(port, slave))
            }
            (controller, mode) => Err(ModbusError::connection(format!(
                "transmission mode {mode} is not supported for {controller} in this build"
            ))),
        }
    }

    /// Connected context addressing `slave`.
    async fn context(&mut self, slave: u8) -> ModbusResult<&mut client::Context> {
        if self.context.is_none() {
            debug!(controller = %self.config.controller, mode = %self.config.mode, "connecting");
            let context = Self::connect(&self.config, Slave(slave)).await?;
            if !self.config.pause_after_connect.is_zero() {
                tokio::time::sleep(self.config.pause_after_connect).await;
            }
            self.context = Some(context);
        }
        let context = self
            .context
            .as_mut()
            .ok_or_else(|| ModbusError::connection("not connected"))?;
        context.set_slave(Slave(slave));
        Ok(context)
    }

    async fn read_kind(
        &mut self,
        kind: RegisterKind,
        slave: u8,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Bytes> {
        let timeout = self.config.timeout;
        let timeout_ms = self.config.timeout_ms();
        let context = self.context(slave).await?;

        let exchange = async {
            match kind {
                RegisterKind::Coil => context
                    .read_coils(address, quantity)
                    .await
                    .map(|r| r.map(|bits| pack_bits(&bits))),
                RegisterKind::Discrete => context
                    .read_discrete_inputs(address, quantity)
                    .await
                    .map(|r| r.map(|bits| pack_bits(&bits))),
                RegisterKind::Holding => context
                    .read_holding_registers(address, quantity)
                    .await
                    .map(|r| r.map(|words| pack_registers(&words))),
                RegisterKind::Input => context
                    .read_input_registers(address, quantity)
                    .await
                    .map(|r| r.map(|words| pack_registers(&words))),
            }
        };

        let response = tokio::time::timeout(timeout, exchange).await.map_err(|_| {
            ModbusError::timeout(format!("reading {quantity} {kind} at {address}"), timeout_ms)
        })?;
        match response {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(code)) => Err(ModbusError::exception(kind.read_function(), exception_code(code))),
            Err(err) => Err(transport_error(err)),
        }
    }
}

impl ModbusTransport for TokioModbusTransport {
    async fn read_coils(&mut self, slave: u8, address: u16, quantity: u16) -> ModbusResult<Bytes> {
        self.read_kind(RegisterKind::Coil, slave, address, quantity).await
    }

    async fn read_discrete_inputs(
        &mut self,
        slave: u8,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Bytes> {
        self.read_kind(RegisterKind::Discrete, slave, address, quantity).await
    }

    async fn read_holding_registers(
        &mut self,
        slave: u8,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Bytes> {
        self.read_kind(RegisterKind::Holding, slave, address, quantity).await
    }

    async fn read_input_registers(
        &mut self,
        slave: u8,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Bytes> {
        self.read_kind(RegisterKind::Input, slave, address, quantity).await
    }

    async fn reset(&mut self) {
        if self.context.take().is_some() {
            debug!(controller = %self.config.controller, "connection reset");
        }
    }

    async fn close(&mut self) -> ModbusResult<()> {
        let Some(mut context) = self.context.take() else {
            return Ok(());
        };
        debug!(controller = %self.config.controller, "closing connection");
        context
            .disconnect()
            .await
            .map(|_| ())
            .map_err(|e| ModbusError::connection(format!("disconnect failed: {e}")))
    }
}

fn transport_error(err: tokio_modbus::Error) -> ModbusError {
    match err {
        tokio_modbus::Error::Transport(e) => ModbusError::io(e.to_string()),
        other => ModbusError::protocol(other.to_string()),
    }
}

fn exception_code(code: ExceptionCode) -> u8 {
    #[allow(unreachable_patterns)]
    match code {
        ExceptionCode::IllegalFunction => EXCEPTION_ILLEGAL_FUNCTION,
        ExceptionCode::IllegalDataAddress => EXCEPTION_ILLEGAL_DATA_ADDRESS,
        ExceptionCode::IllegalDataValue => EXCEPTION_ILLEGAL_DATA_VALUE,
        ExceptionCode::ServerDeviceFailure => EXCEPTION_SERVER_DEVICE_FAILURE,
        ExceptionCode::Acknowledge => EXCEPTION_ACKNOWLEDGE,
        ExceptionCode::ServerDeviceBusy => EXCEPTION_SERVER_DEVICE_BUSY,
        ExceptionCode::MemoryParityError => EXCEPTION_MEMORY_PARITY_ERROR,
        ExceptionCode::GatewayPathUnavailable => EXCEPTION_GATEWAY_PATH_UNAVAILABLE,
        ExceptionCode::GatewayTargetDevice => EXCEPTION_GATEWAY_TARGET_FAILED,
        ExceptionCode::Custom(code) => code,
        _ => 0x00,
    }
}

#[cfg(feature = "rtu")]
mod serial {
    use std::time::Duration;

    use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};

    use super::SerialSettings;
    use crate::error::{ModbusError, ModbusResult};

    pub(super) fn open(path: &str, settings: &SerialSettings, timeout: Duration) -> ModbusResult<SerialStream> {
        let data_bits = match settings.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            other => return Err(ModbusError::connection(format!("invalid data bits {other}"))),
        };
        let parity = match settings.parity.as_str() {
            "N" => Parity::None,
            "E" => Parity::Even,
            "O" => Parity::Odd,
            other => return Err(ModbusError::connection(format!("invalid parity {other:?}"))),
        };
        let stop_bits = match settings.stop_bits {
            1 => StopBits::One,
            2 => StopBits::Two,
            other => return Err(ModbusError::connection(format!("invalid stop bits {other}"))),
        };

        tokio_serial::new(path, settings.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(timeout)
            .open_native_async()
            .map_err(|e| ModbusError::connection(format!("{path}: {e}")))
    }
}

// ============================================================================
// Scripted transport for tests
// ============================================================================
