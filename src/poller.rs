//! # Poll Driver
//!
//! Executes a [`SlavePlan`] against a [`ModbusTransport`] once per cycle.
//!
//! For every slave the planned requests are issued kind by kind. A request
//! answered with "server device busy" is retried up to `busy_retries` times;
//! any other failure abandons the slave for this cycle, discards what was
//! already read from it and reports one [`PollError::Slave`]. The remaining
//! slaves are polled regardless.
//!
//! Successful slaves are decoded field by field. Fields are merged into one
//! measurement per (measurement name, tag set) carrying the tags `name`,
//! `slave_id` and `type` next to the block tags.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::bytes::bit_at;
use crate::config::Config;
use crate::error::{ConfigResult, DecodeError, ModbusError, ModbusResult, PollError};
use crate::field::{Field, RegisterKind, Request, RequestSet, SlavePlan};
use crate::measurement::{Accumulator, Measurement};
use crate::transport::ModbusTransport;
use crate::value::FieldValue;

/// Behaviour of the poll driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOptions {
    /// Emitted as the `name` tag.
    pub device_name: String,
    pub busy_retries: u32,
    pub busy_retries_wait: Duration,
    /// Minimum gap between two requests to the same slave.
    pub pause_between_requests: Duration,
    pub close_connection_after_gather: bool,
    /// Slaves polled concurrently, at least one.
    pub workers: usize,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            device_name: String::new(),
            busy_retries: 0,
            busy_retries_wait: Duration::from_millis(100),
            pause_between_requests: Duration::ZERO,
            close_connection_after_gather: false,
            workers: 1,
        }
    }
}

/// Results of one slave in one cycle.
#[derive(Debug, Default)]
struct SlaveReport {
    slave: u8,
    measurements: Vec<Measurement>,
    errors: Vec<PollError>,
}

/// Response data of one request.
struct Response<'a> {
    kind: RegisterKind,
    request: &'a Request,
    data: Bytes,
}

/// Polls every slave of a plan through one shared transport.
pub struct Poller<T> {
    plan: Arc<SlavePlan>,
    transport: Arc<Mutex<T>>,
    options: PollOptions,
}

impl<T> std::fmt::Debug for Poller<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("slaves", &self.plan.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<T: ModbusTransport> Poller<T> {
    pub fn new(plan: impl Into<Arc<SlavePlan>>, transport: T, options: PollOptions) -> Self {
        Self {
            plan: plan.into(),
            transport: Arc::new(Mutex::new(transport)),
            options,
        }
    }

    /// Build the plan of `config` and poll it through `transport`.
    pub fn from_config(config: &Config, transport: T) -> ConfigResult<Self> {
        Ok(Self::new(config.build_plan()?, transport, config.poll_options()))
    }

    pub fn plan(&self) -> &SlavePlan {
        &self.plan
    }

    pub fn options(&self) -> &PollOptions {
        &self.options
    }

    /// Run one cycle without a deadline.
    pub async fn poll(&self, acc: &mut impl Accumulator) {
        self.run_cycle(acc, None).await;
    }

    /// Run one cycle; requests still in flight after `budget` fail with a
    /// timeout for their slave.
    pub async fn poll_within(&self, acc: &mut impl Accumulator, budget: Duration) {
        self.run_cycle(acc, Some(Instant::now() + budget)).await;
    }

    /// Close the transport connection.
    pub async fn close(&self) -> ModbusResult<()> {
        self.transport.lock().await.close().await
    }

    async fn run_cycle(&self, acc: &mut impl Accumulator, deadline: Option<Instant>) {
        let workers = self.options.workers.max(1);
        let mut reports: Vec<SlaveReport> = if workers == 1 {
            let mut reports = Vec::with_capacity(self.plan.len());
            for (slave, set) in self.plan.iter() {
                reports.push(self.gather_slave(*slave, set, deadline).await);
            }
            reports
        } else {
            stream::iter(self.plan.iter())
                .map(|(slave, set)| self.gather_slave(*slave, set, deadline))
                .buffer_unordered(workers)
                .collect()
                .await
        };
        reports.sort_by_key(|r| r.slave);

        for report in reports {
            for m in report.measurements {
                acc.add_fields(&m.name, m.fields, m.tags, m.timestamp);
            }
            for error in report.errors {
                acc.add_error(error);
            }
        }

        if self.options.close_connection_after_gather {
            if let Err(e) = self.close().await {
                warn!("closing connection after gather failed: {}", e);
            }
        }
    }

    async fn gather_slave(&self, slave: u8, set: &RequestSet, deadline: Option<Instant>) -> SlaveReport {
        let mut report = SlaveReport {
            slave,
            ..Default::default()
        };

        let responses = match self.read_slave(slave, set, deadline).await {
            Ok(responses) => responses,
            Err(source) => {
                if source.is_gateway_unavailable() {
                    debug!(slave, "slave unreachable through gateway: {}", source);
                } else {
                    warn!(slave, "gathering fields failed: {}", source);
                }
                if source.requires_reconnect() {
                    self.transport.lock().await.reset().await;
                }
                report.errors.push(PollError::Slave { slave, source });
                return report;
            }
        };

        let timestamp = Utc::now();
        let mut grouped: BTreeMap<(String, BTreeMap<String, String>), BTreeMap<String, FieldValue>> =
            BTreeMap::new();
        for response in &responses {
            let tags = self.request_tags(slave, response.kind, response.request);
            for field in &response.request.fields {
                match decode_field(response, field) {
                    Some(Ok(value)) => {
                        grouped
                            .entry((field.measurement.clone(), tags.clone()))
                            .or_default()
                            .insert(field.name.clone(), value);
                    }
                    Some(Err(source)) => report.errors.push(PollError::Decode {
                        slave,
                        field: field.name.clone(),
                        source,
                    }),
                    None => {}
                }
            }
        }

        report.measurements = grouped
            .into_iter()
            .map(|((name, tags), fields)| Measurement {
                name,
                tags,
                fields,
                timestamp,
            })
            .collect();
        report
    }

    /// Issue every request of `slave`; stops at the first failure.
    async fn read_slave<'a>(
        &self,
        slave: u8,
        set: &'a RequestSet,
        deadline: Option<Instant>,
    ) -> ModbusResult<Vec<Response<'a>>> {
        let mut responses = Vec::new();
        for kind in RegisterKind::ALL {
            for request in set.get(kind) {
                if !responses.is_empty() && !self.options.pause_between_requests.is_zero() {
                    tokio::time::sleep(self.options.pause_between_requests).await;
                }
                let data = self.read_request(slave, kind, request, deadline).await?;
                responses.push(Response { kind, request, data });
            }
        }
        Ok(responses)
    }

    async fn read_request(
        &self,
        slave: u8,
        kind: RegisterKind,
        request: &Request,
        deadline: Option<Instant>,
    ) -> ModbusResult<Bytes> {
        let mut retries = 0;
        loop {
            let result = within(deadline, async {
                let mut transport = self.transport.lock().await;
                transport.read(kind, slave, request.address, request.length).await
            })
            .await;

            match result {
                Err(e) if e.is_busy() && retries < self.options.busy_retries => {
                    retries += 1;
                    debug!(
                        slave,
                        kind = %kind,
                        address = request.address,
                        "device busy, retry {}/{}",
                        retries,
                        self.options.busy_retries
                    );
                    within(deadline, async {
                        tokio::time::sleep(self.options.busy_retries_wait).await;
                        Ok::<_, ModbusError>(())
                    })
                    .await?;
                }
                other => return other,
            }
        }
    }

    fn request_tags(&self, slave: u8, kind: RegisterKind, request: &Request) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::from([
            ("name".to_string(), self.options.device_name.clone()),
            ("slave_id".to_string(), slave.to_string()),
            ("type".to_string(), kind.type_tag().to_string()),
        ]);
        tags.extend(request.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        tags
    }
}

/// Run `operation`, failing with a timeout once `deadline` passes.
async fn within<F, R>(deadline: Option<Instant>, operation: F) -> ModbusResult<R>
where
    F: Future<Output = ModbusResult<R>>,
{
    match deadline {
        None => operation.await,
        Some(deadline) => tokio::time::timeout_at(deadline, operation)
            .await
            .map_err(|_| ModbusError::timeout("poll cycle", 0))?,
    }
}

/// Decode `field` from its request's response; `None` for fields without a
/// converter.
fn decode_field(response: &Response<'_>, field: &Field) -> Option<Result<FieldValue, DecodeError>> {
    let converter = field.converter.as_ref()?;
    let offset = usize::from(field.address.saturating_sub(response.request.address));
    let data = &response.data[..];

    if response.kind.is_bit() {
        return Some(match bit_at(data, offset) {
            Some(bit) => converter.decode(&[bit]),
            None => Err(DecodeError::ShortSpan {
                expected: offset / 8 + 1,
                actual: data.len(),
            }),
        });
    }
    Some(converter.decode(data.get(offset * 2..).unwrap_or(&[])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{EXCEPTION_GATEWAY_TARGET_FAILED, EXCEPTION_SERVER_DEVICE_BUSY};
    use crate::measurement::MemoryAccumulator;
    use crate::transport::mock::MockTransport;

    fn config(body: &str) -> Config {
        Config::from_toml_str(&format!(
            "name = \"device\"\nconfiguration_type = \"request\"\n{body}"
        ))
        .unwrap()
    }

    fn three_slaves() -> Config {
        config(
            r#"
            [[request]]
            slave_id = 1
            fields = [{ address = 0, name = "value", type = "INT16" }]

            [[request]]
            slave_id = 2
            fields = [{ address = 0, name = "value", type = "INT16" }]

            [[request]]
            slave_id = 3
            fields = [{ address = 0, name = "value", type = "INT16" }]
            "#,
        )
    }

    fn busy() -> ModbusResult<Bytes> {
        Err(ModbusError::exception(0x03, EXCEPTION_SERVER_DEVICE_BUSY))
    }

    fn poller(config: &Config, mock: &MockTransport) -> Poller<MockTransport> {
        Poller::from_config(config, mock.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_failing_slave_does_not_stop_others() {
        let mock = MockTransport::new();
        mock.set_registers(1, RegisterKind::Holding, 0, &[10]);
        mock.set_registers(3, RegisterKind::Holding, 0, &[30]);
        mock.script(2, Err(ModbusError::exception(0x03, EXCEPTION_GATEWAY_TARGET_FAILED)));

        let mut acc = MemoryAccumulator::new();
        poller(&three_slaves(), &mock).poll(&mut acc).await;

        assert_eq!(acc.measurements.len(), 2);
        assert_eq!(
            acc.for_slave(1).next().unwrap().field("value"),
            Some(&FieldValue::Int(10))
        );
        assert_eq!(
            acc.for_slave(3).next().unwrap().field("value"),
            Some(&FieldValue::Int(30))
        );
        assert_eq!(acc.errors.len(), 1);
        assert_eq!(acc.errors[0].slave(), 2);
        assert!(matches!(
            &acc.errors[0],
            PollError::Slave { source, .. } if source.is_gateway_unavailable()
        ));
        // exceptions keep the connection
        assert_eq!(mock.resets(), 0);
    }

    #[tokio::test]
    async fn test_workers_poll_all_slaves() {
        let mut config = three_slaves();
        config.workers = 3;
        let mock = MockTransport::new();
        for slave in 1..=3 {
            mock.set_registers(slave, RegisterKind::Holding, 0, &[u16::from(slave)]);
        }

        let mut acc = MemoryAccumulator::new();
        poller(&config, &mock).poll(&mut acc).await;

        let slaves: Vec<&str> = acc
            .measurements
            .iter()
            .map(|m| m.tag("slave_id").unwrap())
            .collect();
        assert_eq!(slaves, vec!["1", "2", "3"]);
        assert!(acc.errors.is_empty());
    }

    #[tokio::test]
    async fn test_busy_retried_until_success() {
        let mut config = three_slaves();
        config.busy_retries = 2;
        config.busy_retries_wait_ms = 1;
        let mock = MockTransport::new();
        mock.script(1, busy());
        mock.script(1, busy());

        let mut acc = MemoryAccumulator::new();
        poller(&config, &mock).poll(&mut acc).await;

        assert!(acc.errors.is_empty(), "{:?}", acc.errors);
        assert_eq!(acc.for_slave(1).count(), 1);
        let slave_one = mock.calls().iter().filter(|c| c.slave == 1).count();
        assert_eq!(slave_one, 3);
    }

    #[tokio::test]
    async fn test_busy_retries_exhausted() {
        let mut config = three_slaves();
        config.busy_retries = 1;
        config.busy_retries_wait_ms = 1;
        let mock = MockTransport::new();
        for _ in 0..3 {
            mock.script(1, busy());
        }

        let mut acc = MemoryAccumulator::new();
        poller(&config, &mock).poll(&mut acc).await;

        assert_eq!(acc.errors.len(), 1);
        assert!(matches!(&acc.errors[0], PollError::Slave { slave: 1, source } if source.is_busy()));
        assert_eq!(mock.calls().iter().filter(|c| c.slave == 1).count(), 2);
        assert_eq!(acc.measurements.len(), 2);
    }

    #[tokio::test]
    async fn test_other_exceptions_not_retried() {
        let mut config = three_slaves();
        config.busy_retries = 2;
        let mock = MockTransport::new();
        mock.script(1, Err(ModbusError::exception(0x03, 0x01)));

        let mut acc = MemoryAccumulator::new();
        poller(&config, &mock).poll(&mut acc).await;

        assert_eq!(mock.calls().iter().filter(|c| c.slave == 1).count(), 1);
        assert_eq!(acc.errors[0].slave(), 1);
    }

    #[tokio::test]
    async fn test_partial_results_discarded_and_connection_reset() {
        let config = config(
            r#"
            [[request]]
            slave_id = 1
            register = "holding"
            fields = [{ address = 0, name = "a", type = "INT16" }]

            [[request]]
            slave_id = 1
            register = "input"
            fields = [{ address = 0, name = "b", type = "INT16" }]
            "#,
        );
        let mock = MockTransport::new();
        mock.script(1, Ok(Bytes::from_static(&[0x00, 0x01])));
        mock.script(1, Err(ModbusError::io("connection reset by peer")));

        let mut acc = MemoryAccumulator::new();
        poller(&config, &mock).poll(&mut acc).await;

        assert!(acc.measurements.is_empty());
        assert_eq!(acc.errors.len(), 1);
        assert_eq!(mock.resets(), 1);
    }

    #[tokio::test]
    async fn test_coils_and_tags() {
        let config = config(
            r#"
            [[request]]
            slave_id = 1
            register = "coil"
            tags = { line = "north" }
            fields = [
                { address = 0, name = "pump" },
                { address = 1, name = "fan" },
                { address = 2, name = "valve", output = "BOOL" },
            ]
            "#,
        );
        let mock = MockTransport::new();
        mock.set_bits(1, RegisterKind::Coil, 0, &[true, false, true]);

        let mut acc = MemoryAccumulator::new();
        poller(&config, &mock).poll(&mut acc).await;

        assert_eq!(acc.measurements.len(), 1);
        let m = &acc.measurements[0];
        assert_eq!(m.name, "modbus");
        assert_eq!(m.field("pump"), Some(&FieldValue::Uint(1)));
        assert_eq!(m.field("fan"), Some(&FieldValue::Uint(0)));
        assert_eq!(m.field("valve"), Some(&FieldValue::Bool(true)));
        assert_eq!(m.tag("name"), Some("device"));
        assert_eq!(m.tag("slave_id"), Some("1"));
        assert_eq!(m.tag("type"), Some("coil"));
        assert_eq!(m.tag("line"), Some("north"));
    }

    #[tokio::test]
    async fn test_fields_grouped_by_measurement() {
        let config = config(
            r#"
            [[request]]
            slave_id = 1
            fields = [
                { address = 0, name = "voltage", type = "UINT16", scale = 0.1 },
                { address = 1, name = "current", type = "UINT16", measurement = "current" },
                { address = 2, name = "frequency", type = "UINT16" },
            ]
            "#,
        );
        let mock = MockTransport::new();
        mock.set_registers(1, RegisterKind::Holding, 0, &[0x0898, 12, 50]);

        let mut acc = MemoryAccumulator::new();
        poller(&config, &mock).poll(&mut acc).await;

        assert_eq!(mock.calls().len(), 1);
        let names: Vec<&str> = acc.measurements.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["current", "modbus"]);
        let modbus = &acc.measurements[1];
        assert_eq!(modbus.field("voltage"), Some(&FieldValue::Float(220.0)));
        assert_eq!(modbus.field("frequency"), Some(&FieldValue::Uint(50)));
        assert_eq!(acc.measurements[0].field("current"), Some(&FieldValue::Uint(12)));
        assert_eq!(modbus.timestamp, acc.measurements[0].timestamp);
    }

    #[tokio::test]
    async fn test_short_response_reports_decode_error() {
        let config = config(
            r#"
            [[request]]
            slave_id = 1
            fields = [
                { address = 0, name = "low", type = "INT16" },
                { address = 1, name = "high", type = "INT16" },
            ]
            "#,
        );
        let mock = MockTransport::new();
        mock.script(1, Ok(Bytes::from_static(&[0x00, 0x07, 0x00])));

        let mut acc = MemoryAccumulator::new();
        poller(&config, &mock).poll(&mut acc).await;

        assert_eq!(acc.measurements.len(), 1);
        assert_eq!(acc.measurements[0].field("low"), Some(&FieldValue::Int(7)));
        assert_eq!(acc.measurements[0].field("high"), None);
        assert_eq!(
            acc.errors,
            vec![PollError::Decode {
                slave: 1,
                field: "high".into(),
                source: DecodeError::ShortSpan { expected: 2, actual: 1 },
            }]
        );
    }

    #[tokio::test]
    async fn test_close_after_gather() {
        let mut config = three_slaves();
        config.workarounds.close_connection_after_gather = true;
        let mock = MockTransport::new();

        let mut acc = MemoryAccumulator::new();
        let poller = poller(&config, &mock);
        poller.poll(&mut acc).await;
        poller.poll(&mut acc).await;

        assert_eq!(mock.closes(), 2);
        assert_eq!(acc.measurements.len(), 6);
    }

    #[tokio::test]
    async fn test_expired_deadline_fails_slaves() {
        let config = three_slaves();
        let mock = MockTransport::new();
        mock.set_delay(Duration::from_secs(1));
        let poller = poller(&config, &mock);

        let mut acc = MemoryAccumulator::new();
        poller.poll_within(&mut acc, Duration::from_millis(50)).await;

        assert!(acc.measurements.is_empty());
        assert_eq!(acc.errors.len(), 3);
        assert!(acc.errors.iter().all(|e| matches!(
            e,
            PollError::Slave { source: ModbusError::Timeout { .. }, .. }
        )));
        assert_eq!(mock.resets(), 3);
    }
}
