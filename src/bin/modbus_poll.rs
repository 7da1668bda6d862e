//! Modbus Poll
//!
//! Loads a planner configuration, connects to the device and prints the
//! decoded measurements of every poll cycle.
//!
//! Usage: modbus-poll <config.toml> [--once] [--interval-ms N]
//! Example: RUST_LOG=modbus_planner=debug modbus-poll modbus.toml --once
//!
//! Settings may be overridden from the environment, e.g.
//! `MODBUS_CONTROLLER=tcp://10.0.0.5:502`.

use std::time::Duration;

use modbus_planner::{Config, MemoryAccumulator, Poller, TokioModbusTransport};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: modbus-poll <config.toml> [--once] [--interval-ms N]";

struct Args {
    config: String,
    once: bool,
    interval: Duration,
}

fn parse_args() -> Result<Args, String> {
    let mut config = None;
    let mut once = false;
    let mut interval = Duration::from_secs(10);

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--once" => once = true,
            "--interval-ms" => {
                let value = args.next().ok_or("--interval-ms needs a value")?;
                let ms: u64 = value
                    .parse()
                    .map_err(|_| format!("invalid interval {value:?}"))?;
                interval = Duration::from_millis(ms.max(1));
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            other if config.is_none() && !other.starts_with('-') => config = Some(other.to_string()),
            other => return Err(format!("unexpected argument {other:?}\n{USAGE}")),
        }
    }

    Ok(Args {
        config: config.ok_or(USAGE)?,
        once,
        interval,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("modbus_planner=info")),
        )
        .init();

    let args = parse_args()?;
    let config = Config::from_file(&args.config)?;
    let transport = TokioModbusTransport::new(config.transport_config()?);
    let poller = Poller::from_config(&config, transport)?;
    info!(
        version = modbus_planner::VERSION,
        device = %config.name,
        controller = %config.controller,
        slaves = poller.plan().len(),
        "plan ready"
    );

    let mut ticker = tokio::time::interval(args.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut acc = MemoryAccumulator::new();
    loop {
        ticker.tick().await;
        poller.poll_within(&mut acc, args.interval).await;

        let (measurements, errors) = acc.take();
        for m in measurements {
            let tags: Vec<String> = m.tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
            let fields: Vec<String> = m.fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
            println!(
                "{},{} {} {}",
                m.name,
                tags.join(","),
                fields.join(","),
                m.timestamp.timestamp_nanos_opt().unwrap_or_default()
            );
        }
        for e in errors {
            error!("{}", e);
        }

        if args.once {
            break;
        }
    }

    if let Err(e) = poller.close().await {
        error!("closing connection failed: {}", e);
    }
    Ok(())
}
