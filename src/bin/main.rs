use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use linux_embedded_hal::{Delay, I2cdev};
use log::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tsl2591::helpers::median_buffer::RunningMedianBuffer;
use tsl2591::{is_saturated, Channel, Config, Gain, IntegrationTime, TSL2591};

/// Read lux from a TSL2591 on a Linux I²C bus
#[derive(Parser, Debug)]
#[command(name = "tsl2591-read", version, about)]
struct Args {
    /// I²C bus number, opened as /dev/i2c-N
    #[arg(long, env = "TSL2591_BUS", default_value_t = 1)]
    bus: u8,

    /// 7-bit device address, decimal or 0x-prefixed hex
    #[arg(long, env = "TSL2591_ADDRESS", default_value = "0x29", value_parser = parse_address)]
    address: u8,

    /// Integration time in milliseconds (100..=600 in steps of 100)
    #[arg(
        long = "integration-ms",
        env = "TSL2591_INTEGRATION_MS",
        default_value = "100",
        value_parser = parse_integration_time
    )]
    integration_time: IntegrationTime,

    /// Gain multiplier (1, 25, 428 or 9876)
    #[arg(long, env = "TSL2591_GAIN", default_value = "1", value_parser = parse_gain)]
    gain: Gain,

    /// Number of readings, 0 = run forever
    #[arg(long, env = "TSL2591_SAMPLES", default_value_t = 0)]
    samples: u32,

    /// Pause between readings in milliseconds
    #[arg(long = "interval-ms", env = "TSL2591_INTERVAL_MS", default_value_t = 1000)]
    interval_ms: u64,
}

impl Args {
    fn sensor_config(&self) -> Config {
        Config::default()
            .with_address(self.address)
            .with_integration_time(self.integration_time)
            .with_gain(self.gain)
    }
}

fn parse_address(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    match parsed {
        Ok(address) if address <= 0x7F => Ok(address),
        Ok(address) => Err(format!("0x{address:02X} is not a 7-bit address")),
        Err(e) => Err(format!("invalid address {s:?}: {e}")),
    }
}

fn parse_integration_time(s: &str) -> Result<IntegrationTime, String> {
    s.parse()
        .ok()
        .and_then(IntegrationTime::from_ms)
        .ok_or_else(|| format!("{s:?} is not one of 100, 200, 300, 400, 500, 600"))
}

fn parse_gain(s: &str) -> Result<Gain, String> {
    s.parse()
        .ok()
        .and_then(Gain::from_multiplier)
        .ok_or_else(|| format!("{s:?} is not one of 1, 25, 428, 9876"))
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tsl2591=info,tsl2591_read=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = args.sensor_config();
    let path = format!("/dev/i2c-{}", args.bus);
    info!(
        "Opening TSL2591 at 0x{:02X} on {path}: {} ms, {}x gain",
        config.address,
        config.integration_time.as_ms(),
        config.gain.multiplier()
    );

    let i2c = I2cdev::new(&path).with_context(|| format!("opening {path}"))?;
    let mut tsl = TSL2591::from_config(i2c, Delay, config)
        .map_err(|e| anyhow!("TSL2591 init failed: {e:?}"))?;
    if let Err(e) = tsl.check_device_id() {
        warn!("Device ID check failed, continuing anyway: {e:?}");
    }

    let interval = Duration::from_millis(args.interval_ms);
    let mut lux_window = RunningMedianBuffer::<5>::new();
    let mut taken = 0u32;
    while args.samples == 0 || taken < args.samples {
        taken += 1;
        match tsl.get_full_luminosity() {
            Ok((full, ir)) => {
                let visible = Channel::Visible.select(full, ir);
                if is_saturated(full, ir) {
                    warn!("Sample {taken}: saturated (full={full}, ir={ir}), lower the gain");
                } else {
                    let lux = tsl.calculate_lux(full, ir);
                    lux_window.push(lux);
                    info!(
                        "Sample {taken}: full={full} ir={ir} visible={visible} lux={lux:.2} median={:.2}",
                        lux_window.median().unwrap_or(lux)
                    );
                }
            }
            Err(e) => error!("Sample {taken}: reading TSL2591 failed: {e:?}"),
        }
        std::thread::sleep(interval);
    }

    let (_i2c, _delay) = tsl.destroy();
    Ok(())
}
