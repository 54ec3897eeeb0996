//! hapd
//!
//! Runs a demo bridge with a simulated thermometer, a lamp and an outlet.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use rand::Rng;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use hap::hap_runtime::{Flow, Job, Work};
use hap::hap_types::{Category, Value};
use hap::model::catalog;
use hap::{Accessory, AccessoryInfo, Bridge, Driver, DriverConfig, Routine};

/// HAP accessory server
#[derive(Parser, Debug)]
#[command(name = "hapd")]
#[command(about = "HAP accessory server", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server port
    #[arg(long)]
    port: Option<u16>,

    /// Where identity and pairing state is stored
    #[arg(long)]
    persist_file: Option<PathBuf>,

    /// Name announced on the network
    #[arg(long)]
    name: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hap=info,hap_runtime=info,hapd=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = DriverConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(persist_file) = args.persist_file {
        config.persist_file = persist_file;
    }
    if let Some(name) = args.name {
        config.name = name;
    }
    config.validate()?;

    info!("Starting hapd v{}", env!("CARGO_PKG_VERSION"));

    let driver = Driver::new(config.clone())?;
    driver.add_bridge(Bridge::from_accessory(
        Accessory::new(config.name.as_str())
            .with_category(Category::Bridge)
            .with_info(demo_info("Bridge")),
    ))?;

    driver.add_accessory(thermometer())?;
    driver.add_accessory(lamp())?;
    driver.add_accessory(outlet())?;

    // Stop on Ctrl-C
    let stop = driver.scheduler().stop_handle();
    let signals = driver.clone();
    driver.add_job(Job::once(
        "signals",
        Work::cooperative(move || {
            let (stop, driver) = (stop.clone(), signals.clone());
            async move {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        result?;
                        info!("Received Ctrl-C, shutting down");
                        driver.stop();
                    }
                    _ = stop.stopped() => {}
                }
                Ok(Flow::Finish)
            }
        }),
    ))?;

    driver.start()?;
    Ok(())
}

fn demo_info(model: &str) -> AccessoryInfo {
    AccessoryInfo {
        manufacturer: "hapd".to_string(),
        model: model.to_string(),
        serial_number: format!("HAPD-{}", model.to_uppercase()),
        ..AccessoryInfo::default()
    }
}

/// Thermometer drifting around 21°C
fn thermometer() -> Accessory {
    Accessory::new("Thermometer")
        .with_category(Category::Sensor)
        .with_info(demo_info("Thermometer"))
        .with_service(catalog::temperature_sensor())
        .with_routine(
            Routine::cooperative("measure", |driver: Driver, aid| async move {
                let current = driver.value(aid, 9).and_then(|v| v.as_f64()).unwrap_or(21.0);
                let next = (current + rand::thread_rng().gen_range(-0.5..0.5)).clamp(15.0, 30.0);
                driver.update_value(aid, 9, (next * 10.0).round() / 10.0)?;
                Ok(Flow::Repeat)
            })
            .every(Duration::from_secs(3)),
        )
}

fn lamp() -> Accessory {
    Accessory::new("Lamp")
        .with_category(Category::Lightbulb)
        .with_info(demo_info("Lamp"))
        .with_service(catalog::lightbulb().on_change(|values| {
            for (name, value) in values {
                info!(characteristic = %name, %value, "Lamp changed");
            }
            Ok(())
        }))
}

/// Outlet whose in-use flag is polled with a blocking call
fn outlet() -> Accessory {
    Accessory::new("Outlet")
        .with_category(Category::Outlet)
        .with_info(demo_info("Outlet"))
        .with_service(catalog::outlet())
        .with_routine(
            Routine::blocking("poll", |driver: &Driver, aid| {
                // Simulated slow meter read
                std::thread::sleep(Duration::from_millis(200));
                let on = driver.value(aid, 9).and_then(|v| v.as_bool()).unwrap_or(false);
                if driver.value(aid, 10) != Some(Value::Bool(on)) {
                    driver.update_value(aid, 10, on)?;
                }
                Ok(Flow::Repeat)
            })
            .every(Duration::from_secs(10)),
        )
}
