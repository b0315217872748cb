//! Two-node walkthrough on the in-process bus.
//!
//! A "device" exposes a handful of settings; a "console" lists them,
//! changes one, and mirrors another through a watch entry.
//!
//! ```text
//! cargo run --example loopback
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{LevelFilter, Metadata, Record, info};
use settingsbus::adapters::LoopbackBus;
use settingsbus::{Notify, SettingSlot, Settings, SettingsType, Veto};

struct StdoutLogger;

impl log::Log for StdoutLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        println!("[{:<5}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StdoutLogger = StdoutLogger;

fn main() -> Result<()> {
    log::set_logger(&LOGGER).map_err(|e| anyhow::anyhow!("logger: {e}"))?;
    log::set_max_level(LevelFilter::Info);

    let bus = LoopbackBus::new();
    let device = Settings::new(0x0010, bus.node(0x0010)).context("device context")?;
    let console = Settings::new(0x0020, bus.node(0x0020)).context("console context")?;

    // ── Device side ───────────────────────────────────────────
    let baud = Arc::new(SettingSlot::int32(115_200));
    let gain = Arc::new(SettingSlot::float32(0.75));
    let fan = Arc::new(SettingSlot::enumeration(0));
    let fan_modes = device.register_enum(&["off", "on", "auto"])?;

    let gain_check: Notify = {
        let gain = gain.clone();
        Arc::new(move || match gain.get_float() {
            Some(v) if (0.0..=1.0).contains(&v) => Ok(()),
            _ => Err(Veto::ValueRejected),
        })
    };
    device.register_setting("uart", "baud", baud.clone(), SettingsType::INT, None)?;
    device.register_setting("ctl", "gain", gain.clone(), SettingsType::FLOAT, Some(gain_check))?;
    device.register_setting("fan", "mode", fan, fan_modes, None)?;
    device.register_readonly(
        "sys",
        "version",
        Arc::new(SettingSlot::string(16, env!("CARGO_PKG_VERSION")).context("version slot")?),
        SettingsType::STRING,
    )?;

    // ── Console side ──────────────────────────────────────────
    info!("directory of node 0x0010:");
    for rec in console.enumerate()? {
        let ty = rec.ty.map(|t| t.to_string()).unwrap_or_default();
        info!("  {}.{} = {} ({})", rec.section, rec.name, rec.value, ty);
    }

    let mirror = Arc::new(SettingSlot::int32(0));
    console.register_watch("uart", "baud", mirror.clone(), SettingsType::INT, None)?;
    console.sync_watch("uart", "baud")?;
    info!("mirror after sync: {:?}", mirror.get_int());

    console.write_int("uart", "baud", 921_600)?;
    info!("device baud now {:?}, mirror {:?}", baud.get_int(), mirror.get_int());

    match console.write_float("ctl", "gain", 3.0) {
        Ok(()) => info!("gain accepted"),
        Err(e) => info!("gain 3.0 refused: {e}"),
    }
    info!("device gain still {:?}", gain.get_float());

    match console.read("uart", "parity") {
        Ok(rec) => info!("parity = {}", rec.value),
        Err(e) => info!("uart.parity: {e}"),
    }

    Ok(())
}
