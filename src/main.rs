//! Field data-logger host simulator entry point.
//!
//! Runs the logger core against [`SimBoard`] for a stretch of simulated
//! time, then opens the enclosure to export the log and prints what ended
//! up on the media.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  SimBoard (bus · controller · ADC · pulse input · RTC)   │
//! │  LogEventSink                                            │
//! │                                                          │
//! │  ─────────────── Port Trait Boundary ───────────────     │
//! │                                                          │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │  AppService: LogStore · StorageController · export │  │
//! │  └────────────────────────────────────────────────────┘  │
//! │                                                          │
//! │  SharedState (tick / serial / alarm interrupts)          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `fieldlogger [CONFIG.json|-] [SECONDS]`
#![deny(unused_must_use)]

use anyhow::{Context, Result};
use log::{info, warn};

use fieldlogger::adapters::log_sink::LogEventSink;
use fieldlogger::adapters::sim::SimBoard;
use fieldlogger::app::ports::IdlePort;
use fieldlogger::app::service::AppService;
use fieldlogger::config::LoggerConfig;
use fieldlogger::events::SharedState;
use fieldlogger::sensors::{ChannelSettings, SamplingMode, Unit};

static SHARED: SharedState = SharedState::new();

const DEFAULT_SECONDS: u64 = 15 * 60;
/// One meter pulse every this many milliseconds.
const PULSE_PERIOD_MS: u64 = 700;

fn load_config(path: Option<&str>) -> Result<LoggerConfig> {
    let config = match path {
        None | Some("-") => LoggerConfig::default(),
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {path}"))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {path}"))?
        }
    };
    config.validate()?;
    Ok(config)
}

fn demo_channels() -> [ChannelSettings; 3] {
    [
        ChannelSettings {
            enabled: true,
            mode: SamplingMode::Pulse,
            interval_secs: 120,
            unit: Unit::CubicMetre,
            multiply_factor: 0.01,
        },
        ChannelSettings {
            enabled: true,
            mode: SamplingMode::Analog,
            interval_secs: 60,
            unit: Unit::Bar,
            multiply_factor: 1.0,
        },
        ChannelSettings {
            enabled: true,
            mode: SamplingMode::FastAnalog,
            interval_secs: 2,
            unit: Unit::Bar,
            multiply_factor: 1.0,
        },
    ]
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let config = load_config(args.get(1).map(String::as_str))?;
    let seconds = match args.get(2) {
        Some(s) => s.parse().with_context(|| format!("bad duration '{s}'"))?,
        None => DEFAULT_SECONDS,
    };

    info!("╔══════════════════════════════════════╗");
    info!("║  fieldlogger simulator v{:<13}║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let mut board = SimBoard::new(&SHARED);
    board.set_adc(1, 520);
    board.set_adc(2, 410);
    let mut sink = LogEventSink::new();
    let mut app = AppService::new(&SHARED, config);
    app.boot(&mut board, &mut sink);

    for (index, settings) in demo_channels().into_iter().enumerate() {
        if let Err(e) = app.apply_channel_settings(&mut board, &mut sink, index, settings) {
            warn!("Channel {} settings not reported ({})", index + 1, e);
        }
    }

    let end_ms = board.now_ms() + seconds * 1000;
    while board.now_ms() < end_ms {
        board.set_pulse_level(board.now_ms() % PULSE_PERIOD_MS >= 100);
        if !app.run_once(&mut board, &mut sink) {
            board.wait_for_interrupt();
        }
    }

    info!("Opening enclosure");
    board.set_enclosure_open(true);
    while app.run_once(&mut board, &mut sink) {}
    board.set_enclosure_open(false);

    for (name, data) in board.controller.files() {
        info!("── {} ({} bytes) ──", name, data.len());
        for line in String::from_utf8_lossy(data).lines() {
            info!("  {}", line);
        }
    }
    let errors = board.error_log();
    if errors.is_empty() {
        info!("Error log empty");
    } else {
        for code in &errors {
            warn!("Error log: 0x{:04X}", code);
        }
    }
    Ok(())
}
