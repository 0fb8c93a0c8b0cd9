//! aidsorter - goods sorting controller
//!
//! Startup:
//! 1. Load the configuration (fatal on error)
//! 2. Install the Ctrl-C handler
//! 3. Open the MCU link and complete the handshake (fatal on error)
//! 4. Open the frame source and the detector
//! 5. Run the sorting loop until Ctrl-C, then park the MCU

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
#[cfg(feature = "detect-remote")]
use std::time::Duration;

use aidsorter::ui::{Ui, UiMode};
use aidsorter::{
    open_source, Codec, Controller, Detector, McuClient, McuLink, RecoveryPolicy, ReplayDetector,
    SerialLink, SimulatedMcu, Sorter, SorterConfig, SorterError, StubDetector,
};

#[cfg(feature = "detect-remote")]
const REMOTE_DETECTOR_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration file (key=value lines).
    #[arg(long, env = "AIDSORTER_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
    /// Serial port of the MCU; `stub://<name>` runs against a simulated MCU.
    #[arg(long, value_name = "PATH")]
    port: Option<String>,
    /// Frame source URL.
    #[arg(long, default_value = "stub://camera", value_name = "URL")]
    source: String,
    /// Replay per-frame detections from a JSON-lines file (`-` for stdin).
    #[arg(long, value_name = "PATH", conflicts_with = "detector_url")]
    detections: Option<PathBuf>,
    /// Inference server for remote detection (requires the detect-remote feature).
    #[arg(long, value_name = "URL")]
    detector_url: Option<String>,
    /// UI mode for stderr progress.
    #[arg(long, value_enum, default_value_t = UiMode::Auto, value_name = "MODE")]
    ui: UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::for_stderr(args.ui);

    log::info!("{} started.", aidsorter::title());
    log::debug!("CMD: {:?}", std::env::args().collect::<Vec<_>>());
    if let Ok(dir) = std::env::current_dir() {
        log::info!("PWD: {}", dir.display());
    }

    let mut cfg = staged(&ui, "Loading configuration", || match &args.config {
        Some(path) => SorterConfig::load_from(path),
        None => SorterConfig::load(),
    })?;
    if let Some(port) = &args.port {
        cfg.serial_port = port.clone();
    }
    let codec = cfg.codec().context("invalid protocol separator")?;

    // A Ctrl-C during the remaining startup stages must still reach shutdown.
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })
        .context("error setting Ctrl-C handler")?;
    }

    let mcu = staged(&ui, "Connecting to the MCU", || {
        let link = open_link(&cfg, codec)?;
        McuClient::connect(link, codec)
    })?;

    let mut source = staged(&ui, "Opening frame source", || {
        let mut source = open_source(cfg.source_config(&args.source))?;
        source.connect()?;
        Ok(source)
    })?;

    let mut detector = staged(&ui, "Preparing detector", || {
        let mut detector = build_detector(&args, &cfg)?;
        detector.warm_up()?;
        Ok(detector)
    })?;

    let sorter = Sorter::new(cfg.bucket_table(), cfg.detector_samples);
    let mut controller = Controller::new(sorter, mcu)
        .with_filter(cfg.filter())
        .with_recovery(RecoveryPolicy {
            delay: cfg.recovery_delay,
        });

    log::info!("{} running. Press Ctrl-C to stop.", aidsorter::NAME);
    controller
        .run(&mut source, &mut detector, &stop)
        .context("shutdown did not complete cleanly")?;

    log::info!("{} exited with code 0.", aidsorter::title());
    Ok(())
}

/// Run one startup stage, reporting success or failure on the UI.
fn staged<T>(ui: &Ui, name: &str, f: impl FnOnce() -> aidsorter::Result<T>) -> Result<T> {
    let stage = ui.stage(name);
    match f() {
        Ok(value) => Ok(value),
        Err(e) => {
            stage.fail(e.to_string());
            Err(anyhow::Error::new(e).context(format!("{} failed", name.to_lowercase())))
        }
    }
}

fn open_link(cfg: &SorterConfig, codec: Codec) -> aidsorter::Result<Box<dyn McuLink>> {
    if cfg.serial_port.starts_with("stub://") {
        log::warn!("using a simulated MCU on {}", cfg.serial_port);
        return Ok(Box::new(SimulatedMcu::new(&cfg.serial_port, codec)));
    }
    let link = SerialLink::open(&cfg.serial_port, cfg.baudrate, cfg.mcu_connection_timeout)?;
    Ok(Box::new(link))
}

fn build_detector(args: &Args, cfg: &SorterConfig) -> aidsorter::Result<Box<dyn Detector>> {
    if let Some(path) = &args.detections {
        if path.as_os_str() == "-" {
            log::info!("replaying detections from stdin");
            return Ok(Box::new(ReplayDetector::new(
                BufReader::new(std::io::stdin()),
                "stdin",
            )));
        }
        let file = File::open(path).map_err(|e| {
            SorterError::Detector(format!("failed to open {}: {}", path.display(), e))
        })?;
        log::info!("replaying detections from {}", path.display());
        return Ok(Box::new(ReplayDetector::new(
            BufReader::new(file),
            &path.display().to_string(),
        )));
    }

    if let Some(url) = &args.detector_url {
        #[cfg(feature = "detect-remote")]
        {
            log::info!("using remote detector at {}", url);
            return Ok(Box::new(aidsorter::RemoteDetector::new(
                url,
                REMOTE_DETECTOR_TIMEOUT,
            )));
        }
        #[cfg(not(feature = "detect-remote"))]
        {
            return Err(SorterError::Detector(format!(
                "cannot use {}: built without the detect-remote feature",
                url
            )));
        }
    }

    let categories: Vec<&str> = cfg
        .bucket_contents
        .iter()
        .flatten()
        .map(String::as_str)
        .collect();
    if categories.is_empty() {
        log::warn!("no bucket categories configured; the demo detector will see nothing");
    } else {
        log::warn!(
            "no detector configured; cycling through {} configured categories",
            categories.len()
        );
    }
    Ok(Box::new(StubDetector::demo(&categories, cfg.detector_samples)))
}
