//! Sorter configuration.
//!
//! The file is a list of `key=value` lines. Blank lines and lines starting with
//! `#` are ignored; an unknown key is an error. Values not present keep their
//! defaults. After the file, a few `AIDSORTER_*` environment variables may
//! override individual settings.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::buckets::{BucketTable, GATED_BUCKETS};
use crate::detect::{DetectionFilter, DEFAULT_MAX_DETECTIONS, DEFAULT_SCORE_THRESHOLD};
use crate::error::{ConfigError, Result};
use crate::ingest::SourceConfig;
use crate::protocol::{Codec, DEFAULT_SEPARATOR};

pub const DEFAULT_CONFIG_PATH: &str = "aidsorter.cfg";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_BAUDRATE: u32 = 9600;
const DEFAULT_MCU_TIMEOUT_SECS: f64 = 10.0;
const DEFAULT_DETECTOR_SAMPLES: usize = 5;
const DEFAULT_DETECTOR_DEBOUNCE: usize = 5;
const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";
const DEFAULT_RECOVERY_DELAY_SECS: f64 = 2.0;

const ENV_CONFIG: &str = "AIDSORTER_CONFIG";
const ENV_SERIAL_PORT: &str = "AIDSORTER_SERIAL_PORT";
const ENV_BAUDRATE: &str = "AIDSORTER_BAUDRATE";
const ENV_DETECTOR_SAMPLES: &str = "AIDSORTER_DETECTOR_SAMPLES";

#[derive(Debug, Clone, PartialEq)]
pub struct SorterConfig {
    /// Detector worker threads; values below 1 in the file mean all CPUs.
    pub cpu_threads: usize,
    pub resolution: (u32, u32),
    pub baudrate: u32,
    pub mcu_connection_timeout: Duration,
    pub detector_samples: usize,
    pub detector_debounce: usize,
    pub bucket_contents: [Vec<String>; GATED_BUCKETS],
    pub serial_port: String,
    pub protocol_separator: char,
    pub recovery_delay: Duration,
    pub score_threshold: f32,
    pub max_detections: usize,
}

impl Default for SorterConfig {
    fn default() -> Self {
        Self {
            cpu_threads: all_cpus(),
            resolution: (DEFAULT_WIDTH, DEFAULT_HEIGHT),
            baudrate: DEFAULT_BAUDRATE,
            mcu_connection_timeout: Duration::from_secs_f64(DEFAULT_MCU_TIMEOUT_SECS),
            detector_samples: DEFAULT_DETECTOR_SAMPLES,
            detector_debounce: DEFAULT_DETECTOR_DEBOUNCE,
            bucket_contents: Default::default(),
            serial_port: DEFAULT_SERIAL_PORT.to_string(),
            protocol_separator: DEFAULT_SEPARATOR,
            recovery_delay: Duration::from_secs_f64(DEFAULT_RECOVERY_DELAY_SECS),
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }
}

impl FromStr for SorterConfig {
    type Err = ConfigError;

    /// Parse file contents on top of the defaults. No validation or
    /// environment overrides are applied.
    fn from_str(text: &str) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or(ConfigError::Syntax { line: line_no })?;
            cfg.set(line_no, key.trim(), value.trim())?;
        }
        Ok(cfg)
    }
}

impl SorterConfig {
    /// Load from `AIDSORTER_CONFIG`, or from `aidsorter.cfg` when it exists.
    /// Without either, the defaults are used.
    pub fn load() -> Result<Self> {
        match std::env::var(ENV_CONFIG) {
            Ok(path) if !path.trim().is_empty() => Self::load_from(Path::new(&path)),
            _ => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    return Self::load_from(default_path);
                }
                log::info!("no config file found, using defaults");
                Self::finish(Self::default())
            }
        }
    }

    /// Load an explicit file. A missing file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        log::info!("Loading configuration from {}", path.display());
        Self::finish(raw.parse()?)
    }

    fn finish(mut cfg: Self) -> Result<Self> {
        cfg.apply_env()?;
        cfg.validate()?;
        cfg.log_summary();
        Ok(cfg)
    }

    fn set(&mut self, line: usize, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "cpu_threads" => {
                let threads: i64 = parse_number(key, value)?;
                self.cpu_threads = if threads < 1 {
                    all_cpus()
                } else {
                    threads as usize
                };
            }
            "resolution" => self.resolution = parse_resolution(key, value)?,
            "baudrate" => self.baudrate = parse_number(key, value)?,
            "mcu_connection_timeout" => {
                self.mcu_connection_timeout = parse_seconds(key, value)?;
            }
            "detector_samples" => self.detector_samples = parse_number(key, value)?,
            "detector_debounce" => self.detector_debounce = parse_number(key, value)?,
            "serial_port" => self.serial_port = value.to_string(),
            "protocol_separator" => self.protocol_separator = parse_separator(key, value)?,
            "recovery_delay" => self.recovery_delay = parse_seconds(key, value)?,
            "score_threshold" => self.score_threshold = parse_number(key, value)?,
            "max_detections" => self.max_detections = parse_number(key, value)?,
            _ => match bucket_key(key) {
                Some(index) => self.bucket_contents[index] = split_csv(value),
                None => {
                    return Err(ConfigError::UnknownKey {
                        line,
                        key: key.to_string(),
                    })
                }
            },
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(port) = std::env::var(ENV_SERIAL_PORT) {
            if !port.trim().is_empty() {
                self.serial_port = port.trim().to_string();
            }
        }
        if let Ok(baud) = std::env::var(ENV_BAUDRATE) {
            self.baudrate = parse_number(ENV_BAUDRATE, baud.trim())?;
        }
        if let Ok(samples) = std::env::var(ENV_DETECTOR_SAMPLES) {
            self.detector_samples = parse_number(ENV_DETECTOR_SAMPLES, samples.trim())?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.detector_samples < 1 {
            return Err(ConfigError::invalid(
                "detector_samples",
                &self.detector_samples.to_string(),
                "must be at least 1",
            ));
        }
        if self.baudrate == 0 {
            return Err(ConfigError::invalid("baudrate", "0", "must be positive"));
        }
        if self.mcu_connection_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "mcu_connection_timeout",
                "0",
                "must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(ConfigError::invalid(
                "score_threshold",
                &self.score_threshold.to_string(),
                "must be between 0 and 1",
            ));
        }
        if self.max_detections < 1 {
            return Err(ConfigError::invalid(
                "max_detections",
                &self.max_detections.to_string(),
                "must be at least 1",
            ));
        }
        if self.serial_port.is_empty() {
            return Err(ConfigError::invalid("serial_port", "", "must not be empty"));
        }
        Ok(())
    }

    fn log_summary(&self) {
        log::info!("Configuration:");
        log::info!("\tCPU threads: {}", self.cpu_threads);
        log::info!("\tResolution: {}x{}", self.resolution.0, self.resolution.1);
        log::info!("\tSerial port: {} @ {} baud", self.serial_port, self.baudrate);
        log::info!(
            "\tMCU connection timeout: {:.1}s",
            self.mcu_connection_timeout.as_secs_f64()
        );
        log::info!(
            "\tDetector samples: {} (debounce {})",
            self.detector_samples,
            self.detector_debounce
        );
        log::info!(
            "\tScore threshold: {} (max {} detections)",
            self.score_threshold,
            self.max_detections
        );
        for (idx, contents) in self.bucket_contents.iter().enumerate() {
            log::info!("\tBucket {}: {} categories", idx + 1, contents.len());
            log::debug!("\tBucket {} contents: {:?}", idx + 1, contents);
        }
        for (category, buckets) in self.bucket_table().overlaps() {
            let listed: Vec<String> = buckets.iter().map(|b| b.to_string()).collect();
            log::warn!(
                "category '{}' is listed in buckets {}; bucket {} wins",
                category,
                listed.join(", "),
                listed.first().map(String::as_str).unwrap_or("?")
            );
        }
    }

    pub fn bucket_table(&self) -> BucketTable {
        BucketTable::new(self.bucket_contents.clone())
    }

    pub fn codec(&self) -> Result<Codec> {
        Ok(Codec::new(self.protocol_separator)?)
    }

    pub fn source_config(&self, url: &str) -> SourceConfig {
        SourceConfig {
            url: url.to_string(),
            width: self.resolution.0,
            height: self.resolution.1,
        }
    }

    pub fn filter(&self) -> DetectionFilter {
        DetectionFilter {
            score_threshold: self.score_threshold,
            max_detections: self.max_detections,
        }
    }
}

fn all_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn bucket_key(key: &str) -> Option<usize> {
    let number: usize = key
        .strip_prefix("bucket")?
        .strip_suffix("_contents")?
        .parse()
        .ok()?;
    (1..=GATED_BUCKETS).contains(&number).then(|| number - 1)
}

fn parse_number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, value, e.to_string()))
}

fn parse_seconds(key: &str, value: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = parse_number(key, value)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(ConfigError::invalid(
            key,
            value,
            "must be a non-negative number of seconds",
        ));
    }
    Ok(Duration::from_secs_f64(secs))
}

fn parse_resolution(key: &str, value: &str) -> Result<(u32, u32), ConfigError> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| ConfigError::invalid(key, value, "expected <width>x<height>"))?;
    let width: u32 = parse_number(key, w.trim())?;
    let height: u32 = parse_number(key, h.trim())?;
    if width == 0 || height == 0 {
        return Err(ConfigError::invalid(key, value, "dimensions must be positive"));
    }
    Ok((width, height))
}

fn parse_separator(key: &str, value: &str) -> Result<char, ConfigError> {
    let separator = match value {
        "\\n" => '\n',
        "\\r" => '\r',
        "\\t" => '\t',
        _ => {
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(ConfigError::invalid(
                        key,
                        value,
                        "expected a single character or \\n, \\r, \\t",
                    ))
                }
            }
        }
    };
    if !separator.is_ascii() {
        return Err(ConfigError::invalid(key, value, "separator must be ascii"));
    }
    Ok(separator)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
