//! Startup stage reporting for the `aidsorter` binary.
//!
//! On a terminal each stage gets a spinner that resolves to a check mark or a
//! cross; otherwise stages are plain `==>` lines on stderr so they interleave
//! cleanly with log output.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum UiMode {
    #[default]
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        let pretty = is_tty
            && match mode {
                UiMode::Pretty | UiMode::Auto => true,
                UiMode::Plain => false,
            };
        Self { pretty }
    }

    /// Pick the mode against the actual stderr.
    pub fn for_stderr(mode: UiMode) -> Self {
        Self::new(mode, std::io::stderr().is_terminal())
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if !self.pretty {
            eprintln!("==> {}", name);
            return StageGuard::new(name.to_string(), None);
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_draw_target(ProgressDrawTarget::stderr());
        spinner.enable_steady_tick(Duration::from_millis(120));
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(format!("{name}…"));
        StageGuard::new(name.to_string(), Some(spinner))
    }
}

/// Finishes its stage when dropped. A stage that is dropped without
/// [`StageGuard::fail`] is reported as successful.
pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    failure: Option<String>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
            failure: None,
        }
    }

    /// Mark the stage as failed with a short reason.
    pub fn fail(mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
    }

    fn summary(&self) -> String {
        let elapsed = format_duration(self.start.elapsed());
        match &self.failure {
            Some(reason) => format!("✘ {} ({}): {}", self.name, elapsed, reason),
            None => format!("✔ {} ({})", self.name, elapsed),
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = self.summary();
        match &self.spinner {
            Some(spinner) if self.failure.is_some() => spinner.abandon_with_message(message),
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_only_on_a_terminal() {
        assert!(Ui::new(UiMode::Auto, true).is_pretty());
        assert!(!Ui::new(UiMode::Pretty, false).is_pretty());
        assert!(!Ui::new(UiMode::Plain, true).is_pretty());
    }

    #[test]
    fn failed_stage_summary_names_reason() {
        let mut guard = StageGuard::new("handshake".to_string(), None);
        guard.failure = Some("no READY frame".to_string());
        assert!(guard.summary().starts_with("✘ handshake ("));
        assert!(guard.summary().ends_with("): no READY frame"));
    }

    #[test]
    fn durations_switch_units_at_one_second() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
