use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
    /// No stage output at all; library callers and tests.
    Quiet,
}

/// Stage progress on stderr.
#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn quiet() -> Self {
        Self::new(UiMode::Quiet, false, true)
    }

    /// Parse `--ui auto|plain|pretty|quiet`.
    pub fn from_flag(ui_flag: &str, is_tty: bool, disable_pretty: bool) -> Result<Self> {
        let mode = match ui_flag.trim().to_ascii_lowercase().as_str() {
            "auto" => UiMode::Auto,
            "plain" => UiMode::Plain,
            "pretty" => UiMode::Pretty,
            "quiet" => UiMode::Quiet,
            other => {
                return Err(anyhow!(
                    "unknown --ui mode '{}' (expected auto, plain, pretty or quiet)",
                    other
                ))
            }
        };
        Ok(Self::new(mode, is_tty, disable_pretty))
    }

    pub fn mode(&self) -> UiMode {
        self.mode
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        log::debug!("stage start: {}", name);
        let output = match self.mode {
            UiMode::Quiet => StageOutput::Silent,
            UiMode::Pretty if self.is_tty => StageOutput::Spinner(spinner(name)),
            UiMode::Auto if self.is_tty && !self.disable_pretty => {
                StageOutput::Spinner(spinner(name))
            }
            _ => {
                eprintln!("==> {}", name);
                StageOutput::Plain
            }
        };
        StageGuard::new(name.to_string(), output)
    }
}

fn spinner(name: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_draw_target(ProgressDrawTarget::stderr());
    spinner.enable_steady_tick(Duration::from_millis(120));
    let style = ProgressStyle::with_template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(format!("{name}…"));
    spinner
}

enum StageOutput {
    Silent,
    Plain,
    Spinner(ProgressBar),
}

/// Finishes the stage line when dropped.
pub struct StageGuard {
    name: String,
    start: Instant,
    output: StageOutput,
}

impl StageGuard {
    fn new(name: String, output: StageOutput) -> Self {
        Self {
            name,
            start: Instant::now(),
            output,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        log::debug!("stage done: {} in {:?}", self.name, elapsed);
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        match &self.output {
            StageOutput::Silent => {}
            StageOutput::Plain => eprintln!("{message}"),
            StageOutput::Spinner(spinner) => spinner.finish_with_message(message),
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
    fn parses_known_modes() -> Result<()> {
        assert_eq!(Ui::from_flag("plain", true, false)?.mode(), UiMode::Plain);
        assert_eq!(Ui::from_flag(" Pretty ", false, false)?.mode(), UiMode::Pretty);
        assert_eq!(Ui::from_flag("auto", false, false)?.mode(), UiMode::Auto);
        assert!(Ui::from_flag("fancy", true, false).is_err());
        Ok(())
    }

    #[test]
    fn durations_switch_units_at_one_second() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }

    #[test]
    fn quiet_stage_tracks_time() {
        let ui = Ui::quiet();
        let guard = ui.stage("metrics");
        assert!(guard.elapsed() < Duration::from_secs(60));
    }
}
