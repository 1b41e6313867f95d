//! Progress bar utilities for transfer operations

use indicatif::ProgressStyle;

use super::OutputConfig;

const BAR_TEMPLATE: &str =
    "{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg} {bytes} ({bytes_per_sec})";

/// Progress bar wrapper
///
/// In quiet or JSON mode, or with `--no-progress`, nothing is drawn.
#[derive(Debug)]
pub struct ProgressBar {
    bar: Option<indicatif::ProgressBar>,
}

fn suppressed(config: &OutputConfig) -> bool {
    config.quiet || config.json || config.no_progress
}

impl ProgressBar {
    /// Create a byte progress bar; `total` of None draws a spinner instead
    pub fn new(config: &OutputConfig, total: Option<u64>, message: &str) -> Self {
        if suppressed(config) {
            return Self::hidden();
        }

        let bar = match total {
            Some(total) => {
                let bar = indicatif::ProgressBar::new(total);
                let style = ProgressStyle::with_template(BAR_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-");
                bar.set_style(style);
                bar
            }
            None => {
                let bar = indicatif::ProgressBar::new_spinner();
                let style = ProgressStyle::with_template(SPINNER_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_spinner());
                bar.set_style(style);
                bar.enable_steady_tick(std::time::Duration::from_millis(100));
                bar
            }
        };
        bar.set_message(message.to_string());

        Self { bar: Some(bar) }
    }

    /// A bar that never draws
    pub fn hidden() -> Self {
        Self { bar: None }
    }

    /// Increment progress
    pub fn inc(&self, delta: u64) {
        if let Some(bar) = &self.bar {
            bar.inc(delta);
        }
    }

    /// Finish and clear the progress bar
    pub fn finish_and_clear(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    /// Check if progress bar is visible
    pub fn is_visible(&self) -> bool {
        self.bar.is_some()
    }
}
