//! Progress bar adapter for engine progress events

use indicatif::{ProgressBar, ProgressStyle};
use sentinel_core::{ProgressEvent, ProgressSink};

/// Resolution of the bar; engine fractions are scaled onto it
const BAR_LENGTH: u64 = 1000;

/// Drives an indicatif bar from [`ProgressEvent`]s
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    /// A bar on stderr, or a hidden one when `hidden` is set
    pub fn new(hidden: bool) -> Self {
        if hidden {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let bar = ProgressBar::new(BAR_LENGTH);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} {prefix:<14} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        Self { bar }
    }

    /// Remove the bar from the terminal
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    #[cfg(test)]
    fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl ProgressSink for BarProgress {
    fn report(&self, event: &ProgressEvent) {
        let position = (event.fraction * BAR_LENGTH as f64).round() as u64;
        self.bar.set_position(position.min(BAR_LENGTH));
        self.bar.set_prefix(event.stage.label());

        if event.speed_bps > 0 {
            self.bar.set_message(event.speed_display());
        } else {
            self.bar.set_message(event.message.clone());
        }
    }
}
