//! Terminal progress bar for query runs.

use std::sync::atomic::{AtomicU64, Ordering};

use datacube::Progress;
use indicatif::{ProgressBar, ProgressStyle};

const STEPS: u64 = 1000;

/// Renders the completed fraction of a query as an `indicatif` bar.
pub struct BarProgress {
    bar: ProgressBar,
    fraction: AtomicU64,
}

impl BarProgress {
    pub fn new(message: &'static str) -> Self {
        let bar = ProgressBar::new(STEPS);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {percent:>3}% {msg}")
        {
            bar.set_style(style.progress_chars("##-"));
        }
        bar.set_message(message);
        Self {
            bar,
            fraction: AtomicU64::new(0f64.to_bits()),
        }
    }

    fn show(&self, fraction: f64) {
        self.bar
            .set_position((fraction.clamp(0.0, 1.0) * STEPS as f64).round() as u64);
    }
}

impl Progress for BarProgress {
    fn set(&self, fraction: f64) {
        self.fraction.store(fraction.to_bits(), Ordering::Release);
        self.show(fraction);
    }

    fn increment(&self, delta: f64) {
        let previous = self
            .fraction
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f64::from_bits(bits) + delta).to_bits())
            })
            .unwrap_or_else(|bits| bits);
        self.show(f64::from_bits(previous) + delta);
    }

    fn finalize(&self) {
        self.bar.finish_with_message("done");
    }
}
