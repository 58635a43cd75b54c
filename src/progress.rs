//! Progress indicators for cloudrec CLI.

use indicatif::{ProgressBar, ProgressStyle};
use reconcile::{Cycle, Phase, ProgressCallback, RefreshSummary};

/// Progress bar for a refresh, hidden in quiet mode.
pub struct RefreshProgress {
    bar: ProgressBar,
    verbose: bool,
}

impl RefreshProgress {
    pub fn new(quiet: bool, verbose: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        Self { bar, verbose }
    }
}

impl ProgressCallback for RefreshProgress {
    fn on_start(&mut self, total: usize) {
        self.bar.set_length(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            self.bar.set_style(style.progress_chars("=>-"));
        }
        self.bar.set_message("refreshing");
    }

    fn on_cycle_complete(&mut self, cycle: &Cycle) {
        self.bar
            .set_message(crate::ui::truncate_middle(&cycle.identity, 30));
        let phase = cycle.phase();
        let marker = crate::ui::phase_marker(phase);
        match phase {
            Phase::Failed => {
                let reason = cycle.error().map(ToString::to_string).unwrap_or_default();
                self.bar.suspend(|| {
                    println!("  {marker} {} ({reason})", cycle.identity);
                });
            }
            Phase::NotFound => {
                self.bar.suspend(|| {
                    println!("  {marker} {} (gone)", cycle.identity);
                });
            }
            _ if self.verbose => {
                self.bar.suspend(|| {
                    println!("  {marker} {}", cycle.identity);
                });
            }
            _ => {}
        }
        self.bar.inc(1);
    }

    fn on_finish(&mut self, summary: &RefreshSummary) {
        self.bar.finish_and_clear();
        log::debug!(
            "refresh finished: {} committed, {} not found, {} failed",
            summary.committed,
            summary.not_found,
            summary.failed
        );
    }
}
