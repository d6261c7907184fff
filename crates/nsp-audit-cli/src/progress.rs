use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use nsp_audit_core::{ProgressReporter, Stage, StageOutcome, Warning};
use std::sync::Mutex;
use std::time::Duration;

/// One indicatif spinner per pipeline stage, cleared when the stage ends.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.take() {
                old.finish_and_clear();
            }
            *guard = Some(pb);
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }

    fn print_above_bar(&self, line: &str) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.println(line);
                return;
            }
        }
        eprintln!("{}", line);
    }
}

impl ProgressReporter for CliReporter {
    fn on_stage_start(&self, stage: Stage) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.set_message(format!("{}...", stage));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_stage_finish(&self, stage: Stage, outcome: StageOutcome) {
        self.finish_bar();
        match outcome {
            StageOutcome::Completed => eprintln!("  {} {}", "✓".green(), stage),
            StageOutcome::Failed => eprintln!("  {} {}", "!".yellow(), stage),
            StageOutcome::Aborted => eprintln!("  {} {}", "✗".red(), stage),
        }
    }

    fn on_warning(&self, warning: &Warning) {
        let line = format!("  {} {}", "NOTE:".yellow().bold(), warning);
        self.print_above_bar(&line);
    }
}
