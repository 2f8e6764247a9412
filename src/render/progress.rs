use std::time::{Duration, Instant};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::pipeline::phase::{display_name, PhaseName, PHASES};
use crate::pipeline::{DisplayMessage, MessageKind};
use crate::stores::{AnalysisState, LedgerTotals};
use crate::utils::formatting::{format_cost, format_duration, format_tokens};

/// Phase bar plus a status spinner for one live analysis. Lines are printed
/// above the bars so they never interleave.
pub struct AnalysisProgress {
    multi: MultiProgress,
    phase_bar: ProgressBar,
    status_bar: ProgressBar,
    highest_phase: u32,
    start_time: Instant,
}

impl AnalysisProgress {
    pub fn new(symbol: &str) -> Self {
        Self::with_target(symbol, ProgressDrawTarget::stderr())
    }

    /// Progress that draws nothing; lines still go through [`Self::println`].
    pub fn hidden(symbol: &str) -> Self {
        Self::with_target(symbol, ProgressDrawTarget::hidden())
    }

    fn with_target(symbol: &str, target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);

        let phase_bar = multi.add(ProgressBar::new(PHASES.len() as u64));
        if let Ok(bar_style) = ProgressStyle::default_bar()
            .template("  {bar:30.cyan/dark_gray} {pos}/{len} phases | {msg}")
        {
            phase_bar.set_style(bar_style.progress_chars("█▓░"));
        }
        phase_bar.set_message(format!("Analyzing {}", symbol));

        let status_bar = multi.add(ProgressBar::new_spinner());
        if let Ok(spinner) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
            status_bar.set_style(spinner);
        }
        status_bar.set_message("Waiting for agents...");
        status_bar.enable_steady_tick(Duration::from_millis(120));

        Self {
            multi,
            phase_bar,
            status_bar,
            highest_phase: 0,
            start_time: Instant::now(),
        }
    }

    /// Advance the phase bar from a released line. Phases are shown as done
    /// once a later phase starts talking.
    pub fn on_message(&mut self, message: &DisplayMessage) {
        if message.kind == MessageKind::Error {
            return;
        }
        let Some(order) = message.phase_order.filter(|p| *p > self.highest_phase) else {
            return;
        };
        self.highest_phase = order;
        self.phase_bar.set_position(u64::from(order.saturating_sub(1)));
        if let Some(phase) = PhaseName::from_order(order) {
            self.phase_bar.set_message(display_name(phase).to_string());
        }
    }

    pub fn update(&self, state: &AnalysisState, totals: &LedgerTotals) {
        let step = state.current_step.as_deref().unwrap_or("Thinking");
        self.status_bar.set_message(format!(
            "{} | {:.0}% | {} tokens | {} | {}",
            step,
            state.progress,
            format_tokens(totals.total_tokens()),
            format_cost(totals.cost_usd),
            format_duration(self.start_time.elapsed().as_millis() as u64),
        ));
    }

    pub fn highest_phase(&self) -> u32 {
        self.highest_phase
    }

    /// Print a line through the multi-progress (won't interfere with bars).
    pub fn println(&self, line: &str) {
        if self.multi.is_hidden() {
            println!("{}", line);
        } else {
            let _ = self.multi.println(line);
        }
    }

    pub fn finish(&self, state: &AnalysisState) {
        if state.error.is_some() {
            self.phase_bar.abandon_with_message(style("Failed").red().to_string());
        } else {
            self.phase_bar.set_position(PHASES.len() as u64);
            self.phase_bar.finish_with_message("All phases complete");
        }
        self.status_bar.finish_and_clear();
    }

    pub fn abandon(&self, reason: &str) {
        self.phase_bar.abandon_with_message(reason.to_string());
        self.status_bar.finish_and_clear();
    }
}
