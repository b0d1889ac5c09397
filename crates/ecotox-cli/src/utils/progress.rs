use ecotox::engine::progress::{Progress, ProgressCallback};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 100;

/// What the bar currently shows: the running phase and the last audit status line.
struct Display {
    bar: ProgressBar,
    phase: &'static str,
    status: Option<String>,
}

impl Display {
    fn hidden() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
        bar.finish_and_clear();
        Self {
            bar,
            phase: "",
            status: None,
        }
    }

    fn handle(&mut self, event: Progress) {
        match event {
            Progress::PhaseStart { name } => {
                self.phase = name;
                self.status = None;
                self.bar.reset();
                self.bar.set_length(0);
                self.bar.set_style(phase_style());
                self.bar.set_prefix(name);
                self.bar.set_message("");
                self.bar.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
            }
            Progress::TaskStart { total_steps } => {
                self.bar.disable_steady_tick();
                self.bar.set_style(substep_style());
                self.bar.set_length(total_steps);
                self.bar.set_position(0);
            }
            Progress::TaskIncrement => self.bar.inc(1),
            Progress::TaskFinish => {
                if let Some(total) = self.bar.length() {
                    self.bar.set_position(total);
                }
            }
            Progress::StatusUpdate { text } => {
                self.bar.set_message(text.clone());
                self.status = Some(text);
            }
            Progress::PhaseFinish => {
                self.bar.disable_steady_tick();
                let summary = match self.status.take() {
                    Some(status) => format!("✓ {} ({status})", self.phase),
                    None => format!("✓ {}", self.phase),
                };
                self.bar.finish_with_message(summary);
            }
            Progress::Message(text) if self.bar.is_finished() => self.bar.set_message(text),
            Progress::Message(text) => self.bar.println(format!("  {text}")),
        }
    }
}

fn phase_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {prefix:.bold} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn substep_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:.bold} [{bar:36.cyan/blue}] {pos}/{len} sub-steps {msg} ({elapsed})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=>-")
}

/// Renders scenario-runner progress on stderr.
#[derive(Clone)]
pub struct CliProgressHandler {
    display: Arc<Mutex<Display>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        Self {
            display: Arc::new(Mutex::new(Display::hidden())),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let display = Arc::clone(&self.display);
        Box::new(move |event: Progress| match display.lock() {
            Ok(mut display) => display.handle(event),
            Err(_) => warn!("Progress display lock was poisoned; dropping {event:?}"),
        })
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}
