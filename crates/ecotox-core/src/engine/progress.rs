//! Progress events emitted by the scenario runner.
//!
//! A run is a sequence of phases. The integration phase carries one task whose steps are
//! sub-steps; audits update the task's status line with the worst mass ratio seen.

#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    TaskStart { total_steps: u64 },
    TaskIncrement,
    TaskFinish,

    /// Replaces the status text of the running task.
    StatusUpdate { text: String },
    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    /// Starts a phase; `PhaseFinish` is sent when the guard drops, also on early `?` returns.
    pub fn phase(&self, name: &'static str) -> PhaseGuard<'_, 'a> {
        self.report(Progress::PhaseStart { name });
        PhaseGuard { reporter: self }
    }

    /// Publishes the result of a conservation audit as the task status.
    pub fn mass_ratio(&self, ratio: f64) {
        if self.callback.is_some() {
            self.report(Progress::StatusUpdate {
                text: format!("mass ratio {ratio:.6}"),
            });
        }
    }
}

pub struct PhaseGuard<'r, 'a> {
    reporter: &'r ProgressReporter<'a>,
}

impl Drop for PhaseGuard<'_, '_> {
    fn drop(&mut self) {
        self.reporter.report(Progress::PhaseFinish);
    }
}
