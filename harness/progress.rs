use std::fmt;

/// How a single (pathway, sample size) task ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskOutcomeKind {
    Scored,
    NotApplicable,
    Failed,
}

impl TaskOutcomeKind {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Scored => "scored",
            Self::NotApplicable => "not applicable",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskOutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for reporting task completion during a harness run.
///
/// Callbacks arrive from worker threads in completion order, so implementations
/// must be `Sync` and take `&self`.
pub trait RunProgressObserver: Sync {
    fn on_dispatch(&self, total_tasks: usize) {
        let _ = total_tasks;
    }
    fn on_task_complete(&self, pathway_id: &str, sample_size: usize, outcome: TaskOutcomeKind) {
        let _ = (pathway_id, sample_size, outcome);
    }
    fn on_finish(&self) {}
}

#[derive(Default)]
pub struct NoopRunProgress;

impl RunProgressObserver for NoopRunProgress {}
