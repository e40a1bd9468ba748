use std::time::Duration;

/// The outcome of a completed [`Task`](crate::Task) run.
#[derive(Debug, Clone)]
pub struct TaskReport {
    /// Display name of the task, if it was given one.
    pub name: Option<String>,

    /// Entries that reached the end of the pipeline (written to the sink,
    /// or drained when the task has none).
    pub entries: usize,

    /// Run performance statistics.
    pub stats: RunStats,
}

/// Performance statistics for a completed run.
#[derive(Debug, Clone, Copy)]
pub struct RunStats {
    /// Wall-clock time from the first read to the last write.
    pub duration: Duration,

    /// Entries per second. Clamped to 0 on zero-duration runs.
    pub entries_per_sec: usize,
}

impl RunStats {
    pub(crate) fn compute(entries: usize, duration: Duration) -> Self {
        let eps = if duration.as_secs_f64() > 0.0 {
            (entries as f64 / duration.as_secs_f64()) as usize
        } else {
            0
        };
        Self {
            duration,
            entries_per_sec: eps,
        }
    }
}
