//! Execution seam for rebuild jobs.
//!
//! The dispatcher hands each job to a `JobExecutor` and receives results
//! through a channel; it never owns threads itself. `RayonExecutor` is the
//! production implementation; `ManualExecutor` holds tasks until a test
//! releases them, which is how completion timing is controlled in tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::core::error::Error;
use crate::core::types::Result;

use super::job::JobPriority;

/// A boxed rebuild task ready to run on any thread
pub type RebuildTask = Box<dyn FnOnce() + Send>;

/// Runs rebuild tasks on behalf of the dispatcher
pub trait JobExecutor: Send + Sync {
    /// Execute a task. The priority is advisory; executors may use it to
    /// order work but every submitted task must eventually run.
    fn execute(&self, priority: JobPriority, task: RebuildTask);
}

/// Production executor backed by a rayon thread pool
pub struct RayonExecutor {
    pool: rayon::ThreadPool,
}

impl RayonExecutor {
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("terrasect-rebuild-{i}"))
            .build()
            .map_err(|e| Error::Streaming(format!("failed to build job pool: {e}")))?;
        Ok(Self { pool })
    }
}

impl JobExecutor for RayonExecutor {
    fn execute(&self, _priority: JobPriority, task: RebuildTask) {
        // Rayon's queue is priority-blind; urgency ordering comes from the
        // dispatcher submitting near sectors first within a frame.
        self.pool.spawn(task);
    }
}

/// Test executor: tasks queue up until explicitly run
#[derive(Default)]
pub struct ManualExecutor {
    tasks: Mutex<VecDeque<RebuildTask>>,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the oldest queued task, if any
    pub fn run_next(&self) -> bool {
        let task = self.tasks.lock().unwrap().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run every queued task
    pub fn run_all(&self) -> usize {
        let mut count = 0;
        while self.run_next() {
            count += 1;
        }
        count
    }

    pub fn queued(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

impl JobExecutor for ManualExecutor {
    fn execute(&self, _priority: JobPriority, task: RebuildTask) {
        self.tasks.lock().unwrap().push_back(task);
    }
}
