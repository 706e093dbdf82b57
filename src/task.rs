use std::thread;

use tracing::warn;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs background jobs for UI-thread components. Jobs report back over the
/// component's own channel.
pub trait Executor: Send + Sync {
    fn spawn(&self, job: Job);
}

/// One OS thread per job.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadExecutor;

impl Executor for ThreadExecutor {
    fn spawn(&self, job: Job) {
        if let Err(err) = thread::Builder::new()
            .name("irecipes-worker".into())
            .spawn(job)
        {
            warn!(error = %err, "failed to spawn worker thread");
        }
    }
}

/// Runs every job on the calling thread before `spawn` returns.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn spawn(&self, job: Job) {
        job();
    }
}
