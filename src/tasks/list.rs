use super::{ConcurrentTask, TaskState};
use crate::core::{Result, StoreError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{Level, event, info_span};

/// Where the tasks of a list run.
#[derive(Debug, Clone, Default)]
pub enum ConcurrentContext {
    /// One after another on the submitting thread.
    #[default]
    Sequential,
    /// On the blocking pool of a tokio runtime.
    Pool(Handle),
}

impl ConcurrentContext {
    /// Pool of the runtime the caller is running in, or sequential when
    /// there is none.
    pub fn current() -> Self {
        match Handle::try_current() {
            Ok(handle) => ConcurrentContext::Pool(handle),
            Err(_) => ConcurrentContext::Sequential,
        }
    }
}

#[derive(Debug)]
struct Completion {
    remaining: Mutex<usize>,
    done: Condvar,
}

impl Completion {
    fn finish_one(&self) {
        let mut remaining = match self.remaining.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.done.notify_all();
        }
    }
}

/// A named group of independent tasks that complete jointly.
///
/// A failing task never affects its siblings or the group; inspect
/// `failed_tasks` after waiting if individual failures matter.
#[derive(Debug)]
pub struct ConcurrentTaskList<T> {
    name: String,
    tasks: Vec<Arc<ConcurrentTask<T>>>,
    submitted: AtomicBool,
    completion: Arc<Completion>,
}

impl<T: Send + Sync + 'static> ConcurrentTaskList<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
            submitted: AtomicBool::new(false),
            completion: Arc::new(Completion {
                remaining: Mutex::new(0),
                done: Condvar::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_task<F>(&mut self, name: impl Into<String>, job: F) -> Result<&mut Self>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        if self.submitted.load(Ordering::SeqCst) {
            return Err(StoreError::InternalConsistency(format!(
                "Task list '{}' has already been submitted; no more tasks can be added",
                self.name
            )));
        }
        self.tasks.push(Arc::new(ConcurrentTask::new(name, job)));
        Ok(self)
    }

    pub fn tasks(&self) -> &[Arc<ConcurrentTask<T>>] {
        &self.tasks
    }

    pub fn task(&self, name: &str) -> Option<&Arc<ConcurrentTask<T>>> {
        self.tasks.iter().find(|task| task.name() == name)
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Starts every task. Sequential lists have finished when this returns;
    /// pooled lists return immediately.
    pub fn submit(&self, context: &ConcurrentContext) -> Result<()> {
        if self.submitted.swap(true, Ordering::SeqCst) {
            return Err(StoreError::InternalConsistency(format!(
                "Task list '{}' was already submitted",
                self.name
            )));
        }
        *self.completion.remaining.lock()? = self.tasks.len();
        event!(Level::INFO, list = %self.name, tasks = self.tasks.len(), "task list submitted");

        match context {
            ConcurrentContext::Sequential => {
                for task in &self.tasks {
                    run_task(&self.name, task, &self.completion);
                }
            }
            ConcurrentContext::Pool(handle) => {
                for task in &self.tasks {
                    let pending = PooledRun {
                        list: self.name.clone(),
                        task: Arc::clone(task),
                        completion: Arc::clone(&self.completion),
                        finished: false,
                    };
                    // the join handle is dropped: completion is tracked by the list
                    handle.spawn_blocking(move || pending.run());
                }
            }
        }
        Ok(())
    }

    /// Blocks until every task has finished.
    pub fn wait(&self) -> Result<()> {
        self.ensure_submitted()?;
        let mut remaining = self.completion.remaining.lock()?;
        while *remaining > 0 {
            remaining = self.completion.done.wait(remaining)?;
        }
        drop(remaining);
        self.log_summary();
        Ok(())
    }

    /// Like `wait`, but gives up after `timeout`. Returns whether every task
    /// finished; tasks still running keep running.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        self.ensure_submitted()?;
        let remaining = self.completion.remaining.lock()?;
        let (remaining, _) = self
            .completion
            .done
            .wait_timeout_while(remaining, timeout, |remaining| *remaining > 0)?;
        let finished = *remaining == 0;
        drop(remaining);
        if finished {
            self.log_summary();
        }
        Ok(finished)
    }

    pub fn failed_tasks(&self) -> Vec<&Arc<ConcurrentTask<T>>> {
        self.tasks
            .iter()
            .filter(|task| task.state() == TaskState::Failed)
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.tasks
            .iter()
            .all(|task| task.state() == TaskState::Succeeded)
    }

    fn ensure_submitted(&self) -> Result<()> {
        if !self.is_submitted() {
            return Err(StoreError::InternalConsistency(format!(
                "Task list '{}' has not been submitted",
                self.name
            )));
        }
        Ok(())
    }

    fn log_summary(&self) {
        let failed = self.failed_tasks();
        if !failed.is_empty() {
            let names: Vec<&str> = failed.iter().map(|task| task.name()).collect();
            log::warn!(
                "task list '{}' finished with {} failed task(s): {}",
                self.name,
                failed.len(),
                names.join(", ")
            );
        }
    }
}

fn run_task<T>(list: &str, task: &ConcurrentTask<T>, completion: &Completion) {
    let span = info_span!("task", list = %list, task = %task.name());
    let _guard = span.enter();
    task.run();
    event!(Level::DEBUG, state = %task.state(), "task finished");
    completion.finish_one();
}

/// A task handed to the blocking pool. A runtime that is shutting down
/// drops it without running it; the task is then recorded as failed so
/// waiters are still released.
struct PooledRun<T> {
    list: String,
    task: Arc<ConcurrentTask<T>>,
    completion: Arc<Completion>,
    finished: bool,
}

impl<T> PooledRun<T> {
    fn run(mut self) {
        run_task(&self.list, &self.task, &self.completion);
        self.finished = true;
    }
}

impl<T> Drop for PooledRun<T> {
    fn drop(&mut self) {
        if !self.finished {
            self.task.abandon("the runtime is shutting down");
            event!(Level::DEBUG, list = %self.list, task = %self.task.name(), "task dropped unrun");
            self.completion.finish_one();
        }
    }
}
