use chrono::{DateTime, Utc};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, OnceLock};

type Job<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    NotStarted,
    Started,
    Succeeded,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::NotStarted => write!(f, "NOT_STARTED"),
            TaskState::Started => write!(f, "STARTED"),
            TaskState::Succeeded => write!(f, "SUCCEEDED"),
            TaskState::Failed => write!(f, "FAILED"),
        }
    }
}

/// What a finished task produced. Written once, never changed.
#[derive(Debug)]
pub struct TaskOutcome<T> {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub result: anyhow::Result<T>,
}

impl<T> TaskOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        self.result.as_ref().err()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }
}

/// One named unit of work inside a `ConcurrentTaskList`.
pub struct ConcurrentTask<T> {
    name: String,
    job: Mutex<Option<Job<T>>>,
    started_at: OnceLock<DateTime<Utc>>,
    outcome: OnceLock<TaskOutcome<T>>,
}

impl<T> ConcurrentTask<T> {
    pub(crate) fn new<F>(name: impl Into<String>, job: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        Self {
            name: name.into(),
            job: Mutex::new(Some(Box::new(job))),
            started_at: OnceLock::new(),
            outcome: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TaskState {
        match (self.outcome.get(), self.started_at.get()) {
            (Some(outcome), _) if outcome.is_success() => TaskState::Succeeded,
            (Some(_), _) => TaskState::Failed,
            (None, Some(_)) => TaskState::Started,
            (None, None) => TaskState::NotStarted,
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at.get().copied()
    }

    pub fn outcome(&self) -> Option<&TaskOutcome<T>> {
        self.outcome.get()
    }

    /// Runs the job once. A failing or panicking job is recorded as the
    /// task's outcome; nothing escapes to the caller.
    pub(crate) fn run(&self) {
        let job = match self.job.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(job) = job else {
            return;
        };

        let started_at = *self.started_at.get_or_init(Utc::now);
        let result = match catch_unwind(AssertUnwindSafe(job)) {
            Ok(result) => result,
            Err(panic) => Err(anyhow::anyhow!(
                "task panicked: {}",
                panic_message(panic.as_ref())
            )),
        };
        if let Err(err) = &result {
            log::warn!("task '{}' failed: {:#}", self.name, err);
        }

        let _ = self.outcome.set(TaskOutcome {
            started_at,
            completed_at: Utc::now(),
            result,
        });
    }

    /// Records a task that will never run as failed. No-op once an outcome
    /// exists.
    pub(crate) fn abandon(&self, reason: &str) {
        let job = match self.job.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(job);

        let now = Utc::now();
        let started_at = *self.started_at.get_or_init(|| now);
        let abandoned = self.outcome.set(TaskOutcome {
            started_at,
            completed_at: now,
            result: Err(anyhow::anyhow!("task never ran: {}", reason)),
        });
        if abandoned.is_ok() {
            log::warn!("task '{}' never ran: {}", self.name, reason);
        }
    }
}

impl<T> fmt::Debug for ConcurrentTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentTask")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_follow_the_run() {
        let task = ConcurrentTask::new("answer", || Ok(42));
        assert_eq!(task.state(), TaskState::NotStarted);
        task.run();
        assert_eq!(task.state(), TaskState::Succeeded);
        assert_eq!(task.outcome().and_then(TaskOutcome::value), Some(&42));
        assert!(task.started_at().is_some());
    }

    #[test]
    fn test_failure_and_panic_are_captured() {
        let failing: ConcurrentTask<()> = ConcurrentTask::new("failing", || anyhow::bail!("boom"));
        failing.run();
        assert_eq!(failing.state(), TaskState::Failed);
        let message = failing.outcome().and_then(TaskOutcome::error).map(|e| e.to_string());
        assert_eq!(message.as_deref(), Some("boom"));

        let panicking: ConcurrentTask<()> = ConcurrentTask::new("panicking", || panic!("bad step"));
        panicking.run();
        assert_eq!(panicking.state(), TaskState::Failed);
        let message = panicking.outcome().and_then(TaskOutcome::error).map(|e| e.to_string());
        assert_eq!(message.as_deref(), Some("task panicked: bad step"));
    }

    #[test]
    fn test_abandoned_task_fails_without_running() {
        let task: ConcurrentTask<()> = ConcurrentTask::new("stranded", || panic!("must not run"));
        task.abandon("runtime is gone");
        assert_eq!(task.state(), TaskState::Failed);
        let message = task.outcome().and_then(TaskOutcome::error).map(|e| e.to_string());
        assert_eq!(message.as_deref(), Some("task never ran: runtime is gone"));

        task.run();
        assert_eq!(task.state(), TaskState::Failed);

        let finished = ConcurrentTask::new("finished", || Ok(1));
        finished.run();
        finished.abandon("too late");
        assert_eq!(finished.state(), TaskState::Succeeded);
    }

    #[test]
    fn test_second_run_is_ignored() {
        let task = ConcurrentTask::new("once", || Ok("first"));
        task.run();
        let completed = task.outcome().map(|o| o.completed_at);
        task.run();
        assert_eq!(task.outcome().map(|o| o.completed_at), completed);
    }
}
