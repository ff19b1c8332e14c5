//! Structured fan-out for cleanup work.
//!
//! Each task is a `tokio::spawn`ed future; the group keeps the handles and
//! [`TaskGroup::join`] waits for all of them. Dropping an unjoined group
//! detaches its tasks rather than aborting them, so deletions that were
//! already issued run to completion even if the pass is cancelled.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::error;

/// How one task ended. `output` is `None` if the task panicked.
#[derive(Debug)]
pub struct TaskOutcome<T> {
    pub label: String,
    pub output: Option<T>,
}

pub struct TaskGroup<T> {
    name: &'static str,
    tasks: Vec<(String, JoinHandle<T>)>,
}

impl<T: Send + 'static> TaskGroup<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            tasks: Vec::new(),
        }
    }

    pub fn spawn<F>(&mut self, label: impl Into<String>, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.tasks.push((label.into(), tokio::spawn(task)));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every task, in spawn order.
    pub async fn join(self) -> Vec<TaskOutcome<T>> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        for (label, handle) in self.tasks {
            let output = match handle.await {
                Ok(output) => Some(output),
                Err(e) => {
                    error!(group = self.name, task = %label, error = %e, "task failed");
                    None
                }
            };
            outcomes.push(TaskOutcome { label, output });
        }
        outcomes
    }
}
