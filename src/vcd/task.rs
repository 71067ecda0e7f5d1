//! Blocking wait on control-plane tasks.

use std::time::Duration;

use tracing::debug;

use super::api::Session;
use super::types::{Task, TaskStatus};
use crate::error::{Error, Result};

/// How often and how long to poll a task.
#[derive(Debug, Clone, Copy)]
pub struct TaskWait {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for TaskWait {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Poll `task` until it reaches a terminal status.
///
/// `success` returns `Ok`; `error`, `canceled` and `aborted` become
/// [`Error::TaskFailed`] carrying the server's message when it sent one.
pub async fn wait_for_task(
    session: &dyn Session,
    task: Task,
    operation: &str,
    wait: TaskWait,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + wait.timeout;
    let mut task = task;

    loop {
        match task.status {
            TaskStatus::Success => return Ok(()),
            status if status.is_terminal() => {
                let message = task
                    .error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| format!("task {status}"));
                return Err(Error::TaskFailed {
                    operation: operation.to_string(),
                    message,
                });
            }
            status => {
                debug!(operation, task = %task.href, %status, "task in progress");
            }
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(Error::TaskTimeout {
                operation: operation.to_string(),
                waited: wait.timeout,
            });
        }

        tokio::time::sleep(wait.interval).await;
        task = session.refresh_task(&task).await?;
    }
}
