//! Background task coordination
//!
//! A task is one long-running operation (a remote download or a background
//! transcription). Submitting a task:
//!
//! 1. [`TaskRunner::submit`] generates a [`TaskId`] and creates the task's
//!    progress channel in the [`ProgressRegistry`]
//! 2. the job is queued for the bounded worker pool and the id is returned
//!    to the caller immediately
//! 3. a worker runs the job, which publishes [`ProgressEvent`]s
//! 4. the runner always finishes the channel with exactly one terminal event
//!    followed by the end-of-stream sentinel, whatever the job did
//! 5. the progress stream endpoint drains the channel and removes it

pub mod events;
pub mod registry;
pub mod runner;

pub use events::{ProcessStage, ProgressEvent, ProgressMessage, ProgressReceiver, ProgressSender};
pub use registry::{ProgressChannel, ProgressRegistry};
pub use runner::{RunnerError, TaskContext, TaskError, TaskJob, TaskRunner};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque task identifier
///
/// Generated from UUIDv7, which is ordered by creation time and never
/// repeats, so ids are unique across the life of the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_are_unique_and_ordered() {
        let ids: Vec<TaskId> = (0..256).map(|_| TaskId::generate()).collect();

        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());

        let mut sorted = ids.clone();
        sorted.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(sorted, ids);
    }
}
