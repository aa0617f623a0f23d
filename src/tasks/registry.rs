use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::TaskId;
use super::events::{ProgressReceiver, ProgressSender};

/// One task's progress channel as held by the registry
///
/// The registry keeps the read half until a stream consumer takes it; the
/// write half is handed to the worker at creation.
#[derive(Debug)]
pub struct ProgressChannel {
    receiver: Mutex<Option<ProgressReceiver>>,
    cancel: CancellationToken,
}

impl ProgressChannel {
    /// Takes the read half. Only the first caller gets it.
    pub fn take_receiver(&self) -> Option<ProgressReceiver> {
        self.receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// True once a stream consumer holds the read half
    pub fn is_claimed(&self) -> bool {
        self.receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

/// Process-wide map of live progress channels keyed by task id
///
/// Each channel has one writer (the worker) and one reader (the stream
/// endpoint); only the map itself is shared between tasks.
#[derive(Debug, Default)]
pub struct ProgressRegistry {
    channels: DashMap<TaskId, Arc<ProgressChannel>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a fresh channel under `task_id`, replacing any previous one.
    pub fn create(&self, task_id: TaskId) -> (ProgressSender, CancellationToken) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let channel = Arc::new(ProgressChannel {
            receiver: Mutex::new(Some(ProgressReceiver::new(rx))),
            cancel: cancel.clone(),
        });

        if self.channels.insert(task_id.clone(), channel).is_some() {
            debug!(%task_id, "Replaced existing progress channel");
        }

        (ProgressSender::new(tx), cancel)
    }

    pub fn get(&self, task_id: &TaskId) -> Option<Arc<ProgressChannel>> {
        self.channels.get(task_id).map(|entry| entry.value().clone())
    }

    /// Removes the channel; a no-op when it is already gone.
    pub fn remove(&self, task_id: &TaskId) {
        if self.channels.remove(task_id).is_some() {
            debug!(%task_id, "Removed progress channel");
        }
    }

    /// Requests cancellation of a live task. Returns false for unknown ids.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        match self.get(task_id) {
            Some(channel) => {
                channel.cancel.cancel();
                info!(%task_id, "Task cancellation requested");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
