//! Server-sent progress stream (GET /progress/{task_id})
//!
//! Each event is one `data:` line of single-line JSON. The stream ends after
//! the task's terminal event, and the registry entry is removed however the
//! stream stops: normal end, idle timeout, server shutdown or client
//! disconnect. Only the end of the stream is tied to these; the task itself
//! keeps running until it finishes or is cancelled through `DELETE /tasks`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use tracing::{debug, info, warn};

use super::state::AppState;
use crate::tasks::{ProgressEvent, ProgressRegistry, TaskId};

pub async fn stream_progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let task_id = TaskId::from(task_id);
    let registry = state.registry.clone();
    let idle_timeout = state.config.worker.stream_idle_timeout();
    let shutdown = state.shutdown.clone();

    let stream = async_stream::stream! {
        let Some(channel) = registry.get(&task_id) else {
            debug!(%task_id, "Progress requested for unknown task");
            yield Ok(to_sse(&ProgressEvent::error("task not found")));
            return;
        };
        let Some(mut receiver) = channel.take_receiver() else {
            debug!(%task_id, "Progress stream already claimed");
            yield Ok(to_sse(&ProgressEvent::error("task already being streamed")));
            return;
        };

        let _guard = ChannelGuard {
            registry: registry.clone(),
            task_id: task_id.clone(),
        };
        info!(%task_id, "Progress stream opened");

        loop {
            let step = tokio::select! {
                biased;
                _ = shutdown.cancelled() => Step::Shutdown,
                read = tokio::time::timeout(idle_timeout, receiver.next_event()) => match read {
                    Ok(Some(event)) => Step::Event(event),
                    Ok(None) => Step::End,
                    Err(_) => Step::Idle,
                },
            };

            match step {
                Step::Event(event) => yield Ok(to_sse(&event)),
                Step::End => break,
                Step::Idle => {
                    warn!(%task_id, "Progress stream idle too long, closing it");
                    yield Ok(to_sse(&ProgressEvent::error("progress stream timed out")));
                    break;
                }
                Step::Shutdown => {
                    info!(%task_id, "Closing progress stream for shutdown");
                    yield Ok(to_sse(&ProgressEvent::error("server shutting down")));
                    break;
                }
            }
        }

        info!(%task_id, "Progress stream closed");
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

enum Step {
    Event(ProgressEvent),
    End,
    Idle,
    Shutdown,
}

fn to_sse(event: &ProgressEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(json) => Event::default().data(json),
        Err(e) => {
            warn!(error = %e, "Failed to serialize progress event");
            Event::default().data(r#"{"status":"error","message":"invalid progress event"}"#)
        }
    }
}

/// Removes the task's channel when the stream is dropped
struct ChannelGuard {
    registry: Arc<ProgressRegistry>,
    task_id: TaskId,
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_removes_channel() {
        let registry = Arc::new(ProgressRegistry::new());
        let task_id = TaskId::generate();
        let _ = registry.create(task_id.clone());

        {
            let _guard = ChannelGuard {
                registry: registry.clone(),
                task_id: task_id.clone(),
            };
            assert!(registry.get(&task_id).is_some());
        }

        assert!(registry.get(&task_id).is_none());
    }
}
