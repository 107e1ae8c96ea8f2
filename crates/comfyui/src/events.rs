//! Relay-level events derived from the ComfyUI stream.
//!
//! The listener translates raw [`EngineMessage`]s into [`EngineEvent`]s and
//! forwards them over a channel to a single consumer that owns all job
//! state changes.

use serde::Serialize;

use crate::messages::EngineMessage;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EngineEvent {
    /// The event stream is open.
    StreamConnected,

    /// The event stream dropped.
    StreamDisconnected,

    /// The engine queue is empty; every pending job may have finished.
    QueueDrained,

    /// A prompt began executing.
    JobStarted { prompt_id: String },

    /// A prompt is executing a specific node.
    NodeExecuting { prompt_id: String, node: String },

    /// A prompt finished; its outputs are ready in history.
    JobFinished { prompt_id: String },

    /// A prompt failed or was interrupted.
    JobFailed { prompt_id: String, error: String },

    /// Step progress, logged only.
    Progress {
        prompt_id: Option<String>,
        percent: i16,
    },
}

/// Map an engine message to the event the relay acts on.
///
/// Returns `None` for messages that carry nothing actionable (non-zero
/// queue depth, cache hits, per-node outputs).
pub fn translate(message: EngineMessage) -> Option<EngineEvent> {
    match message {
        EngineMessage::Status(data) if data.status.exec_info.queue_remaining == 0 => {
            Some(EngineEvent::QueueDrained)
        }
        EngineMessage::Status(_) => None,
        EngineMessage::ExecutionStart(data) => Some(EngineEvent::JobStarted {
            prompt_id: data.prompt_id,
        }),
        EngineMessage::Executing(data) => Some(match data.node {
            Some(node) => EngineEvent::NodeExecuting {
                prompt_id: data.prompt_id,
                node,
            },
            None => EngineEvent::JobFinished {
                prompt_id: data.prompt_id,
            },
        }),
        EngineMessage::ExecutionSuccess(data) => Some(EngineEvent::JobFinished {
            prompt_id: data.prompt_id,
        }),
        EngineMessage::ExecutionError(data) => {
            let error = if data.exception_type.is_empty() {
                data.exception_message
            } else {
                format!("{}: {}", data.exception_type, data.exception_message)
            };
            Some(EngineEvent::JobFailed {
                prompt_id: data.prompt_id,
                error,
            })
        }
        EngineMessage::ExecutionInterrupted(data) => Some(EngineEvent::JobFailed {
            prompt_id: data.prompt_id,
            error: "Execution interrupted".to_string(),
        }),
        EngineMessage::Progress(data) => Some(EngineEvent::Progress {
            percent: data.percent(),
            prompt_id: data.prompt_id,
        }),
        EngineMessage::ExecutionCached(_) | EngineMessage::Executed(_) => None,
    }
}
