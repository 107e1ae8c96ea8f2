//! Interpretation of ComfyUI `/history/{prompt_id}` documents.
//!
//! A history document is keyed by prompt id. The entry is absent while the
//! prompt is queued or running; once finished it carries a `status` block
//! and per-node `outputs`, each node listing files under keys such as
//! `images`, `gifs` or `videos`.

use std::cmp::Ordering;

use serde::Serialize;

/// Location of one output file on the engine, as accepted by `/view`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRef {
    pub filename: String,
    pub subfolder: String,
    /// Storage kind (`output`, `temp`, `input`).
    pub kind: String,
}

/// What the engine's history says about a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryState {
    /// Not finished yet (or unknown to the engine).
    Pending,
    /// Finished; artifacts in node order.
    Completed(Vec<ArtifactRef>),
    /// Finished with an execution error.
    Failed(String),
}

/// Default `type` when an output entry omits it.
const DEFAULT_ARTIFACT_KIND: &str = "output";

/// Fallback failure reason when the history carries no error message.
const UNKNOWN_FAILURE: &str = "Execution failed";

/// Classify the history document for `prompt_id`.
pub fn parse_history(prompt_id: &str, history: &serde_json::Value) -> HistoryState {
    let Some(entry) = history.get(prompt_id) else {
        return HistoryState::Pending;
    };

    if let Some(status) = entry.get("status") {
        if status.get("status_str").and_then(|s| s.as_str()) == Some("error") {
            return HistoryState::Failed(failure_reason(status));
        }
        // Older engines omit `completed`; presence of the entry means done.
        if status.get("completed").and_then(|c| c.as_bool()) == Some(false) {
            return HistoryState::Pending;
        }
    }

    HistoryState::Completed(collect_artifacts(entry))
}

/// Every file reference across every output node.
pub fn collect_artifacts(entry: &serde_json::Value) -> Vec<ArtifactRef> {
    let Some(outputs) = entry.get("outputs").and_then(|o| o.as_object()) else {
        return Vec::new();
    };

    let mut nodes: Vec<(&String, &serde_json::Value)> = outputs.iter().collect();
    nodes.sort_by(|(a, _), (b, _)| node_order(a, b));

    nodes
        .into_iter()
        .filter_map(|(_, node)| node.as_object())
        .flat_map(|node| node.values())
        .filter_map(|field| field.as_array())
        .flatten()
        .filter_map(artifact_from_entry)
        .collect()
}

/// Numeric node ids ascend numerically and come before any other key,
/// which is how the engine's own clients enumerate `outputs`.
fn node_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn artifact_from_entry(value: &serde_json::Value) -> Option<ArtifactRef> {
    let filename = value.get("filename")?.as_str()?;
    let subfolder = value
        .get("subfolder")
        .and_then(|s| s.as_str())
        .unwrap_or_default();
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or(DEFAULT_ARTIFACT_KIND);

    Some(ArtifactRef {
        filename: filename.to_string(),
        subfolder: subfolder.to_string(),
        kind: kind.to_string(),
    })
}

/// Pull the exception message out of the `execution_error` status message,
/// shaped `["execution_error", {"exception_message": ...}]`.
fn failure_reason(status: &serde_json::Value) -> String {
    status
        .get("messages")
        .and_then(|m| m.as_array())
        .into_iter()
        .flatten()
        .filter_map(|m| m.as_array())
        .find(|m| m.first().and_then(|k| k.as_str()) == Some("execution_error"))
        .and_then(|m| m.get(1))
        .and_then(|data| data.get("exception_message"))
        .and_then(|msg| msg.as_str())
        .map(|msg| msg.trim().to_string())
        .unwrap_or_else(|| UNKNOWN_FAILURE.to_string())
}
