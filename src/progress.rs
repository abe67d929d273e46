//! Progress events and the process-wide cancellation flag.
//!
//! Each executing operation emits a totally ordered stream of
//! [`OperationProgressEvent`]s whose cumulative counters never decrease.
//! The final event of a run carries `done = true` (and `canceled = true`
//! when the run was interrupted).
//!
//! Cancellation is one process-wide atomic boolean: cleared when an
//! operation starts executing, set by whoever wants the run to stop
//! (another thread, a signal handler, an IPC message). Workers poll it at
//! item boundaries only — an item that already started its atomic rewrite
//! runs that rewrite to completion so no temp files survive.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// The six operations, as they appear in progress events and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Rename,
    Delete,
    Compress,
    Flatten,
    ExifOffset,
    MetadataStrip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationProgressEvent {
    pub operation: Operation,
    pub processed: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub current_path: Option<String>,
    pub done: bool,
    pub canceled: bool,
}

/// Emitted once per file evaluated by the compress target-size solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateProgressEvent {
    pub current: usize,
    pub total: usize,
}

static CANCEL_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Ask the currently executing operation to stop. Idempotent.
pub fn request_cancel() {
    CANCEL_REQUESTED.store(true, Ordering::SeqCst);
}

/// Clear the flag. Called by every façade at execute entry.
pub fn clear_cancel() {
    CANCEL_REQUESTED.store(false, Ordering::SeqCst);
}

pub fn is_canceled() -> bool {
    CANCEL_REQUESTED.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_round_trip() {
        clear_cancel();
        assert!(!is_canceled());
        request_cancel();
        assert!(is_canceled());
        // Setting twice is fine
        request_cancel();
        assert!(is_canceled());
        clear_cancel();
        assert!(!is_canceled());
    }

    #[test]
    fn operation_serializes_camel_case() {
        let json = serde_json::to_string(&Operation::ExifOffset).unwrap();
        assert_eq!(json, r#""exifOffset""#);
        let json = serde_json::to_string(&Operation::MetadataStrip).unwrap();
        assert_eq!(json, r#""metadataStrip""#);
    }

    #[test]
    fn progress_event_serializes_camel_case_fields() {
        let event = OperationProgressEvent {
            operation: Operation::Rename,
            processed: 1,
            total: 10,
            succeeded: 1,
            failed: 0,
            skipped: 0,
            current_path: Some("/a/b.jpg".to_string()),
            done: false,
            canceled: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""currentPath":"/a/b.jpg""#));
        assert!(json.contains(r#""operation":"rename""#));
    }
}
