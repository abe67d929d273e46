//! Capture-datetime probe for video files.
//!
//! Extracting a capture timestamp from a video container is an external
//! concern (ffprobe, a native demuxer, a sidecar reader). The engine only
//! needs one question answered, so it takes the collaborator as a trait
//! and ships a null implementation. The rename planner falls back to the
//! file's modified time when the probe has nothing.

use chrono::NaiveDateTime;
use std::path::Path;

pub trait VideoProbe: Sync {
    /// Capture datetime of a video file, if the probe can determine one.
    fn capture_datetime(&self, path: &Path) -> Option<NaiveDateTime>;
}

/// Probe that never answers. The default when no collaborator is wired up.
pub struct NoProbe;

impl VideoProbe for NoProbe {
    fn capture_datetime(&self, _path: &Path) -> Option<NaiveDateTime> {
        None
    }
}
