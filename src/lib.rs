//! # Shutterbatch
//!
//! A batch file-operations engine for creators managing large photo and
//! video collections. Six operations — bulk rename, extension-targeted
//! delete, JPEG recompression, directory flattening, EXIF datetime offset,
//! and JPEG metadata stripping — all follow the same contract:
//!
//! ```text
//! request ──► collect ──► plan (preview stops here) ──► execute
//! ```
//!
//! A preview is the planner's output verbatim: one item per input file,
//! each `ready` or `skipped` with a human reason, destinations already
//! resolved under the requested conflict policy. Execution fans the ready
//! items across a worker pool, mutates the filesystem through atomic
//! temp-file-then-replace writes, and streams progress events with
//! monotonic counters. A process-wide flag cancels between items; files
//! already mid-rewrite finish their atomic step, so no half-written
//! destination or stray temp file ever survives.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`ops`] | The six operation façades (`preview` / `execute` each) |
//! | [`collect`] | Walks inputs into a deduped, stably-ordered file list |
//! | [`plan`] | Conflict policies, name reservations, output-dir defaulting |
//! | [`exec`] | Parallel executor with progress and cancellation |
//! | [`fsops`] | Atomic write/copy/move primitives, `_noN` sequencing, trash |
//! | [`jpeg`] | JPEG segment codec and the decode→resize→re-encode path |
//! | [`jpeg::tiff`] | EXIF/TIFF reading, in-place datetime patching, selective rebuild |
//! | [`template`] | `{tag:format}` rename template engine |
//! | [`settings`] | JSON settings document with debounced saves and merge |
//! | [`progress`] | Progress event types and the cancellation flag |
//! | [`types`] | Request/response envelopes (camelCase JSON) |
//! | [`pathutil`] | Canonicalization and case-folded path comparison |
//! | [`probe`] | Pluggable capture-datetime probe for video files |
//!
//! # Design Notes
//!
//! Per-file atomicity is the whole promise: an operation either commits a
//! file completely or leaves it untouched, and a failed or canceled run
//! simply reports which files were processed. There is no multi-file
//! rollback. Plans are pure — planners read the filesystem but never write
//! it, so a preview is always safe.
//!
//! The only process-wide state is the cancellation flag and the settings
//! store's write lock. Everything else lives per request.

pub mod collect;
pub mod error;
pub mod exec;
pub mod fsops;
pub mod jpeg;
pub mod ops;
pub mod pathutil;
pub mod plan;
pub mod probe;
pub mod progress;
pub mod settings;
pub mod template;
pub mod types;

pub use error::EngineError;
pub use progress::{clear_cancel, is_canceled, request_cancel};
