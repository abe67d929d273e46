//! The six operation façades.
//!
//! Each façade exposes `preview(request)` and `execute(request, …)`.
//! Preview returns the planner output verbatim; execute clears the
//! cancellation flag, re-plans, hands ready items to the executor and
//! returns the aggregated result with one detail row per input. A façade
//! returns either a normal response or an [`EngineError`] — never both.

pub mod compress;
pub mod delete;
pub mod exif_offset;
pub mod flatten;
pub mod rename;
pub mod strip;

use crate::collect::Collection;
use crate::error::EngineError;
use chrono::NaiveDateTime;
use std::fs;
use std::io::BufReader;
use std::path::Path;
use std::time::SystemTime;

/// The `InvalidRequest` for an empty collection, distinguishing "nothing
/// there" from "everything was filtered out".
pub(crate) fn empty_collection_error(collection: &Collection) -> EngineError {
    if collection.skipped_by_extension > 0 {
        EngineError::InvalidRequest(format!(
            "no supported files found ({} filtered out by extension)",
            collection.skipped_by_extension
        ))
    } else {
        EngineError::InvalidRequest("no matching files found".to_string())
    }
}

/// First ASCII value among `tags`, in priority order, from a file's EXIF.
pub(crate) fn read_exif_datetime_string(path: &Path, tags: &[exif::Tag]) -> Option<String> {
    let file = fs::File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
    for tag in tags {
        if let Some(field) = exif.get_field(*tag, exif::In::PRIMARY) {
            if let exif::Value::Ascii(ref values) = field.value {
                if let Some(first) = values.first() {
                    if let Ok(s) = std::str::from_utf8(first) {
                        let trimmed = s.trim().trim_matches('\0');
                        if !trimmed.is_empty() {
                            return Some(trimmed.to_string());
                        }
                    }
                }
            }
        }
    }
    None
}

/// Parse the EXIF `YYYY:MM:DD HH:MM:SS` form.
pub(crate) fn parse_exif_datetime(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim().trim_matches('"'), "%Y:%m:%d %H:%M:%S").ok()
}

/// Filesystem timestamp as a local civil datetime.
pub(crate) fn naive_local(time: SystemTime) -> NaiveDateTime {
    chrono::DateTime::<chrono::Local>::from(time).naive_local()
}
