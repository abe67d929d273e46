//! EXIF datetime offset: shift capture timestamps by a signed number of
//! seconds.
//!
//! All three datetime tags (`DateTimeOriginal`, `DateTimeDigitized`,
//! `DateTime`) are rewritten in place inside the APP1 segment. The fields
//! are fixed-width ASCII, so the rewrite never changes the file size —
//! only the APP1 payload bytes differ. Applying the opposite offset
//! restores the original bytes exactly.

use crate::collect::{self, ExtensionSet, JPEG_EXTENSIONS};
use crate::error::EngineError;
use crate::exec::{self, ExecDetail};
use crate::fsops;
use crate::jpeg::{tiff, Chunk, JpegStream};
use crate::ops::{empty_collection_error, read_exif_datetime_string};
use crate::progress::{self, Operation, OperationProgressEvent};
use crate::types::{
    ExecStatus, ExifOffsetExecuteDetail, ExifOffsetExecuteResponse, ExifOffsetPreviewItem,
    ExifOffsetPreviewResponse, ExifOffsetRequest, PlanStatus,
};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
struct PlannedOffset {
    source: PathBuf,
    original: Option<String>,
    corrected: Option<String>,
    status: PlanStatus,
    reason: Option<String>,
}

pub fn preview(request: &ExifOffsetRequest) -> Result<ExifOffsetPreviewResponse, EngineError> {
    let plan = build_plan(request)?;
    let mut ready = 0usize;
    let mut skipped = 0usize;
    let items = plan
        .iter()
        .map(|item| {
            match item.status {
                PlanStatus::Ready => ready += 1,
                PlanStatus::Skipped => skipped += 1,
            }
            ExifOffsetPreviewItem {
                source_path: item.source.to_string_lossy().to_string(),
                original_datetime: item.original.clone(),
                corrected_datetime: item.corrected.clone(),
                status: item.status,
                reason: item.reason.clone(),
            }
        })
        .collect();

    Ok(ExifOffsetPreviewResponse {
        items,
        total: ready + skipped,
        ready,
        skipped,
    })
}

pub fn execute<F>(
    request: &ExifOffsetRequest,
    report_progress: &mut F,
) -> Result<ExifOffsetExecuteResponse, EngineError>
where
    F: FnMut(OperationProgressEvent),
{
    progress::clear_cancel();
    let plan = build_plan(request)?;
    let offset_seconds = request.offset_seconds;

    let report = exec::run_parallel(
        Operation::ExifOffset,
        plan,
        move |item, canceled| execute_one(item, offset_seconds, canceled),
        progress::is_canceled,
        report_progress,
    );

    Ok(ExifOffsetExecuteResponse {
        processed: report.processed,
        succeeded: report.succeeded,
        failed: report.failed,
        skipped: report.skipped,
        details: report.details,
    })
}

impl ExecDetail for ExifOffsetExecuteDetail {
    fn status(&self) -> ExecStatus {
        self.status
    }
    fn source_path(&self) -> &str {
        &self.source_path
    }
}

fn execute_one(item: &PlannedOffset, offset_seconds: i64, canceled: bool) -> ExifOffsetExecuteDetail {
    let source_path = item.source.to_string_lossy().to_string();

    if canceled || item.status == PlanStatus::Skipped {
        return ExifOffsetExecuteDetail {
            source_path,
            status: ExecStatus::Skipped,
            reason: if canceled {
                Some("canceled".to_string())
            } else {
                item.reason.clone()
            },
        };
    }

    match shift_file(&item.source, offset_seconds) {
        Ok(()) => ExifOffsetExecuteDetail {
            source_path,
            status: ExecStatus::Succeeded,
            reason: match (&item.original, &item.corrected) {
                (Some(original), Some(corrected)) => Some(format!("{original} -> {corrected}")),
                _ => None,
            },
        },
        Err(reason) => {
            tracing::warn!(source = %source_path, "exif offset failed: {reason}");
            ExifOffsetExecuteDetail {
                source_path,
                status: ExecStatus::Failed,
                reason: Some(reason),
            }
        }
    }
}

/// Rewrite the datetime fields of one file and replace it atomically.
fn shift_file(path: &Path, offset_seconds: i64) -> Result<(), String> {
    let data = std::fs::read(path).map_err(|e| format!("read failed: {e}"))?;
    let mut stream = JpegStream::parse(&data)?;

    let mut patched = 0usize;
    for chunk in &mut stream.chunks {
        if !chunk.is_exif_app1() {
            continue;
        }
        if let Chunk::Segment { payload, .. } = chunk {
            patched += tiff::offset_datetimes(payload, offset_seconds)?;
        }
    }
    if patched == 0 {
        return Err("no rewritable datetime fields".to_string());
    }

    let out = stream.emit()?;
    fsops::atomic_write_replace(path, &out).map_err(|e| format!("write failed: {e}"))
}

fn build_plan(request: &ExifOffsetRequest) -> Result<Vec<PlannedOffset>, EngineError> {
    let collection = collect::collect(
        &request.input_paths,
        request.include_subfolders,
        Some(&ExtensionSet::new(JPEG_EXTENSIONS.iter().copied())),
    )?;
    if collection.is_empty() {
        return Err(empty_collection_error(&collection));
    }

    let mut plan = Vec::with_capacity(collection.entries.len());
    for entry in &collection.entries {
        let original = read_exif_datetime_string(
            &entry.path,
            &[
                exif::Tag::DateTimeOriginal,
                exif::Tag::DateTimeDigitized,
                exif::Tag::DateTime,
            ],
        );
        let item = match original {
            None => PlannedOffset {
                source: entry.path.clone(),
                original: None,
                corrected: None,
                status: PlanStatus::Skipped,
                reason: Some("no datetime".to_string()),
            },
            Some(original) => match tiff::apply_offset(&original, request.offset_seconds) {
                Some(corrected) => PlannedOffset {
                    source: entry.path.clone(),
                    original: Some(original),
                    corrected: Some(corrected),
                    status: PlanStatus::Ready,
                    reason: None,
                },
                None => PlannedOffset {
                    source: entry.path.clone(),
                    original: Some(original),
                    corrected: None,
                    status: PlanStatus::Skipped,
                    reason: Some("shifted datetime out of range".to_string()),
                },
            },
        };
        plan.push(item);
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg::tests::synthetic_jpeg;
    use crate::jpeg::tiff::tests::payload_with_datetimes;
    use tempfile::TempDir;

    fn request(inputs: Vec<String>, offset_seconds: i64) -> ExifOffsetRequest {
        ExifOffsetRequest {
            input_paths: inputs,
            include_subfolders: false,
            offset_seconds,
        }
    }

    fn write_jpeg(path: &Path, datetime: &str) {
        let payload = payload_with_datetimes(datetime, datetime, datetime);
        std::fs::write(path, synthetic_jpeg(&payload)).unwrap();
    }

    fn read_tag(path: &Path, tag: exif::Tag) -> Option<String> {
        read_exif_datetime_string(path, &[tag])
    }

    #[test]
    fn offset_shifts_all_three_tags_without_resizing_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("photo.jpg");
        write_jpeg(&file, "2024:01:01 00:00:00");
        let size_before = std::fs::metadata(&file).unwrap().len();

        let response = execute(
            &request(vec![file.to_string_lossy().to_string()], -3600),
            &mut |_| {},
        )
        .unwrap();

        assert_eq!(response.succeeded, 1);
        assert_eq!(std::fs::metadata(&file).unwrap().len(), size_before);
        for tag in [
            exif::Tag::DateTimeOriginal,
            exif::Tag::DateTimeDigitized,
            exif::Tag::DateTime,
        ] {
            assert_eq!(
                read_tag(&file, tag).as_deref(),
                Some("2023:12:31 23:00:00"),
                "tag {tag}"
            );
        }
    }

    #[test]
    fn opposite_offsets_restore_original_bytes() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("photo.jpg");
        write_jpeg(&file, "2023:04:05 12:34:56");
        let original_bytes = std::fs::read(&file).unwrap();

        let paths = vec![file.to_string_lossy().to_string()];
        execute(&request(paths.clone(), 90_000), &mut |_| {}).unwrap();
        assert_ne!(std::fs::read(&file).unwrap(), original_bytes);
        execute(&request(paths, -90_000), &mut |_| {}).unwrap();
        assert_eq!(std::fs::read(&file).unwrap(), original_bytes);
    }

    #[test]
    fn preview_shows_original_and_corrected() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("photo.jpg");
        write_jpeg(&file, "2024:06:15 10:00:00");

        let response =
            preview(&request(vec![file.to_string_lossy().to_string()], 120)).unwrap();
        assert_eq!(response.ready, 1);
        let item = &response.items[0];
        assert_eq!(item.original_datetime.as_deref(), Some("2024:06:15 10:00:00"));
        assert_eq!(item.corrected_datetime.as_deref(), Some("2024:06:15 10:02:00"));
    }

    #[test]
    fn file_without_datetime_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("plain.jpg");
        // Valid JPEG structure, but no EXIF segment at all.
        std::fs::write(
            &file,
            [0xFF, 0xD8, 0xFF, 0xDA, 0x00, 0x04, 0x01, 0x02, 0xFF, 0xD9],
        )
        .unwrap();

        let response =
            preview(&request(vec![file.to_string_lossy().to_string()], 60)).unwrap();
        assert_eq!(response.skipped, 1);
        assert_eq!(response.items[0].reason.as_deref(), Some("no datetime"));
    }

    #[test]
    fn out_of_range_shift_is_skipped_at_plan_time() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("edge.jpg");
        write_jpeg(&file, "9999:12:31 23:59:00");

        let response =
            preview(&request(vec![file.to_string_lossy().to_string()], 3600)).unwrap();
        assert_eq!(response.skipped, 1);
        assert!(response.items[0]
            .reason
            .as_deref()
            .unwrap()
            .contains("out of range"));
    }

    #[test]
    fn non_jpeg_inputs_are_rejected() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("clip.mp4"), b"video").unwrap();

        let result = preview(&request(
            vec![tmp.path().to_string_lossy().to_string()],
            60,
        ));
        assert!(matches!(result, Err(EngineError::InvalidRequest(_))));
    }
}
