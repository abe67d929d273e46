//! Bulk rename: template-driven renaming of photo and video files.
//!
//! The planner resolves a datetime per file (EXIF capture time, the video
//! probe, the filesystem mtime or the shared run timestamp, depending on
//! the requested source), renders the template, and settles destination
//! collisions. Execution moves files with [`fsops::atomic_move_replace`];
//! when no output directory is given the rename happens in place.
//!
//! Rename is a move, so a plan whose destinations overlap other items'
//! sources cannot run in parallel — a worker could destroy a source before
//! another worker reads it. Such plans fall back to sequential execution
//! in plan order.

use crate::collect::{self, FileEntry, IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
use crate::error::EngineError;
use crate::exec::{self, ExecDetail};
use crate::fsops;
use crate::ops::{empty_collection_error, naive_local, parse_exif_datetime, read_exif_datetime_string};
use crate::pathutil::{destination_key, relative_or_flat_absolute};
use crate::plan::{
    demote_overwrite_duplicates, resolve_destination, validate_file_name, NameReservations,
};
use crate::probe::VideoProbe;
use crate::progress::{self, Operation, OperationProgressEvent};
use crate::template::{RenderContext, Template};
use crate::types::{
    ConflictPolicy, DatetimeSource, ExecStatus, PlanStatus, RenameExecuteDetail,
    RenameExecuteResponse, RenamePreviewItem, RenamePreviewResponse, RenameRequest,
};
use chrono::{Local, NaiveDateTime};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
struct PlannedRename {
    source: PathBuf,
    destination: Option<PathBuf>,
    status: PlanStatus,
    reason: Option<String>,
}

pub fn preview(
    request: &RenameRequest,
    probe: &dyn VideoProbe,
) -> Result<RenamePreviewResponse, EngineError> {
    let executed_at = Local::now().naive_local();
    let plan = build_plan(request, executed_at, probe)?;

    let mut ready = 0usize;
    let mut skipped = 0usize;
    let items = plan
        .iter()
        .map(|item| {
            match item.status {
                PlanStatus::Ready => ready += 1,
                PlanStatus::Skipped => skipped += 1,
            }
            RenamePreviewItem {
                source_path: item.source.to_string_lossy().to_string(),
                destination_path: item
                    .destination
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string()),
                status: item.status,
                reason: item.reason.clone(),
            }
        })
        .collect();

    Ok(RenamePreviewResponse {
        total: ready + skipped,
        ready,
        skipped,
        items,
    })
}

pub fn execute<F>(
    request: &RenameRequest,
    probe: &dyn VideoProbe,
    report_progress: &mut F,
) -> Result<RenameExecuteResponse, EngineError>
where
    F: FnMut(OperationProgressEvent),
{
    progress::clear_cancel();
    let executed_at = Local::now().naive_local();
    let plan = build_plan(request, executed_at, probe)?;

    let report = if needs_sequential(&plan) {
        tracing::debug!("rename plan overlaps its own sources, running sequentially");
        exec::run_sequential(
            Operation::Rename,
            plan,
            |item, canceled| execute_one(item, canceled),
            progress::is_canceled,
            report_progress,
        )
    } else {
        exec::run_parallel(
            Operation::Rename,
            plan,
            |item, canceled| execute_one(item, canceled),
            progress::is_canceled,
            report_progress,
        )
    };

    Ok(RenameExecuteResponse {
        processed: report.processed,
        succeeded: report.succeeded,
        failed: report.failed,
        skipped: report.skipped,
        details: report.details,
    })
}

impl ExecDetail for RenameExecuteDetail {
    fn status(&self) -> ExecStatus {
        self.status
    }
    fn source_path(&self) -> &str {
        &self.source_path
    }
}

/// A parallel move can destroy a source before another worker reads it when
/// some destination is also someone's source.
fn needs_sequential(plan: &[PlannedRename]) -> bool {
    let source_keys: HashSet<String> = plan
        .iter()
        .map(|item| destination_key(&item.source))
        .collect();
    plan.iter().any(|item| {
        item.destination
            .as_ref()
            .is_some_and(|dest| source_keys.contains(&destination_key(dest)))
    })
}

fn execute_one(item: &PlannedRename, canceled: bool) -> RenameExecuteDetail {
    let source_path = item.source.to_string_lossy().to_string();
    let destination_path = item
        .destination
        .as_ref()
        .map(|p| p.to_string_lossy().to_string());

    if canceled || item.status == PlanStatus::Skipped {
        return RenameExecuteDetail {
            source_path,
            destination_path,
            status: ExecStatus::Skipped,
            reason: if canceled {
                Some("canceled".to_string())
            } else {
                item.reason.clone()
            },
        };
    }

    let Some(destination) = item.destination.as_ref() else {
        return RenameExecuteDetail {
            source_path,
            destination_path,
            status: ExecStatus::Skipped,
            reason: Some("no destination".to_string()),
        };
    };

    if *destination == item.source {
        return RenameExecuteDetail {
            source_path,
            destination_path,
            status: ExecStatus::Skipped,
            reason: Some("unchanged".to_string()),
        };
    }

    if let Some(parent) = destination.parent() {
        if let Err(error) = fs::create_dir_all(parent) {
            return RenameExecuteDetail {
                source_path,
                destination_path,
                status: ExecStatus::Failed,
                reason: Some(format!("cannot create destination directory: {error}")),
            };
        }
    }

    match fsops::atomic_move_replace(&item.source, destination) {
        Ok(outcome) => RenameExecuteDetail {
            source_path,
            destination_path,
            status: ExecStatus::Succeeded,
            reason: match outcome {
                fsops::MoveOutcome::CopiedAndRemoved => {
                    Some("moved via copy and replace".to_string())
                }
                _ => None,
            },
        },
        Err(error) => {
            tracing::warn!(source = %source_path, "rename failed: {error}");
            RenameExecuteDetail {
                source_path,
                destination_path,
                status: ExecStatus::Failed,
                reason: Some(error.to_string()),
            }
        }
    }
}

fn build_plan(
    request: &RenameRequest,
    executed_at: NaiveDateTime,
    probe: &dyn VideoProbe,
) -> Result<Vec<PlannedRename>, EngineError> {
    if request.template.trim().is_empty() {
        return Err(EngineError::InvalidRequest("template is empty".to_string()));
    }
    let template = Template::parse(&request.template).map_err(EngineError::InvalidRequest)?;

    let collection = collect::collect(
        &request.input_paths,
        request.include_subfolders,
        Some(&collect::rename_extensions()),
    )?;
    if collection.is_empty() {
        return Err(empty_collection_error(&collection));
    }

    let output_dir = match request.output_dir.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(dir) => Some(PathBuf::from(dir)),
    };
    if output_dir.is_some() && collection.input_root.is_none() && collection.entries.len() > 1 {
        return Err(EngineError::InvalidRequest(
            "an output directory needs a common parent across the input files".to_string(),
        ));
    }

    let policy = request.conflict_policy.unwrap_or(ConflictPolicy::Sequence);
    let reservations = NameReservations::new();
    let mut plan = Vec::with_capacity(collection.entries.len());

    for (index, entry) in collection.entries.iter().enumerate() {
        let stem = entry
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("file")
            .to_string();
        let raw_ext = entry
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_string();

        let timestamp = resolve_timestamp(entry, request.source, executed_at, probe);
        if template.requires_timestamp() && timestamp.is_none() {
            plan.push(PlannedRename {
                source: entry.path.clone(),
                destination: None,
                status: PlanStatus::Skipped,
                reason: Some("no datetime".to_string()),
            });
            continue;
        }

        let rendered = template.render(&RenderContext {
            timestamp,
            executed_at,
            seq: index + 1,
            orig: &stem,
            ext: &raw_ext.to_ascii_lowercase(),
        });
        let rendered = match rendered {
            Ok(name) => name,
            Err(reason) => {
                plan.push(PlannedRename {
                    source: entry.path.clone(),
                    destination: None,
                    status: PlanStatus::Skipped,
                    reason: Some(reason),
                });
                continue;
            }
        };

        if rendered.trim().is_empty() {
            plan.push(PlannedRename {
                source: entry.path.clone(),
                destination: None,
                status: PlanStatus::Skipped,
                reason: Some("template produced an empty name".to_string()),
            });
            continue;
        }
        if let Err(reason) = validate_file_name(&rendered) {
            plan.push(PlannedRename {
                source: entry.path.clone(),
                destination: None,
                status: PlanStatus::Skipped,
                reason: Some(reason),
            });
            continue;
        }

        let mut file_name = rendered;
        if !template.uses_ext() && !raw_ext.is_empty() {
            file_name.push('.');
            file_name.push_str(&raw_ext);
        }

        let base = match output_dir.as_ref() {
            Some(out) => {
                let relative =
                    relative_or_flat_absolute(&entry.path, collection.input_root.as_deref());
                let relative_parent = relative.parent().map(Path::to_path_buf).unwrap_or_default();
                out.join(relative_parent).join(&file_name)
            }
            None => entry
                .path
                .parent()
                .map_or_else(|| PathBuf::from(&file_name), |p| p.join(&file_name)),
        };

        let resolution = resolve_destination(&base, Some(&entry.path), &reservations, policy);
        plan.push(PlannedRename {
            source: entry.path.clone(),
            destination: Some(resolution.destination),
            status: resolution.status,
            reason: resolution.reason,
        });
    }

    if policy == ConflictPolicy::Overwrite {
        demote_overwrite_duplicates(
            &mut plan,
            |item| {
                (item.status == PlanStatus::Ready)
                    .then(|| item.destination.as_ref().map(|d| destination_key(d)))
                    .flatten()
            },
            |item| {
                item.status = PlanStatus::Skipped;
                item.reason = Some("superseded by a later item with the same destination".to_string());
            },
        );
    }

    Ok(plan)
}

fn resolve_timestamp(
    entry: &FileEntry,
    source: DatetimeSource,
    executed_at: NaiveDateTime,
    probe: &dyn VideoProbe,
) -> Option<NaiveDateTime> {
    match source {
        DatetimeSource::CurrentTime => Some(executed_at),
        DatetimeSource::ModifiedOnly => Some(naive_local(entry.modified)),
        DatetimeSource::CaptureThenModified => {
            capture_datetime(&entry.path, probe).or(Some(naive_local(entry.modified)))
        }
    }
}

fn capture_datetime(path: &Path, probe: &dyn VideoProbe) -> Option<NaiveDateTime> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        let value =
            read_exif_datetime_string(path, &[exif::Tag::DateTimeOriginal, exif::Tag::DateTime])?;
        return parse_exif_datetime(&value);
    }
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        return probe.capture_datetime(path);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg::tests::synthetic_jpeg;
    use crate::jpeg::tiff::tests::payload_with_datetimes;
    use crate::probe::NoProbe;
    use tempfile::TempDir;

    fn request(inputs: Vec<String>, template: &str) -> RenameRequest {
        RenameRequest {
            input_paths: inputs,
            include_subfolders: false,
            template: template.to_string(),
            source: DatetimeSource::CaptureThenModified,
            output_dir: None,
            conflict_policy: None,
        }
    }

    fn write_jpeg_with_capture_time(path: &Path, datetime: &str) {
        let payload = payload_with_datetimes(datetime, datetime, datetime);
        std::fs::write(path, synthetic_jpeg(&payload)).unwrap();
    }

    #[test]
    fn renames_by_exif_capture_date_in_place() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("IMG.JPG");
        write_jpeg_with_capture_time(&source, "2023:04:05 12:34:56");

        let request = request(
            vec![tmp.path().to_string_lossy().to_string()],
            "{capture_date:YYYY-MM-DD}_{seq:2}",
        );
        let response = execute(&request, &NoProbe, &mut |_| {}).unwrap();

        assert_eq!(response.succeeded, 1);
        assert!(tmp.path().join("2023-04-05_01.JPG").exists());
        assert!(!source.exists());
    }

    #[test]
    fn preview_reports_destination_without_touching_files() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("IMG.JPG");
        write_jpeg_with_capture_time(&source, "2023:04:05 12:34:56");

        let request = request(
            vec![source.to_string_lossy().to_string()],
            "{capture_date:YYYYMMDD}_{capture_time:HHmmss}",
        );
        let response = preview(&request, &NoProbe).unwrap();

        assert_eq!(response.ready, 1);
        let destination = response.items[0].destination_path.as_ref().unwrap();
        assert!(destination.ends_with("20230405_123456.JPG"), "{destination}");
        assert!(source.exists());
    }

    #[test]
    fn colliding_names_get_sequence_suffixes() {
        let tmp = TempDir::new().unwrap();
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            std::fs::write(tmp.path().join(name), b"data").unwrap();
        }

        let request = request(vec![tmp.path().to_string_lossy().to_string()], "same");
        let response = execute(&request, &NoProbe, &mut |_| {}).unwrap();

        assert_eq!(response.succeeded, 3);
        assert!(tmp.path().join("same.jpg").exists());
        assert!(tmp.path().join("same_no1.jpg").exists());
        assert!(tmp.path().join("same_no2.jpg").exists());
    }

    #[test]
    fn skip_policy_skips_existing_destination() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.jpg"), b"data").unwrap();
        std::fs::write(tmp.path().join("taken.jpg"), b"other").unwrap();

        let mut req = request(
            vec![tmp.path().join("a.jpg").to_string_lossy().to_string()],
            "taken",
        );
        req.conflict_policy = Some(ConflictPolicy::Skip);
        let response = preview(&req, &NoProbe).unwrap();

        assert_eq!(response.skipped, 1);
        assert_eq!(response.items[0].reason.as_deref(), Some("collision"));
    }

    #[test]
    fn overwrite_keeps_only_last_writer_ready() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.jpg"), b"1").unwrap();
        std::fs::write(tmp.path().join("b.jpg"), b"2").unwrap();

        let mut req = request(vec![tmp.path().to_string_lossy().to_string()], "same");
        req.conflict_policy = Some(ConflictPolicy::Overwrite);
        let response = preview(&req, &NoProbe).unwrap();

        assert_eq!(response.ready, 1);
        assert_eq!(response.skipped, 1);
        // Plan order is a.jpg then b.jpg; the earlier one is demoted.
        assert_eq!(response.items[0].status, PlanStatus::Skipped);
        assert_eq!(response.items[1].status, PlanStatus::Ready);
    }

    #[test]
    fn output_dir_mirrors_relative_structure() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        std::fs::create_dir_all(input.join("a")).unwrap();
        std::fs::create_dir_all(input.join("b")).unwrap();
        std::fs::write(input.join("a/1.jpg"), b"1").unwrap();
        std::fs::write(input.join("b/2.jpg"), b"2").unwrap();
        let out = tmp.path().join("out");

        let mut req = request(
            vec![input.to_string_lossy().to_string()],
            "{orig}_r",
        );
        req.include_subfolders = true;
        req.output_dir = Some(out.to_string_lossy().to_string());
        let response = execute(&req, &NoProbe, &mut |_| {}).unwrap();

        assert_eq!(response.succeeded, 2);
        assert!(out.join("a/1_r.jpg").exists());
        assert!(out.join("b/2_r.jpg").exists());
        assert!(!input.join("a/1.jpg").exists());
    }

    #[test]
    fn forbidden_characters_skip_the_item() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.jpg"), b"data").unwrap();

        let req = request(vec![tmp.path().to_string_lossy().to_string()], "bad:name");
        let response = preview(&req, &NoProbe).unwrap();

        assert_eq!(response.skipped, 1);
        assert!(response.items[0]
            .reason
            .as_deref()
            .unwrap()
            .contains("forbidden"));
    }

    #[test]
    fn empty_template_is_invalid_request() {
        let req = request(vec!["/tmp".to_string()], "   ");
        assert!(matches!(
            preview(&req, &NoProbe),
            Err(EngineError::InvalidRequest(_))
        ));
    }

    #[test]
    fn unsupported_files_only_is_invalid_request() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"text").unwrap();

        let req = request(vec![tmp.path().to_string_lossy().to_string()], "{orig}");
        let error = preview(&req, &NoProbe).unwrap_err();
        match error {
            EngineError::InvalidRequest(message) => assert!(message.contains("filtered")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unchanged_destination_is_skipped_at_execute() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("keep.jpg"), b"data").unwrap();

        let req = request(vec![tmp.path().to_string_lossy().to_string()], "{orig}");
        let response = execute(&req, &NoProbe, &mut |_| {}).unwrap();

        assert_eq!(response.skipped, 1);
        assert_eq!(response.details[0].reason.as_deref(), Some("unchanged"));
        assert!(tmp.path().join("keep.jpg").exists());
    }

    #[test]
    fn cancel_mid_run_skips_remaining_items() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("1.jpg"), b"a").unwrap();
        std::fs::write(tmp.path().join("2.jpg"), b"b").unwrap();
        std::fs::write(tmp.path().join("3.jpg"), b"c").unwrap();

        let req = request(vec![tmp.path().to_string_lossy().to_string()], "{orig}_x");
        let plan = build_plan(&req, Local::now().naive_local(), &NoProbe).unwrap();

        // Cancellation raised after the first item: the rest of the plan is
        // reported skipped with reason "canceled".
        let polls = std::sync::atomic::AtomicUsize::new(0);
        let report = exec::run_sequential(
            Operation::Rename,
            plan,
            |item, canceled| execute_one(item, canceled),
            || polls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) >= 1,
            &mut |_| {},
        );

        assert_eq!(report.processed, 3);
        assert!(report.canceled);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.details[1].reason.as_deref(), Some("canceled"));
        assert_eq!(report.details[2].reason.as_deref(), Some("canceled"));
        assert!(tmp.path().join("1_x.jpg").exists());
        assert!(tmp.path().join("2.jpg").exists());
    }

    #[test]
    fn video_probe_supplies_capture_time() {
        use crate::probe::tests::FixedProbe;
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("clip.mp4"), b"notavideo").unwrap();

        let probe = FixedProbe(Some(
            chrono::NaiveDate::from_ymd_opt(2022, 7, 1)
                .unwrap()
                .and_hms_opt(8, 30, 0)
                .unwrap(),
        ));
        let req = request(
            vec![tmp.path().to_string_lossy().to_string()],
            "{capture_date:YYYYMMDD}",
        );
        let response = preview(&req, &probe).unwrap();
        let destination = response.items[0].destination_path.as_ref().unwrap();
        assert!(destination.ends_with("20220701.mp4"), "{destination}");
    }
}
