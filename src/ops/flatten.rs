//! Directory flattening: copy every file of a tree into one flat directory.
//!
//! Sources are never removed. The output directory defaults to a
//! timestamped sibling of the input (`<name>_flattened_<YYYYMMDDHHMMSS>`)
//! and must not be the input directory or live inside it — flattening into
//! yourself would walk its own output.

use crate::collect;
use crate::error::EngineError;
use crate::exec::{self, ExecDetail};
use crate::fsops;
use crate::pathutil::{destination_key, safe_canonicalize};
use crate::plan::{
    default_timestamped_dir, demote_overwrite_duplicates, resolve_destination, NameReservations,
};
use crate::progress::{self, Operation, OperationProgressEvent};
use crate::types::{
    ConflictPolicy, ExecStatus, FlattenExecuteDetail, FlattenExecuteResponse, FlattenPreviewItem,
    FlattenPreviewResponse, FlattenRequest, PlanStatus,
};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
struct PlannedFlatten {
    source: PathBuf,
    destination: PathBuf,
    status: PlanStatus,
    reason: Option<String>,
}

pub fn preview(request: &FlattenRequest) -> Result<FlattenPreviewResponse, EngineError> {
    let (output_dir, plan, collisions) = build_plan(request)?;
    let mut ready = 0usize;
    let mut skipped = 0usize;
    let items = plan
        .iter()
        .map(|item| {
            match item.status {
                PlanStatus::Ready => ready += 1,
                PlanStatus::Skipped => skipped += 1,
            }
            FlattenPreviewItem {
                source_path: item.source.to_string_lossy().to_string(),
                destination_path: item.destination.to_string_lossy().to_string(),
                status: item.status,
                reason: item.reason.clone(),
            }
        })
        .collect();

    Ok(FlattenPreviewResponse {
        output_dir: output_dir.to_string_lossy().to_string(),
        items,
        total: ready + skipped,
        ready,
        skipped,
        collisions,
    })
}

pub fn execute<F>(
    request: &FlattenRequest,
    report_progress: &mut F,
) -> Result<FlattenExecuteResponse, EngineError>
where
    F: FnMut(OperationProgressEvent),
{
    progress::clear_cancel();
    let (output_dir, plan, _) = build_plan(request)?;
    fs::create_dir_all(&output_dir)?;

    let report = exec::run_parallel(
        Operation::Flatten,
        plan,
        |item, canceled| execute_one(item, canceled),
        progress::is_canceled,
        report_progress,
    );

    Ok(FlattenExecuteResponse {
        output_dir: output_dir.to_string_lossy().to_string(),
        processed: report.processed,
        succeeded: report.succeeded,
        failed: report.failed,
        skipped: report.skipped,
        details: report.details,
    })
}

impl ExecDetail for FlattenExecuteDetail {
    fn status(&self) -> ExecStatus {
        self.status
    }
    fn source_path(&self) -> &str {
        &self.source_path
    }
}

fn execute_one(item: &PlannedFlatten, canceled: bool) -> FlattenExecuteDetail {
    let source_path = item.source.to_string_lossy().to_string();
    let destination_path = item.destination.to_string_lossy().to_string();

    if canceled || item.status == PlanStatus::Skipped {
        return FlattenExecuteDetail {
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

    match fsops::atomic_copy_replace(&item.source, &item.destination) {
        Ok(()) => FlattenExecuteDetail {
            source_path,
            destination_path,
            status: ExecStatus::Succeeded,
            reason: None,
        },
        Err(error) => {
            tracing::warn!(source = %source_path, "flatten copy failed: {error}");
            FlattenExecuteDetail {
                source_path,
                destination_path,
                status: ExecStatus::Failed,
                reason: Some(error.to_string()),
            }
        }
    }
}

fn build_plan(
    request: &FlattenRequest,
) -> Result<(PathBuf, Vec<PlannedFlatten>, usize), EngineError> {
    let input_dir = PathBuf::from(request.input_dir.trim());
    if !input_dir.is_dir() {
        return Err(EngineError::InvalidRequest(
            "input path must be an existing directory".to_string(),
        ));
    }
    let input_dir = safe_canonicalize(&input_dir)?;

    let output_dir = resolve_output_dir(&input_dir, request.output_dir.as_deref())?;
    validate_output_dir(&input_dir, &output_dir)?;

    let collection = collect::collect(
        &[input_dir.to_string_lossy().to_string()],
        true,
        None,
    )?;
    if collection.is_empty() {
        return Err(EngineError::InvalidRequest(
            "input directory contains no files".to_string(),
        ));
    }

    let reservations = NameReservations::new();
    let mut collisions = 0usize;
    let mut plan = Vec::with_capacity(collection.entries.len());

    for entry in &collection.entries {
        let file_name = entry
            .path
            .file_name()
            .ok_or_else(|| EngineError::InvalidRequest("invalid file name".to_string()))?;
        let base = output_dir.join(file_name);
        if reservations.contains(&destination_key(&base)) || base.exists() {
            collisions += 1;
        }
        let resolution =
            resolve_destination(&base, Some(&entry.path), &reservations, request.conflict_policy);
        plan.push(PlannedFlatten {
            source: entry.path.clone(),
            destination: resolution.destination,
            status: resolution.status,
            reason: resolution.reason,
        });
    }

    if request.conflict_policy == ConflictPolicy::Overwrite {
        demote_overwrite_duplicates(
            &mut plan,
            |item| {
                (item.status == PlanStatus::Ready).then(|| destination_key(&item.destination))
            },
            |item| {
                item.status = PlanStatus::Skipped;
                item.reason =
                    Some("superseded by a later item with the same destination".to_string());
            },
        );
    }

    Ok((output_dir, plan, collisions))
}

fn resolve_output_dir(input_dir: &Path, output_dir: Option<&str>) -> Result<PathBuf, EngineError> {
    match output_dir.map(str::trim) {
        Some("") => Err(EngineError::InvalidRequest(
            "output directory is empty".to_string(),
        )),
        Some(dir) => Ok(PathBuf::from(dir)),
        None => {
            let stamp = Local::now().format("%Y%m%d%H%M%S").to_string();
            default_timestamped_dir(input_dir, "_flattened_", &stamp)
        }
    }
}

fn validate_output_dir(input_dir: &Path, output_dir: &Path) -> Result<(), EngineError> {
    let output = safe_canonicalize(output_dir).unwrap_or_else(|_| output_dir.to_path_buf());
    if output == input_dir {
        return Err(EngineError::InvalidRequest(
            "output directory cannot equal the input directory".to_string(),
        ));
    }
    if output.starts_with(input_dir) {
        return Err(EngineError::InvalidRequest(
            "output directory cannot live inside the input directory".to_string(),
        ));
    }
    Ok(())
}
