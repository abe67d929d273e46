//! Extension-targeted delete: unlink, recycle, or retreat matching files.
//!
//! `direct` unlinks, `trash` hands the file to the OS recycle bin, and
//! `retreat` moves it into a retreat directory (flat, by filename) under
//! the usual conflict policy. Trash destinations are opaque, so the
//! conflict policy does not apply there.

use crate::collect::{self, ExtensionSet};
use crate::error::EngineError;
use crate::exec::{self, ExecDetail};
use crate::fsops;
use crate::plan::{resolve_destination, NameReservations};
use crate::progress::{self, Operation, OperationProgressEvent};
use crate::types::{
    ConflictPolicy, DeleteExecuteDetail, DeleteExecuteResponse, DeleteMode, DeletePreviewItem,
    DeletePreviewResponse, DeleteRequest, ExecStatus, PlanStatus,
};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
struct PlannedDelete {
    source: PathBuf,
    destination: Option<PathBuf>,
    mode: DeleteMode,
    status: PlanStatus,
    reason: Option<String>,
}

pub fn preview(request: &DeleteRequest) -> Result<DeletePreviewResponse, EngineError> {
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
            DeletePreviewItem {
                source_path: item.source.to_string_lossy().to_string(),
                mode: item.mode,
                destination_path: item
                    .destination
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string()),
                status: item.status,
                reason: item.reason.clone(),
            }
        })
        .collect();

    Ok(DeletePreviewResponse {
        items,
        total: ready + skipped,
        ready,
        skipped,
    })
}

pub fn execute<F>(
    request: &DeleteRequest,
    report_progress: &mut F,
) -> Result<DeleteExecuteResponse, EngineError>
where
    F: FnMut(OperationProgressEvent),
{
    progress::clear_cancel();
    let plan = build_plan(request)?;

    let report = exec::run_parallel(
        Operation::Delete,
        plan,
        |item, canceled| execute_one(item, canceled),
        progress::is_canceled,
        report_progress,
    );

    Ok(DeleteExecuteResponse {
        processed: report.processed,
        succeeded: report.succeeded,
        failed: report.failed,
        skipped: report.skipped,
        details: report.details,
    })
}

impl ExecDetail for DeleteExecuteDetail {
    fn status(&self) -> ExecStatus {
        self.status
    }
    fn source_path(&self) -> &str {
        &self.source_path
    }
}

fn execute_one(item: &PlannedDelete, canceled: bool) -> DeleteExecuteDetail {
    let source_path = item.source.to_string_lossy().to_string();
    let destination_path = item
        .destination
        .as_ref()
        .map(|p| p.to_string_lossy().to_string());

    if canceled || item.status == PlanStatus::Skipped {
        return DeleteExecuteDetail {
            source_path,
            mode: item.mode,
            destination_path,
            status: ExecStatus::Skipped,
            reason: if canceled {
                Some("canceled".to_string())
            } else {
                item.reason.clone()
            },
        };
    }

    let result: Result<(), String> = match item.mode {
        DeleteMode::Direct => {
            fs::remove_file(&item.source).map_err(|e| format!("delete failed: {e}"))
        }
        DeleteMode::Trash => fsops::move_to_trash(&item.source),
        DeleteMode::Retreat => match item.destination.as_ref() {
            Some(destination) => {
                let prepared = match destination.parent() {
                    Some(parent) => fs::create_dir_all(parent)
                        .map_err(|e| format!("cannot create retreat directory: {e}")),
                    None => Ok(()),
                };
                prepared.and_then(|()| {
                    fsops::atomic_move_replace(&item.source, destination)
                        .map(|_| ())
                        .map_err(|e| format!("retreat move failed: {e}"))
                })
            }
            None => Err("retreat destination missing from plan".to_string()),
        },
    };

    match result {
        Ok(()) => DeleteExecuteDetail {
            source_path,
            mode: item.mode,
            destination_path,
            status: ExecStatus::Succeeded,
            reason: None,
        },
        Err(reason) => {
            tracing::warn!(source = %source_path, "delete failed: {reason}");
            DeleteExecuteDetail {
                source_path,
                mode: item.mode,
                destination_path,
                status: ExecStatus::Failed,
                reason: Some(reason),
            }
        }
    }
}

fn build_plan(request: &DeleteRequest) -> Result<Vec<PlannedDelete>, EngineError> {
    let extensions = ExtensionSet::from_request(&request.extensions)?;
    let collection = collect::collect(
        &request.input_paths,
        request.include_subfolders,
        Some(&extensions),
    )?;
    // An empty match is a legitimate outcome for a delete pattern, not an error.
    if collection.is_empty() {
        return Ok(Vec::new());
    }

    let retreat_dir = match request.mode {
        DeleteMode::Retreat => {
            let dir = request
                .retreat_dir
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    EngineError::InvalidRequest(
                        "retreat mode requires a retreat directory".to_string(),
                    )
                })?;
            Some(PathBuf::from(dir))
        }
        _ => None,
    };
    let policy = request.conflict_policy.unwrap_or(ConflictPolicy::Sequence);
    let reservations = NameReservations::new();

    let mut plan = Vec::with_capacity(collection.entries.len());
    for entry in &collection.entries {
        let (status, reason, destination) = match (&request.mode, retreat_dir.as_ref()) {
            (DeleteMode::Retreat, Some(root)) => {
                let file_name = entry
                    .path
                    .file_name()
                    .ok_or_else(|| EngineError::InvalidRequest("invalid file name".to_string()))?;
                let base = root.join(file_name);
                let resolution =
                    resolve_destination(&base, Some(&entry.path), &reservations, policy);
                (
                    resolution.status,
                    resolution.reason,
                    Some(resolution.destination),
                )
            }
            _ => (PlanStatus::Ready, None, None),
        };

        plan.push(PlannedDelete {
            source: entry.path.clone(),
            destination,
            mode: request.mode,
            status,
            reason,
        });
    }

    Ok(plan)
}
