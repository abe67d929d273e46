//! JPEG recompression: resize and re-encode at a chosen quality, or solve
//! for a target total size.
//!
//! Sizes are predicted with the analytic model
//! `size ≈ Σ sizeᵢ · (r/100)² · (q/100)^1.25`. When a target total size is
//! requested, the solver walks a descending resize ladder (100 → 10 in
//! steps of 5) at the requested quality and accepts the first rung whose
//! estimate fits `target + tolerance`; only if the smallest rung still
//! overshoots does it start lowering quality (steps of 5, floor 20).
//! Resize always gives way before quality does.
//!
//! Output lands in the requested directory or in a timestamped sibling of
//! the input root (`<name>_compressed_<YYYYMMDDHHMMSS>`), mirroring the
//! input's relative structure.

use crate::collect::{self, ExtensionSet, JPEG_EXTENSIONS};
use crate::error::EngineError;
use crate::exec::{self, ExecDetail};
use crate::fsops;
use crate::jpeg;
use crate::ops::empty_collection_error;
use crate::pathutil::relative_or_flat_absolute;
use crate::plan::{default_timestamped_dir, resolve_destination, NameReservations};
use crate::progress::{self, EstimateProgressEvent, Operation, OperationProgressEvent};
use crate::types::{
    CompressCollectInfoResponse, CompressEstimateResponse, CompressExecuteDetail,
    CompressExecuteResponse, CompressPreviewItem, CompressPreviewResponse, CompressRequest,
    ExecStatus, PlanStatus,
};
use chrono::Local;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
struct PlannedCompress {
    source: PathBuf,
    destination: PathBuf,
    source_size: u64,
    estimated_size: u64,
    status: PlanStatus,
    reason: Option<String>,
}

#[derive(Debug)]
struct PlanState {
    output_dir: PathBuf,
    effective_resize_percent: f32,
    effective_quality: u8,
    target_size_kb: Option<u64>,
    tolerance_percent: f32,
    plan: Vec<PlannedCompress>,
    warnings: usize,
}

/// File count and total byte size of the current selection.
pub fn collect_info(
    input_paths: &[String],
    include_subfolders: bool,
) -> Result<CompressCollectInfoResponse, EngineError> {
    let collection = collect::collect(input_paths, include_subfolders, Some(&jpeg_set()))?;
    Ok(CompressCollectInfoResponse {
        file_count: collection.entries.len(),
        total_size: collection.entries.iter().map(|e| e.size).sum(),
    })
}

/// Model-estimated total output size for explicit parameters.
pub fn estimate<F>(
    input_paths: &[String],
    include_subfolders: bool,
    resize_percent: f32,
    quality: u8,
    on_progress: &mut F,
) -> Result<CompressEstimateResponse, EngineError>
where
    F: FnMut(EstimateProgressEvent),
{
    let collection = collect::collect(input_paths, include_subfolders, Some(&jpeg_set()))?;
    let total = collection.entries.len();
    let mut estimated_total_size = 0u64;
    let mut total_source_size = 0u64;
    for (index, entry) in collection.entries.iter().enumerate() {
        total_source_size += entry.size;
        estimated_total_size += estimate_item(entry.size, resize_percent, quality);
        on_progress(EstimateProgressEvent {
            current: index + 1,
            total,
        });
    }
    Ok(CompressEstimateResponse {
        file_count: total,
        total_source_size,
        estimated_total_size,
    })
}

pub fn preview(request: &CompressRequest) -> Result<CompressPreviewResponse, EngineError> {
    let state = build_plan(request, &mut |_| {})?;
    Ok(preview_response(&state))
}

/// Execute. `report_estimate` receives one event per file evaluated by the
/// target-size solver (nothing without a target).
pub fn execute<F, G>(
    request: &CompressRequest,
    report_progress: &mut F,
    report_estimate: &mut G,
) -> Result<CompressExecuteResponse, EngineError>
where
    F: FnMut(OperationProgressEvent),
    G: FnMut(EstimateProgressEvent),
{
    progress::clear_cancel();
    let state = build_plan(request, report_estimate)?;
    fs::create_dir_all(&state.output_dir)?;

    let resize = state.effective_resize_percent;
    let quality = state.effective_quality;
    let preserve_exif = request.preserve_exif;

    let report = exec::run_parallel(
        Operation::Compress,
        state.plan,
        move |item, canceled| execute_one(item, resize, quality, preserve_exif, canceled),
        progress::is_canceled,
        report_progress,
    );

    Ok(CompressExecuteResponse {
        output_dir: state.output_dir.to_string_lossy().to_string(),
        effective_resize_percent: resize,
        effective_quality: quality,
        processed: report.processed,
        succeeded: report.succeeded,
        failed: report.failed,
        skipped: report.skipped,
        details: report.details,
    })
}

impl ExecDetail for CompressExecuteDetail {
    fn status(&self) -> ExecStatus {
        self.status
    }
    fn source_path(&self) -> &str {
        &self.source_path
    }
}

fn jpeg_set() -> ExtensionSet {
    ExtensionSet::new(JPEG_EXTENSIONS.iter().copied())
}

fn execute_one(
    item: &PlannedCompress,
    resize_percent: f32,
    quality: u8,
    preserve_exif: bool,
    canceled: bool,
) -> CompressExecuteDetail {
    let source_path = item.source.to_string_lossy().to_string();
    let destination_path = item.destination.to_string_lossy().to_string();

    if canceled || item.status == PlanStatus::Skipped {
        return CompressExecuteDetail {
            source_path,
            destination_path,
            status: ExecStatus::Skipped,
            output_size: None,
            reason: if canceled {
                Some("canceled".to_string())
            } else {
                item.reason.clone()
            },
        };
    }

    let written = jpeg::recompress(&item.source, resize_percent, quality, preserve_exif)
        .and_then(|bytes| {
            if let Some(parent) = item.destination.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("cannot create destination directory: {e}"))?;
            }
            fsops::atomic_write_replace(&item.destination, &bytes)
                .map_err(|e| format!("write failed: {e}"))?;
            Ok(bytes.len() as u64)
        });

    match written {
        Ok(size) => CompressExecuteDetail {
            source_path,
            destination_path,
            status: ExecStatus::Succeeded,
            output_size: Some(size),
            reason: None,
        },
        Err(reason) => {
            tracing::warn!(source = %source_path, "compress failed: {reason}");
            CompressExecuteDetail {
                source_path,
                destination_path,
                status: ExecStatus::Failed,
                output_size: None,
                reason: Some(reason),
            }
        }
    }
}

fn build_plan<G>(request: &CompressRequest, report_estimate: &mut G) -> Result<PlanState, EngineError>
where
    G: FnMut(EstimateProgressEvent),
{
    let resize_percent = request.resize_percent.clamp(1.0, 100.0);
    let quality = request.quality.clamp(1, 100);
    let tolerance_percent = request.tolerance_percent.unwrap_or(10.0).max(0.0);

    let collection = collect::collect(
        &request.input_paths,
        request.include_subfolders,
        Some(&jpeg_set()),
    )?;
    if collection.is_empty() {
        return Err(empty_collection_error(&collection));
    }

    let output_dir = match request.output_dir.as_deref().map(str::trim) {
        Some("") | None => {
            let root = collection.input_root.as_deref().ok_or_else(|| {
                EngineError::InvalidRequest(
                    "inputs with no common parent need an explicit output directory".to_string(),
                )
            })?;
            let stamp = Local::now().format("%Y%m%d%H%M%S").to_string();
            default_timestamped_dir(root, "_compressed_", &stamp)?
        }
        Some(dir) => PathBuf::from(dir),
    };

    let sizes: Vec<u64> = collection.entries.iter().map(|e| e.size).collect();
    let (effective_resize_percent, effective_quality) = match request.target_size_kb {
        Some(target_kb) => {
            let total = sizes.len();
            for current in 1..=total {
                report_estimate(EstimateProgressEvent { current, total });
            }
            solve_target(&sizes, target_kb * 1024, tolerance_percent, quality)
        }
        None => (resize_percent, quality),
    };

    let per_file_target_kb = request
        .target_size_kb
        .map(|total_kb| total_kb / sizes.len().max(1) as u64);

    let reservations = NameReservations::new();
    let mut warnings = 0usize;
    let mut plan = Vec::with_capacity(collection.entries.len());

    for entry in &collection.entries {
        let estimated_size =
            estimate_item(entry.size, effective_resize_percent, effective_quality);
        let relative = relative_or_flat_absolute(&entry.path, collection.input_root.as_deref());
        let base = output_dir.join(relative);

        let resolution =
            resolve_destination(&base, None, &reservations, request.conflict_policy);

        let warning = tolerance_warning(
            estimated_size,
            per_file_target_kb,
            tolerance_percent,
        );
        if warning.is_some() {
            warnings += 1;
        }
        let reason = match (resolution.reason, warning) {
            (Some(a), Some(b)) => Some(format!("{a}; {b}")),
            (Some(a), None) => Some(a),
            (None, b) => b,
        };

        plan.push(PlannedCompress {
            source: entry.path.clone(),
            destination: resolution.destination,
            source_size: entry.size,
            estimated_size,
            status: resolution.status,
            reason,
        });
    }

    Ok(PlanState {
        output_dir,
        effective_resize_percent,
        effective_quality,
        target_size_kb: request.target_size_kb,
        tolerance_percent,
        plan,
        warnings,
    })
}

fn preview_response(state: &PlanState) -> CompressPreviewResponse {
    let mut ready = 0usize;
    let mut skipped = 0usize;
    let items = state
        .plan
        .iter()
        .map(|item| {
            match item.status {
                PlanStatus::Ready => ready += 1,
                PlanStatus::Skipped => skipped += 1,
            }
            CompressPreviewItem {
                source_path: item.source.to_string_lossy().to_string(),
                destination_path: item.destination.to_string_lossy().to_string(),
                source_size: item.source_size,
                estimated_size: item.estimated_size,
                status: item.status,
                reason: item.reason.clone(),
            }
        })
        .collect();

    CompressPreviewResponse {
        output_dir: state.output_dir.to_string_lossy().to_string(),
        effective_resize_percent: state.effective_resize_percent,
        effective_quality: state.effective_quality,
        target_size_kb: state.target_size_kb,
        tolerance_percent: state.tolerance_percent,
        items,
        total: ready + skipped,
        ready,
        skipped,
        warnings: state.warnings,
    }
}

/// Per-item size prediction: `size · (r/100)² · (q/100)^1.25`.
fn estimate_item(source_size: u64, resize_percent: f32, quality: u8) -> u64 {
    let resize_ratio = (resize_percent as f64 / 100.0).clamp(0.01, 1.0);
    let quality_ratio = (quality as f64 / 100.0).clamp(0.01, 1.0);
    ((source_size as f64) * resize_ratio * resize_ratio * quality_ratio.powf(1.25)).round() as u64
}

fn estimate_total(sizes: &[u64], resize_percent: f32, quality: u8) -> u64 {
    sizes
        .iter()
        .map(|&size| estimate_item(size, resize_percent, quality))
        .sum()
}

/// Pick `(resize, quality)` so the estimated total lands within tolerance
/// of the target: descending resize ladder first, then quality.
fn solve_target(
    sizes: &[u64],
    target_bytes: u64,
    tolerance_percent: f32,
    quality_seed: u8,
) -> (f32, u8) {
    let ceiling =
        target_bytes as f64 + target_bytes as f64 * (tolerance_percent as f64 / 100.0);
    let quality = quality_seed.clamp(1, 100);

    for rung in (2..=20).rev() {
        let resize = (rung * 5) as f32;
        if (estimate_total(sizes, resize, quality) as f64) <= ceiling {
            return (resize, quality);
        }
    }

    let mut q = quality;
    while q > 20 {
        q = q.saturating_sub(5).max(20);
        if (estimate_total(sizes, 10.0, q) as f64) <= ceiling {
            return (10.0, q);
        }
    }
    (10.0, 20)
}

/// Warn when a per-item estimate misses its share of the target.
fn tolerance_warning(
    estimated_size: u64,
    per_file_target_kb: Option<u64>,
    tolerance_percent: f32,
) -> Option<String> {
    let target_bytes = per_file_target_kb?.saturating_mul(1024);
    if target_bytes == 0 {
        return None;
    }
    let diff = estimated_size.abs_diff(target_bytes);
    let tolerance = (target_bytes as f64 * (tolerance_percent as f64 / 100.0)) as u64;
    (diff > tolerance).then(|| {
        format!(
            "estimated {estimated_size} B misses the per-file target {target_bytes} B by more than {tolerance_percent}%"
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConflictPolicy;
    use tempfile::TempDir;

    fn request(inputs: Vec<String>) -> CompressRequest {
        CompressRequest {
            input_paths: inputs,
            include_subfolders: false,
            resize_percent: 100.0,
            quality: 85,
            target_size_kb: None,
            tolerance_percent: None,
            preserve_exif: false,
            output_dir: None,
            conflict_policy: ConflictPolicy::Sequence,
        }
    }

    fn write_test_jpeg(path: &std::path::Path, width: u32, height: u32) {
        image::DynamicImage::new_rgb8(width, height)
            .save(path)
            .unwrap();
    }

    #[test]
    fn estimate_model_shrinks_with_resize_and_quality() {
        let full = estimate_item(1_000_000, 100.0, 100);
        let half = estimate_item(1_000_000, 50.0, 100);
        let low_q = estimate_item(1_000_000, 100.0, 50);
        assert_eq!(full, 1_000_000);
        assert_eq!(half, 250_000);
        assert!(low_q < full && low_q > half);
    }

    #[test]
    fn solver_lands_inside_the_tolerance_window() {
        // Ten 10 MB sources, 20 MB target, 10% tolerance.
        let sizes = vec![10 * 1024 * 1024u64; 10];
        let target = 20 * 1024 * 1024u64;
        let (resize, quality) = solve_target(&sizes, target, 10.0, 85);

        let estimate = estimate_total(&sizes, resize, quality);
        let window = (target as f64 * 0.9) as u64..=(target as f64 * 1.1) as u64;
        assert!(
            window.contains(&estimate),
            "estimate {estimate} outside [{:?}] at ({resize}, {quality})",
            window
        );
    }

    #[test]
    fn solver_prefers_resize_over_quality() {
        let sizes = vec![1_000_000u64; 4];
        // Reachable by resize alone: quality must stay at the seed.
        let (_, quality) = solve_target(&sizes, 1_000_000, 10.0, 85);
        assert_eq!(quality, 85);
    }

    #[test]
    fn solver_drops_quality_only_at_the_resize_floor() {
        let sizes = vec![1_000_000_000u64];
        // Even 10% resize of a 1 GB source is 10 MB × q-factor; ask for 2 MB.
        let (resize, quality) = solve_target(&sizes, 2_000_000, 10.0, 85);
        assert_eq!(resize, 10.0);
        assert!(quality < 85);
    }

    #[test]
    fn generous_target_keeps_full_size() {
        let sizes = vec![1_000u64; 3];
        let (resize, quality) = solve_target(&sizes, 1_000_000, 10.0, 85);
        assert_eq!(resize, 100.0);
        assert_eq!(quality, 85);
    }

    #[test]
    fn execute_writes_resized_output() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        std::fs::create_dir(&input).unwrap();
        write_test_jpeg(&input.join("photo.jpg"), 80, 60);
        let out = tmp.path().join("out");

        let mut req = request(vec![input.to_string_lossy().to_string()]);
        req.resize_percent = 50.0;
        req.quality = 60;
        req.output_dir = Some(out.to_string_lossy().to_string());
        let response = execute(&req, &mut |_| {}, &mut |_| {}).unwrap();

        assert_eq!(response.succeeded, 1);
        let detail = &response.details[0];
        assert!(detail.output_size.unwrap() > 0);
        let decoded = image::open(out.join("photo.jpg")).unwrap();
        assert_eq!(decoded.width(), 40);
        assert_eq!(decoded.height(), 30);
    }

    #[test]
    fn default_output_dir_is_timestamped_sibling() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("shoot");
        std::fs::create_dir(&input).unwrap();
        write_test_jpeg(&input.join("a.jpg"), 16, 16);

        let response = preview(&request(vec![input.to_string_lossy().to_string()])).unwrap();
        let out = PathBuf::from(&response.output_dir);
        assert!(out
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("shoot_compressed_"));
    }

    #[test]
    fn preview_reports_effective_parameters_for_target() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        std::fs::create_dir(&input).unwrap();
        write_test_jpeg(&input.join("a.jpg"), 64, 64);

        let mut req = request(vec![input.to_string_lossy().to_string()]);
        req.target_size_kb = Some(1);
        let response = preview(&req).unwrap();
        assert!(response.effective_resize_percent <= 100.0);
        assert!(response.effective_quality >= 20);
        // Per-item estimates reproduce the model at the effective parameters.
        let item = &response.items[0];
        assert_eq!(
            item.estimated_size,
            estimate_item(
                item.source_size,
                response.effective_resize_percent,
                response.effective_quality
            )
        );
    }

    #[test]
    fn non_jpeg_inputs_are_rejected() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("x.png"), b"png").unwrap();
        let result = preview(&request(vec![tmp.path().to_string_lossy().to_string()]));
        assert!(matches!(result, Err(EngineError::InvalidRequest(_))));
    }

    #[test]
    fn collect_info_sums_sizes() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.jpg"), vec![0u8; 100]).unwrap();
        std::fs::write(tmp.path().join("b.jpg"), vec![0u8; 150]).unwrap();

        let info =
            collect_info(&[tmp.path().to_string_lossy().to_string()], false).unwrap();
        assert_eq!(info.file_count, 2);
        assert_eq!(info.total_size, 250);
    }

    #[test]
    fn estimate_emits_one_event_per_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.jpg"), vec![0u8; 1000]).unwrap();
        std::fs::write(tmp.path().join("b.jpg"), vec![0u8; 1000]).unwrap();

        let mut events = Vec::new();
        let response = estimate(
            &[tmp.path().to_string_lossy().to_string()],
            false,
            50.0,
            80,
            &mut |e| events.push(e),
        )
        .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].current, 2);
        assert_eq!(response.total_source_size, 2000);
        assert_eq!(
            response.estimated_total_size,
            estimate_total(&[1000, 1000], 50.0, 80)
        );
    }
}
