//! JPEG metadata stripping: remove selected metadata categories in place.
//!
//! EXIF categories are removed by rebuilding the TIFF block inside APP1;
//! IPTC and XMP are removed by dropping their whole APP segments. The
//! entropy-coded image data is never touched. Presets bundle the masks
//! users actually reach for; `custom` passes the request mask through.

use crate::collect::{self, ExtensionSet, JPEG_EXTENSIONS};
use crate::error::EngineError;
use crate::exec::{self, ExecDetail};
use crate::fsops;
use crate::jpeg::{tiff, Chunk, JpegStream};
use crate::ops::empty_collection_error;
use crate::progress::{self, Operation, OperationProgressEvent};
use crate::types::{
    ExecStatus, MetadataCategories, PlanStatus, StripExecuteDetail, StripExecuteResponse,
    StripPreset, StripPreviewItem, StripPreviewResponse, StripRequest,
};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
struct PlannedStrip {
    source: PathBuf,
    found_categories: Vec<String>,
    tags_to_strip: usize,
    has_iptc: bool,
    has_xmp: bool,
    status: PlanStatus,
    reason: Option<String>,
}

/// Resolve a preset to its category mask.
pub fn preset_categories(
    preset: StripPreset,
    custom: &MetadataCategories,
) -> MetadataCategories {
    match preset {
        StripPreset::SnsPublish => MetadataCategories {
            gps: true,
            camera_lens: true,
            comments: true,
            thumbnail: true,
            ..Default::default()
        },
        StripPreset::Delivery => MetadataCategories {
            camera_lens: true,
            software: true,
            comments: true,
            ..Default::default()
        },
        StripPreset::FullClean => MetadataCategories {
            gps: true,
            camera_lens: true,
            software: true,
            author_copyright: true,
            comments: true,
            thumbnail: true,
            iptc: true,
            xmp: true,
            shooting_settings: true,
            capture_datetime: true,
        },
        StripPreset::Custom => custom.clone(),
    }
}

pub fn preview(request: &StripRequest) -> Result<StripPreviewResponse, EngineError> {
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
            StripPreviewItem {
                source_path: item.source.to_string_lossy().to_string(),
                found_categories: item.found_categories.clone(),
                tags_to_strip: item.tags_to_strip,
                has_iptc: item.has_iptc,
                has_xmp: item.has_xmp,
                status: item.status,
                reason: item.reason.clone(),
            }
        })
        .collect();

    Ok(StripPreviewResponse {
        items,
        total: ready + skipped,
        ready,
        skipped,
    })
}

pub fn execute<F>(
    request: &StripRequest,
    report_progress: &mut F,
) -> Result<StripExecuteResponse, EngineError>
where
    F: FnMut(OperationProgressEvent),
{
    progress::clear_cancel();
    let plan = build_plan(request)?;
    let cats = preset_categories(request.preset, &request.categories);
    let full_clean = request.preset == StripPreset::FullClean;

    let report = exec::run_parallel(
        Operation::MetadataStrip,
        plan,
        move |item, canceled| execute_one(item, &cats, full_clean, canceled),
        progress::is_canceled,
        report_progress,
    );

    Ok(StripExecuteResponse {
        processed: report.processed,
        succeeded: report.succeeded,
        failed: report.failed,
        skipped: report.skipped,
        details: report.details,
    })
}

impl ExecDetail for StripExecuteDetail {
    fn status(&self) -> ExecStatus {
        self.status
    }
    fn source_path(&self) -> &str {
        &self.source_path
    }
}

fn execute_one(
    item: &PlannedStrip,
    cats: &MetadataCategories,
    full_clean: bool,
    canceled: bool,
) -> StripExecuteDetail {
    let source_path = item.source.to_string_lossy().to_string();

    if canceled || item.status == PlanStatus::Skipped {
        return StripExecuteDetail {
            source_path,
            stripped_tags: 0,
            stripped_iptc: false,
            stripped_xmp: false,
            status: ExecStatus::Skipped,
            reason: if canceled {
                Some("canceled".to_string())
            } else {
                item.reason.clone()
            },
        };
    }

    match strip_file(&item.source, cats, full_clean) {
        Ok(Some((stripped_tags, stripped_iptc, stripped_xmp))) => StripExecuteDetail {
            source_path,
            stripped_tags,
            stripped_iptc,
            stripped_xmp,
            status: ExecStatus::Succeeded,
            reason: None,
        },
        Ok(None) => StripExecuteDetail {
            source_path,
            stripped_tags: 0,
            stripped_iptc: false,
            stripped_xmp: false,
            status: ExecStatus::Skipped,
            reason: Some("no matching metadata".to_string()),
        },
        Err(reason) => {
            tracing::warn!(source = %source_path, "metadata strip failed: {reason}");
            StripExecuteDetail {
                source_path,
                stripped_tags: 0,
                stripped_iptc: false,
                stripped_xmp: false,
                status: ExecStatus::Failed,
                reason: Some(reason),
            }
        }
    }
}

/// Rewrite one file. `Ok(None)` means nothing matched the mask and the file
/// was left untouched.
fn strip_file(
    path: &Path,
    cats: &MetadataCategories,
    full_clean: bool,
) -> Result<Option<(usize, bool, bool)>, String> {
    let data = std::fs::read(path).map_err(|e| format!("read failed: {e}"))?;
    let stream = JpegStream::parse(&data)?;

    let mut stripped_tags = 0usize;
    let mut stripped_iptc = false;
    let mut stripped_xmp = false;
    let mut chunks = Vec::with_capacity(stream.chunks.len());

    for chunk in stream.chunks {
        if chunk.is_xmp_app1() && cats.xmp {
            stripped_xmp = true;
            continue;
        }
        if chunk.is_iptc_app13() && cats.iptc {
            stripped_iptc = true;
            continue;
        }
        if chunk.is_exif_app1() {
            if let Chunk::Segment { marker, payload } = &chunk {
                match tiff::strip_categories(payload, cats, full_clean) {
                    Ok(outcome) if outcome.removed > 0 => {
                        stripped_tags += outcome.removed;
                        chunks.push(Chunk::Segment {
                            marker: *marker,
                            payload: outcome.payload,
                        });
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) if e == "exif too large" => return Err(e),
                    // A malformed TIFF block is left as found.
                    Err(_) => {}
                }
            }
        }
        chunks.push(chunk);
    }

    if stripped_tags == 0 && !stripped_iptc && !stripped_xmp {
        return Ok(None);
    }

    let out = JpegStream {
        chunks,
        entropy: stream.entropy,
    }
    .emit()?;
    fsops::atomic_write_replace(path, &out).map_err(|e| format!("write failed: {e}"))?;
    Ok(Some((stripped_tags, stripped_iptc, stripped_xmp)))
}

fn build_plan(request: &StripRequest) -> Result<Vec<PlannedStrip>, EngineError> {
    let collection = collect::collect(
        &request.input_paths,
        request.include_subfolders,
        Some(&ExtensionSet::new(JPEG_EXTENSIONS.iter().copied())),
    )?;
    if collection.is_empty() {
        return Err(empty_collection_error(&collection));
    }

    let cats = preset_categories(request.preset, &request.categories);
    let mut plan = Vec::with_capacity(collection.entries.len());

    for entry in &collection.entries {
        plan.push(plan_one(&entry.path, &cats));
    }
    Ok(plan)
}

fn plan_one(path: &Path, cats: &MetadataCategories) -> PlannedStrip {
    let skipped = |reason: String, has_iptc: bool, has_xmp: bool| PlannedStrip {
        source: path.to_path_buf(),
        found_categories: Vec::new(),
        tags_to_strip: 0,
        has_iptc,
        has_xmp,
        status: PlanStatus::Skipped,
        reason: Some(reason),
    };

    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => return skipped(format!("read failed: {e}"), false, false),
    };
    let stream = match JpegStream::parse(&data) {
        Ok(stream) => stream,
        Err(e) => return skipped(e, false, false),
    };

    let has_iptc = stream.chunks.iter().any(Chunk::is_iptc_app13);
    let has_xmp = stream.chunks.iter().any(Chunk::is_xmp_app1);
    let scan = stream
        .first_exif_app1()
        .and_then(|i| match &stream.chunks[i] {
            Chunk::Segment { payload, .. } => tiff::scan_categories(payload).ok(),
            Chunk::Standalone(_) => None,
        })
        .unwrap_or_default();

    let mut found = Vec::new();
    let mut present = |selected: bool, count: usize, name: &str| {
        if selected && count > 0 {
            found.push(name.to_string());
        }
    };
    present(cats.gps, scan.gps_tags, "gps");
    present(cats.camera_lens, scan.camera_lens_tags, "cameraLens");
    present(cats.software, scan.software_tags, "software");
    present(
        cats.author_copyright,
        scan.author_copyright_tags,
        "authorCopyright",
    );
    present(cats.comments, scan.comment_tags, "comments");
    present(cats.thumbnail, scan.thumbnail_tags, "thumbnail");
    present(
        cats.shooting_settings,
        scan.shooting_settings_tags,
        "shootingSettings",
    );
    present(
        cats.capture_datetime,
        scan.capture_datetime_tags,
        "captureDateTime",
    );
    present(cats.iptc, usize::from(has_iptc), "iptc");
    present(cats.xmp, usize::from(has_xmp), "xmp");

    if found.is_empty() {
        return skipped("no matching metadata".to_string(), has_iptc, has_xmp);
    }

    let tags_to_strip = scan.tags_selected_by(cats);
    PlannedStrip {
        source: path.to_path_buf(),
        found_categories: found,
        tags_to_strip,
        has_iptc,
        has_xmp,
        status: PlanStatus::Ready,
        reason: None,
    }
}
