//! Request and response envelopes shared by the operation façades and the CLI.
//!
//! These types are the JSON boundary of the engine: a desktop shell (or the
//! bundled CLI) serializes a request, the façade answers with a preview or
//! an execute response, and progress events stream alongside. Field names
//! are camelCase on the wire.
//!
//! Statuses are closed enums. A preview item is either `ready` or `skipped`
//! (with a human reason); an executed item is `succeeded`, `failed` or
//! `skipped`. New operations add a façade and a variant, never a string tag.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ===== Shared vocabulary =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlanStatus {
    Ready,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// How a destination-name collision is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictPolicy {
    /// Replace the existing destination via atomic swap.
    Overwrite,
    /// Append `_noN` to the stem, smallest N ≥ 1 that is free.
    Sequence,
    /// Mark the item skipped.
    Skip,
}

// ===== Rename =====

/// Where the per-file datetime for template rendering comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DatetimeSource {
    /// EXIF capture time, then the video probe, then the filesystem mtime.
    CaptureThenModified,
    ModifiedOnly,
    /// One shared execution timestamp; every item in the run gets the same second.
    CurrentTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    pub input_paths: Vec<String>,
    pub include_subfolders: bool,
    pub template: String,
    pub source: DatetimeSource,
    pub output_dir: Option<String>,
    pub conflict_policy: Option<ConflictPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenamePreviewItem {
    pub source_path: String,
    pub destination_path: Option<String>,
    pub status: PlanStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenamePreviewResponse {
    pub items: Vec<RenamePreviewItem>,
    pub total: usize,
    pub ready: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameExecuteDetail {
    pub source_path: String,
    pub destination_path: Option<String>,
    pub status: ExecStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameExecuteResponse {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub details: Vec<RenameExecuteDetail>,
}

/// One documented template tag, for shells that render a tag palette.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateTagInfo {
    pub token: String,
    pub label: String,
    pub description: String,
}

// ===== Delete =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeleteMode {
    /// Unlink in place.
    Direct,
    /// Hand to the OS recycle bin.
    Trash,
    /// Move into a retreat directory.
    Retreat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub input_paths: Vec<String>,
    pub include_subfolders: bool,
    pub extensions: Vec<String>,
    pub mode: DeleteMode,
    pub retreat_dir: Option<String>,
    pub conflict_policy: Option<ConflictPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePreviewItem {
    pub source_path: String,
    pub mode: DeleteMode,
    pub destination_path: Option<String>,
    pub status: PlanStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePreviewResponse {
    pub items: Vec<DeletePreviewItem>,
    pub total: usize,
    pub ready: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteExecuteDetail {
    pub source_path: String,
    pub mode: DeleteMode,
    pub destination_path: Option<String>,
    pub status: ExecStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteExecuteResponse {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub details: Vec<DeleteExecuteDetail>,
}

// ===== Compress =====

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressRequest {
    pub input_paths: Vec<String>,
    pub include_subfolders: bool,
    pub resize_percent: f32,
    pub quality: u8,
    pub target_size_kb: Option<u64>,
    pub tolerance_percent: Option<f32>,
    pub preserve_exif: bool,
    pub output_dir: Option<String>,
    pub conflict_policy: ConflictPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressPreviewItem {
    pub source_path: String,
    pub destination_path: String,
    pub source_size: u64,
    pub estimated_size: u64,
    pub status: PlanStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressPreviewResponse {
    pub output_dir: String,
    pub effective_resize_percent: f32,
    pub effective_quality: u8,
    pub target_size_kb: Option<u64>,
    pub tolerance_percent: f32,
    pub items: Vec<CompressPreviewItem>,
    pub total: usize,
    pub ready: usize,
    pub skipped: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressExecuteDetail {
    pub source_path: String,
    pub destination_path: String,
    pub status: ExecStatus,
    pub output_size: Option<u64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressExecuteResponse {
    pub output_dir: String,
    pub effective_resize_percent: f32,
    pub effective_quality: u8,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub details: Vec<CompressExecuteDetail>,
}

/// File count and byte total for the current selection, before any planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressCollectInfoResponse {
    pub file_count: usize,
    pub total_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressEstimateResponse {
    pub file_count: usize,
    pub total_source_size: u64,
    pub estimated_total_size: u64,
}

// ===== Flatten =====

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenRequest {
    pub input_dir: String,
    pub output_dir: Option<String>,
    pub conflict_policy: ConflictPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenPreviewItem {
    pub source_path: String,
    pub destination_path: String,
    pub status: PlanStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenPreviewResponse {
    pub output_dir: String,
    pub items: Vec<FlattenPreviewItem>,
    pub total: usize,
    pub ready: usize,
    pub skipped: usize,
    pub collisions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenExecuteDetail {
    pub source_path: String,
    pub destination_path: String,
    pub status: ExecStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenExecuteResponse {
    pub output_dir: String,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub details: Vec<FlattenExecuteDetail>,
}

// ===== EXIF offset =====

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExifOffsetRequest {
    pub input_paths: Vec<String>,
    pub include_subfolders: bool,
    pub offset_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExifOffsetPreviewItem {
    pub source_path: String,
    pub original_datetime: Option<String>,
    pub corrected_datetime: Option<String>,
    pub status: PlanStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExifOffsetPreviewResponse {
    pub items: Vec<ExifOffsetPreviewItem>,
    pub total: usize,
    pub ready: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExifOffsetExecuteDetail {
    pub source_path: String,
    pub status: ExecStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExifOffsetExecuteResponse {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub details: Vec<ExifOffsetExecuteDetail>,
}

// ===== Metadata strip =====

/// Category mask: which metadata groups to remove.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataCategories {
    pub gps: bool,
    pub camera_lens: bool,
    pub software: bool,
    pub author_copyright: bool,
    pub comments: bool,
    pub thumbnail: bool,
    pub iptc: bool,
    pub xmp: bool,
    pub shooting_settings: bool,
    #[serde(rename = "captureDateTime")]
    pub capture_datetime: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StripPreset {
    /// Safe for posting publicly: gps, camera/lens, comments, thumbnail.
    SnsPublish,
    /// Client delivery: camera/lens, software, comments.
    Delivery,
    /// Everything removable, keeping only structural tags.
    FullClean,
    /// Use the request's category mask as-is.
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripRequest {
    pub input_paths: Vec<String>,
    pub include_subfolders: bool,
    pub preset: StripPreset,
    pub categories: MetadataCategories,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripPreviewItem {
    pub source_path: String,
    pub found_categories: Vec<String>,
    pub tags_to_strip: usize,
    pub has_iptc: bool,
    pub has_xmp: bool,
    pub status: PlanStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripPreviewResponse {
    pub items: Vec<StripPreviewItem>,
    pub total: usize,
    pub ready: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripExecuteDetail {
    pub source_path: String,
    pub stripped_tags: usize,
    pub stripped_iptc: bool,
    pub stripped_xmp: bool,
    pub status: ExecStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripExecuteResponse {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub details: Vec<StripExecuteDetail>,
}

// ===== Settings document =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePattern {
    pub name: String,
    pub extensions: Vec<String>,
    pub mode: DeleteMode,
    pub retreat_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameTemplateEntry {
    pub name: String,
    pub template: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThemeMode {
    System,
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub delete_patterns: Vec<DeletePattern>,
    pub rename_templates: Vec<RenameTemplateEntry>,
    pub output_directories: HashMap<String, String>,
    pub theme: ThemeMode,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            delete_patterns: Vec::new(),
            rename_templates: vec![RenameTemplateEntry {
                name: "date-seq".to_string(),
                template: "{capture_date:YYYYMMDD}_{capture_time:HHmmss}_{seq:3}".to_string(),
            }],
            output_directories: HashMap::new(),
            theme: ThemeMode::System,
        }
    }
}

/// Names that exist on both sides of a settings merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportConflictPreview {
    pub delete_pattern_names: Vec<String>,
    pub rename_template_names: Vec<String>,
    pub output_directory_keys: Vec<String>,
    pub theme_conflict: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_policy_wire_names() {
        assert_eq!(
            serde_json::to_string(&ConflictPolicy::Overwrite).unwrap(),
            r#""overwrite""#
        );
        assert_eq!(
            serde_json::to_string(&ConflictPolicy::Sequence).unwrap(),
            r#""sequence""#
        );
    }

    #[test]
    fn categories_capture_datetime_wire_name() {
        let cats = MetadataCategories {
            capture_datetime: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&cats).unwrap();
        assert!(json.contains(r#""captureDateTime":true"#));
    }

    #[test]
    fn settings_default_has_one_template() {
        let settings = AppSettings::default();
        assert_eq!(settings.rename_templates.len(), 1);
        assert_eq!(settings.theme, ThemeMode::System);
    }

    #[test]
    fn settings_round_trips_through_json() {
        let mut settings = AppSettings::default();
        settings.delete_patterns.push(DeletePattern {
            name: "temps".to_string(),
            extensions: vec!["tmp".to_string(), "bak".to_string()],
            mode: DeleteMode::Trash,
            retreat_dir: None,
        });
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains(r#""deletePatterns""#));
        assert!(json.contains(r#""mode":"trash""#));
        let back: AppSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn settings_missing_fields_default() {
        let back: AppSettings = serde_json::from_str(r#"{"theme":"dark"}"#).unwrap();
        assert_eq!(back.theme, ThemeMode::Dark);
        assert_eq!(back.rename_templates.len(), 1);
        assert!(back.delete_patterns.is_empty());
    }

    #[test]
    fn rename_request_accepts_camel_case() {
        let json = r#"{
            "inputPaths": ["/photos"],
            "includeSubfolders": true,
            "template": "{orig}",
            "source": "captureThenModified",
            "outputDir": null,
            "conflictPolicy": "skip"
        }"#;
        let request: RenameRequest = serde_json::from_str(json).unwrap();
        assert!(request.include_subfolders);
        assert_eq!(request.conflict_policy, Some(ConflictPolicy::Skip));
        assert_eq!(request.source, DatetimeSource::CaptureThenModified);
    }
}
