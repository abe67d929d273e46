//! File collection: turn user-supplied paths into a deduplicated,
//! stably-ordered list of files.
//!
//! Inputs may mix files and directories. Directories are walked depth-first
//! with entries in each directory sorted case-insensitively by filename, so
//! a given tree always collects in the same order. Symlinks are followed;
//! cycles are broken by remembering visited canonical paths. Files that
//! cannot be stat-ed are omitted and surfaced as diagnostics rather than
//! failing the whole collection.

use crate::error::EngineError;
use crate::pathutil::{common_parent, destination_key, safe_canonicalize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Still-image extensions the rename operation accepts, raw formats included.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "tif", "tiff", "bmp", "heic", "heif", "dng", "cr2",
    "cr3", "nef", "arw", "raf",
];

/// Video container extensions the rename operation accepts.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "m4v", "avi", "mkv", "wmv", "mts", "m2ts", "mpg", "mpeg", "webm",
];

/// The JPEG-only operations (compress, exif offset, metadata strip).
pub const JPEG_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// Everything rename accepts: images plus videos.
pub fn rename_extensions() -> ExtensionSet {
    ExtensionSet::new(IMAGE_EXTENSIONS.iter().chain(VIDEO_EXTENSIONS.iter()))
}

/// A set of lowercase extensions without leading dot. Matching is
/// case-insensitive against the final path component's extension.
#[derive(Debug, Clone)]
pub struct ExtensionSet(Vec<String>);

impl ExtensionSet {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut list = Vec::new();
        for value in values {
            let ext = value.as_ref().to_ascii_lowercase();
            if seen.insert(ext.clone()) {
                list.push(ext);
            }
        }
        Self(list)
    }

    /// Normalize user-supplied extension strings: trim, drop a leading dot,
    /// lowercase, dedupe preserving order. Path separators or embedded dots
    /// are caller errors; an empty result is too.
    pub fn from_request(values: &[String]) -> Result<Self, EngineError> {
        let mut seen = HashSet::new();
        let mut list = Vec::new();
        for raw in values {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            let normalized = trimmed.trim_start_matches('.').to_ascii_lowercase();
            if normalized.is_empty() {
                continue;
            }
            if normalized.contains('.') || normalized.contains('/') || normalized.contains('\\') {
                return Err(EngineError::InvalidRequest(format!(
                    "invalid extension `{raw}`"
                )));
            }
            if seen.insert(normalized.clone()) {
                list.push(normalized);
            }
        }
        if list.is_empty() {
            return Err(EngineError::InvalidRequest(
                "at least one extension is required".to_string(),
            ));
        }
        Ok(Self(list))
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.0.iter().any(|item| *item == ext)
            })
            .unwrap_or(false)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// One collected file. Immutable snapshot of what `stat` said at
/// collection time.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

#[derive(Debug, Clone)]
pub struct Collection {
    pub entries: Vec<FileEntry>,
    /// Deepest directory containing every collected file, if one exists.
    pub input_root: Option<PathBuf>,
    /// Directory entries rejected by the extension filter.
    pub skipped_by_extension: usize,
    /// Paths that could not be read or stat-ed. Diagnostic, not fatal.
    pub unreadable: Vec<String>,
}

impl Collection {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|entry| entry.path.clone()).collect()
    }
}

/// Collect files from `input_paths`. Directories are walked (recursively
/// when `include_subfolders`); `filter` of `None` accepts every file.
pub fn collect(
    input_paths: &[String],
    include_subfolders: bool,
    filter: Option<&ExtensionSet>,
) -> Result<Collection, EngineError> {
    if input_paths.is_empty() {
        return Err(EngineError::InvalidRequest(
            "no input paths given".to_string(),
        ));
    }

    let mut resolved: Vec<PathBuf> = Vec::with_capacity(input_paths.len());
    for raw in input_paths {
        let path = PathBuf::from(raw);
        if !path.exists() {
            return Err(EngineError::InvalidRequest(format!(
                "input path does not exist: {raw}"
            )));
        }
        let canonical = safe_canonicalize(&path)
            .map_err(|e| EngineError::InvalidRequest(format!("cannot resolve `{raw}`: {e}")))?;
        resolved.push(canonical);
    }

    let mut collector = Collector {
        filter,
        seen: HashSet::new(),
        entries: Vec::new(),
        skipped_by_extension: 0,
        unreadable: Vec::new(),
    };

    for path in &resolved {
        if path.is_file() {
            collector.push_file(path);
        } else if path.is_dir() {
            collector.walk_dir(path, include_subfolders);
        }
    }

    let files: Vec<PathBuf> = collector.entries.iter().map(|e| e.path.clone()).collect();
    let input_root = common_parent(&files);
    tracing::debug!(
        files = collector.entries.len(),
        skipped_by_extension = collector.skipped_by_extension,
        unreadable = collector.unreadable.len(),
        "collection complete"
    );

    Ok(Collection {
        entries: collector.entries,
        input_root,
        skipped_by_extension: collector.skipped_by_extension,
        unreadable: collector.unreadable,
    })
}

struct Collector<'a> {
    filter: Option<&'a ExtensionSet>,
    seen: HashSet<String>,
    entries: Vec<FileEntry>,
    skipped_by_extension: usize,
    unreadable: Vec<String>,
}

impl Collector<'_> {
    fn accepts(&self, path: &Path) -> bool {
        match self.filter {
            Some(set) => set.matches(path),
            None => true,
        }
    }

    fn push_file(&mut self, path: &Path) {
        if !self.accepts(path) {
            self.skipped_by_extension += 1;
            return;
        }
        let canonical = match safe_canonicalize(path) {
            Ok(p) => p,
            Err(_) => {
                self.unreadable.push(path.to_string_lossy().to_string());
                return;
            }
        };
        if !self.seen.insert(destination_key(&canonical)) {
            return;
        }
        match std::fs::metadata(&canonical) {
            Ok(meta) => {
                let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                self.entries.push(FileEntry {
                    path: canonical,
                    size: meta.len(),
                    modified,
                });
            }
            Err(_) => {
                self.unreadable.push(canonical.to_string_lossy().to_string());
            }
        }
    }

    fn walk_dir(&mut self, dir: &Path, recursive: bool) {
        let mut walker = WalkDir::new(dir)
            .follow_links(true)
            .min_depth(1)
            .sort_by(|a, b| {
                a.file_name()
                    .to_string_lossy()
                    .to_lowercase()
                    .cmp(&b.file_name().to_string_lossy().to_lowercase())
            });
        if !recursive {
            walker = walker.max_depth(1);
        }
        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    self.push_file(entry.path());
                }
                Ok(_) => {}
                Err(error) => {
                    let path = error
                        .path()
                        .map(|p| p.to_string_lossy().to_string())
                        .unwrap_or_else(|| dir.to_string_lossy().to_string());
                    self.unreadable.push(path);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn extension_filter_is_case_insensitive() {
        let set = ExtensionSet::new(["jpg"]);
        assert!(set.matches(Path::new("/a/Photo.JPG")));
        assert!(set.matches(Path::new("/a/photo.jpg")));
        assert!(!set.matches(Path::new("/a/photo.png")));
        assert!(!set.matches(Path::new("/a/no_extension")));
    }

    #[test]
    fn from_request_normalizes() {
        let set = ExtensionSet::from_request(&[
            " .JPG ".to_string(),
            "jpg".to_string(),
            "Png".to_string(),
        ])
        .unwrap();
        assert_eq!(set.as_slice(), &["jpg".to_string(), "png".to_string()]);
    }

    #[test]
    fn from_request_rejects_separators_and_empty() {
        assert!(ExtensionSet::from_request(&["a/b".to_string()]).is_err());
        assert!(ExtensionSet::from_request(&["a.b".to_string()]).is_err());
        assert!(ExtensionSet::from_request(&[]).is_err());
        assert!(ExtensionSet::from_request(&["  ".to_string()]).is_err());
    }

    #[test]
    fn collects_sorted_within_directory() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("b.jpg"));
        touch(&tmp.path().join("A.jpg"));
        touch(&tmp.path().join("c.jpg"));

        let collected = collect(
            &[tmp.path().to_string_lossy().to_string()],
            false,
            Some(&ExtensionSet::new(["jpg"])),
        )
        .unwrap();

        let names: Vec<String> = collected
            .entries
            .iter()
            .map(|e| e.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["A.jpg", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn non_recursive_skips_grandchildren() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("top.jpg"));
        touch(&tmp.path().join("sub/nested.jpg"));

        let collected = collect(
            &[tmp.path().to_string_lossy().to_string()],
            false,
            Some(&ExtensionSet::new(["jpg"])),
        )
        .unwrap();
        assert_eq!(collected.entries.len(), 1);
        assert!(collected.entries[0].path.ends_with("top.jpg"));
    }

    #[test]
    fn recursive_walks_depth_first() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("a/1.jpg"));
        touch(&tmp.path().join("a/2.jpg"));
        touch(&tmp.path().join("b/1.jpg"));

        let collected = collect(
            &[tmp.path().to_string_lossy().to_string()],
            true,
            Some(&ExtensionSet::new(["jpg"])),
        )
        .unwrap();

        let root = collected.input_root.clone().unwrap();
        let rel: Vec<PathBuf> = collected
            .entries
            .iter()
            .map(|e| e.path.strip_prefix(&root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            rel,
            vec![
                PathBuf::from("a/1.jpg"),
                PathBuf::from("a/2.jpg"),
                PathBuf::from("b/1.jpg"),
            ]
        );
    }

    #[test]
    fn duplicate_inputs_are_deduped() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("one.jpg");
        touch(&file);

        let spec = file.to_string_lossy().to_string();
        let collected = collect(&[spec.clone(), spec], false, None).unwrap();
        assert_eq!(collected.entries.len(), 1);
    }

    #[test]
    fn filtered_files_are_counted() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("keep.jpg"));
        touch(&tmp.path().join("drop.txt"));

        let collected = collect(
            &[tmp.path().to_string_lossy().to_string()],
            false,
            Some(&ExtensionSet::new(["jpg"])),
        )
        .unwrap();
        assert_eq!(collected.entries.len(), 1);
        assert_eq!(collected.skipped_by_extension, 1);
    }

    #[test]
    fn missing_input_is_invalid_request() {
        let result = collect(&["/definitely/not/here".to_string()], false, None);
        assert!(matches!(result, Err(EngineError::InvalidRequest(_))));
    }

    #[test]
    fn entries_carry_size_and_mtime() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("sized.jpg");
        fs::write(&file, vec![0u8; 1234]).unwrap();

        let collected = collect(&[file.to_string_lossy().to_string()], false, None).unwrap();
        assert_eq!(collected.entries[0].size, 1234);
        assert!(collected.entries[0].modified > SystemTime::UNIX_EPOCH);
    }
}
