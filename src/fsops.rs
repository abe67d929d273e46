//! Atomic filesystem primitives.
//!
//! Every destination write goes through the same discipline: bytes land in
//! a temp file `<name>.tmp.<pid>.<counter>` inside the destination
//! directory, the temp file is fsynced, then it replaces the destination in
//! one rename. The replace is atomic against concurrent readers on the same
//! volume; because the temp file always lives next to its destination, the
//! final rename never crosses volumes. If anything fails along the way the
//! temp file is removed and the destination is untouched.
//!
//! Moves try a plain rename first (same-volume fast path) and fall back to
//! copy-then-replace plus source removal when the rename fails, which is
//! what a cross-volume move looks like from here.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// How a move was carried out. Surfaced as a reason note so users can see
/// when a cross-volume fallback happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Renamed,
    CopiedAndRemoved,
    Unchanged,
}

fn temp_path_for(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "out".to_string());
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let temp_name = format!("{}.tmp.{}.{}", name, std::process::id(), counter);
    destination.with_file_name(temp_name)
}

/// Write `bytes` to `destination` atomically.
pub fn atomic_write_replace(destination: &Path, bytes: &[u8]) -> io::Result<()> {
    let temp = temp_path_for(destination);
    let result = write_synced(&temp, bytes).and_then(|()| replace(&temp, destination));
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

/// Copy `source`'s bytes to `destination` atomically. The copy may cross
/// volumes; the final replace never does.
pub fn atomic_copy_replace(source: &Path, destination: &Path) -> io::Result<()> {
    let temp = temp_path_for(destination);
    let result = copy_synced(source, &temp).and_then(|()| replace(&temp, destination));
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

/// Move `source` to `destination`, replacing an existing destination
/// atomically. Same path in and out is a no-op.
pub fn atomic_move_replace(source: &Path, destination: &Path) -> io::Result<MoveOutcome> {
    if source == destination {
        return Ok(MoveOutcome::Unchanged);
    }

    if !destination.exists() {
        match fs::rename(source, destination) {
            Ok(()) => return Ok(MoveOutcome::Renamed),
            // Likely a cross-volume move; fall through to copy.
            Err(_) => {}
        }
    }

    atomic_copy_replace(source, destination)?;
    fs::remove_file(source).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("destination written but source not removed: {e}"),
        )
    })?;
    Ok(MoveOutcome::CopiedAndRemoved)
}

/// Hand a file to the OS recycle bin.
pub fn move_to_trash(path: &Path) -> Result<(), String> {
    trash::delete(path).map_err(|e| format!("trash error: {e}"))
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use std::io::Write;
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

fn copy_synced(source: &Path, temp: &Path) -> io::Result<()> {
    fs::copy(source, temp)?;
    let file = fs::File::open(temp)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(not(windows))]
fn replace(temp: &Path, destination: &Path) -> io::Result<()> {
    fs::rename(temp, destination)
}

#[cfg(windows)]
fn replace(temp: &Path, destination: &Path) -> io::Result<()> {
    if destination.exists() {
        return replace_file_windows(destination, temp);
    }
    fs::rename(temp, destination)
}

#[cfg(windows)]
fn replace_file_windows(destination: &Path, replacement: &Path) -> io::Result<()> {
    use std::ffi::OsStr;
    use std::iter;
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::Storage::FileSystem::ReplaceFileW;

    fn wide(value: &OsStr) -> Vec<u16> {
        value.encode_wide().chain(iter::once(0)).collect()
    }

    let destination_w = wide(destination.as_os_str());
    let replacement_w = wide(replacement.as_os_str());
    let result = unsafe {
        ReplaceFileW(
            destination_w.as_ptr(),
            replacement_w.as_ptr(),
            std::ptr::null(),
            0,
            std::ptr::null(),
            std::ptr::null(),
        )
    };
    if result == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// The `_noN` sibling of `base` for a given N: `photo.jpg` → `photo_no3.jpg`.
pub fn sequenced_candidate(base: &Path, n: usize) -> PathBuf {
    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let ext = base.extension().and_then(|e| e.to_str()).unwrap_or("");
    let file_name = if ext.is_empty() {
        format!("{stem}_no{n}")
    } else {
        format!("{stem}_no{n}.{ext}")
    };
    base.with_file_name(file_name)
}

/// Disambiguate a directory path with `_noN`, smallest free N ≥ 1.
pub fn unique_directory(base: PathBuf) -> PathBuf {
    if !base.exists() {
        return base;
    }
    let name = base
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("output")
        .to_string();
    let mut n = 1usize;
    loop {
        let candidate = base.with_file_name(format!("{name}_no{n}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
