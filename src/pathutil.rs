//! Path canonicalization and comparison helpers.
//!
//! Every path that enters the engine goes through [`safe_canonicalize`]
//! once, so the rest of the code can assume absolute, symlink-resolved,
//! `.`/`..`-free paths. Destination comparisons use [`destination_key`],
//! which folds case so two spellings of the same file collide on Windows
//! and behave deterministically everywhere else.

use std::path::{Component, Path, PathBuf};

/// `canonicalize()` that strips the Windows `\\?\` verbatim prefix, which
/// confuses both users and downstream string comparisons.
pub fn safe_canonicalize(path: &Path) -> std::io::Result<PathBuf> {
    let canonical = path.canonicalize()?;
    Ok(strip_verbatim(canonical))
}

#[cfg(windows)]
fn strip_verbatim(path: PathBuf) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix(r"\\?\UNC\") {
        Some(stripped) => PathBuf::from(format!(r"\\{}", stripped)),
        None => match s.strip_prefix(r"\\?\") {
            Some(stripped) => PathBuf::from(stripped),
            None => path,
        },
    }
}

#[cfg(not(windows))]
fn strip_verbatim(path: PathBuf) -> PathBuf {
    path
}

/// Lowercased string form of a path, used as the key for collision and
/// reservation checks.
pub fn destination_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

/// Compute the relative path from `base` to `target`.
///
/// Returns the component list that, joined, leads from `base` to `target`
/// (`..` segments included when `target` is not under `base`). `None` when
/// the two paths share no common root (different drives or UNC shares).
pub fn relativize(base: &Path, target: &Path) -> Option<PathBuf> {
    let base_components: Vec<Component> = base.components().collect();
    let target_components: Vec<Component> = target.components().collect();

    // Prefixes (drive letters, UNC shares) must match for any relative
    // walk to make sense.
    match (base_components.first(), target_components.first()) {
        (Some(Component::Prefix(a)), Some(Component::Prefix(b))) if a != b => return None,
        _ => {}
    }

    let common = base_components
        .iter()
        .zip(target_components.iter())
        .take_while(|(a, b)| a == b)
        .count();
    if common == 0 && matches!(base_components.first(), Some(Component::Prefix(_))) {
        return None;
    }

    let mut relative = PathBuf::new();
    for _ in common..base_components.len() {
        relative.push("..");
    }
    for component in &target_components[common..] {
        relative.push(component.as_os_str());
    }
    Some(relative)
}

/// Relative path from `root` when the file lives under it, otherwise a
/// prefix-free rendering of the absolute path. Used when mirroring a tree
/// into an output directory.
pub fn relative_or_flat_absolute(path: &Path, root: Option<&Path>) -> PathBuf {
    if let Some(root) = root {
        if let Ok(relative) = path.strip_prefix(root) {
            return relative.to_path_buf();
        }
    }
    let mut flattened = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => flattened.push(".."),
            Component::Normal(segment) => flattened.push(segment),
        }
    }
    flattened
}

/// Deepest directory that contains every given file, if one exists.
pub fn common_parent(files: &[PathBuf]) -> Option<PathBuf> {
    if files.is_empty() {
        return None;
    }
    let mut current = files[0].parent()?.to_path_buf();
    for path in files.iter().skip(1) {
        let parent = path.parent()?;
        while !parent.starts_with(&current) {
            if !current.pop() {
                return None;
            }
        }
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn canonicalize_resolves_dot_segments() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("a").join("b");
        std::fs::create_dir_all(&dir).unwrap();
        let twisted = tmp.path().join("a").join(".").join("b").join("..").join("b");
        let canonical = safe_canonicalize(&twisted).unwrap();
        assert_eq!(canonical, safe_canonicalize(&dir).unwrap());
    }

    #[test]
    fn destination_key_folds_case() {
        assert_eq!(
            destination_key(Path::new("/Photos/IMG.JPG")),
            destination_key(Path::new("/photos/img.jpg"))
        );
    }

    #[test]
    fn relativize_child() {
        let rel = relativize(Path::new("/a/b"), Path::new("/a/b/c/d.jpg")).unwrap();
        assert_eq!(rel, PathBuf::from("c/d.jpg"));
    }

    #[test]
    fn relativize_sibling_walks_up() {
        let rel = relativize(Path::new("/a/b"), Path::new("/a/c/x.jpg")).unwrap();
        assert_eq!(rel, PathBuf::from("../c/x.jpg"));
    }

    #[test]
    fn common_parent_of_siblings() {
        let files = vec![
            PathBuf::from("/root/a/1.jpg"),
            PathBuf::from("/root/b/2.jpg"),
        ];
        assert_eq!(common_parent(&files), Some(PathBuf::from("/root")));
    }

    #[test]
    fn common_parent_empty_is_none() {
        assert_eq!(common_parent(&[]), None);
    }

    #[test]
    fn relative_or_flat_absolute_inside_root() {
        let rel = relative_or_flat_absolute(
            Path::new("/root/sub/f.jpg"),
            Some(Path::new("/root")),
        );
        assert_eq!(rel, PathBuf::from("sub/f.jpg"));
    }

    #[test]
    fn relative_or_flat_absolute_outside_root() {
        let rel = relative_or_flat_absolute(
            Path::new("/elsewhere/f.jpg"),
            Some(Path::new("/root")),
        );
        assert_eq!(rel, PathBuf::from("elsewhere/f.jpg"));
    }
}
