//! Shared planner vocabulary: conflict resolution, name reservations and
//! output-directory defaulting.
//!
//! Planners are pure with respect to the filesystem — they read (to detect
//! existing destinations) but never mutate. A plan item is `ready` or
//! `skipped`; anything detectable without mutation becomes a skip with a
//! human reason rather than a failure.
//!
//! The reservation set is shared between the planner and the executor so
//! that two items in the same run can never commit to one destination:
//! sequence suffixes are allocated against both the filesystem and the
//! reservations already made by earlier items.

use crate::error::EngineError;
use crate::fsops::{sequenced_candidate, unique_directory};
use crate::pathutil::destination_key;
use crate::types::{ConflictPolicy, PlanStatus};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Characters not allowed in a rendered file name, matching the strictest
/// host filesystem the engine targets.
const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Mutex-protected set of normalized destination keys claimed by the
/// current plan.
#[derive(Debug, Default)]
pub struct NameReservations {
    inner: Mutex<HashSet<String>>,
}

impl NameReservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a key. Returns false when it was already claimed.
    pub fn reserve(&self, key: String) -> bool {
        self.inner.lock().expect("reservation set poisoned").insert(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .lock()
            .expect("reservation set poisoned")
            .contains(key)
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub status: PlanStatus,
    pub reason: Option<String>,
    pub destination: PathBuf,
}

/// Decide the final destination for a desired path under a conflict policy.
///
/// A collision exists when the destination is already reserved by an
/// earlier item in this plan, or when it exists on disk and is not the
/// item's own source (in-place operations collide with themselves
/// otherwise).
pub fn resolve_destination(
    base: &Path,
    source: Option<&Path>,
    reservations: &NameReservations,
    policy: ConflictPolicy,
) -> Resolution {
    let key = destination_key(base);
    let exists = base.exists() && source != Some(base);
    let collision = reservations.contains(&key) || exists;

    match policy {
        ConflictPolicy::Overwrite => {
            reservations.reserve(key);
            Resolution {
                status: PlanStatus::Ready,
                reason: collision.then(|| "existing destination will be overwritten".to_string()),
                destination: base.to_path_buf(),
            }
        }
        ConflictPolicy::Skip => {
            if collision {
                Resolution {
                    status: PlanStatus::Skipped,
                    reason: Some("collision".to_string()),
                    destination: base.to_path_buf(),
                }
            } else {
                reservations.reserve(key);
                Resolution {
                    status: PlanStatus::Ready,
                    reason: None,
                    destination: base.to_path_buf(),
                }
            }
        }
        ConflictPolicy::Sequence => {
            let mut candidate = base.to_path_buf();
            let mut n = 0usize;
            loop {
                let key = destination_key(&candidate);
                let exists = candidate.exists() && source != Some(candidate.as_path());
                if !reservations.contains(&key) && !exists {
                    reservations.reserve(key);
                    return Resolution {
                        status: PlanStatus::Ready,
                        reason: (n > 0)
                            .then(|| "collision resolved with sequence suffix".to_string()),
                        destination: candidate,
                    };
                }
                n += 1;
                candidate = sequenced_candidate(base, n);
            }
        }
    }
}

/// Plan-time validation of a rendered file name. Empty stems and reserved
/// characters never reach the filesystem.
pub fn validate_file_name(name: &str) -> Result<(), String> {
    let stem = name.trim().trim_matches('.');
    if stem.is_empty() {
        return Err("empty file name".to_string());
    }
    if name
        .chars()
        .any(|c| FORBIDDEN_CHARS.contains(&c) || c.is_control())
    {
        return Err("name contains forbidden characters".to_string());
    }
    Ok(())
}

/// With `Overwrite`, several items may legally target one destination, but
/// only the last writer (in plan order) may stay ready — otherwise parallel
/// execution would race and the survivor would be arbitrary. Demote every
/// earlier duplicate.
pub fn demote_overwrite_duplicates<T>(
    items: &mut [T],
    key_of: impl Fn(&T) -> Option<String>,
    mut demote: impl FnMut(&mut T),
) {
    let mut last_for_key: std::collections::HashMap<String, usize> =
        std::collections::HashMap::new();
    for (i, item) in items.iter().enumerate() {
        if let Some(key) = key_of(item) {
            last_for_key.insert(key, i);
        }
    }
    for (i, item) in items.iter_mut().enumerate() {
        if let Some(key) = key_of(item) {
            if last_for_key.get(&key).copied() != Some(i) {
                demote(item);
            }
        }
    }
}

/// Default output directory `<parent>/<name><tag><stamp>`, disambiguated
/// with `_noN` when taken. `stamp` is the run timestamp `YYYYMMDDHHMMSS`.
pub fn default_timestamped_dir(
    input_root: &Path,
    tag: &str,
    stamp: &str,
) -> Result<PathBuf, EngineError> {
    let parent = input_root.parent().ok_or_else(|| {
        EngineError::InvalidRequest("input root has no parent directory".to_string())
    })?;
    let name = input_root
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| EngineError::InvalidRequest("input root has no name".to_string()))?;
    Ok(unique_directory(parent.join(format!("{name}{tag}{stamp}"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn sequence_allocates_in_plan_order() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("name.jpg");
        let reservations = NameReservations::new();

        let mut destinations = Vec::new();
        for _ in 0..4 {
            let resolution =
                resolve_destination(&base, None, &reservations, ConflictPolicy::Sequence);
            assert_eq!(resolution.status, PlanStatus::Ready);
            destinations.push(
                resolution
                    .destination
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .to_string(),
            );
        }
        assert_eq!(
            destinations,
            vec!["name.jpg", "name_no1.jpg", "name_no2.jpg", "name_no3.jpg"]
        );
    }

    #[test]
    fn sequence_skips_names_taken_on_disk() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("name.jpg");
        fs::write(&base, b"x").unwrap();
        fs::write(tmp.path().join("name_no1.jpg"), b"x").unwrap();

        let reservations = NameReservations::new();
        let resolution = resolve_destination(&base, None, &reservations, ConflictPolicy::Sequence);
        assert_eq!(
            resolution.destination.file_name().unwrap(),
            "name_no2.jpg"
        );
    }

    #[test]
    fn skip_policy_reports_collision() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("taken.jpg");
        fs::write(&base, b"x").unwrap();

        let reservations = NameReservations::new();
        let resolution = resolve_destination(&base, None, &reservations, ConflictPolicy::Skip);
        assert_eq!(resolution.status, PlanStatus::Skipped);
        assert_eq!(resolution.reason.as_deref(), Some("collision"));
    }

    #[test]
    fn skip_policy_ignores_own_source() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("self.jpg");
        fs::write(&base, b"x").unwrap();

        let reservations = NameReservations::new();
        let resolution =
            resolve_destination(&base, Some(&base), &reservations, ConflictPolicy::Skip);
        assert_eq!(resolution.status, PlanStatus::Ready);
    }

    #[test]
    fn overwrite_is_always_ready() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("existing.jpg");
        fs::write(&base, b"x").unwrap();

        let reservations = NameReservations::new();
        let resolution =
            resolve_destination(&base, None, &reservations, ConflictPolicy::Overwrite);
        assert_eq!(resolution.status, PlanStatus::Ready);
        assert!(resolution.reason.is_some());
    }

    #[test]
    fn collision_detection_folds_case() {
        let tmp = TempDir::new().unwrap();
        let reservations = NameReservations::new();
        let first = resolve_destination(
            &tmp.path().join("Photo.JPG"),
            None,
            &reservations,
            ConflictPolicy::Skip,
        );
        assert_eq!(first.status, PlanStatus::Ready);
        let second = resolve_destination(
            &tmp.path().join("photo.jpg"),
            None,
            &reservations,
            ConflictPolicy::Skip,
        );
        assert_eq!(second.status, PlanStatus::Skipped);
    }

    #[test]
    fn validate_file_name_rules() {
        assert!(validate_file_name("ok.jpg").is_ok());
        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("  .").is_err());
        assert!(validate_file_name("a:b.jpg").is_err());
        assert!(validate_file_name("a\u{0007}b").is_err());
    }

    #[test]
    fn demote_keeps_only_last_writer() {
        #[derive(Debug, PartialEq)]
        struct Item {
            key: Option<String>,
            demoted: bool,
        }
        let mut items = vec![
            Item { key: Some("a".into()), demoted: false },
            Item { key: Some("b".into()), demoted: false },
            Item { key: Some("a".into()), demoted: false },
            Item { key: None, demoted: false },
        ];
        demote_overwrite_duplicates(
            &mut items,
            |item| item.key.clone(),
            |item| item.demoted = true,
        );
        assert!(items[0].demoted);
        assert!(!items[1].demoted);
        assert!(!items[2].demoted);
        assert!(!items[3].demoted);
    }

    #[test]
    fn default_dir_uses_parent_and_stamp() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("shoot");
        fs::create_dir(&input).unwrap();
        let dir = default_timestamped_dir(&input, "_compressed_", "20240101120000").unwrap();
        assert_eq!(dir.parent().unwrap(), tmp.path());
        assert_eq!(
            dir.file_name().unwrap().to_string_lossy(),
            "shoot_compressed_20240101120000"
        );
    }
}
