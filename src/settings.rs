//! Settings persistence: a JSON document in the OS config directory.
//!
//! Loads tolerate missing files and missing fields (defaults apply, and a
//! normalized copy is written back). Saves are serialized by an internal
//! mutex so concurrent writers cannot interleave, and the debounced path
//! coalesces bursts of saves into one write 400 ms after the last call.
//!
//! Import supports `overwrite` and `merge`; merging resolves name clashes
//! by the caller's conflict policy (`existing`, `import`, `cancel`) and
//! can be previewed first via [`SettingsStore::preview_import_conflicts`].

use crate::error::EngineError;
use crate::types::{
    AppSettings, DeleteMode, DeletePattern, ImportConflictPreview, RenameTemplateEntry, ThemeMode,
};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SETTINGS_FILE_NAME: &str = "settings.json";
const SAVE_DEBOUNCE: Duration = Duration::from_millis(400);

/// Merge conflict policy for settings import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Keep the existing entry.
    Existing,
    /// Take the imported entry.
    Import,
    /// Error out on the first conflict.
    Cancel,
}

#[derive(Default)]
struct Debounce {
    pending: Option<AppSettings>,
    timer_running: bool,
}

pub struct SettingsStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
    debounce: Arc<Mutex<Debounce>>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
            debounce: Arc::new(Mutex::new(Debounce::default())),
        }
    }

    /// Store at `<config_dir>/shutterbatch/settings.json`.
    pub fn open_default() -> Result<Self, EngineError> {
        let dir = dirs::config_dir()
            .ok_or_else(|| EngineError::Settings("no config directory on this system".to_string()))?
            .join("shutterbatch");
        Ok(Self::new(dir.join(SETTINGS_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document. A missing file or missing fields fall back to
    /// defaults, and the normalized form is written back so the file on
    /// disk always carries every field.
    pub fn load(&self) -> Result<AppSettings, EngineError> {
        let settings = if self.path.exists() {
            let body = fs::read_to_string(&self.path)
                .map_err(|e| EngineError::Settings(e.to_string()))?;
            serde_json::from_str(&body)?
        } else {
            AppSettings::default()
        };
        self.save(&settings)?;
        Ok(settings)
    }

    /// Validate and write immediately.
    pub fn save(&self, settings: &AppSettings) -> Result<(), EngineError> {
        write_document(&self.path, &self.write_lock, settings)
    }

    /// Write at most once per burst: the value passed to the last call
    /// within a 400 ms window wins.
    pub fn save_debounced(&self, settings: AppSettings) {
        let mut state = self.debounce.lock().expect("debounce lock poisoned");
        state.pending = Some(settings);
        if state.timer_running {
            return;
        }
        state.timer_running = true;
        drop(state);

        let debounce = Arc::clone(&self.debounce);
        let write_lock = Arc::clone(&self.write_lock);
        let path = self.path.clone();
        std::thread::spawn(move || loop {
            std::thread::sleep(SAVE_DEBOUNCE);
            let pending = {
                let mut state = debounce.lock().expect("debounce lock poisoned");
                match state.pending.take() {
                    Some(settings) => settings,
                    None => {
                        state.timer_running = false;
                        return;
                    }
                }
            };
            if let Err(error) = write_document(&path, &write_lock, &pending) {
                tracing::warn!("debounced settings save failed: {error}");
            }
        });
    }

    /// Write the current document to an arbitrary path.
    pub fn export_to(&self, output_path: &str) -> Result<(), EngineError> {
        let target = PathBuf::from(output_path.trim());
        if target.as_os_str().is_empty() {
            return Err(EngineError::Settings("no export path given".to_string()));
        }
        let settings = self.load()?;
        let body = serde_json::to_string_pretty(&settings)?;
        fs::write(target, body).map_err(|e| EngineError::Settings(e.to_string()))
    }

    /// Replace the document with the file at `input_path`.
    pub fn import_overwrite(&self, input_path: &str) -> Result<AppSettings, EngineError> {
        let imported = read_document(input_path)?;
        self.save(&imported)?;
        Ok(imported)
    }

    /// Merge the file at `input_path` into the current document.
    pub fn import_merge(
        &self,
        input_path: &str,
        policy: MergePolicy,
    ) -> Result<AppSettings, EngineError> {
        let imported = read_document(input_path)?;
        let merged = merge(&self.load()?, &imported, policy)?;
        self.save(&merged)?;
        Ok(merged)
    }

    /// Which names exist on both sides of a prospective merge.
    pub fn preview_import_conflicts(
        &self,
        input_path: &str,
    ) -> Result<ImportConflictPreview, EngineError> {
        let imported = read_document(input_path)?;
        let existing = self.load()?;

        let mut delete_pattern_names = clashing_names(
            existing.delete_patterns.iter().map(|p| p.name.as_str()),
            imported.delete_patterns.iter().map(|p| p.name.as_str()),
        );
        delete_pattern_names.sort_by_key(|n| n.to_lowercase());
        let mut rename_template_names = clashing_names(
            existing.rename_templates.iter().map(|t| t.name.as_str()),
            imported.rename_templates.iter().map(|t| t.name.as_str()),
        );
        rename_template_names.sort_by_key(|n| n.to_lowercase());

        let mut output_directory_keys: Vec<String> = imported
            .output_directories
            .keys()
            .filter(|key| existing.output_directories.contains_key(*key))
            .cloned()
            .collect();
        output_directory_keys.sort();

        let theme_conflict =
            imported.theme != ThemeMode::System && imported.theme != existing.theme;

        Ok(ImportConflictPreview {
            delete_pattern_names,
            rename_template_names,
            output_directory_keys,
            theme_conflict,
        })
    }
}

fn write_document(
    path: &Path,
    write_lock: &Mutex<()>,
    settings: &AppSettings,
) -> Result<(), EngineError> {
    validate(settings)?;
    let _guard = write_lock.lock().expect("settings lock poisoned");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| EngineError::Settings(e.to_string()))?;
    }
    let body = serde_json::to_string_pretty(settings)?;
    fs::write(path, body).map_err(|e| EngineError::Settings(e.to_string()))
}

fn read_document(input_path: &str) -> Result<AppSettings, EngineError> {
    let path = PathBuf::from(input_path.trim());
    if path.as_os_str().is_empty() {
        return Err(EngineError::Settings("no import path given".to_string()));
    }
    let body = fs::read_to_string(path).map_err(|e| EngineError::Settings(e.to_string()))?;
    let imported: AppSettings = serde_json::from_str(&body)?;
    validate(&imported)?;
    Ok(imported)
}

fn clashing_names<'a>(
    existing: impl Iterator<Item = &'a str>,
    imported: impl Iterator<Item = &'a str>,
) -> Vec<String> {
    let existing: HashSet<String> = existing.map(str::to_lowercase).collect();
    let mut seen = HashSet::new();
    imported
        .filter(|name| existing.contains(&name.to_lowercase()))
        .filter(|name| seen.insert(name.to_lowercase()))
        .map(str::to_string)
        .collect()
}

fn validate(settings: &AppSettings) -> Result<(), EngineError> {
    let mut names = HashSet::new();
    for pattern in &settings.delete_patterns {
        let name = pattern.name.trim();
        let length = name.chars().count();
        if !(1..=40).contains(&length) {
            return Err(EngineError::Settings(
                "delete pattern names must be 1-40 characters".to_string(),
            ));
        }
        if !names.insert(name.to_lowercase()) {
            return Err(EngineError::Settings(format!(
                "duplicate delete pattern name `{name}`"
            )));
        }
        if pattern.extensions.is_empty() {
            return Err(EngineError::Settings(format!(
                "delete pattern `{name}` has no extensions"
            )));
        }
        if pattern.mode == DeleteMode::Retreat
            && pattern
                .retreat_dir
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .is_empty()
        {
            return Err(EngineError::Settings(format!(
                "delete pattern `{name}` uses retreat mode without a retreat directory"
            )));
        }
    }
    Ok(())
}

fn merge(
    existing: &AppSettings,
    imported: &AppSettings,
    policy: MergePolicy,
) -> Result<AppSettings, EngineError> {
    let mut delete_patterns = existing.delete_patterns.clone();
    for pattern in &imported.delete_patterns {
        match index_by_name(&delete_patterns, &pattern.name, |p: &DeletePattern| &p.name) {
            Some(index) => match policy {
                MergePolicy::Existing => {}
                MergePolicy::Import => delete_patterns[index] = pattern.clone(),
                MergePolicy::Cancel => {
                    return Err(EngineError::Settings(format!(
                        "delete pattern `{}` conflicts",
                        pattern.name
                    )));
                }
            },
            None => delete_patterns.push(pattern.clone()),
        }
    }

    let mut rename_templates = existing.rename_templates.clone();
    for template in &imported.rename_templates {
        match index_by_name(&rename_templates, &template.name, |t: &RenameTemplateEntry| {
            &t.name
        }) {
            Some(index) => match policy {
                MergePolicy::Existing => {}
                MergePolicy::Import => rename_templates[index] = template.clone(),
                MergePolicy::Cancel => {
                    return Err(EngineError::Settings(format!(
                        "rename template `{}` conflicts",
                        template.name
                    )));
                }
            },
            None => rename_templates.push(template.clone()),
        }
    }

    let mut output_directories: HashMap<String, String> = existing.output_directories.clone();
    for (key, value) in &imported.output_directories {
        if output_directories.contains_key(key) {
            match policy {
                MergePolicy::Existing => {}
                MergePolicy::Import => {
                    output_directories.insert(key.clone(), value.clone());
                }
                MergePolicy::Cancel => {
                    return Err(EngineError::Settings(format!(
                        "output directory key `{key}` conflicts"
                    )));
                }
            }
        } else {
            output_directories.insert(key.clone(), value.clone());
        }
    }

    let theme = match policy {
        MergePolicy::Existing => existing.theme,
        MergePolicy::Import => imported.theme,
        MergePolicy::Cancel => {
            if imported.theme != ThemeMode::System && imported.theme != existing.theme {
                return Err(EngineError::Settings("theme conflicts".to_string()));
            }
            existing.theme
        }
    };

    Ok(AppSettings {
        delete_patterns,
        rename_templates,
        output_directories,
        theme,
    })
}

fn index_by_name<T>(items: &[T], name: &str, name_of: impl Fn(&T) -> &String) -> Option<usize> {
    items
        .iter()
        .position(|item| name_of(item).eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> SettingsStore {
        SettingsStore::new(tmp.path().join("settings.json"))
    }

    fn pattern(name: &str) -> DeletePattern {
        DeletePattern {
            name: name.to_string(),
            extensions: vec!["tmp".to_string()],
            mode: DeleteMode::Direct,
            retreat_dir: None,
        }
    }

    #[test]
    fn load_without_file_writes_defaults() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let settings = store.load().unwrap();
        assert_eq!(settings, AppSettings::default());
        assert!(store.path().exists());
        let body = fs::read_to_string(store.path()).unwrap();
        assert!(body.contains("renameTemplates"));
    }

    #[test]
    fn save_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let mut settings = AppSettings::default();
        settings.delete_patterns.push(pattern("temps"));
        settings.theme = ThemeMode::Dark;
        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap(), settings);
    }

    #[test]
    fn load_fills_missing_fields_and_rewrites() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        fs::write(store.path(), r#"{"theme":"light"}"#).unwrap();
        let settings = store.load().unwrap();
        assert_eq!(settings.theme, ThemeMode::Light);
        assert_eq!(settings.rename_templates.len(), 1);
        let body = fs::read_to_string(store.path()).unwrap();
        assert!(body.contains("deletePatterns"));
    }

    #[test]
    fn validation_rejects_bad_patterns() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let mut settings = AppSettings::default();
        settings.delete_patterns.push(DeletePattern {
            extensions: Vec::new(),
            ..pattern("no-exts")
        });
        assert!(store.save(&settings).is_err());

        let mut settings = AppSettings::default();
        settings.delete_patterns.push(pattern("dup"));
        settings.delete_patterns.push(pattern("DUP"));
        assert!(store.save(&settings).is_err());

        let mut settings = AppSettings::default();
        settings.delete_patterns.push(DeletePattern {
            mode: DeleteMode::Retreat,
            retreat_dir: None,
            ..pattern("retreat")
        });
        assert!(store.save(&settings).is_err());
    }

    #[test]
    fn merge_existing_keeps_current_entries() {
        let mut existing = AppSettings::default();
        existing.delete_patterns.push(pattern("shared"));
        let mut imported = AppSettings::default();
        imported.delete_patterns.push(DeletePattern {
            extensions: vec!["bak".to_string()],
            ..pattern("shared")
        });
        imported.delete_patterns.push(pattern("new"));

        let merged = merge(&existing, &imported, MergePolicy::Existing).unwrap();
        assert_eq!(merged.delete_patterns.len(), 2);
        assert_eq!(merged.delete_patterns[0].extensions, vec!["tmp"]);
    }

    #[test]
    fn merge_import_takes_imported_entries() {
        let mut existing = AppSettings::default();
        existing.delete_patterns.push(pattern("shared"));
        let mut imported = AppSettings::default();
        imported.delete_patterns.push(DeletePattern {
            extensions: vec!["bak".to_string()],
            ..pattern("shared")
        });

        let merged = merge(&existing, &imported, MergePolicy::Import).unwrap();
        assert_eq!(merged.delete_patterns[0].extensions, vec!["bak"]);
    }

    #[test]
    fn merge_cancel_errors_on_conflict() {
        let mut existing = AppSettings::default();
        existing.delete_patterns.push(pattern("shared"));
        let mut imported = AppSettings::default();
        imported.delete_patterns.push(pattern("SHARED"));

        assert!(merge(&existing, &imported, MergePolicy::Cancel).is_err());
    }

    #[test]
    fn conflict_preview_lists_clashes() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let mut current = AppSettings::default();
        current.delete_patterns.push(pattern("temps"));
        current
            .output_directories
            .insert("compress".to_string(), "/a".to_string());
        store.save(&current).unwrap();

        let mut incoming = AppSettings::default();
        incoming.delete_patterns.push(pattern("TEMPS"));
        incoming
            .output_directories
            .insert("compress".to_string(), "/b".to_string());
        incoming.theme = ThemeMode::Dark;
        let import_path = tmp.path().join("incoming.json");
        fs::write(&import_path, serde_json::to_string(&incoming).unwrap()).unwrap();

        let preview = store
            .preview_import_conflicts(&import_path.to_string_lossy())
            .unwrap();
        assert_eq!(preview.delete_pattern_names, vec!["TEMPS"]);
        assert_eq!(preview.output_directory_keys, vec!["compress"]);
        assert!(preview.theme_conflict);
    }

    #[test]
    fn import_overwrite_replaces_document() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.load().unwrap();

        let mut incoming = AppSettings::default();
        incoming.theme = ThemeMode::Dark;
        let import_path = tmp.path().join("incoming.json");
        fs::write(&import_path, serde_json::to_string(&incoming).unwrap()).unwrap();

        let result = store
            .import_overwrite(&import_path.to_string_lossy())
            .unwrap();
        assert_eq!(result.theme, ThemeMode::Dark);
        assert_eq!(store.load().unwrap().theme, ThemeMode::Dark);
    }

    #[test]
    fn debounced_saves_coalesce_to_the_last_value() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let mut first = AppSettings::default();
        first.theme = ThemeMode::Light;
        let mut second = AppSettings::default();
        second.theme = ThemeMode::Dark;

        store.save_debounced(first);
        store.save_debounced(second);
        std::thread::sleep(Duration::from_millis(700));

        assert_eq!(store.load().unwrap().theme, ThemeMode::Dark);
    }

    #[test]
    fn export_writes_a_readable_copy() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.load().unwrap();
        let export_path = tmp.path().join("exported.json");
        store.export_to(&export_path.to_string_lossy()).unwrap();
        let exported: AppSettings =
            serde_json::from_str(&fs::read_to_string(&export_path).unwrap()).unwrap();
        assert_eq!(exported, AppSettings::default());
    }
}
