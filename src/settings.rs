use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::warn;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::pomodoro::Preset;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("settings are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("settings store is unavailable")]
    Unavailable,
}

pub type SettingsResult<T> = Result<T, SettingsError>;

/// The persisted part of the pomodoro setup. Timer state is never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PomodoroSettings {
    pub selected_preset_id: Option<String>,
    pub presets: Vec<Preset>,
}

/// Which fields of a [`PomodoroSettings`] a save should write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldMask {
    pub selected_preset_id: bool,
    pub presets: bool,
}

impl FieldMask {
    pub const SELECTED_PRESET: Self = Self {
        selected_preset_id: true,
        presets: false,
    };
    pub const PRESETS: Self = Self {
        selected_preset_id: false,
        presets: true,
    };
    pub const ALL: Self = Self {
        selected_preset_id: true,
        presets: true,
    };
}

/// Where presets and the selected preset live between runs.
pub trait SettingsRepository {
    fn load_pomodoro_settings(&self) -> SettingsResult<PomodoroSettings>;
    fn save_pomodoro_settings(&self, partial: &PomodoroSettings, mask: FieldMask)
    -> SettingsResult<()>;
}

const SELECTED_KEY: &str = "selectedPresetId";
const PRESETS_KEY: &str = "presets";

fn settings_from_value(value: &Value) -> PomodoroSettings {
    let selected_preset_id = value
        .get(SELECTED_KEY)
        .and_then(Value::as_str)
        .map(str::to_string);
    let presets = value
        .get(PRESETS_KEY)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| match serde_json::from_value::<Preset>(entry.clone()) {
                    Ok(preset) => Some(preset),
                    Err(e) => {
                        warn!("Skipping unreadable stored preset: {e}");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    PomodoroSettings {
        selected_preset_id,
        presets,
    }
}

fn merge_into(
    document: &mut Map<String, Value>,
    partial: &PomodoroSettings,
    mask: FieldMask,
) -> SettingsResult<()> {
    if mask.selected_preset_id {
        let value = match &partial.selected_preset_id {
            Some(id) => Value::String(id.clone()),
            None => Value::Null,
        };
        document.insert(SELECTED_KEY.to_string(), value);
    }
    if mask.presets {
        document.insert(PRESETS_KEY.to_string(), serde_json::to_value(&partial.presets)?);
    }
    Ok(())
}

/// Settings kept in one JSON document on disk. Unknown keys are preserved.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.local/share/tick_it/settings.json`.
    pub fn default_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Path::new(&home)
            .join(".local")
            .join("share")
            .join("tick_it")
            .join("settings.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> SettingsResult<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&contents)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

impl SettingsRepository for JsonSettingsStore {
    fn load_pomodoro_settings(&self) -> SettingsResult<PomodoroSettings> {
        let document = self.read_document()?;
        Ok(settings_from_value(&Value::Object(document)))
    }

    fn save_pomodoro_settings(
        &self,
        partial: &PomodoroSettings,
        mask: FieldMask,
    ) -> SettingsResult<()> {
        // A corrupt file is replaced rather than blocking the save.
        let mut document = self.read_document().unwrap_or_default();
        merge_into(&mut document, partial, mask)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&document)?)?;
        Ok(())
    }
}

/// Process-local settings, for tests and for running without a file.
#[derive(Debug, Default)]
pub struct MemorySettings {
    document: Mutex<Map<String, Value>>,
    failing: bool,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every call fails.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn with_document(document: Value) -> Self {
        let document = match document {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            document: Mutex::new(document),
            failing: false,
        }
    }

    pub fn snapshot(&self) -> Value {
        match self.document.lock() {
            Ok(document) => Value::Object(document.clone()),
            Err(_) => Value::Null,
        }
    }
}

impl SettingsRepository for MemorySettings {
    fn load_pomodoro_settings(&self) -> SettingsResult<PomodoroSettings> {
        if self.failing {
            return Err(SettingsError::Unavailable);
        }
        let document = self.document.lock().map_err(|_| SettingsError::Unavailable)?;
        Ok(settings_from_value(&Value::Object(document.clone())))
    }

    fn save_pomodoro_settings(
        &self,
        partial: &PomodoroSettings,
        mask: FieldMask,
    ) -> SettingsResult<()> {
        if self.failing {
            return Err(SettingsError::Unavailable);
        }
        let mut document = self.document.lock().map_err(|_| SettingsError::Unavailable)?;
        merge_into(&mut document, partial, mask)
    }
}
