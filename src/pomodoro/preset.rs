use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const CLASSIC_PRESET_ID: &str = "classic";
pub const MAX_MINUTES: u32 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetKind {
    Pomodoro,
    Stopwatch,
    Countdown,
    Custom,
}

impl PresetKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pomodoro" => Some(PresetKind::Pomodoro),
            "stopwatch" => Some(PresetKind::Stopwatch),
            "countdown" => Some(PresetKind::Countdown),
            "custom" => Some(PresetKind::Custom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PresetKind::Pomodoro => "pomodoro",
            PresetKind::Stopwatch => "stopwatch",
            PresetKind::Countdown => "countdown",
            PresetKind::Custom => "custom",
        }
    }
}

/// One timer regimen. Fields are only reachable through the repairing
/// constructors, so every live `Preset` satisfies the interval and duration
/// bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "PresetRecord")]
pub struct Preset {
    id: String,
    name: String,
    description: String,
    kind: PresetKind,
    focus_minutes: u32,
    short_break_minutes: u32,
    long_break_minutes: u32,
    long_break_interval: u32,
    auto_start_breaks: bool,
    auto_start_focus: bool,
    is_default: bool,
}

/// User-supplied fields for creating or editing a preset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetDraft {
    pub name: String,
    pub description: String,
    pub kind: PresetKind,
    pub focus_minutes: i64,
    pub short_break_minutes: i64,
    pub long_break_minutes: i64,
    pub long_break_interval: i64,
    pub auto_start_breaks: bool,
    pub auto_start_focus: bool,
}

impl Default for PresetDraft {
    fn default() -> Self {
        Self {
            name: "Custom".to_string(),
            description: String::new(),
            kind: PresetKind::Custom,
            focus_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            long_break_interval: 4,
            auto_start_breaks: true,
            auto_start_focus: false,
        }
    }
}

// Shape of a preset as found in storage: every field optional, numbers signed.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PresetRecord {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    kind: Option<String>,
    focus_minutes: Option<i64>,
    short_break_minutes: Option<i64>,
    long_break_minutes: Option<i64>,
    long_break_interval: Option<i64>,
    auto_start_breaks: Option<bool>,
    auto_start_focus: Option<bool>,
    is_default: Option<bool>,
}

impl From<PresetRecord> for Preset {
    fn from(record: PresetRecord) -> Self {
        let fallback = PresetDraft::default();
        let draft = PresetDraft {
            name: record
                .name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(fallback.name),
            description: record.description.unwrap_or_default(),
            kind: record
                .kind
                .as_deref()
                .and_then(PresetKind::parse)
                .unwrap_or(PresetKind::Custom),
            focus_minutes: record.focus_minutes.unwrap_or(fallback.focus_minutes),
            short_break_minutes: record
                .short_break_minutes
                .unwrap_or(fallback.short_break_minutes),
            long_break_minutes: record
                .long_break_minutes
                .unwrap_or(fallback.long_break_minutes),
            long_break_interval: record
                .long_break_interval
                .unwrap_or(fallback.long_break_interval),
            auto_start_breaks: record.auto_start_breaks.unwrap_or(fallback.auto_start_breaks),
            auto_start_focus: record.auto_start_focus.unwrap_or(fallback.auto_start_focus),
        };
        let id = record
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(generate_id);
        Preset::repaired(id, draft, record.is_default.unwrap_or(false))
    }
}

fn generate_id() -> String {
    format!("custom-{}", Uuid::new_v4())
}

fn clamp_minutes(value: i64, min: u32) -> u32 {
    value.clamp(i64::from(min), i64::from(MAX_MINUTES)) as u32
}

impl Preset {
    fn repaired(id: String, draft: PresetDraft, is_default: bool) -> Self {
        // Only a stopwatch may run focus without a bound.
        let focus_floor = if draft.kind == PresetKind::Stopwatch { 0 } else { 1 };
        Self {
            id,
            name: draft.name,
            description: draft.description,
            kind: draft.kind,
            focus_minutes: clamp_minutes(draft.focus_minutes, focus_floor),
            short_break_minutes: clamp_minutes(draft.short_break_minutes, 1),
            long_break_minutes: clamp_minutes(draft.long_break_minutes, 1),
            long_break_interval: draft.long_break_interval.clamp(1, i64::from(u32::MAX)) as u32,
            auto_start_breaks: draft.auto_start_breaks,
            auto_start_focus: draft.auto_start_focus,
            is_default,
        }
    }

    /// Builds a user preset with a freshly generated id.
    pub fn custom(draft: PresetDraft) -> Self {
        Self::repaired(generate_id(), draft, false)
    }

    fn builtin(
        id: &str,
        name: &str,
        description: &str,
        kind: PresetKind,
        minutes: (u32, u32, u32),
        long_break_interval: u32,
        auto_start: bool,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            kind,
            focus_minutes: minutes.0,
            short_break_minutes: minutes.1,
            long_break_minutes: minutes.2,
            long_break_interval,
            auto_start_breaks: auto_start,
            auto_start_focus: false,
            is_default: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> PresetKind {
        self.kind
    }

    pub fn focus_minutes(&self) -> u32 {
        self.focus_minutes
    }

    pub fn short_break_minutes(&self) -> u32 {
        self.short_break_minutes
    }

    pub fn long_break_minutes(&self) -> u32 {
        self.long_break_minutes
    }

    pub fn long_break_interval(&self) -> u32 {
        self.long_break_interval
    }

    pub fn auto_start_breaks(&self) -> bool {
        self.auto_start_breaks
    }

    pub fn auto_start_focus(&self) -> bool {
        self.auto_start_focus
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn summary(&self) -> String {
        let focus = if self.kind == PresetKind::Stopwatch && self.focus_minutes == 0 {
            "open".to_string()
        } else {
            self.focus_minutes.to_string()
        };
        format!(
            "{focus}/{}/{} every {}",
            self.short_break_minutes, self.long_break_minutes, self.long_break_interval
        )
    }
}

/// The fixed built-in catalog, in display order.
pub fn defaults() -> Vec<Preset> {
    vec![
        Preset::builtin(
            CLASSIC_PRESET_ID,
            "Classic",
            "25 minutes of focus, 5 minute breaks",
            PresetKind::Pomodoro,
            (25, 5, 15),
            4,
            true,
        ),
        Preset::builtin(
            "short",
            "Short",
            "Quick 15 minute sprints",
            PresetKind::Pomodoro,
            (15, 3, 10),
            4,
            true,
        ),
        Preset::builtin(
            "52-17",
            "52/17 rule",
            "52 minutes of work, 17 minutes of rest",
            PresetKind::Pomodoro,
            (52, 17, 30),
            4,
            true,
        ),
        Preset::builtin(
            "animedoro",
            "Animedoro",
            "Long focus blocks with an episode-sized break",
            PresetKind::Pomodoro,
            (90, 15, 30),
            2,
            true,
        ),
        Preset::builtin(
            "stopwatch",
            "Stopwatch",
            "Open-ended focus, stop when you are done",
            PresetKind::Stopwatch,
            (0, 5, 15),
            4,
            false,
        ),
        Preset::builtin(
            "countdown-60",
            "Countdown 60",
            "A single hour-long countdown",
            PresetKind::Countdown,
            (60, 5, 15),
            4,
            false,
        ),
        Preset::builtin(
            "countdown-30",
            "Countdown 30",
            "A single half-hour countdown",
            PresetKind::Countdown,
            (30, 5, 15),
            4,
            false,
        ),
    ]
}

/// Looks `preset_id` up in `all`, degrading to Classic when it is missing.
pub fn resolve(preset_id: &str, all: &[Preset]) -> Preset {
    all.iter()
        .find(|preset| preset.id == preset_id)
        .cloned()
        .or_else(|| defaults().into_iter().find(|p| p.id == CLASSIC_PRESET_ID))
        .unwrap_or_else(|| Preset::custom(PresetDraft::default()))
}

/// Built-ins first, then every stored user preset whose id is not already taken.
pub fn merge(stored: Vec<Preset>) -> Vec<Preset> {
    let mut merged = defaults();
    for preset in stored {
        if preset.is_default || merged.iter().any(|existing| existing.id == preset.id) {
            continue;
        }
        merged.push(preset);
    }
    merged
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PresetError {
    #[error("preset {0} is built in and cannot be changed")]
    BuiltIn(String),
    #[error("no preset with id {0}")]
    NotFound(String),
}

#[derive(Debug, Clone)]
pub struct PresetCatalog {
    presets: Vec<Preset>,
}

impl Default for PresetCatalog {
    fn default() -> Self {
        Self {
            presets: defaults(),
        }
    }
}

impl PresetCatalog {
    pub fn from_stored(stored: Vec<Preset>) -> Self {
        Self {
            presets: merge(stored),
        }
    }

    pub fn all(&self) -> &[Preset] {
        &self.presets
    }

    pub fn resolve(&self, preset_id: &str) -> Preset {
        resolve(preset_id, &self.presets)
    }

    pub fn contains(&self, preset_id: &str) -> bool {
        self.presets.iter().any(|preset| preset.id == preset_id)
    }

    /// User presets only; this is what gets written back to storage.
    pub fn user_presets(&self) -> Vec<Preset> {
        self.presets
            .iter()
            .filter(|preset| !preset.is_default)
            .cloned()
            .collect()
    }

    pub fn add(&mut self, draft: PresetDraft) -> Preset {
        let preset = Preset::custom(draft);
        self.presets.push(preset.clone());
        preset
    }

    pub fn update(&mut self, preset_id: &str, draft: PresetDraft) -> Result<Preset, PresetError> {
        let slot = self.user_slot(preset_id)?;
        let updated = Preset::repaired(preset_id.to_string(), draft, false);
        self.presets[slot] = updated.clone();
        Ok(updated)
    }

    pub fn remove(&mut self, preset_id: &str) -> Result<Preset, PresetError> {
        let slot = self.user_slot(preset_id)?;
        Ok(self.presets.remove(slot))
    }

    fn user_slot(&self, preset_id: &str) -> Result<usize, PresetError> {
        let slot = self
            .presets
            .iter()
            .position(|preset| preset.id == preset_id)
            .ok_or_else(|| PresetError::NotFound(preset_id.to_string()))?;
        if self.presets[slot].is_default {
            return Err(PresetError::BuiltIn(preset_id.to_string()));
        }
        Ok(slot)
    }
}
