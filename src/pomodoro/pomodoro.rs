use serde::{Deserialize, Serialize};

use super::preset::{Preset, PresetKind};

pub const SECONDS_PER_MINUTE: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    Focus,
    ShortBreak,
    LongBreak,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Focus => "FOCUS",
            SessionMode::ShortBreak => "SHORT BREAK",
            SessionMode::LongBreak => "LONG BREAK",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            SessionMode::Focus => "💼",
            SessionMode::ShortBreak => "☕",
            SessionMode::LongBreak => "🌴",
        }
    }
}

/// Full length of `mode` under `preset`, in seconds.
pub fn duration_secs(mode: SessionMode, preset: &Preset) -> u32 {
    let minutes = match mode {
        SessionMode::Focus => preset.focus_minutes(),
        SessionMode::ShortBreak => preset.short_break_minutes(),
        SessionMode::LongBreak => preset.long_break_minutes(),
    };
    minutes * SECONDS_PER_MINUTE
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub mode: SessionMode,
    pub running: bool,
    pub seconds_remaining: u32,
    pub completed_focus_sessions: u32,
    /// Seconds spent running in the current mode.
    pub elapsed_seconds: u32,
}

impl SessionState {
    fn initial(preset: &Preset) -> Self {
        Self {
            mode: SessionMode::Focus,
            running: false,
            seconds_remaining: duration_secs(SessionMode::Focus, preset),
            completed_focus_sessions: 0,
            elapsed_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionMode,
    pub to: SessionMode,
    pub auto_started: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Counted,
    Expired(Transition),
}

/// Owns the live session and every rule that changes it.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    preset: Preset,
    state: SessionState,
}

impl SessionStateMachine {
    pub fn new(preset: Preset) -> Self {
        let state = SessionState::initial(&preset);
        Self { preset, state }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn preset(&self) -> &Preset {
        &self.preset
    }

    pub fn current_duration(&self) -> u32 {
        duration_secs(self.state.mode, &self.preset)
    }

    /// A stopwatch focus has no bound and never expires on its own.
    pub fn is_unbounded(&self) -> bool {
        self.preset.kind() == PresetKind::Stopwatch && self.state.mode == SessionMode::Focus
    }

    /// Returns `true` when the session was not already running.
    pub fn start(&mut self) -> bool {
        if self.state.running {
            return false;
        }
        self.state.running = true;
        true
    }

    pub fn stop(&mut self) -> bool {
        std::mem::replace(&mut self.state.running, false)
    }

    pub fn reset(&mut self) {
        self.state.running = false;
        self.state.seconds_remaining = self.current_duration();
        self.state.elapsed_seconds = 0;
    }

    pub fn skip(&mut self) -> Transition {
        self.state.running = false;
        self.expire()
    }

    pub fn switch_mode(&mut self, mode: SessionMode) {
        if mode == SessionMode::Focus {
            self.state.completed_focus_sessions = 0;
        }
        self.enter(mode);
        self.state.running = false;
    }

    /// Swaps the active preset and starts a fresh focus cycle under it.
    pub fn set_preset(&mut self, preset: Preset) {
        self.state = SessionState::initial(&preset);
        self.preset = preset;
    }

    /// Advances the session by one clock period.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.state.running {
            return TickOutcome::Idle;
        }
        self.state.elapsed_seconds = self.state.elapsed_seconds.saturating_add(1);
        if self.is_unbounded() {
            return TickOutcome::Counted;
        }
        self.state.seconds_remaining = self.state.seconds_remaining.saturating_sub(1);
        if self.state.seconds_remaining > 0 {
            return TickOutcome::Counted;
        }
        TickOutcome::Expired(self.expire())
    }

    fn expire(&mut self) -> Transition {
        let from = self.state.mode;
        let (to, auto_started) = match from {
            SessionMode::Focus => {
                self.state.completed_focus_sessions += 1;
                let interval = self.preset.long_break_interval().max(1);
                let next = if self.state.completed_focus_sessions % interval == 0 {
                    SessionMode::LongBreak
                } else {
                    SessionMode::ShortBreak
                };
                (next, self.preset.auto_start_breaks())
            }
            SessionMode::ShortBreak | SessionMode::LongBreak => {
                (SessionMode::Focus, self.preset.auto_start_focus())
            }
        };
        self.enter(to);
        self.state.running = auto_started;
        Transition {
            from,
            to,
            auto_started,
        }
    }

    fn enter(&mut self, mode: SessionMode) {
        self.state.mode = mode;
        self.state.seconds_remaining = duration_secs(mode, &self.preset);
        self.state.elapsed_seconds = 0;
    }
}
