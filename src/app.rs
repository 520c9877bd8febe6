//! The primary surface: one event loop that owns the session, its clock,
//! the mirror channel and the settings repository.

use std::io::Write;
use std::str::FromStr;

use chrono::Local;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::mirror::mirror_clock::status_line;
use crate::mirror::MirrorState;
use crate::notify::{self, Notifier};
use crate::pomodoro::preset::CLASSIC_PRESET_ID;
use crate::pomodoro::pomodoro::duration_secs;
use crate::pomodoro::{
    PresetCatalog, PresetDraft, PresetKind, SessionClock, SessionMode, SessionStateMachine,
    TickOutcome, Transition,
};
use crate::settings::{FieldMask, PomodoroSettings, SettingsRepository};
use crate::ws::{
    ControlAction, LIVENESS_POLL, MirrorError, MirrorLink, MirrorNotice, MirrorOptions,
    MirrorSyncChannel, StateSnapshot, SurfaceHost, SyncMessage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Home,
    Focus,
    Ambient,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Home => "HOME",
            RunMode::Focus => "FOCUS",
            RunMode::Ambient => "AMBIENT",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            RunMode::Home => "🏠",
            RunMode::Focus => "🍅",
            RunMode::Ambient => "🌌",
        }
    }
}

/// Durations and interval as typed by the user, before clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresetTimes {
    pub focus: i64,
    pub short_break: i64,
    pub long_break: i64,
    pub interval: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Reset,
    Skip,
    SwitchMode(SessionMode),
    SelectPreset(String),
    ListPresets,
    AddPreset {
        name: String,
        times: PresetTimes,
        kind: PresetKind,
    },
    EditPreset {
        id: String,
        times: PresetTimes,
    },
    RemovePreset(String),
    OpenMirror,
    CloseMirror,
    SwitchRunMode(RunMode),
    Status,
    Quit,
}

impl From<ControlAction> for Command {
    fn from(action: ControlAction) -> Self {
        match action {
            ControlAction::Start => Command::Start,
            ControlAction::Stop => Command::Stop,
            ControlAction::Reset => Command::Reset,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command {0:?} (try: start, stop, reset, skip, focus, short, long, presets, mirror, quit)")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

const ADD_USAGE: &str = "add <name> <focus> <short> <long> <interval> [kind]";
const EDIT_USAGE: &str = "edit <id> <focus> <short> <long> <interval>";

fn parse_times(args: &[&str], usage: &'static str) -> Result<PresetTimes, CommandError> {
    let numbers = args
        .iter()
        .map(|arg| arg.parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| CommandError::Usage(usage))?;
    match numbers.as_slice() {
        [focus, short_break, long_break, interval] => Ok(PresetTimes {
            focus: *focus,
            short_break: *short_break,
            long_break: *long_break,
            interval: *interval,
        }),
        _ => Err(CommandError::Usage(usage)),
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&head, args)) = words.split_first() else {
            return Ok(Command::Status);
        };
        let command = match (head.to_ascii_lowercase().as_str(), args) {
            ("start" | "s", []) => Command::Start,
            ("stop" | "pause" | "p", []) => Command::Stop,
            ("reset" | "r", []) => Command::Reset,
            ("skip", []) => Command::Skip,
            ("focus", []) => Command::SwitchMode(SessionMode::Focus),
            ("short", []) => Command::SwitchMode(SessionMode::ShortBreak),
            ("long", []) => Command::SwitchMode(SessionMode::LongBreak),
            ("preset", [id]) => Command::SelectPreset(id.to_string()),
            ("preset", _) => return Err(CommandError::Usage("preset <id>")),
            ("presets", []) => Command::ListPresets,
            ("add", [name, rest @ ..]) if rest.len() == 4 || rest.len() == 5 => {
                let kind = match rest.get(4) {
                    Some(kind) => PresetKind::parse(kind).ok_or(CommandError::Usage(ADD_USAGE))?,
                    None => PresetKind::Custom,
                };
                Command::AddPreset {
                    name: name.to_string(),
                    times: parse_times(&rest[..4], ADD_USAGE)?,
                    kind,
                }
            }
            ("add", _) => return Err(CommandError::Usage(ADD_USAGE)),
            ("edit", [id, rest @ ..]) => Command::EditPreset {
                id: id.to_string(),
                times: parse_times(rest, EDIT_USAGE)?,
            },
            ("edit", _) => return Err(CommandError::Usage(EDIT_USAGE)),
            ("remove" | "rm", [id]) => Command::RemovePreset(id.to_string()),
            ("remove" | "rm", _) => return Err(CommandError::Usage("remove <id>")),
            ("mirror", []) => Command::OpenMirror,
            ("unmirror", []) => Command::CloseMirror,
            ("home", []) => Command::SwitchRunMode(RunMode::Home),
            ("ambient", []) => Command::SwitchRunMode(RunMode::Ambient),
            ("timer", []) => Command::SwitchRunMode(RunMode::Focus),
            ("status", []) => Command::Status,
            ("quit" | "exit" | "q", []) => Command::Quit,
            _ => return Err(CommandError::Unknown(line.trim().to_string())),
        };
        Ok(command)
    }
}

#[derive(Debug, Clone)]
pub struct PrimaryConfig {
    /// Overrides the stored preset selection for this run.
    pub preset: Option<String>,
    pub mirror: MirrorOptions,
    pub notifications: bool,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            preset: None,
            mirror: MirrorOptions::default(),
            notifications: true,
        }
    }
}

fn stamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

type PendingOpen = JoinHandle<Result<MirrorLink, MirrorError>>;

/// Resolves once the pending mirror open finishes; pending while none is.
async fn opened(pending: &mut Option<PendingOpen>) -> Result<MirrorLink, MirrorError> {
    let Some(task) = pending.as_mut() else {
        return std::future::pending().await;
    };
    let result = task.await;
    *pending = None;
    result.unwrap_or_else(|e| {
        Err(MirrorError::SurfaceCreationDenied(format!(
            "mirror launch task failed: {e}"
        )))
    })
}

fn render_line(line: &str) {
    print!("\r\x1b[2K{line}");
    let _ = std::io::stdout().flush();
}

pub struct PrimarySurface<H, S> {
    run_mode: RunMode,
    catalog: PresetCatalog,
    selected_preset_id: String,
    session: Option<SessionStateMachine>,
    clock: SessionClock,
    mirror: MirrorSyncChannel,
    pending_open: Option<PendingOpen>,
    last_pushed: Option<StateSnapshot>,
    host: H,
    settings: S,
    notifier: Notifier,
    mirror_options: MirrorOptions,
}

impl<H: SurfaceHost, S: SettingsRepository> PrimarySurface<H, S> {
    /// Loads presets from `settings` (falling back to the built-ins) and
    /// mounts the focus timer.
    pub fn new(host: H, settings: S, config: PrimaryConfig) -> Self {
        let stored = settings.load_pomodoro_settings().unwrap_or_else(|e| {
            warn!("Failed to load settings, using built-in presets: {e}");
            PomodoroSettings::default()
        });
        let catalog = PresetCatalog::from_stored(stored.presets);
        let wanted = config
            .preset
            .or(stored.selected_preset_id)
            .unwrap_or_else(|| CLASSIC_PRESET_ID.to_string());
        if !catalog.contains(&wanted) {
            warn!("Preset {wanted} not found, falling back to Classic");
        }
        let selected_preset_id = catalog.resolve(&wanted).id().to_string();

        let mut surface = Self {
            run_mode: RunMode::Focus,
            catalog,
            selected_preset_id,
            session: None,
            clock: SessionClock::default(),
            mirror: MirrorSyncChannel::new(),
            pending_open: None,
            last_pushed: None,
            host,
            settings,
            notifier: Notifier::new(config.notifications),
            mirror_options: config.mirror,
        };
        surface.mount_timer();
        surface
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    pub fn session(&self) -> Option<&SessionStateMachine> {
        self.session.as_ref()
    }

    pub fn catalog(&self) -> &PresetCatalog {
        &self.catalog
    }

    pub fn selected_preset_id(&self) -> &str {
        &self.selected_preset_id
    }

    pub fn mirror_active(&self) -> bool {
        self.mirror.is_active()
    }

    pub fn clock_running(&self) -> bool {
        self.clock.is_running()
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    /// Serves commands, clock ticks and mirror traffic until `Quit` arrives
    /// or every command sender is gone.
    pub async fn run(&mut self, commands: &mut mpsc::UnboundedReceiver<Command>) {
        let mut heartbeat = time::interval(LIVENESS_POLL);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Quit) | None => break,
                    Some(command) => self.handle(command),
                },
                _ = self.clock.tick() => self.on_clock_tick(),
                notice = self.mirror.recv() => match notice {
                    MirrorNotice::Control(action) => self.on_control_received(action),
                    MirrorNotice::Closed => self.on_mirror_closed(),
                },
                result = opened(&mut self.pending_open) => self.on_mirror_opened(result),
                _ = heartbeat.tick() => self.on_heartbeat(),
            }
        }
    }

    /// Stops the clock and closes any mirror.
    pub fn shutdown(&mut self) {
        self.unmount_timer();
        info!("Primary surface shut down");
    }

    /// Whether a mirror is being launched right now.
    pub fn mirror_opening(&self) -> bool {
        self.pending_open.is_some()
    }

    pub fn handle(&mut self, command: Command) {
        debug!("Command: {command:?}");
        match command {
            Command::Start
            | Command::Stop
            | Command::Reset
            | Command::Skip
            | Command::SwitchMode(_) => self.apply_timer_action(&command),
            Command::SelectPreset(id) => self.select_preset(&id),
            Command::ListPresets => self.print_presets(),
            Command::AddPreset { name, times, kind } => self.add_preset(name, times, kind),
            Command::EditPreset { id, times } => self.edit_preset(&id, times),
            Command::RemovePreset(id) => self.remove_preset(&id),
            Command::OpenMirror => self.open_mirror(),
            Command::CloseMirror => {
                if let Some(task) = self.pending_open.take() {
                    task.abort();
                    println!("\n🪞 Mirror launch cancelled");
                }
                if self.mirror.is_active() {
                    self.mirror.close();
                    self.on_mirror_closed();
                }
            }
            Command::SwitchRunMode(mode) => self.switch_run_mode(mode),
            Command::Status => self.print_status(),
            Command::Quit => {}
        }
    }

    /// A mirror request runs exactly like the same command typed locally.
    pub fn on_control_received(&mut self, action: ControlAction) {
        info!("Mirror requested {action:?}");
        self.apply_timer_action(&Command::from(action));
    }

    fn apply_timer_action(&mut self, command: &Command) {
        let Some(machine) = self.session.as_mut() else {
            println!("\nThe timer is not open; type `timer` first.");
            return;
        };
        let mut transition = None;
        match command {
            Command::Start => {
                if machine.start() {
                    self.clock.restart(true);
                }
            }
            Command::Stop => {
                machine.stop();
                self.clock.stop();
            }
            Command::Reset => {
                machine.reset();
                self.clock.stop();
            }
            Command::Skip => {
                transition = Some(machine.skip());
                self.clock.restart(machine.state().running);
            }
            Command::SwitchMode(mode) => {
                machine.switch_mode(*mode);
                self.clock.stop();
                println!(
                    "\n{} [{}] Switched to {} mode",
                    mode.emoji(),
                    stamp(),
                    mode.as_str()
                );
            }
            _ => return,
        }
        if let Some(transition) = transition {
            self.announce(&transition);
        }
        self.render_timer();
        self.push_state(true);
    }

    fn on_clock_tick(&mut self) {
        let Some(machine) = self.session.as_mut() else {
            self.clock.stop();
            return;
        };
        match self.clock.advance(machine) {
            TickOutcome::Idle => return,
            TickOutcome::Counted => {}
            TickOutcome::Expired(transition) => self.announce(&transition),
        }
        self.render_timer();
        self.push_state(false);
    }

    fn on_heartbeat(&mut self) {
        if self.mirror.poll_liveness() {
            self.on_mirror_closed();
        }
        if self.run_mode != RunMode::Focus {
            render_line(&format!(
                "{} {}  {}",
                self.run_mode.emoji(),
                self.run_mode.as_str(),
                stamp()
            ));
        }
    }

    fn on_mirror_closed(&mut self) {
        self.last_pushed = None;
        println!("\n🪞 [{}] Mirror closed", stamp());
    }

    fn announce(&self, transition: &Transition) {
        let Some(machine) = self.session.as_ref() else {
            return;
        };
        let minutes = duration_secs(transition.to, machine.preset()) / 60;
        let message = notify::transition_message(transition, minutes);
        println!("\n🔔 [{}] {message}", stamp());
        info!(
            "{:?} -> {:?} (auto-start: {}, completed: {})",
            transition.from,
            transition.to,
            transition.auto_started,
            machine.state().completed_focus_sessions
        );
        self.notifier.send(&message);
    }

    /// Sends the current snapshot to the mirror. Unforced pushes are skipped
    /// when nothing changed since the last one.
    fn push_state(&mut self, force: bool) {
        let (Some(handle), Some(machine)) = (self.mirror.handle(), self.session.as_ref()) else {
            return;
        };
        let snapshot = StateSnapshot::from(machine);
        if !force && self.last_pushed == Some(snapshot) {
            return;
        }
        if self.mirror.send(handle, &SyncMessage::StatePush(snapshot)) {
            self.last_pushed = Some(snapshot);
        } else {
            self.on_mirror_closed();
        }
    }

    /// Starts launching a mirror in the background. The link arrives later
    /// through [`Self::on_mirror_opened`].
    fn open_mirror(&mut self) {
        if self.session.is_none() {
            println!("\nThe mirror shows the focus timer; type `timer` first.");
            return;
        }
        if self.mirror.poll_liveness() {
            self.on_mirror_closed();
        }
        if self.mirror.is_active() {
            println!("\n🪞 Mirror already open");
            self.push_state(true);
            return;
        }
        if self.pending_open.is_some() {
            println!("\n🪞 Mirror is still opening");
            return;
        }
        let mut host = self.host.clone();
        let options = self.mirror_options.clone();
        self.pending_open = Some(tokio::spawn(async move { host.open(&options).await }));
        println!("\n🪞 [{}] Opening mirror...", stamp());
    }

    fn on_mirror_opened(&mut self, result: Result<MirrorLink, MirrorError>) {
        match result {
            Ok(mut link) => {
                if self.session.is_none() {
                    debug!("Timer unmounted while the mirror opened; closing it");
                    link.surface.close();
                    return;
                }
                let handle = self.mirror.install(link);
                println!("\n🪞 [{}] Mirror open", stamp());
                debug!("Mirror handle {handle:?}");
                self.push_state(true);
            }
            Err(e) => {
                warn!("Mirror unavailable: {e}");
                println!("\n⚠️  {e}");
                self.notifier.send(&e.to_string());
            }
        }
    }

    fn select_preset(&mut self, preset_id: &str) {
        if !self.catalog.contains(preset_id) {
            println!("\nNo preset {preset_id:?}; using Classic.");
        }
        let preset = self.catalog.resolve(preset_id);
        self.selected_preset_id = preset.id().to_string();
        self.persist(FieldMask::SELECTED_PRESET);
        println!("\n🍅 Preset: {} ({})", preset.name(), preset.summary());
        self.activate_selected();
    }

    fn add_preset(&mut self, name: String, times: PresetTimes, kind: PresetKind) {
        let preset = self.catalog.add(PresetDraft {
            name,
            kind,
            focus_minutes: times.focus,
            short_break_minutes: times.short_break,
            long_break_minutes: times.long_break,
            long_break_interval: times.interval,
            ..PresetDraft::default()
        });
        self.persist(FieldMask::PRESETS);
        println!(
            "\n➕ Added {} ({}) as {}",
            preset.name(),
            preset.summary(),
            preset.id()
        );
    }

    fn edit_preset(&mut self, preset_id: &str, times: PresetTimes) {
        let current = self.catalog.resolve(preset_id);
        let draft = PresetDraft {
            name: current.name().to_string(),
            description: current.description().to_string(),
            kind: current.kind(),
            focus_minutes: times.focus,
            short_break_minutes: times.short_break,
            long_break_minutes: times.long_break,
            long_break_interval: times.interval,
            auto_start_breaks: current.auto_start_breaks(),
            auto_start_focus: current.auto_start_focus(),
        };
        match self.catalog.update(preset_id, draft) {
            Ok(preset) => {
                self.persist(FieldMask::PRESETS);
                println!("\n✏️  {} is now {}", preset.name(), preset.summary());
                if self.selected_preset_id == preset_id {
                    self.activate_selected();
                }
            }
            Err(e) => println!("\n⚠️  {e}"),
        }
    }

    fn remove_preset(&mut self, preset_id: &str) {
        match self.catalog.remove(preset_id) {
            Ok(preset) => {
                println!("\n➖ Removed {}", preset.name());
                if self.selected_preset_id == preset_id {
                    self.selected_preset_id = CLASSIC_PRESET_ID.to_string();
                    self.persist(FieldMask::ALL);
                    self.activate_selected();
                } else {
                    self.persist(FieldMask::PRESETS);
                }
            }
            Err(e) => println!("\n⚠️  {e}"),
        }
    }

    fn activate_selected(&mut self) {
        let preset = self.catalog.resolve(&self.selected_preset_id);
        if let Some(machine) = self.session.as_mut() {
            machine.set_preset(preset);
            self.clock.stop();
            self.render_timer();
            self.push_state(true);
        }
    }

    fn persist(&self, mask: FieldMask) {
        let partial = PomodoroSettings {
            selected_preset_id: Some(self.selected_preset_id.clone()),
            presets: self.catalog.user_presets(),
        };
        if let Err(e) = self.settings.save_pomodoro_settings(&partial, mask) {
            warn!("Failed to save settings, keeping changes in memory: {e}");
        }
    }

    fn switch_run_mode(&mut self, mode: RunMode) {
        if mode == self.run_mode {
            return;
        }
        if self.run_mode == RunMode::Focus {
            self.unmount_timer();
        }
        self.run_mode = mode;
        println!("\n{} [{}] {} mode", mode.emoji(), stamp(), mode.as_str());
        if mode == RunMode::Focus {
            self.mount_timer();
        }
    }

    fn mount_timer(&mut self) {
        let preset = self.catalog.resolve(&self.selected_preset_id);
        info!("Mounting timer with preset {}", preset.id());
        self.session = Some(SessionStateMachine::new(preset));
        self.clock.stop();
        self.last_pushed = None;
    }

    fn unmount_timer(&mut self) {
        self.clock.stop();
        self.session = None;
        if let Some(task) = self.pending_open.take() {
            task.abort();
        }
        if self.mirror.is_active() {
            self.mirror.close();
            self.on_mirror_closed();
        }
    }

    fn render_timer(&self) {
        if let Some(machine) = self.session.as_ref() {
            let view = MirrorState::from(&StateSnapshot::from(machine));
            render_line(&status_line(machine.preset().name(), &view));
        }
    }

    fn print_status(&self) {
        match self.session.as_ref() {
            Some(machine) => {
                let state = machine.state();
                println!(
                    "\n{} {} | preset {} | {} focus sessions done | mirror {}",
                    state.mode.emoji(),
                    state.mode.as_str(),
                    machine.preset().name(),
                    state.completed_focus_sessions,
                    if self.mirror.is_active() { "open" } else { "closed" }
                );
                self.render_timer();
            }
            None => println!(
                "\n{} {} mode | preset {}",
                self.run_mode.emoji(),
                self.run_mode.as_str(),
                self.selected_preset_id
            ),
        }
    }

    fn print_presets(&self) {
        println!("\n--- Presets ---");
        for preset in self.catalog.all() {
            let marker = if preset.id() == self.selected_preset_id {
                "*"
            } else {
                " "
            };
            println!(
                "{marker} {:<14} {:<14} {:<10} {}",
                preset.id(),
                preset.name(),
                preset.kind().as_str(),
                preset.summary()
            );
        }
        println!("---------------");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timer_commands() {
        assert_eq!("start".parse::<Command>(), Ok(Command::Start));
        assert_eq!(" P ".parse::<Command>(), Ok(Command::Stop));
        assert_eq!(
            "long".parse::<Command>(),
            Ok(Command::SwitchMode(SessionMode::LongBreak))
        );
        assert_eq!("".parse::<Command>(), Ok(Command::Status));
        assert_eq!(
            "timer".parse::<Command>(),
            Ok(Command::SwitchRunMode(RunMode::Focus))
        );
    }

    #[test]
    fn parses_preset_commands() {
        assert_eq!(
            "add Deep 50 10 20 3 countdown".parse::<Command>(),
            Ok(Command::AddPreset {
                name: "Deep".into(),
                times: PresetTimes {
                    focus: 50,
                    short_break: 10,
                    long_break: 20,
                    interval: 3
                },
                kind: PresetKind::Countdown,
            })
        );
        assert_eq!(
            "edit custom-1 0 1 2 -1".parse::<Command>(),
            Ok(Command::EditPreset {
                id: "custom-1".into(),
                times: PresetTimes {
                    focus: 0,
                    short_break: 1,
                    long_break: 2,
                    interval: -1
                },
            })
        );
        assert_eq!(
            "add Deep 50 x 20 3".parse::<Command>(),
            Err(CommandError::Usage(ADD_USAGE))
        );
        assert_eq!(
            "preset".parse::<Command>(),
            Err(CommandError::Usage("preset <id>"))
        );
    }

    #[test]
    fn rejects_unknown_commands() {
        assert!(matches!(
            "dance".parse::<Command>(),
            Err(CommandError::Unknown(_))
        ));
        assert!(matches!(
            "start now".parse::<Command>(),
            Err(CommandError::Unknown(_))
        ));
    }

    #[test]
    fn control_actions_map_to_local_commands() {
        assert_eq!(Command::from(ControlAction::Reset), Command::Reset);
    }
}
