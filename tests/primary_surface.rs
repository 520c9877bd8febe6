use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time;

use tick_it::app::PresetTimes;
use tick_it::pomodoro::{PresetKind, SessionMode};
use tick_it::settings::{MemorySettings, SettingsRepository};
use tick_it::ws::loopback::{LoopbackHost, LoopbackSurface};
use tick_it::ws::{ControlAction, StateSnapshot, SurfaceHost, SyncMessage};
use tick_it::{Command, PrimaryConfig, PrimarySurface, RunMode};

fn quiet() -> PrimaryConfig {
    PrimaryConfig {
        notifications: false,
        ..PrimaryConfig::default()
    }
}

fn last_push(mirror: &mut LoopbackSurface) -> Option<StateSnapshot> {
    mirror
        .drain()
        .into_iter()
        .filter_map(|message| match message {
            SyncMessage::StatePush(snapshot) => Some(snapshot),
            SyncMessage::Control { .. } => None,
        })
        .last()
}

/// Lets the primary loop run for `millis` of (paused) time.
async fn settle<H: SurfaceHost, S: SettingsRepository>(
    primary: &mut PrimarySurface<H, S>,
    rx: &mut mpsc::UnboundedReceiver<Command>,
    millis: u64,
) {
    let _ = time::timeout(Duration::from_millis(millis), primary.run(rx)).await;
}

#[tokio::test(start_paused = true)]
async fn mirror_follows_the_session_and_relays_controls() {
    let (host, mut surfaces) = LoopbackHost::new();
    let mut primary = PrimarySurface::new(host, MemorySettings::new(), quiet());
    let (_commands, mut rx) = mpsc::unbounded_channel();

    primary.handle(Command::OpenMirror);
    settle(&mut primary, &mut rx, 10).await;
    assert!(primary.mirror_active());
    assert!(!primary.mirror_opening());
    let mut mirror = surfaces.try_recv().unwrap();
    assert_eq!(mirror.title, "tick_it");

    let opened = last_push(&mut mirror).unwrap();
    assert_eq!(opened.mode, SessionMode::Focus);
    assert_eq!(opened.seconds_remaining, 25 * 60);
    assert!(!opened.running);

    mirror.press(ControlAction::Start);
    settle(&mut primary, &mut rx, 500).await;
    assert!(primary.session().unwrap().state().running);
    assert!(primary.clock_running());
    let started = last_push(&mut mirror).unwrap();
    assert!(started.running);
    assert_eq!(started.seconds_remaining, 25 * 60);

    settle(&mut primary, &mut rx, 3_200).await;
    let counted = last_push(&mut mirror).unwrap();
    assert_eq!(counted.seconds_remaining, 25 * 60 - 3);

    mirror.press(ControlAction::Stop);
    settle(&mut primary, &mut rx, 100).await;
    assert!(!primary.session().unwrap().state().running);
    assert!(!primary.clock_running());
    assert!(!last_push(&mut mirror).unwrap().running);
}

#[tokio::test(start_paused = true)]
async fn commands_are_served_while_a_mirror_is_opening() {
    let (host, mut surfaces) = LoopbackHost::delayed(Duration::from_secs(2));
    let mut primary = PrimarySurface::new(host, MemorySettings::new(), quiet());
    let (commands, mut rx) = mpsc::unbounded_channel();
    commands.send(Command::OpenMirror).unwrap();
    commands.send(Command::Start).unwrap();

    settle(&mut primary, &mut rx, 500).await;
    assert!(primary.session().unwrap().state().running);
    assert!(primary.clock_running());
    assert!(primary.mirror_opening());
    assert!(!primary.mirror_active());

    settle(&mut primary, &mut rx, 2_000).await;
    assert!(primary.mirror_active());
    assert!(!primary.mirror_opening());

    let mut mirror = surfaces.try_recv().unwrap();
    match mirror.recv().await {
        Some(SyncMessage::StatePush(snapshot)) => assert!(snapshot.running),
        other => panic!("expected a state push, got {other:?}"),
    }
    let latest = last_push(&mut mirror).unwrap();
    assert_eq!(latest.seconds_remaining, 25 * 60 - 2);
}

#[tokio::test(start_paused = true)]
async fn leaving_the_timer_cancels_a_pending_mirror() {
    let (host, _surfaces) = LoopbackHost::delayed(Duration::from_secs(2));
    let mut primary = PrimarySurface::new(host, MemorySettings::new(), quiet());
    let (_commands, mut rx) = mpsc::unbounded_channel();

    primary.handle(Command::OpenMirror);
    settle(&mut primary, &mut rx, 100).await;
    assert!(primary.mirror_opening());

    primary.handle(Command::SwitchRunMode(RunMode::Home));
    assert!(!primary.mirror_opening());
    settle(&mut primary, &mut rx, 3_000).await;
    assert!(!primary.mirror_active());
}

#[tokio::test(start_paused = true)]
async fn silently_closed_mirror_is_dropped() {
    let (host, mut surfaces) = LoopbackHost::new();
    let mut primary = PrimarySurface::new(host, MemorySettings::new(), quiet());
    let (_commands, mut rx) = mpsc::unbounded_channel();

    primary.handle(Command::OpenMirror);
    settle(&mut primary, &mut rx, 10).await;
    let mut mirror = surfaces.try_recv().unwrap();
    mirror.drain();

    mirror.vanish();
    settle(&mut primary, &mut rx, 1_100).await;
    assert!(!primary.mirror_active());

    primary.handle(Command::Start);
    assert!(primary.session().unwrap().state().running);
    assert!(mirror.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn close_notice_deactivates_the_mirror() {
    let (host, mut surfaces) = LoopbackHost::new();
    let mut primary = PrimarySurface::new(host, MemorySettings::new(), quiet());
    let (_commands, mut rx) = mpsc::unbounded_channel();

    primary.handle(Command::OpenMirror);
    settle(&mut primary, &mut rx, 10).await;
    let mirror = surfaces.try_recv().unwrap();
    mirror.close();
    settle(&mut primary, &mut rx, 100).await;
    assert!(!primary.mirror_active());

    primary.handle(Command::OpenMirror);
    settle(&mut primary, &mut rx, 10).await;
    assert!(primary.mirror_active());
    assert!(surfaces.try_recv().unwrap().is_open());
}

#[tokio::test(start_paused = true)]
async fn timer_works_without_detached_views() {
    let mut primary =
        PrimarySurface::new(LoopbackHost::unsupported(), MemorySettings::new(), quiet());
    let (_commands, mut rx) = mpsc::unbounded_channel();

    primary.handle(Command::OpenMirror);
    settle(&mut primary, &mut rx, 10).await;
    assert!(!primary.mirror_active());
    assert!(!primary.mirror_opening());

    primary.handle(Command::Start);
    assert!(primary.session().unwrap().state().running);
    assert!(primary.clock_running());
}

#[tokio::test(start_paused = true)]
async fn unavailable_settings_fall_back_to_builtins() {
    let (host, _surfaces) = LoopbackHost::new();
    let mut primary = PrimarySurface::new(host, MemorySettings::failing(), quiet());
    assert_eq!(primary.selected_preset_id(), "classic");
    assert_eq!(primary.catalog().all().len(), 7);

    primary.handle(Command::SelectPreset("short".to_string()));
    assert_eq!(primary.selected_preset_id(), "short");
    assert_eq!(
        primary.session().unwrap().state().seconds_remaining,
        15 * 60
    );
}

#[tokio::test(start_paused = true)]
async fn stored_selection_is_restored_and_changes_are_saved() {
    let (host, _surfaces) = LoopbackHost::new();
    let settings = MemorySettings::with_document(json!({
        "selectedPresetId": "animedoro",
        "theme": "dark"
    }));
    let mut primary = PrimarySurface::new(host, settings, quiet());
    assert_eq!(primary.selected_preset_id(), "animedoro");
    assert_eq!(primary.session().unwrap().preset().id(), "animedoro");

    primary.handle(Command::SelectPreset("52-17".to_string()));
    primary.handle(Command::AddPreset {
        name: "Reading".to_string(),
        times: PresetTimes {
            focus: 40,
            short_break: 10,
            long_break: 20,
            interval: 3,
        },
        kind: PresetKind::Custom,
    });

    let saved = primary.settings().snapshot();
    assert_eq!(saved["selectedPresetId"], "52-17");
    assert_eq!(saved["theme"], "dark");
    assert_eq!(saved["presets"].as_array().unwrap().len(), 1);
    assert_eq!(saved["presets"][0]["name"], "Reading");
    assert_eq!(saved["presets"][0]["focusMinutes"], 40);
}

#[tokio::test(start_paused = true)]
async fn unknown_stored_selection_degrades_to_classic() {
    let (host, _surfaces) = LoopbackHost::new();
    let settings = MemorySettings::with_document(json!({ "selectedPresetId": "gone" }));
    let primary = PrimarySurface::new(host, settings, quiet());
    assert_eq!(primary.selected_preset_id(), "classic");
}

#[tokio::test(start_paused = true)]
async fn leaving_the_timer_unmounts_it() {
    let (host, mut surfaces) = LoopbackHost::new();
    let mut primary = PrimarySurface::new(host, MemorySettings::new(), quiet());
    let (_commands, mut rx) = mpsc::unbounded_channel();

    primary.handle(Command::OpenMirror);
    settle(&mut primary, &mut rx, 10).await;
    let mirror = surfaces.try_recv().unwrap();
    primary.handle(Command::Start);

    primary.handle(Command::SwitchRunMode(RunMode::Home));
    assert_eq!(primary.run_mode(), RunMode::Home);
    assert!(primary.session().is_none());
    assert!(!primary.clock_running());
    assert!(!primary.mirror_active());
    assert!(!mirror.is_open());

    primary.handle(Command::OpenMirror);
    assert!(!primary.mirror_opening());
    assert!(!primary.mirror_active());

    primary.handle(Command::SwitchRunMode(RunMode::Focus));
    let state = primary.session().unwrap().state();
    assert_eq!(state.mode, SessionMode::Focus);
    assert_eq!(state.seconds_remaining, 25 * 60);
    assert!(!state.running);
}

#[tokio::test(start_paused = true)]
async fn classic_focus_rolls_into_an_auto_started_break() {
    let (host, _surfaces) = LoopbackHost::new();
    let mut primary = PrimarySurface::new(host, MemorySettings::new(), quiet());
    let (_commands, mut rx) = mpsc::unbounded_channel();

    primary.handle(Command::Start);
    settle(&mut primary, &mut rx, 1_500_500).await;

    let state = primary.session().unwrap().state();
    assert_eq!(state.mode, SessionMode::ShortBreak);
    assert_eq!(state.seconds_remaining, 5 * 60);
    assert_eq!(state.completed_focus_sessions, 1);
    assert!(state.running);
    assert!(primary.clock_running());
}

#[tokio::test(start_paused = true)]
async fn quit_ends_the_loop() {
    let (host, _surfaces) = LoopbackHost::new();
    let mut primary = PrimarySurface::new(host, MemorySettings::new(), quiet());
    let (commands, mut rx) = mpsc::unbounded_channel();
    commands.send(Command::Start).unwrap();
    commands.send(Command::Quit).unwrap();

    let finished = time::timeout(Duration::from_secs(5), primary.run(&mut rx)).await;
    assert!(finished.is_ok());
    primary.shutdown();
    assert!(primary.session().is_none());
}
