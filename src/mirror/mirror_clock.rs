use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::pomodoro::SessionMode;
use crate::pomodoro::clock::TICK_PERIOD;
use crate::ws::protocol::{ControlAction, StateSnapshot, SyncMessage};

/// What the mirror shows. Not authoritative: every push replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorState {
    pub mode: SessionMode,
    pub running: bool,
    pub seconds_remaining: u32,
    pub elapsed_seconds: u32,
    pub duration_seconds: u32,
    pub unbounded: bool,
}

impl Default for MirrorState {
    fn default() -> Self {
        Self {
            mode: SessionMode::Focus,
            running: false,
            seconds_remaining: 0,
            elapsed_seconds: 0,
            duration_seconds: 0,
            unbounded: false,
        }
    }
}

impl From<&StateSnapshot> for MirrorState {
    fn from(snapshot: &StateSnapshot) -> Self {
        Self {
            mode: snapshot.mode,
            running: snapshot.running,
            seconds_remaining: snapshot.seconds_remaining,
            elapsed_seconds: snapshot.elapsed_seconds,
            duration_seconds: snapshot.duration_seconds,
            unbounded: snapshot.unbounded,
        }
    }
}

/// Countdown that keeps the mirror moving between pushes.
#[derive(Debug)]
pub struct DetachedMirrorClock {
    state: MirrorState,
    synced: bool,
    period: Duration,
    tick_handle: Option<Interval>,
}

impl Default for DetachedMirrorClock {
    fn default() -> Self {
        Self::new(TICK_PERIOD)
    }
}

impl DetachedMirrorClock {
    pub fn new(period: Duration) -> Self {
        Self {
            state: MirrorState::default(),
            synced: false,
            period,
            tick_handle: None,
        }
    }

    pub fn state(&self) -> &MirrorState {
        &self.state
    }

    /// Whether any push has arrived yet.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn is_ticking(&self) -> bool {
        self.tick_handle.is_some()
    }

    /// Reconciles with an authoritative push: overwrite everything, then
    /// re-anchor the local loop on the push.
    pub fn apply(&mut self, snapshot: &StateSnapshot) {
        self.state = MirrorState::from(snapshot);
        self.synced = true;
        self.restart_loop();
    }

    /// Optimistic local update for a button press, plus the request to send.
    pub fn press(&mut self, action: ControlAction) -> SyncMessage {
        match action {
            ControlAction::Start => self.state.running = true,
            ControlAction::Stop => self.state.running = false,
            ControlAction::Reset => {
                self.state.running = false;
                self.state.elapsed_seconds = 0;
                if !self.state.unbounded {
                    self.state.seconds_remaining = self.state.duration_seconds;
                }
            }
        }
        let already_counting = action == ControlAction::Start && self.tick_handle.is_some();
        if !already_counting {
            self.restart_loop();
        }
        SyncMessage::Control { action }
    }

    /// Resolves on the next local tick; never resolves while stopped.
    pub async fn tick(&mut self) {
        match self.tick_handle.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Local extrapolation of one period. Holds at zero until the primary
    /// says what comes next.
    pub fn advance(&mut self) {
        if !self.state.running {
            return;
        }
        if self.state.unbounded {
            self.state.elapsed_seconds = self.state.elapsed_seconds.saturating_add(1);
        } else if self.state.seconds_remaining > 0 {
            self.state.seconds_remaining -= 1;
            self.state.elapsed_seconds = self.state.elapsed_seconds.saturating_add(1);
        }
    }

    pub fn stop(&mut self) {
        self.tick_handle = None;
    }

    fn restart_loop(&mut self) {
        if self.state.running {
            let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.tick_handle = Some(ticker);
        } else {
            self.tick_handle = None;
        }
    }
}

/// `MM:SS`, or `H:MM:SS` past the hour.
pub fn format_clock(seconds: u32) -> String {
    let (hours, minutes, secs) = (seconds / 3600, (seconds / 60) % 60, seconds % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

pub fn status_line(title: &str, state: &MirrorState) -> String {
    let shown = if state.unbounded {
        format!("+{}", format_clock(state.elapsed_seconds))
    } else {
        format_clock(state.seconds_remaining)
    };
    let flag = if state.running { "▶" } else { "⏸" };
    format!(
        "{} {title} | {} {shown} {flag}",
        state.mode.emoji(),
        state.mode.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(seconds_remaining: u32, running: bool) -> StateSnapshot {
        StateSnapshot {
            seconds_remaining,
            running,
            mode: SessionMode::Focus,
            elapsed_seconds: 1500 - seconds_remaining,
            duration_seconds: 1500,
            unbounded: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn applying_same_push_twice_is_a_no_op() {
        let mut clock = DetachedMirrorClock::default();
        clock.apply(&snapshot(600, true));
        let once = *clock.state();
        clock.apply(&snapshot(600, true));
        assert_eq!(*clock.state(), once);
        assert!(clock.is_ticking());
    }

    #[tokio::test(start_paused = true)]
    async fn local_loop_extrapolates_between_pushes() {
        let mut clock = DetachedMirrorClock::default();
        clock.apply(&snapshot(600, true));
        for _ in 0..3 {
            clock.tick().await;
            clock.advance();
        }
        assert_eq!(clock.state().seconds_remaining, 597);

        clock.apply(&snapshot(599, true));
        assert_eq!(clock.state().seconds_remaining, 599);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_push_stops_the_loop() {
        let mut clock = DetachedMirrorClock::default();
        clock.apply(&snapshot(600, true));
        clock.apply(&snapshot(600, false));
        assert!(!clock.is_ticking());
        let waited = time::timeout(Duration::from_secs(5), clock.tick()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn extrapolation_holds_at_zero() {
        let mut clock = DetachedMirrorClock::default();
        clock.apply(&snapshot(1, true));
        clock.advance();
        clock.advance();
        assert_eq!(clock.state().seconds_remaining, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn presses_update_optimistically() {
        let mut clock = DetachedMirrorClock::default();
        clock.apply(&snapshot(1200, false));

        let message = clock.press(ControlAction::Start);
        assert_eq!(
            message,
            SyncMessage::Control {
                action: ControlAction::Start
            }
        );
        assert!(clock.state().running);
        assert!(clock.is_ticking());

        clock.press(ControlAction::Reset);
        assert!(!clock.state().running);
        assert!(!clock.is_ticking());
        assert_eq!(clock.state().seconds_remaining, 1500);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_sessions_count_up() {
        let mut clock = DetachedMirrorClock::default();
        clock.apply(&StateSnapshot {
            seconds_remaining: 0,
            running: true,
            mode: SessionMode::Focus,
            elapsed_seconds: 42,
            duration_seconds: 0,
            unbounded: true,
        });
        clock.advance();
        assert_eq!(clock.state().elapsed_seconds, 43);
        assert!(status_line("t", clock.state()).contains("+00:43"));
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(300), "05:00");
        assert_eq!(format_clock(5400), "1:30:00");
    }
}
