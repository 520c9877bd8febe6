use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use super::pomodoro::{SessionStateMachine, TickOutcome};

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Fixed-period tick source for the primary surface.
///
/// The interval lives only while the session runs. Deadlines are laid out
/// from the moment the clock starts (`start + n * period`), so a slow tick
/// never pushes the following ones back.
#[derive(Debug)]
pub struct SessionClock {
    period: Duration,
    ticker: Option<Interval>,
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new(TICK_PERIOD)
    }
}

impl SessionClock {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            ticker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn start(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        self.ticker = Some(ticker);
    }

    pub fn stop(&mut self) {
        self.ticker = None;
    }

    /// Start or stop so the clock matches the session's `running` flag.
    pub fn follow(&mut self, running: bool) {
        if running {
            self.start();
        } else {
            self.stop();
        }
    }

    /// Stop and, if the session still runs, start again with a fresh phase.
    pub fn restart(&mut self, running: bool) {
        self.stop();
        self.follow(running);
    }

    /// Resolves on the next tick; never resolves while stopped.
    pub async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Applies one elapsed period to `machine`.
    ///
    /// On expiry the clock stops itself, so the expiry is reported once, and
    /// it comes back only if the preset auto-starts the next mode.
    pub fn advance(&mut self, machine: &mut SessionStateMachine) -> TickOutcome {
        let outcome = machine.tick();
        match outcome {
            TickOutcome::Idle => self.stop(),
            TickOutcome::Counted => {}
            TickOutcome::Expired(_) => self.restart(machine.state().running),
        }
        outcome
    }
}
