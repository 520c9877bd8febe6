use log::warn;
use notify_rust::Notification;

use crate::pomodoro::{SessionMode, Transition};

/// Desktop notifications. A disabled notifier swallows everything.
#[derive(Debug, Clone, Copy)]
pub struct Notifier {
    enabled: bool,
}

impl Notifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn send(&self, message: &str) {
        if !self.enabled {
            return;
        }
        if let Err(e) = send_notification(message) {
            warn!("Failed to send notification: {e}");
        }
    }
}

fn send_notification(message: &str) -> Result<(), Box<dyn std::error::Error>> {
    Notification::new()
        .summary("tick_it")
        .body(message)
        .timeout(0) // No auto-dismiss
        .show()?;
    Ok(())
}

pub fn transition_message(transition: &Transition, next_minutes: u32) -> String {
    match transition.to {
        SessionMode::Focus => "Break is over! Back to focus.".to_string(),
        SessionMode::ShortBreak => {
            format!("Focus session complete! Time for a {next_minutes}-minute break.")
        }
        SessionMode::LongBreak => {
            format!("Focus cycle complete! Enjoy a {next_minutes}-minute long break.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_next_break() {
        let transition = Transition {
            from: SessionMode::Focus,
            to: SessionMode::LongBreak,
            auto_started: true,
        };
        assert!(transition_message(&transition, 15).contains("15-minute long break"));
    }
}
