pub mod app;
pub mod mirror;
pub mod notify;
pub mod pomodoro;
pub mod settings;
pub mod ws;

pub use app::{Command, PrimaryConfig, PrimarySurface, RunMode};
