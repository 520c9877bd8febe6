pub mod clock;
#[allow(clippy::module_inception)]
pub mod pomodoro;
pub mod preset;

pub use clock::SessionClock;
pub use pomodoro::{SessionMode, SessionState, SessionStateMachine, TickOutcome, Transition};
pub use preset::{Preset, PresetCatalog, PresetDraft, PresetError, PresetKind};
