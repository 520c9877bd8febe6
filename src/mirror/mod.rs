pub mod client;
pub mod mirror_clock;

pub use client::run_mirror;
pub use mirror_clock::{DetachedMirrorClock, MirrorState};
