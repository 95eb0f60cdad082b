//! Session engine: window tracking, reconciliation, normalization, and the
//! polling loop tying them together.

pub mod browser;
pub mod container;
pub mod engine;
pub mod normalizer;
pub mod window;

pub use browser::{Browser, SHIELD_ID, UpdateOutcome, WindowSnapshot, set_shield_in_all_frames};
pub use container::{WindowContainer, WindowLifecycle};
pub use engine::{CaptureSession, StopHandle, TickOutcome};
pub use normalizer::{CaptureContext, NormalizedCapture, OperationNormalizer};
pub use window::{ManagedWindow, ScreenTransitionHistory, collect_screen_elements_per_iframe};
