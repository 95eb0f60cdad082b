//! # capture-session
//!
//! A Rust library for capturing exploratory-testing sessions from a live browser
//! via the Chrome DevTools Protocol (CDP).
//!
//! ## Features
//!
//! - **Session Engine**: Polling loop that reconciles windows, detects screen
//!   transitions, and drains user operations and DOM mutations from the page
//! - **Window Registry**: Tracks every open window/tab and keeps a consistent
//!   current-window pointer as windows come and go
//! - **Shield**: Full-viewport overlay that holds user input while the engine
//!   is processing, including inside iframes
//! - **Replay**: Re-runs recorded operations (clicks, inputs, window switches,
//!   back/forward) against a live page, plus batch autofill
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use capture_session::{CaptureConfig, CaptureSession, ChromeClient, LaunchOptions, NullListener};
//!
//! # fn main() -> capture_session::Result<()> {
//! // Launch a browser and start capturing
//! let client = ChromeClient::launch(LaunchOptions::default())?;
//! let mut session = CaptureSession::new(client, CaptureConfig::default(), NullListener);
//!
//! session.start("https://example.com")?;
//! session.run()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Receiving captured data
//!
//! Everything the engine observes is delivered through a
//! [`CaptureEventListener`] implementation:
//!
//! ```rust,no_run
//! use capture_session::{CaptureEventListener, Operation};
//!
//! struct PrintListener;
//!
//! impl CaptureEventListener for PrintListener {
//!     fn on_operation(&self, operation: &Operation) {
//!         println!("{} on {}", operation.operation_type, operation.url);
//!     }
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`capture`]: The session engine, window registry, and normalizer
//! - [`webdriver`]: Browser client trait and the Chrome/CDP implementation
//! - [`script`]: Page-side instrumentation protocol and its data shapes
//! - [`events`]: Listener trait and event payloads
//! - [`operation`]: Captured records (operations, transitions, elements)
//! - [`config`]: Session configuration
//! - [`error`]: Error types and result aliases

pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod operation;
pub mod script;
pub mod webdriver;

pub use capture::{
    Browser, CaptureSession, OperationNormalizer, SHIELD_ID, StopHandle, TickOutcome,
    WindowContainer, WindowLifecycle,
};
pub use config::CaptureConfig;
pub use error::{CaptureError, Result};
pub use events::{
    BrowserHistoryState, CaptureEventListener, NullListener, ScreenMutation, WindowSummary,
    WindowsChangedEvent,
};
pub use operation::{
    ElementInfo, InputValueSet, Operation, ScreenElements, ScreenTransition,
    SpecialOperationType, TargetOperation, WindowHandle,
};
pub use script::{CaptureArch, ElementMutation, PageInstrumentation};
pub use webdriver::{ChromeClient, LaunchOptions, WebDriverClient};
