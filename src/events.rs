//! Listener seam between the capture engine and its embedder.
//!
//! The engine pushes everything it observes through a [`CaptureEventListener`]
//! passed in at construction time. Errors raised inside the polling loop are
//! reported through [`CaptureEventListener::on_error`] rather than unwinding,
//! so the embedder decides whether a given failure ends the session.

use crate::error::CaptureError;
use crate::operation::{Operation, ScreenTransition, WindowHandle};
use crate::script::ElementMutation;
use serde::{Deserialize, Serialize};

/// A batch of DOM mutations observed on one screen, attributed to the
/// operation that most recently preceded them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScreenMutation {
    pub element_mutations: Vec<ElementMutation>,

    /// Capture-time timestamp in epoch milliseconds.
    pub timestamp: u64,

    /// Screenshot of the screen the mutations occurred on, as a data URL.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub image_data: String,

    pub window_handle: WindowHandle,

    pub title: String,

    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub scroll_position: Option<crate::operation::ScrollPosition>,
}

/// One entry in a windows-changed notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WindowSummary {
    pub window_handle: WindowHandle,

    pub url: String,

    pub title: String,
}

/// Emitted whenever the set of open windows or the current window changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WindowsChangedEvent {
    pub windows: Vec<WindowSummary>,

    pub current_window_handle: WindowHandle,

    /// True when the current window's host name differs from the host
    /// observed before this change.
    pub current_window_host_name_changed: bool,
}

/// Whether browser-history navigation is currently possible in each
/// direction for the current window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BrowserHistoryState {
    pub can_go_back: bool,

    pub can_go_forward: bool,
}

/// Callbacks the engine invokes as it captures. Every method has an empty
/// default so embedders implement only what they consume.
pub trait CaptureEventListener {
    /// A user operation (or synthesized special operation) was captured.
    fn on_operation(&self, operation: &Operation) {
        let _ = operation;
    }

    /// The current window navigated to a different screen.
    fn on_screen_transition(&self, transition: &ScreenTransition) {
        let _ = transition;
    }

    /// DOM mutations were observed without an accompanying navigation.
    fn on_mutation(&self, mutation: &ScreenMutation) {
        let _ = mutation;
    }

    /// Back/forward availability changed for the current window.
    fn on_history_changed(&self, state: BrowserHistoryState) {
        let _ = state;
    }

    /// The set of open windows or the current window changed.
    fn on_windows_changed(&self, event: &WindowsChangedEvent) {
        let _ = event;
    }

    /// A modal dialog appeared or disappeared in the current window.
    fn on_alert_visibility_changed(&self, visible: bool) {
        let _ = visible;
    }

    /// All browser windows are gone; the session is over.
    fn on_browser_closed(&self) {}

    /// The polling loop hit an error. Fatal errors end the session after
    /// this callback returns; transient ones are retried next tick.
    fn on_error(&self, error: &CaptureError) {
        let _ = error;
    }
}

/// Listener that discards every event. Useful for replay-only sessions
/// and as a test double.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl CaptureEventListener for NullListener {}
