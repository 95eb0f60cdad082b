//! Canonical records emitted by the capture engine.
//!
//! Everything here is immutable once constructed: an [`Operation`] or
//! [`ScreenTransition`] describes one moment in the timeline and is handed
//! to consumers as-is.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque identifier for one browser window or tab, supplied by the
/// WebDriver layer. The engine references handles but never invents them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowHandle(String);

impl WindowHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WindowHandle {
    fn from(handle: &str) -> Self {
        Self(handle.to_string())
    }
}

impl From<String> for WindowHandle {
    fn from(handle: String) -> Self {
        Self(handle)
    }
}

/// Milliseconds since the Unix epoch, as assigned to captured records.
pub fn epoch_milliseconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Bounding rectangle of an element, in CSS pixels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingRect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

/// Scroll offset of a document at capture time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollPosition {
    pub x: f64,
    pub y: f64,
}

/// Viewport size of the capturing client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientSize {
    pub width: u32,
    pub height: u32,
}

/// Position and viewport of a nested browsing context, identified by the
/// zero-based index of its `iframe` element in the parent document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Iframe {
    pub index: usize,
    #[serde(default)]
    pub bounding_rect: BoundingRect,
    #[serde(default)]
    pub inner_height: u32,
    #[serde(default)]
    pub inner_width: u32,
    #[serde(default)]
    pub outer_height: u32,
    #[serde(default)]
    pub outer_width: u32,
}

/// Descriptor of a DOM element at capture time.
///
/// Multiple `ElementInfo` values may describe the same physical element
/// across polls; equality is therefore by XPath and iframe index, never by
/// content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementInfo {
    pub tagname: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// The element's own text, excluding text contributed by children.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_without_children: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Stable locator of the element within its document.
    pub xpath: String,

    /// Checked state for radio buttons and checkboxes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,

    #[serde(default)]
    pub attributes: HashMap<String, String>,

    #[serde(default)]
    pub bounding_rect: BoundingRect,

    #[serde(default)]
    pub inner_height: u32,
    #[serde(default)]
    pub inner_width: u32,
    #[serde(default)]
    pub outer_height: u32,
    #[serde(default)]
    pub outer_width: u32,

    /// Set when the element lives inside a nested browsing context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iframe: Option<Iframe>,
}

impl PartialEq for ElementInfo {
    fn eq(&self, other: &Self) -> bool {
        self.xpath == other.xpath
            && self.iframe.as_ref().map(|i| i.index) == other.iframe.as_ref().map(|i| i.index)
    }
}

/// Element snapshot of one document, grouped by originating iframe.
/// `iframe_index` of `None` denotes the top-level document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenElements {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iframe_index: Option<usize>,
    #[serde(default)]
    pub elements: Vec<ElementInfo>,
}

/// Reserved operation types synthesized by the engine rather than captured
/// from the page. Consumers must treat these as metadata-only: they carry
/// no element target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialOperationType {
    SwitchWindow,
    BrowserBack,
    BrowserForward,
    PauseCapturing,
    ResumeCapturing,
}

impl SpecialOperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialOperationType::SwitchWindow => "switch_window",
            SpecialOperationType::BrowserBack => "browser_back",
            SpecialOperationType::BrowserForward => "browser_forward",
            SpecialOperationType::PauseCapturing => "pause_capturing",
            SpecialOperationType::ResumeCapturing => "resume_capturing",
        }
    }

    /// Parse a wire operation type; `None` for page-originated types.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "switch_window" => Some(SpecialOperationType::SwitchWindow),
            "browser_back" => Some(SpecialOperationType::BrowserBack),
            "browser_forward" => Some(SpecialOperationType::BrowserForward),
            "pause_capturing" => Some(SpecialOperationType::PauseCapturing),
            "resume_capturing" => Some(SpecialOperationType::ResumeCapturing),
            _ => None,
        }
    }
}

impl fmt::Display for SpecialOperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record of one user or programmatic action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub input: String,

    /// Tag/event name of a page-originated action, or a reserved special
    /// type such as `switch_window`.
    #[serde(rename = "type")]
    pub operation_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_info: Option<ElementInfo>,

    #[serde(default)]
    pub scroll_position: ScrollPosition,

    #[serde(default)]
    pub client_size: ClientSize,

    pub title: String,
    pub url: String,

    /// Base64-encoded PNG screenshot taken around the time of the action.
    #[serde(default)]
    pub image_data: String,

    pub window_handle: WindowHandle,

    /// Milliseconds since epoch, assigned by the capturing context.
    pub timestamp: u64,

    #[serde(default)]
    pub screen_elements: Vec<ScreenElements>,

    #[serde(default)]
    pub page_source: String,
}

/// A detected navigation or window switch, recorded as a distinct artifact
/// from ordinary operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenTransition {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub image_data: String,
    pub window_handle: WindowHandle,
    pub timestamp: u64,
    #[serde(default)]
    pub page_source: String,
    #[serde(default)]
    pub screen_elements: Vec<ScreenElements>,
}

/// A recorded operation handed back to the engine for replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetOperation {
    #[serde(default)]
    pub input: String,
    #[serde(rename = "type")]
    pub operation_type: String,
    #[serde(default)]
    pub element_info: Option<ElementInfo>,
    #[serde(default)]
    pub scroll_position: ScrollPosition,
    #[serde(default)]
    pub client_size: ClientSize,
}

/// One autofill entry: the element to fill and the value to enter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputValueSet {
    pub xpath: String,
    pub input_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iframe_index: Option<usize>,
}
