//! The contract between the engine and the in-page instrumentation layer.
//!
//! The injected script buffers user events and DOM mutations per document
//! and exposes a small set of functions the engine calls over the remote
//! protocol. This module defines those call shapes ([`PageInstrumentation`])
//! and the data that crosses the boundary. The page side of the contract
//! lives in `capture.js`.

use crate::error::Result;
use crate::operation::{
    ClientSize, ElementInfo, Iframe, ScreenElements, ScrollPosition, WindowHandle,
};
use serde::{Deserialize, Serialize};

/// How captured items leave the page: drained by the engine's polling loop,
/// or pushed out-of-band by the page itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureArch {
    Polling,
    Push,
}

/// Inline style of the blocking overlay installed by the shield.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShieldStyle {
    pub position: String,
    pub z_index: String,
    pub width: String,
    pub height: String,
    pub opacity: String,
    pub background_color: String,
}

impl Default for ShieldStyle {
    fn default() -> Self {
        Self {
            position: "absolute".to_string(),
            z_index: "2147483647".to_string(),
            width: "100%".to_string(),
            height: "100%".to_string(),
            opacity: "0.6".to_string(),
            background_color: "#333".to_string(),
        }
    }
}

/// Arguments for arming focus-change detection in a window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSwitchDetection {
    pub window_handle: WindowHandle,
    pub shield_id: String,
    pub shield_style: ShieldStyle,
    pub is_shield_enabled: bool,
}

/// A DOM event whose default action was deliberately blocked, carrying
/// enough information to be re-fired against the live DOM afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInfo {
    pub id: String,
    pub target_x_path: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub bubbles: bool,
    #[serde(default)]
    pub cancelable: bool,
}

/// The suspension wrapper around a captured event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspendedEvent {
    pub refire_type: String,
    pub event_info: EventInfo,
}

/// The raw action payload reported by the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedOperation {
    #[serde(default)]
    pub input: String,
    #[serde(rename = "type")]
    pub operation_type: String,
    pub element_info: ElementInfo,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub scroll_position: ScrollPosition,
    pub timestamp: u64,
}

/// A raw, not-yet-normalized user action reported by the instrumentation
/// layer. `suspended_event` is absent for items registered out-of-band
/// (push architecture).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedItem {
    pub operation: CapturedOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iframe: Option<Iframe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended_event: Option<SuspendedEvent>,
}

/// Locator of a mutated node: XPath plus the iframe index when the node
/// lives inside a nested browsing context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementLocator {
    pub xpath: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iframe: Option<usize>,
}

/// Descriptor of an element added by a mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutatedElement {
    pub tagname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub xpath: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(default)]
    pub attributes: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub outer_html: String,
}

/// One DOM change observed since the last poll.
///
/// Mutations are ephemeral: captured, forwarded, and not retained by the
/// engine itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ElementMutation {
    #[serde(rename_all = "camelCase")]
    ChildElementAddition {
        target_element: ElementLocator,
        added_child_element: MutatedElement,
    },
    #[serde(rename_all = "camelCase")]
    ChildElementRemoval {
        target_element: ElementLocator,
        removed_child_element: ElementLocator,
    },
    #[serde(rename_all = "camelCase")]
    TextContentAddition {
        target_element: ElementLocator,
        added_text_content: String,
    },
    #[serde(rename_all = "camelCase")]
    TextContentRemoval {
        target_element: ElementLocator,
        removed_text_content: String,
    },
    #[serde(rename_all = "camelCase")]
    TextContentChange {
        target_element: ElementLocator,
        old_value: String,
    },
    #[serde(rename_all = "camelCase")]
    AttributeAddition {
        target_element: ElementLocator,
        attribute_name: String,
        new_value: String,
    },
    #[serde(rename_all = "camelCase")]
    AttributeRemoval {
        target_element: ElementLocator,
        attribute_name: String,
        old_value: String,
    },
    #[serde(rename_all = "camelCase")]
    AttributeChange {
        target_element: ElementLocator,
        attribute_name: String,
        new_value: String,
        old_value: String,
    },
}

/// A batch of mutations with the scroll context active at capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedMutation {
    pub timestamp: u64,
    pub element_mutations: Vec<ElementMutation>,
    #[serde(default)]
    pub scroll_position: ScrollPosition,
}

/// Request shape for [`PageInstrumentation::capture_data`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureDataRequest {
    pub capture_arch: CaptureArch,
    pub shield_id: String,
    /// Index of the nested browsing context being drained, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iframe_index: Option<usize>,
}

/// Everything drained from one document in one poll: buffered captured
/// events, a fresh element snapshot, and buffered DOM mutations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureDump {
    #[serde(default)]
    pub captured_items: Vec<CapturedItem>,
    #[serde(default)]
    pub screen_elements: Vec<ScreenElements>,
    #[serde(default)]
    pub mutated_items: Vec<CapturedMutation>,
    #[serde(default)]
    pub client_size: ClientSize,
}

impl CaptureDump {
    /// Fold a dump drained from a nested browsing context into this one,
    /// attributing its items to the given iframe index.
    pub fn merge_frame(&mut self, mut frame: CaptureDump, iframe_index: usize) {
        for item in &mut frame.captured_items {
            let iframe = item.iframe.get_or_insert_with(Iframe::default);
            iframe.index = iframe_index;
            iframe.inner_width = frame.client_size.width;
            iframe.inner_height = frame.client_size.height;
        }
        self.captured_items.append(&mut frame.captured_items);

        for mut group in frame.screen_elements {
            group.iframe_index = Some(iframe_index);
            self.screen_elements.push(group);
        }

        for batch in &mut frame.mutated_items {
            for mutation in &mut batch.element_mutations {
                set_mutation_iframe(mutation, iframe_index);
            }
        }
        self.mutated_items.append(&mut frame.mutated_items);
    }

    pub fn is_empty(&self) -> bool {
        self.captured_items.is_empty() && self.mutated_items.is_empty()
    }
}

fn set_mutation_iframe(mutation: &mut ElementMutation, iframe_index: usize) {
    let target = match mutation {
        ElementMutation::ChildElementAddition { target_element, .. }
        | ElementMutation::ChildElementRemoval { target_element, .. }
        | ElementMutation::TextContentAddition { target_element, .. }
        | ElementMutation::TextContentRemoval { target_element, .. }
        | ElementMutation::TextContentChange { target_element, .. }
        | ElementMutation::AttributeAddition { target_element, .. }
        | ElementMutation::AttributeRemoval { target_element, .. }
        | ElementMutation::AttributeChange { target_element, .. } => target_element,
    };
    target.iframe = Some(iframe_index);
}

/// The call contract implemented by code injected into the page.
///
/// Each function addresses the document the client currently has in
/// context (top document or a frame selected via the WebDriver layer).
/// Navigation destroys all injected state, so every call must tolerate a
/// fresh document and re-install what it needs.
pub trait PageInstrumentation {
    /// Install baseline guard machinery in a fresh document. Idempotent per
    /// document lifetime.
    fn init_guard(&self, shield_style: &ShieldStyle) -> Result<bool>;

    /// Arm focus-change detection for a window.
    fn arm_window_switch_detection(&self, detection: &WindowSwitchDetection) -> Result<()>;

    /// Drain buffered captured events and DOM mutations, and take a fresh
    /// element snapshot. Buffers are cleared; the caller is responsible for
    /// draining frequently enough that page-side buffers do not fill.
    fn capture_data(&self, request: &CaptureDataRequest) -> Result<CaptureDump>;

    /// Install the blocking overlay in the current document.
    fn attach_shield(&self, shield_id: &str) -> Result<()>;

    /// Remove the blocking overlay from the current document.
    fn detach_shield(&self, shield_id: &str) -> Result<()>;

    /// Release operations that were suppressed while the shield was up.
    fn unblock_user_operations(&self, window_handle: &WindowHandle, shield_id: &str) -> Result<()>;

    /// Toggle the shield in the current document only. Window-wide toggles
    /// traverse every frame and call this per document.
    fn set_shield_in_document(&self, enabled: bool) -> Result<()>;

    /// Stop buffering captured items at the source.
    fn pause_capturing(&self) -> Result<()>;

    /// Resume buffering captured items.
    fn resume_capturing(&self) -> Result<()>;

    fn capturing_is_paused(&self) -> Result<bool>;

    /// Ground-truth read of which window currently has input focus; `None`
    /// when no captured window has focus.
    fn browsing_window_handle(&self) -> Result<Option<WindowHandle>>;

    /// Replay a previously suspended DOM event against its original target.
    fn refire_event(&self, event: &EventInfo) -> Result<()>;

    /// Snapshot the visible elements of the current document.
    fn collect_screen_elements(&self) -> Result<Vec<ElementInfo>>;

    /// Number of nested browsing contexts in the current document.
    fn iframe_count(&self) -> Result<usize>;

    /// Mark the given window's document as the focused one.
    fn focus_window(&self, window_handle: &WindowHandle) -> Result<()>;
}
