//! Per-window state: screen summary, navigation history, and capture
//! helpers that need the client positioned on this window.

use crate::error::{CaptureError, Result};
use crate::events::BrowserHistoryState;
use crate::operation::{
    ClientSize, Operation, ScreenElements, ScreenTransition, ScrollPosition,
    SpecialOperationType, WindowHandle, epoch_milliseconds,
};
use crate::script::PageInstrumentation;
use crate::webdriver::{FrameLockGuard, WebDriverClient};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use url::Url;

/// Linear history of screens visited in one window. Back/forward moves the
/// position and locks the history so the resulting navigation is not
/// recorded as a fresh entry.
#[derive(Debug, Default, Clone)]
pub struct ScreenTransitionHistory {
    entries: Vec<String>,
    position: Option<usize>,
    locked: bool,
}

impl ScreenTransitionHistory {
    /// Record a newly visited url, discarding any forward entries.
    pub fn push(&mut self, url: String) {
        if let Some(position) = self.position {
            self.entries.truncate(position + 1);
        }
        self.entries.push(url);
        self.position = Some(self.entries.len() - 1);
    }

    pub fn can_go_back(&self) -> bool {
        matches!(self.position, Some(position) if position > 0)
    }

    pub fn can_go_forward(&self) -> bool {
        matches!(self.position, Some(position) if position + 1 < self.entries.len())
    }

    /// Step back. The next observed navigation is attributed to this move
    /// instead of being pushed as a new entry.
    pub fn back(&mut self) -> Option<&str> {
        if !self.can_go_back() {
            return None;
        }
        let position = self.position? - 1;
        self.position = Some(position);
        self.locked = true;
        self.entries.get(position).map(String::as_str)
    }

    /// Step forward; same locking behavior as [`Self::back`].
    pub fn forward(&mut self) -> Option<&str> {
        if !self.can_go_forward() {
            return None;
        }
        let position = self.position? + 1;
        self.position = Some(position);
        self.locked = true;
        self.entries.get(position).map(String::as_str)
    }

    /// Take the lock set by the last back/forward, if any.
    pub fn consume_lock(&mut self) -> bool {
        std::mem::take(&mut self.locked)
    }

    pub fn state(&self) -> BrowserHistoryState {
        BrowserHistoryState {
            can_go_back: self.can_go_back(),
            can_go_forward: self.can_go_forward(),
        }
    }
}

/// Host component of a url, or empty for urls without one (about:blank,
/// data urls).
pub fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// One browser window tracked by the registry.
#[derive(Debug, Clone)]
pub struct ManagedWindow {
    handle: WindowHandle,
    /// Url and title read when the window was first seen. Reported for
    /// windows that have not been current yet; kept apart from the
    /// observed screen so the first visit still registers a transition.
    first_url: String,
    first_title: String,
    current_url: String,
    current_title: String,
    history: ScreenTransitionHistory,
}

impl ManagedWindow {
    pub fn new(handle: WindowHandle) -> Self {
        Self::with_first_paint(handle, String::new(), String::new())
    }

    pub fn with_first_paint(handle: WindowHandle, url: String, title: String) -> Self {
        Self {
            handle,
            first_url: url,
            first_title: title,
            current_url: String::new(),
            current_title: String::new(),
            history: ScreenTransitionHistory::default(),
        }
    }

    pub fn handle(&self) -> &WindowHandle {
        &self.handle
    }

    /// Last observed url, falling back to the first-paint url for windows
    /// that have never been current.
    pub fn url(&self) -> &str {
        if self.current_url.is_empty() {
            &self.first_url
        } else {
            &self.current_url
        }
    }

    pub fn title(&self) -> &str {
        if self.current_url.is_empty() {
            &self.first_title
        } else {
            &self.current_title
        }
    }

    pub fn host(&self) -> String {
        host_of(self.url())
    }

    pub fn history(&self) -> &ScreenTransitionHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut ScreenTransitionHistory {
        &mut self.history
    }

    /// Compare the live url and title against the last observed screen and
    /// produce a transition when they differ. The client must currently be
    /// positioned on this window.
    pub fn capture_screen_transition<C>(&mut self, client: &C) -> Result<Option<ScreenTransition>>
    where
        C: WebDriverClient + PageInstrumentation + ?Sized,
    {
        let url = client.current_url()?;
        let title = client.current_title()?;
        if url == self.current_url && title == self.current_title {
            return Ok(None);
        }

        let url_changed = url != self.current_url;
        self.current_url = url.clone();
        self.current_title = title.clone();

        if url_changed && !self.history.consume_lock() {
            self.history.push(url.clone());
        }

        let screenshot = client.take_screenshot()?;
        let screen_elements = collect_screen_elements_per_iframe(client)?;

        Ok(Some(ScreenTransition {
            title,
            url,
            image_data: encode_screenshot(&screenshot),
            window_handle: self.handle.clone(),
            timestamp: epoch_milliseconds(),
            page_source: client.page_source()?,
            screen_elements,
        }))
    }

    /// Build an engine-synthesized operation attributed to this window,
    /// using the given pre-captured page snapshot.
    pub fn create_special_operation(
        &self,
        operation_type: SpecialOperationType,
        input: impl Into<String>,
        page_source: String,
        screen_elements: Vec<ScreenElements>,
        client_size: ClientSize,
    ) -> Operation {
        Operation {
            input: input.into(),
            operation_type: operation_type.as_str().to_string(),
            element_info: None,
            scroll_position: ScrollPosition::default(),
            client_size,
            title: self.title().to_string(),
            url: self.url().to_string(),
            image_data: String::new(),
            window_handle: self.handle.clone(),
            timestamp: epoch_milliseconds(),
            screen_elements,
            page_source,
        }
    }
}

pub fn encode_screenshot(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", BASE64.encode(png))
}

const ELEMENTS_LOCK_ID: &str = "collect-screen-elements";

/// Collect screen elements from the top document and every iframe,
/// attributing each group to its frame. Takes the frame lock for the whole
/// traversal so a concurrent shield toggle cannot interleave.
pub fn collect_screen_elements_per_iframe<C>(client: &C) -> Result<Vec<ScreenElements>>
where
    C: WebDriverClient + PageInstrumentation + ?Sized,
{
    let guard = FrameLockGuard::acquire(client, ELEMENTS_LOCK_ID);

    let result = (|| {
        let mut groups = vec![ScreenElements {
            iframe_index: None,
            elements: client.collect_screen_elements()?,
        }];

        let iframe_count = client.iframe_count()?;
        for index in 0..iframe_count {
            client.switch_frame_to(index, guard.id())?;
            let elements = client.collect_screen_elements()?;
            client.switch_default_content(guard.id())?;
            if elements.is_empty() {
                continue;
            }
            groups.push(ScreenElements {
                iframe_index: Some(index),
                elements,
            });
        }

        Ok::<_, CaptureError>(groups)
    })();

    // Never leave the client parked inside a frame.
    let _ = client.switch_default_content(guard.id());

    result
}
