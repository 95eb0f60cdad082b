//! Production [`WebDriverClient`] backed by a Chrome/Chromium instance.
//!
//! Window handles map to devtools target ids. Instrumentation calls are
//! executed as injected JavaScript against the selected tab; the page-side
//! script (`capture.js`) is re-installed on demand because navigation wipes
//! it.

use crate::error::{CaptureError, Result};
use crate::operation::{ElementInfo, WindowHandle};
use crate::script::{
    CaptureDataRequest, CaptureDump, EventInfo, PageInstrumentation, ShieldStyle,
    WindowSwitchDetection,
};
use crate::webdriver::WebDriverClient;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::{Browser, Tab};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

const CAPTURE_SCRIPT: &str = include_str!("../script/capture.js");

/// Options for launching a browser instance.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Run without a visible window.
    pub headless: bool,

    /// Initial window width in pixels.
    pub window_width: u32,

    /// Initial window height in pixels.
    pub window_height: u32,

    /// Path to the Chrome/Chromium binary. Auto-detected when `None`.
    pub chrome_path: Option<PathBuf>,

    /// User data directory for the browser profile.
    pub user_data_dir: Option<PathBuf>,

    /// Whether to run the browser sandboxed.
    pub sandbox: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1280,
            window_height: 800,
            chrome_path: None,
            user_data_dir: None,
            sandbox: true,
        }
    }
}

impl LaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set headless mode.
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Builder method: set the window size.
    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.window_width = width;
        self.window_height = height;
        self
    }

    /// Builder method: set the browser binary path.
    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    /// Builder method: set the user data directory.
    pub fn user_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_data_dir = Some(dir.into());
        self
    }

    /// Builder method: set sandbox mode.
    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }
}

/// Client for one Chrome instance, exposing the WebDriver and
/// instrumentation contracts the engine depends on.
pub struct ChromeClient {
    browser: Browser,

    /// The tab the client currently has in window context.
    current_tab: Mutex<Option<Arc<Tab>>>,

    /// The iframe index the client currently has in document context;
    /// `None` means the top document.
    current_frame: Mutex<Option<usize>>,

    /// Named frame lock serializing frame traversals across callers.
    frame_lock: Mutex<Option<String>>,
    frame_unlocked: Condvar,

    /// Set by the dialog listeners installed on each watched tab.
    alert_visible: Arc<AtomicBool>,

    /// Target ids that already have dialog listeners attached.
    watched_tabs: Mutex<HashSet<String>>,
}

impl ChromeClient {
    /// Launch a new browser instance with the given options.
    pub fn launch(options: LaunchOptions) -> Result<Self> {
        let mut launch_opts = headless_chrome::LaunchOptions::default();

        launch_opts.ignore_default_args.push(OsStr::new("--enable-automation"));
        launch_opts.args.push(OsStr::new("--disable-blink-features=AutomationControlled"));

        // A capture session can idle for a long time between user actions.
        launch_opts.idle_browser_timeout = Duration::from_secs(60 * 60);

        launch_opts.headless = options.headless;
        launch_opts.window_size = Some((options.window_width, options.window_height));
        launch_opts.sandbox = options.sandbox;

        if let Some(path) = options.chrome_path {
            launch_opts.path = Some(path);
        }

        if let Some(dir) = options.user_data_dir {
            launch_opts.user_data_dir = Some(dir);
        }

        let browser =
            Browser::new(launch_opts).map_err(|e| CaptureError::LaunchFailed(e.to_string()))?;

        browser
            .new_tab()
            .map_err(|e| CaptureError::LaunchFailed(format!("Failed to create tab: {}", e)))?;

        let client = Self::wrap(browser);
        let tabs = client.tabs()?;
        if let Some(tab) = tabs.first() {
            client.adopt_tab(tab.clone())?;
        }

        Ok(client)
    }

    /// Connect to an existing browser instance via WebSocket.
    pub fn connect(ws_url: impl Into<String>) -> Result<Self> {
        let browser = Browser::connect(ws_url.into())
            .map_err(|e| CaptureError::LaunchFailed(e.to_string()))?;

        let client = Self::wrap(browser);
        let tabs = client.tabs()?;
        if let Some(tab) = tabs.first() {
            client.adopt_tab(tab.clone())?;
        }

        Ok(client)
    }

    fn wrap(browser: Browser) -> Self {
        Self {
            browser,
            current_tab: Mutex::new(None),
            current_frame: Mutex::new(None),
            frame_lock: Mutex::new(None),
            frame_unlocked: Condvar::new(),
            alert_visible: Arc::new(AtomicBool::new(false)),
            watched_tabs: Mutex::new(HashSet::new()),
        }
    }

    fn tabs(&self) -> Result<Vec<Arc<Tab>>> {
        let tabs = self
            .browser
            .get_tabs()
            .lock()
            .map_err(|e| CaptureError::Session(format!("Failed to get tabs: {}", e)))?
            .clone();

        Ok(tabs)
    }

    fn tab(&self) -> Result<Arc<Tab>> {
        self.current_tab
            .lock()
            .map_err(|e| CaptureError::Session(format!("Tab state poisoned: {}", e)))?
            .clone()
            .ok_or_else(|| CaptureError::WindowOperationFailed("No window selected".to_string()))
    }

    fn find_tab(&self, handle: &WindowHandle) -> Result<Arc<Tab>> {
        self.tabs()?
            .into_iter()
            .find(|tab| tab.get_target_id().as_str() == handle.as_str())
            .ok_or_else(|| {
                CaptureError::WindowOperationFailed(format!("No window with handle {}", handle))
            })
    }

    fn adopt_tab(&self, tab: Arc<Tab>) -> Result<()> {
        self.watch_dialogs(&tab)?;
        *self
            .current_tab
            .lock()
            .map_err(|e| CaptureError::Session(format!("Tab state poisoned: {}", e)))? =
            Some(tab);
        *self
            .current_frame
            .lock()
            .map_err(|e| CaptureError::Session(format!("Frame state poisoned: {}", e)))? = None;
        Ok(())
    }

    /// Track modal dialog visibility for a tab. Scripts cannot run while a
    /// dialog is up, so polling relies on this flag instead of probing.
    fn watch_dialogs(&self, tab: &Arc<Tab>) -> Result<()> {
        let target_id = tab.get_target_id().to_string();
        {
            let mut watched = self
                .watched_tabs
                .lock()
                .map_err(|e| CaptureError::Session(format!("Watch state poisoned: {}", e)))?;
            if !watched.insert(target_id) {
                return Ok(());
            }
        }

        let flag = Arc::clone(&self.alert_visible);
        let listener = tab.add_event_listener(Arc::new(move |event: &Event| match event {
            Event::PageJavascriptDialogOpening(_) => flag.store(true, Ordering::SeqCst),
            Event::PageJavascriptDialogClosed(_) => flag.store(false, Ordering::SeqCst),
            _ => {}
        }));

        if let Err(e) = listener {
            log::warn!("Failed to watch dialogs for tab: {}", e);
        }

        Ok(())
    }

    fn frame_context(&self) -> Result<String> {
        let frame = *self
            .current_frame
            .lock()
            .map_err(|e| CaptureError::Session(format!("Frame state poisoned: {}", e)))?;

        Ok(match frame {
            Some(index) => format!("window.frames[{}]", index),
            None => "window".to_string(),
        })
    }

    fn eval(&self, expr: &str) -> Result<Option<Value>> {
        let tab = self.tab()?;
        let result = tab
            .evaluate(expr, false)
            .map_err(|e| CaptureError::ScriptFailed(e.to_string()))?;

        Ok(result.value)
    }

    /// Call one instrumentation function in the current document context,
    /// installing the page-side script first if navigation removed it.
    fn call(&self, function: &str, args: Value) -> Result<Value> {
        let target = self.frame_context()?;
        let script_literal = serde_json::to_string(CAPTURE_SCRIPT)
            .map_err(|e| CaptureError::ScriptFailed(e.to_string()))?;
        let expr = format!(
            "(() => {{\n\
               const w = {target};\n\
               if (!w.__captureSession) {{ w.eval({script_literal}); }}\n\
               const result = w.__captureSession.{function}({args});\n\
               return result === undefined ? null : JSON.stringify(result);\n\
             }})()",
        );

        match self.eval(&expr)? {
            Some(Value::String(body)) => serde_json::from_str(&body).map_err(|e| {
                CaptureError::ScriptFailed(format!("{} returned malformed data: {}", function, e))
            }),
            _ => Ok(Value::Null),
        }
    }

    /// Run an action snippet against the element at `xpath`. The snippet
    /// sees `el` (the element) and `w` (its window).
    fn element_action(&self, xpath: &str, action: &str) -> Result<()> {
        let target = self.frame_context()?;
        let xpath_literal = serde_json::to_string(xpath)
            .map_err(|e| CaptureError::ScriptFailed(e.to_string()))?;
        let expr = format!(
            "(() => {{\n\
               const w = {target};\n\
               const el = w.document.evaluate({xpath_literal}, w.document, null, \
                 XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;\n\
               if (!el) return 'not_found';\n\
               if (el.disabled) return 'not_interactable';\n\
               {action}\n\
               return 'ok';\n\
             }})()",
        );

        match self.eval(&expr)? {
            Some(Value::String(status)) if status == "ok" => Ok(()),
            Some(Value::String(status)) if status == "not_found" => {
                Err(CaptureError::ElementNotFound(xpath.to_string()))
            }
            Some(Value::String(status)) if status == "not_interactable" => {
                Err(CaptureError::ElementNotInteractable(xpath.to_string()))
            }
            other => Err(CaptureError::ScriptFailed(format!(
                "Element action returned {:?}",
                other
            ))),
        }
    }
}

impl WebDriverClient for ChromeClient {
    fn open(&self, url: &str) -> Result<()> {
        let tab = self.tab()?;

        tab.navigate_to(url).map_err(|e| {
            let message = e.to_string();
            if message.contains("ERR_CONNECTION_REFUSED") {
                CaptureError::ConnectionRefused(format!("{}: {}", url, message))
            } else if message.contains("invalid") {
                CaptureError::InvalidUrl(format!("{}: {}", url, message))
            } else {
                CaptureError::Session(format!("Failed to navigate to {}: {}", url, message))
            }
        })?;

        tab.wait_until_navigated()
            .map_err(|e| CaptureError::Session(format!("Navigation timeout: {}", e)))?;

        Ok(())
    }

    fn close(&self) -> Result<()> {
        let tabs = self.tabs()?;
        for tab in tabs {
            let _ = tab.close(false); // Ignore errors on individual tab closes
        }
        Ok(())
    }

    fn refresh(&self) -> Result<()> {
        self.tab()?
            .reload(false, None)
            .map_err(|e| CaptureError::Session(format!("Failed to reload: {}", e)))?;
        Ok(())
    }

    fn window_handles(&self) -> Result<Vec<WindowHandle>> {
        Ok(self
            .tabs()?
            .iter()
            .map(|tab| WindowHandle::from(tab.get_target_id().to_string()))
            .collect())
    }

    fn switch_window_to(&self, handle: &WindowHandle) -> Result<()> {
        let tab = self.find_tab(handle)?;
        tab.activate()
            .map_err(|e| CaptureError::WindowOperationFailed(format!("Failed to activate {}: {}", handle, e)))?;
        self.adopt_tab(tab)
    }

    fn switch_frame_to(&self, index: usize, lock_id: &str) -> Result<()> {
        let held = self
            .frame_lock
            .lock()
            .map_err(|e| CaptureError::Session(format!("Frame lock poisoned: {}", e)))?;
        if held.as_deref() != Some(lock_id) {
            return Err(CaptureError::FrameOperationFailed(format!(
                "Frame lock not held by {}",
                lock_id
            )));
        }
        drop(held);

        *self
            .current_frame
            .lock()
            .map_err(|e| CaptureError::Session(format!("Frame state poisoned: {}", e)))? =
            Some(index);
        Ok(())
    }

    fn switch_default_content(&self, lock_id: &str) -> Result<()> {
        let held = self
            .frame_lock
            .lock()
            .map_err(|e| CaptureError::Session(format!("Frame lock poisoned: {}", e)))?;
        if held.as_deref() != Some(lock_id) {
            return Err(CaptureError::FrameOperationFailed(format!(
                "Frame lock not held by {}",
                lock_id
            )));
        }
        drop(held);

        *self
            .current_frame
            .lock()
            .map_err(|e| CaptureError::Session(format!("Frame state poisoned: {}", e)))? = None;
        Ok(())
    }

    fn lock_frame(&self, lock_id: &str) {
        let mut held = self
            .frame_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while held.is_some() {
            held = self
                .frame_unlocked
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *held = Some(lock_id.to_string());
    }

    fn unlock_frame(&self) {
        let mut held = self
            .frame_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *held = None;
        drop(held);
        self.frame_unlocked.notify_all();
    }

    fn wait_until_frame_unlock(&self) {
        let mut held = self
            .frame_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while held.is_some() {
            held = self
                .frame_unlocked
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn current_url(&self) -> Result<String> {
        Ok(self.tab()?.get_url())
    }

    fn current_title(&self) -> Result<String> {
        self.tab()?
            .get_title()
            .map_err(|e| CaptureError::ScriptFailed(format!("Failed to read title: {}", e)))
    }

    fn page_source(&self) -> Result<String> {
        self.tab()?
            .get_content()
            .map_err(|e| CaptureError::ScriptFailed(format!("Failed to read page source: {}", e)))
    }

    fn take_screenshot(&self) -> Result<Vec<u8>> {
        self.tab()?
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| CaptureError::ScreenshotFailed(e.to_string()))
    }

    fn alert_is_visible(&self) -> Result<bool> {
        Ok(self.alert_visible.load(Ordering::SeqCst))
    }

    fn navigate_back(&self) -> Result<()> {
        self.eval("window.history.back(); true")?;
        // Give the navigation a moment to start before the next poll.
        std::thread::sleep(Duration::from_millis(300));
        Ok(())
    }

    fn navigate_forward(&self) -> Result<()> {
        self.eval("window.history.forward(); true")?;
        std::thread::sleep(Duration::from_millis(300));
        Ok(())
    }

    fn click_element(&self, xpath: &str) -> Result<()> {
        self.element_action(xpath, "el.click();")
    }

    fn set_element_value(&self, xpath: &str, value: &str) -> Result<()> {
        let value_literal = serde_json::to_string(value)
            .map_err(|e| CaptureError::ScriptFailed(e.to_string()))?;
        self.element_action(
            xpath,
            &format!(
                "el.value = {value_literal}; \
                 el.dispatchEvent(new w.Event('change', {{ bubbles: true }}));"
            ),
        )
    }

    fn set_element_checked(&self, xpath: &str, checked: bool) -> Result<()> {
        self.element_action(
            xpath,
            &format!(
                "el.checked = {checked}; \
                 el.dispatchEvent(new w.Event('change', {{ bubbles: true }}));"
            ),
        )
    }

    fn select_element_value(&self, xpath: &str, value: &str) -> Result<()> {
        let value_literal = serde_json::to_string(value)
            .map_err(|e| CaptureError::ScriptFailed(e.to_string()))?;
        self.element_action(
            xpath,
            &format!(
                "el.value = {value_literal}; \
                 el.dispatchEvent(new w.Event('change', {{ bubbles: true }}));"
            ),
        )
    }
}

impl PageInstrumentation for ChromeClient {
    fn init_guard(&self, shield_style: &ShieldStyle) -> Result<bool> {
        let result = self.call("initGuard", json!({ "shieldStyle": shield_style }))?;
        Ok(result.as_bool().unwrap_or(false))
    }

    fn arm_window_switch_detection(&self, detection: &WindowSwitchDetection) -> Result<()> {
        let args = serde_json::to_value(detection)
            .map_err(|e| CaptureError::ScriptFailed(e.to_string()))?;
        self.call("setFunctionToDetectWindowSwitch", args)?;
        Ok(())
    }

    fn capture_data(&self, request: &CaptureDataRequest) -> Result<CaptureDump> {
        let args = serde_json::to_value(request)
            .map_err(|e| CaptureError::ScriptFailed(e.to_string()))?;
        let result = self.call("captureData", args)?;
        serde_json::from_value(result).map_err(|e| {
            CaptureError::ScriptFailed(format!("captureData returned malformed data: {}", e))
        })
    }

    fn attach_shield(&self, shield_id: &str) -> Result<()> {
        self.call("attachShield", json!({ "shieldId": shield_id }))?;
        Ok(())
    }

    fn detach_shield(&self, shield_id: &str) -> Result<()> {
        self.call("detachShield", json!({ "shieldId": shield_id }))?;
        Ok(())
    }

    fn unblock_user_operations(&self, window_handle: &WindowHandle, shield_id: &str) -> Result<()> {
        self.call(
            "unblockUserOperations",
            json!({ "windowHandle": window_handle, "shieldId": shield_id }),
        )?;
        Ok(())
    }

    fn set_shield_in_document(&self, enabled: bool) -> Result<()> {
        self.call("setShieldEnabled", json!(enabled))?;
        Ok(())
    }

    fn pause_capturing(&self) -> Result<()> {
        self.call("pauseCapturing", Value::Null)?;
        Ok(())
    }

    fn resume_capturing(&self) -> Result<()> {
        self.call("resumeCapturing", Value::Null)?;
        Ok(())
    }

    fn capturing_is_paused(&self) -> Result<bool> {
        let result = self.call("capturingIsPaused", Value::Null)?;
        Ok(result.as_bool().unwrap_or(false))
    }

    fn browsing_window_handle(&self) -> Result<Option<WindowHandle>> {
        // First pass: visibility and focus together is the strongest signal.
        let tabs = self.tabs()?;
        for tab in &tabs {
            let result =
                tab.evaluate("document.visibilityState === 'visible' && document.hasFocus()", false);
            match result {
                Ok(remote_object) => {
                    if let Some(value) = remote_object.value {
                        if value.as_bool().unwrap_or(false) {
                            return Ok(Some(WindowHandle::from(tab.get_target_id().to_string())));
                        }
                    }
                }
                Err(e) => {
                    log::debug!("Failed to check tab focus: {}", e);
                    continue;
                }
            }
        }

        // Second pass: visibility alone, for platforms where the browser
        // window itself has lost OS focus.
        for tab in &tabs {
            let result = tab.evaluate("document.visibilityState === 'visible'", false);
            if let Ok(remote_object) = result {
                if let Some(value) = remote_object.value {
                    if value.as_bool().unwrap_or(false) {
                        return Ok(Some(WindowHandle::from(tab.get_target_id().to_string())));
                    }
                }
            }
        }

        Ok(None)
    }

    fn refire_event(&self, event: &EventInfo) -> Result<()> {
        let args = serde_json::to_value(event)
            .map_err(|e| CaptureError::ScriptFailed(e.to_string()))?;
        self.call("refireEvent", args)?;
        Ok(())
    }

    fn collect_screen_elements(&self) -> Result<Vec<ElementInfo>> {
        let result = self.call("collectScreenElements", Value::Null)?;
        serde_json::from_value(result).map_err(|e| {
            CaptureError::ScriptFailed(format!("collectScreenElements returned malformed data: {}", e))
        })
    }

    fn iframe_count(&self) -> Result<usize> {
        let value = self.eval("window.frames.length")?;
        Ok(value.and_then(|v| v.as_u64()).unwrap_or(0) as usize)
    }

    fn focus_window(&self, window_handle: &WindowHandle) -> Result<()> {
        self.call("focusWindow", json!(window_handle))?;
        Ok(())
    }
}
