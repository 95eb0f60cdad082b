//! The capture session: polling loop, command surface, and replay.

use crate::capture::browser::{Browser, SHIELD_ID, UpdateOutcome, set_shield_in_all_frames};
use crate::capture::normalizer::{CaptureContext, NormalizedCapture, OperationNormalizer};
use crate::capture::window::{collect_screen_elements_per_iframe, encode_screenshot};
use crate::config::CaptureConfig;
use crate::error::{CaptureError, Result};
use crate::events::{BrowserHistoryState, CaptureEventListener};
use crate::operation::{
    ClientSize, InputValueSet, SpecialOperationType, TargetOperation, WindowHandle,
};
use crate::script::{
    CaptureArch, CaptureDataRequest, CaptureDump, CapturedItem, PageInstrumentation, ShieldStyle,
};
use crate::webdriver::{FrameLockGuard, WebDriverClient};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const CAPTURE_LOCK_ID: &str = "capture-data";
const REPLAY_LOCK_ID: &str = "replay";

/// Whether one tick observed the browser still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    BrowserClosed,
}

/// Cloneable handle that stops a running session from another thread.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// An exploratory-testing capture session over one browser.
///
/// The session polls the browser on a fixed interval, reconciles its window
/// registry, drains captured operations and mutations from the page, and
/// reports everything through the listener. All commands (replay, back,
/// autofill, window selection) go through the same instance, so they
/// interleave with ticks rather than racing them.
pub struct CaptureSession<C, L>
where
    C: WebDriverClient + PageInstrumentation,
    L: CaptureEventListener,
{
    client: C,
    listener: L,
    config: CaptureConfig,
    browser: Browser,
    normalizer: OperationNormalizer,
    shield_style: ShieldStyle,
    running: Arc<AtomicBool>,
    paused: bool,
    alert_visible: bool,
    last_history_state: Option<BrowserHistoryState>,
}

impl<C, L> CaptureSession<C, L>
where
    C: WebDriverClient + PageInstrumentation,
    L: CaptureEventListener,
{
    pub fn new(client: C, config: CaptureConfig, listener: L) -> Self {
        Self {
            client,
            listener,
            browser: Browser::new(config.clone()),
            config,
            normalizer: OperationNormalizer::new(),
            shield_style: ShieldStyle::default(),
            running: Arc::new(AtomicBool::new(true)),
            paused: false,
            alert_visible: false,
            last_history_state: None,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.running))
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Navigate to the starting url and register the initial window.
    pub fn start(&mut self, url: &str) -> Result<()> {
        log::info!("Starting capture session at {}", url);
        self.client.open(url)?;

        // Some applications rewrite their url shortly after load; an
        // optional settle-then-reload gets the post-rewrite screen.
        if self.config.wait_time_for_startup_reload > 0 {
            std::thread::sleep(Duration::from_secs(self.config.wait_time_for_startup_reload));
            self.client.refresh()?;
        }

        self.browser.update_state(&self.client, &self.listener)?;
        self.install_guard()?;
        Ok(())
    }

    /// Poll until the browser closes or a stop handle fires. Transient
    /// errors are reported and retried next tick; fatal ones end the loop.
    pub fn run(&mut self) -> Result<()> {
        while self.running.load(Ordering::SeqCst) {
            match self.tick() {
                Ok(TickOutcome::Continue) => {}
                Ok(TickOutcome::BrowserClosed) => {
                    log::info!("All browser windows closed; ending session");
                    self.listener.on_browser_closed();
                    break;
                }
                Err(error) => {
                    log::error!("Capture tick failed: {}", error);
                    self.listener.on_error(&error);
                    if error.is_fatal() {
                        return Err(error);
                    }
                }
            }
            std::thread::sleep(self.config.polling_interval());
        }
        Ok(())
    }

    /// One full observation pass.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        // Dialogs block script execution, so only the alert edge is
        // reported and everything else waits for dismissal.
        let alert_visible = self.client.alert_is_visible()?;
        if alert_visible != self.alert_visible {
            self.alert_visible = alert_visible;
            self.listener.on_alert_visibility_changed(alert_visible);
        }
        if alert_visible {
            return Ok(TickOutcome::Continue);
        }

        if self.browser.update_state(&self.client, &self.listener)? == UpdateOutcome::BrowserClosed
        {
            return Ok(TickOutcome::BrowserClosed);
        }

        self.install_guard()?;

        if let Some(window) = self.browser.container_mut().current_window_mut() {
            if let Some(transition) = window.capture_screen_transition(&self.client)? {
                log::debug!("Screen transition to {}", transition.url);
                self.listener.on_screen_transition(&transition);
            }
        }
        self.emit_history_state_if_changed();

        if self.config.capture_arch == CaptureArch::Polling && !self.browser.is_window_selecting() {
            let dump = self.drain_captured_data()?;
            if !dump.is_empty() {
                self.process_dump(dump)?;
            }
        }

        Ok(TickOutcome::Continue)
    }

    /// Close every window and end the session.
    pub fn quit(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.client.close()
    }

    /// Suspend capturing. The page keeps suppressing its capture hooks
    /// until [`Self::resume`]; the pause itself is recorded.
    pub fn pause(&mut self) -> Result<()> {
        if self.paused {
            return Ok(());
        }
        self.client.pause_capturing()?;
        self.paused = true;
        self.emit_command_operation(SpecialOperationType::PauseCapturing, "")?;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if !self.paused {
            return Ok(());
        }
        self.client.resume_capturing()?;
        self.paused = false;
        self.emit_command_operation(SpecialOperationType::ResumeCapturing, "")?;
        Ok(())
    }

    /// Make `handle` the capturing window.
    pub fn switch_capturing_window(&mut self, handle: &WindowHandle) -> Result<()> {
        self.browser.switch_window_to(&self.client, handle)
    }

    /// Begin window selection: user input is held until a window is chosen.
    pub fn select_capturing_window(&mut self) -> Result<()> {
        self.browser.protect_all_window(&self.client)
    }

    /// End window selection and release held input.
    pub fn unselect_capturing_window(&mut self) -> Result<()> {
        self.browser.unprotect_all_window(&self.client)
    }

    /// PNG screenshot of the current window as a data url.
    pub fn take_screenshot(&self) -> Result<String> {
        let png = self.client.take_screenshot()?;
        Ok(encode_screenshot(&png))
    }

    /// Navigate back in the current window's screen history and record the
    /// move as an operation.
    pub fn browser_back(&mut self) -> Result<()> {
        let can_go_back = self
            .browser
            .container()
            .current_window()
            .map(|window| window.history().can_go_back())
            .unwrap_or(false);
        if !can_go_back {
            return Err(CaptureError::InvalidOperation(
                "No previous screen to go back to".to_string(),
            ));
        }

        self.emit_command_operation(SpecialOperationType::BrowserBack, "")?;

        if let Some(window) = self.browser.container_mut().current_window_mut() {
            window.history_mut().back();
        }
        self.client.navigate_back()?;
        self.emit_history_state_if_changed();
        Ok(())
    }

    pub fn browser_forward(&mut self) -> Result<()> {
        let can_go_forward = self
            .browser
            .container()
            .current_window()
            .map(|window| window.history().can_go_forward())
            .unwrap_or(false);
        if !can_go_forward {
            return Err(CaptureError::InvalidOperation(
                "No next screen to go forward to".to_string(),
            ));
        }

        self.emit_command_operation(SpecialOperationType::BrowserForward, "")?;

        if let Some(window) = self.browser.container_mut().current_window_mut() {
            window.history_mut().forward();
        }
        self.client.navigate_forward()?;
        self.emit_history_state_if_changed();
        Ok(())
    }

    /// Replay one recorded operation against the live page.
    pub fn run_operation(&mut self, operation: &TargetOperation) -> Result<()> {
        if let Some(special) = SpecialOperationType::parse(&operation.operation_type) {
            return match special {
                SpecialOperationType::SwitchWindow => {
                    let handle = WindowHandle::new(operation.input.clone());
                    self.switch_capturing_window(&handle)
                }
                SpecialOperationType::BrowserBack => self.browser_back(),
                SpecialOperationType::BrowserForward => self.browser_forward(),
                SpecialOperationType::PauseCapturing => self.pause(),
                SpecialOperationType::ResumeCapturing => self.resume(),
            };
        }

        let element_info = operation.element_info.as_ref().ok_or_else(|| {
            CaptureError::InvalidOperation(format!(
                "Operation type {} requires a target element",
                operation.operation_type
            ))
        })?;
        let iframe_index = element_info.iframe.as_ref().map(|iframe| iframe.index);
        let xpath = element_info.xpath.clone();

        match operation.operation_type.as_str() {
            "click" => self.with_frame(iframe_index, |client| client.click_element(&xpath)),
            "change" => {
                let tagname = element_info.tagname.to_ascii_uppercase();
                let input_type = element_info
                    .attributes
                    .get("type")
                    .map(|t| t.to_ascii_lowercase())
                    .unwrap_or_default();
                let input = operation.input.clone();
                self.with_frame(iframe_index, |client| {
                    if tagname == "SELECT" {
                        client.select_element_value(&xpath, &input)
                    } else if input_type == "checkbox" || input_type == "radio" {
                        client.set_element_checked(&xpath, input == "on" || input == "true")
                    } else {
                        client.set_element_value(&xpath, &input)
                    }
                })
            }
            other => Err(CaptureError::InvalidOperation(format!(
                "Cannot replay operation type {}",
                other
            ))),
        }
    }

    /// Fill a batch of form fields. The shield is held up for the whole
    /// batch so the synthetic inputs are not captured as user operations;
    /// individual failures are logged and reported, not fatal.
    pub fn enter_values(&mut self, input_value_sets: &[InputValueSet]) -> Result<()> {
        let current_handle = self.browser.current_window_handle().ok_or_else(|| {
            CaptureError::WindowOperationFailed("No window to fill values in".to_string())
        })?;

        set_shield_in_all_frames(&self.client, &current_handle, true)?;

        for set in input_value_sets {
            let result = self.with_frame(set.iframe_index, |client| {
                client.set_element_value(&set.xpath, &set.input_value)
            });
            if let Err(error) = result {
                log::warn!("Autofill failed for {}: {}", set.xpath, error);
                self.listener.on_error(&error);
            }
        }

        if !self.config.shield_enabled {
            set_shield_in_all_frames(&self.client, &current_handle, false)?;
        } else {
            self.client
                .unblock_user_operations(&current_handle, SHIELD_ID)?;
        }
        Ok(())
    }

    /// Entry point for the push architecture: the page delivers items
    /// itself instead of being polled for them.
    pub fn register_captured_item(&mut self, item: CapturedItem) -> Result<()> {
        let dump = CaptureDump {
            captured_items: vec![item],
            screen_elements: collect_screen_elements_per_iframe(&self.client)?,
            mutated_items: Vec::new(),
            client_size: ClientSize::default(),
        };
        self.process_dump(dump)
    }

    /// Re-initialize the page-side guard after navigations; a fresh
    /// document also needs the shield re-attached.
    fn install_guard(&mut self) -> Result<()> {
        let freshly_installed = self.client.init_guard(&self.shield_style)?;
        if freshly_installed && self.config.shield_enabled {
            if let Some(handle) = self.browser.current_window_handle() {
                set_shield_in_all_frames(&self.client, &handle, true)?;
                self.client.unblock_user_operations(&handle, SHIELD_ID)?;
            }
        }
        Ok(())
    }

    fn emit_history_state_if_changed(&mut self) {
        let Some(window) = self.browser.container().current_window() else {
            return;
        };
        let state = window.history().state();
        if self.last_history_state != Some(state) {
            self.last_history_state = Some(state);
            self.listener.on_history_changed(state);
        }
    }

    /// Drain buffered capture data from the top document and every iframe
    /// of the current window, under the frame lock.
    fn drain_captured_data(&self) -> Result<CaptureDump> {
        let guard = FrameLockGuard::acquire(&self.client, CAPTURE_LOCK_ID);

        let result = (|| {
            let mut dump = self.client.capture_data(&CaptureDataRequest {
                capture_arch: self.config.capture_arch,
                shield_id: SHIELD_ID.to_string(),
                iframe_index: None,
            })?;

            let iframe_count = self.client.iframe_count()?;
            for index in 0..iframe_count {
                self.client.switch_frame_to(index, guard.id())?;
                let frame = self.client.capture_data(&CaptureDataRequest {
                    capture_arch: self.config.capture_arch,
                    shield_id: SHIELD_ID.to_string(),
                    iframe_index: Some(index),
                })?;
                self.client.switch_default_content(guard.id())?;
                dump.merge_frame(frame, index);
            }

            Ok::<_, CaptureError>(dump)
        })();

        let _ = self.client.switch_default_content(guard.id());

        result
    }

    /// Normalize a dump and report its operations and mutations, then
    /// refire any events the page held back.
    fn process_dump(&mut self, dump: CaptureDump) -> Result<()> {
        let Some(window_handle) = self.browser.current_window_handle() else {
            return Ok(());
        };

        let title = self.client.current_title()?;
        let url = self.client.current_url()?;
        let image_data = encode_screenshot(&self.client.take_screenshot()?);
        let page_source = self.client.page_source()?;

        let NormalizedCapture {
            operations,
            mutations,
            suspended_events,
        } = self.normalizer.normalize(
            dump,
            &CaptureContext {
                window_handle: &window_handle,
                title: &title,
                url: &url,
                image_data: &image_data,
                page_source: &page_source,
            },
        );

        for operation in &operations {
            log::debug!(
                "Captured {} on {}",
                operation.operation_type,
                operation
                    .element_info
                    .as_ref()
                    .map(|info| info.xpath.as_str())
                    .unwrap_or("-")
            );
            self.listener.on_operation(operation);
        }
        for mutation in &mutations {
            self.listener.on_mutation(mutation);
        }

        for suspended in &suspended_events {
            if let Err(error) = self.client.refire_event(&suspended.event_info) {
                log::warn!(
                    "Failed to refire {} on {}: {}",
                    suspended.event_info.event_type,
                    suspended.event_info.target_x_path,
                    error
                );
            }
        }

        Ok(())
    }

    /// Record an engine command (pause, back, ...) as an operation
    /// attributed to the current window's pre-command screen.
    fn emit_command_operation(
        &mut self,
        operation_type: SpecialOperationType,
        input: &str,
    ) -> Result<()> {
        let page_source = self.client.page_source()?;
        let screen_elements = collect_screen_elements_per_iframe(&self.client)?;
        let Some(window) = self.browser.container().current_window() else {
            return Ok(());
        };
        let operation = window.create_special_operation(
            operation_type,
            input,
            page_source,
            screen_elements,
            ClientSize::default(),
        );
        self.listener.on_operation(&operation);
        Ok(())
    }

    fn with_frame<T>(&self, iframe: Option<usize>, f: impl FnOnce(&C) -> Result<T>) -> Result<T> {
        match iframe {
            None => f(&self.client),
            Some(index) => {
                let guard = FrameLockGuard::acquire(&self.client, REPLAY_LOCK_ID);
                self.client.switch_frame_to(index, guard.id())?;
                let result = f(&self.client);
                let _ = self.client.switch_default_content(guard.id());
                result
            }
        }
    }
}
