//! Window reconciliation and the shield controller.
//!
//! [`Browser`] owns the window registry and runs the per-tick state update:
//! reconcile against live handles, follow browser-side focus changes,
//! re-arm the shield across windows when the current host changes, and
//! synthesize a `switch_window` operation when the current window moved.

use crate::capture::container::{WindowContainer, WindowLifecycle};
use crate::capture::window::{ManagedWindow, collect_screen_elements_per_iframe, host_of};
use crate::config::CaptureConfig;
use crate::error::{CaptureError, Result};
use crate::events::{CaptureEventListener, WindowSummary, WindowsChangedEvent};
use crate::operation::{ClientSize, ScreenElements, SpecialOperationType, WindowHandle};
use crate::script::{PageInstrumentation, ShieldStyle, WindowSwitchDetection};
use crate::webdriver::{FrameLockGuard, WebDriverClient};

/// DOM id of the overlay element the page-side script installs.
pub const SHIELD_ID: &str = "__capture_session_shield";

const SHIELD_LOCK_ID: &str = "shield";

/// Install or remove the shield overlay in the top document and every
/// iframe of the currently selected window, under the frame lock. Disabling
/// also releases any operations the shield suppressed.
pub fn set_shield_in_all_frames<C>(
    client: &C,
    window_handle: &WindowHandle,
    enabled: bool,
) -> Result<()>
where
    C: WebDriverClient + PageInstrumentation + ?Sized,
{
    let guard = FrameLockGuard::acquire(client, SHIELD_LOCK_ID);

    let result = (|| {
        apply_shield_in_frame(client, window_handle, enabled)?;

        let iframe_count = client.iframe_count()?;
        for index in 0..iframe_count {
            client.switch_frame_to(index, guard.id())?;
            apply_shield_in_frame(client, window_handle, enabled)?;
            client.switch_default_content(guard.id())?;
        }

        Ok::<_, CaptureError>(())
    })();

    let _ = client.switch_default_content(guard.id());

    result
}

fn apply_shield_in_frame<C>(client: &C, window_handle: &WindowHandle, enabled: bool) -> Result<()>
where
    C: WebDriverClient + PageInstrumentation + ?Sized,
{
    client.set_shield_in_document(enabled)?;
    if enabled {
        client.attach_shield(SHIELD_ID)?;
    } else {
        client.detach_shield(SHIELD_ID)?;
        client.unblock_user_operations(window_handle, SHIELD_ID)?;
    }
    Ok(())
}

/// Point-in-time copy of the current window taken at the start of a tick,
/// before reconciliation can move the client elsewhere. Feeds the
/// synthesized `switch_window` operation.
pub struct WindowSnapshot {
    pub handle: WindowHandle,
    pub host: String,
    pub page_source: String,
    pub screen_elements: Vec<ScreenElements>,
    pub client_size: ClientSize,
}

/// Outcome of one state update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Continued,
    /// No windows remain; the session should end.
    BrowserClosed,
}

/// Lifecycle hooks bound to a client, handed to the container for window
/// creation and switching.
struct Lifecycle<'a, C: ?Sized> {
    client: &'a C,
    shield_style: ShieldStyle,
    shield_enabled: bool,
}

impl<C> WindowLifecycle for Lifecycle<'_, C>
where
    C: WebDriverClient + PageInstrumentation + ?Sized,
{
    /// Visit the new window once: instrument its document, arm switch
    /// detection, and read the first-paint url and title so the window
    /// can be reported before it ever becomes current. The caller is
    /// responsible for moving the client back afterward.
    fn create_window(&self, handle: &WindowHandle) -> Result<ManagedWindow> {
        self.client.switch_window_to(handle)?;
        self.client.init_guard(&self.shield_style)?;
        self.client.arm_window_switch_detection(&WindowSwitchDetection {
            window_handle: handle.clone(),
            shield_id: SHIELD_ID.to_string(),
            shield_style: self.shield_style.clone(),
            is_shield_enabled: self.shield_enabled,
        })?;
        if self.shield_enabled {
            set_shield_in_all_frames(self.client, handle, true)?;
        }
        let url = self.client.current_url()?;
        let title = self.client.current_title()?;
        Ok(ManagedWindow::with_first_paint(handle.clone(), url, title))
    }

    fn switch_to(&self, handle: &WindowHandle) -> Result<()> {
        self.client.switch_window_to(handle)?;
        self.client.focus_window(handle)?;
        Ok(())
    }
}

/// Tracked browser state spanning all windows.
pub struct Browser {
    container: WindowContainer,
    config: CaptureConfig,
    shield_style: ShieldStyle,

    /// True while the embedder is choosing a window; focus alignment and
    /// shield release are deferred until selection ends.
    window_selecting: bool,
}

impl Browser {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            container: WindowContainer::new(),
            config,
            shield_style: ShieldStyle::default(),
            window_selecting: false,
        }
    }

    pub fn container(&self) -> &WindowContainer {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut WindowContainer {
        &mut self.container
    }

    pub fn is_window_selecting(&self) -> bool {
        self.window_selecting
    }

    pub fn current_window_handle(&self) -> Option<WindowHandle> {
        self.container.current_window_handle().cloned()
    }

    fn lifecycle<'a, C: ?Sized>(&self, client: &'a C) -> Lifecycle<'a, C> {
        Lifecycle {
            client,
            shield_style: self.shield_style.clone(),
            shield_enabled: self.config.shield_enabled,
        }
    }

    /// Switch the registry (and the browser) to `handle`.
    pub fn switch_window_to<C>(&mut self, client: &C, handle: &WindowHandle) -> Result<()>
    where
        C: WebDriverClient + PageInstrumentation + ?Sized,
    {
        let lifecycle = self.lifecycle(client);
        self.container.change_current_window_to(handle, &lifecycle)
    }

    /// Enter window-selection mode: overlay the active window so user input
    /// is held until the embedder picks a window.
    pub fn protect_all_window<C>(&mut self, client: &C) -> Result<()>
    where
        C: WebDriverClient + PageInstrumentation + ?Sized,
    {
        self.window_selecting = true;
        if let Some(handle) = self.current_window_handle() {
            set_shield_in_all_frames(client, &handle, true)?;
        }
        Ok(())
    }

    /// Leave window-selection mode and release the overlay.
    pub fn unprotect_all_window<C>(&mut self, client: &C) -> Result<()>
    where
        C: WebDriverClient + PageInstrumentation + ?Sized,
    {
        self.window_selecting = false;
        if let Some(handle) = self.current_window_handle() {
            set_shield_in_all_frames(client, &handle, false)?;
        }
        Ok(())
    }

    /// Capture the page state of the current window. The client must be
    /// positioned on it. A window that can no longer be read has been
    /// closed out from under us; reconciliation handles that case, so no
    /// snapshot is taken rather than failing the whole tick.
    fn snapshot_current<C>(&self, client: &C) -> Option<WindowSnapshot>
    where
        C: WebDriverClient + PageInstrumentation + ?Sized,
    {
        let window = self.container.current_window()?;

        let page_source = match client.page_source() {
            Ok(source) => source,
            Err(error) => {
                log::debug!("current window is gone, skipping snapshot: {error}");
                return None;
            }
        };
        let screen_elements = match collect_screen_elements_per_iframe(client) {
            Ok(elements) => elements,
            Err(error) => {
                log::debug!("current window is gone, skipping snapshot: {error}");
                return None;
            }
        };

        Some(WindowSnapshot {
            handle: window.handle().clone(),
            host: window.host(),
            page_source,
            screen_elements,
            client_size: ClientSize::default(),
        })
    }

    /// One reconciliation pass. Steps, in order: snapshot the current
    /// window, reconcile the registry against live handles, align to the
    /// browser's focused window, handle host changes across a window-set
    /// change, synthesize the switch operation, release the shield on the
    /// settled window, re-arm switch detection.
    pub fn update_state<C, L>(&mut self, client: &C, listener: &L) -> Result<UpdateOutcome>
    where
        C: WebDriverClient + PageInstrumentation + ?Sized,
        L: CaptureEventListener + ?Sized,
    {
        let lifecycle = self.lifecycle(client);

        let previous = self.snapshot_current(client);

        let handles = client.window_handles()?;
        if handles.is_empty() {
            return Ok(UpdateOutcome::BrowserClosed);
        }
        let windows_changed = self.container.update(&handles, &lifecycle)?;
        if windows_changed {
            // Window creation leaves the client parked on the last new
            // window; move it back before reading the current page.
            if let Some(current) = self.container.current_window_handle() {
                client.switch_window_to(current)?;
            }
        }

        if !self.window_selecting {
            if let Some(focused) = client.browsing_window_handle()? {
                if self.container.contains(&focused)
                    && self.container.current_window_handle() != Some(&focused)
                {
                    self.container.change_current_window_to(&focused, &lifecycle)?;
                }
            }
        }

        if windows_changed {
            let current_host = host_of(&client.current_url()?);
            let host_changed = previous
                .as_ref()
                .is_some_and(|previous| previous.host != current_host);
            if host_changed {
                self.reshield_all_windows(client)?;
            }
            self.emit_windows_changed(listener, host_changed);
        }

        let current_handle = self.container.current_window_handle().cloned();
        if let (Some(previous), Some(current_handle)) = (&previous, &current_handle) {
            if previous.handle != *current_handle {
                self.emit_switch_window_operation(listener, previous, current_handle);
            }
        }

        if !self.window_selecting {
            if let Some(current_handle) = &current_handle {
                client.unblock_user_operations(current_handle, SHIELD_ID)?;
            }
        }

        if let Some(current_handle) = current_handle {
            // Idempotent on the page side; survives navigations.
            client.arm_window_switch_detection(&WindowSwitchDetection {
                window_handle: current_handle,
                shield_id: SHIELD_ID.to_string(),
                shield_style: self.shield_style.clone(),
                is_shield_enabled: self.config.shield_enabled,
            })?;
        }

        Ok(UpdateOutcome::Continued)
    }

    /// Re-attach the shield to every window after a host change, ending on
    /// the current window. A freshly navigated document needs the guard
    /// re-initialized first.
    fn reshield_all_windows<C>(&self, client: &C) -> Result<()>
    where
        C: WebDriverClient + PageInstrumentation + ?Sized,
    {
        let current = self.current_window_handle();
        for handle in self.container.window_handles() {
            client.switch_window_to(&handle)?;
            client.init_guard(&self.shield_style)?;
            set_shield_in_all_frames(client, &handle, true)?;
        }
        if let Some(current) = current {
            client.switch_window_to(&current)?;
        }
        Ok(())
    }

    fn emit_windows_changed<L>(&self, listener: &L, host_changed: bool)
    where
        L: CaptureEventListener + ?Sized,
    {
        let Some(current) = self.container.current_window_handle() else {
            return;
        };
        listener.on_windows_changed(&WindowsChangedEvent {
            windows: self
                .container
                .windows()
                .map(|window| WindowSummary {
                    window_handle: window.handle().clone(),
                    url: window.url().to_string(),
                    title: window.title().to_string(),
                })
                .collect(),
            current_window_handle: current.clone(),
            current_window_host_name_changed: host_changed,
        });
    }

    /// Report the window move as an operation attributed to the window the
    /// user left, carrying the page state snapshotted before the move.
    fn emit_switch_window_operation<L>(
        &self,
        listener: &L,
        previous: &WindowSnapshot,
        new_handle: &WindowHandle,
    ) where
        L: CaptureEventListener + ?Sized,
    {
        let Some(window) = self.container.get(&previous.handle) else {
            return;
        };
        let operation = window.create_special_operation(
            SpecialOperationType::SwitchWindow,
            new_handle.as_str(),
            previous.page_source.clone(),
            previous.screen_elements.clone(),
            previous.client_size,
        );
        listener.on_operation(&operation);
    }
}
