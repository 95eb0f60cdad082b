//! Registry of open windows and the current-window pointer.
//!
//! The container owns only bookkeeping; creating a window's state and
//! actually switching the browser are delegated through [`WindowLifecycle`]
//! so the registry logic stays testable without a browser.

use crate::capture::window::ManagedWindow;
use crate::error::{CaptureError, Result};
use crate::operation::WindowHandle;
use indexmap::IndexMap;

/// Hooks the container invokes when windows appear or the current window
/// changes.
pub trait WindowLifecycle {
    /// Build the tracked state for a newly observed window.
    fn create_window(&self, handle: &WindowHandle) -> Result<ManagedWindow>;

    /// Make `handle` the focused window in the browser. The container only
    /// commits its current pointer after this succeeds.
    fn switch_to(&self, handle: &WindowHandle) -> Result<()>;
}

/// Insertion-ordered window registry.
#[derive(Default)]
pub struct WindowContainer {
    windows: IndexMap<WindowHandle, ManagedWindow>,
    current: Option<WindowHandle>,
}

impl WindowContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn contains(&self, handle: &WindowHandle) -> bool {
        self.windows.contains_key(handle)
    }

    pub fn window_handles(&self) -> Vec<WindowHandle> {
        self.windows.keys().cloned().collect()
    }

    pub fn windows(&self) -> impl Iterator<Item = &ManagedWindow> {
        self.windows.values()
    }

    pub fn get(&self, handle: &WindowHandle) -> Option<&ManagedWindow> {
        self.windows.get(handle)
    }

    pub fn get_mut(&mut self, handle: &WindowHandle) -> Option<&mut ManagedWindow> {
        self.windows.get_mut(handle)
    }

    pub fn current_window_handle(&self) -> Option<&WindowHandle> {
        self.current.as_ref()
    }

    pub fn current_window(&self) -> Option<&ManagedWindow> {
        self.windows.get(self.current.as_ref()?)
    }

    pub fn current_window_mut(&mut self) -> Option<&mut ManagedWindow> {
        let current = self.current.clone()?;
        self.windows.get_mut(&current)
    }

    /// Register a window. The first window added to an empty registry
    /// becomes current. Adding a known handle is a no-op.
    pub fn add(&mut self, handle: WindowHandle, lifecycle: &dyn WindowLifecycle) -> Result<()> {
        if self.windows.contains_key(&handle) {
            return Ok(());
        }

        let window = lifecycle.create_window(&handle)?;
        let was_empty = self.windows.is_empty();
        self.windows.insert(handle.clone(), window);

        if was_empty {
            self.change_current_window_to(&handle, lifecycle)?;
        }

        Ok(())
    }

    /// Remove a window. When it is the current window, the neighbor at
    /// index - 1 (or index + 1 for the first window) is selected before the
    /// entry is deleted; the last removal clears the current pointer.
    pub fn remove(&mut self, handle: &WindowHandle, lifecycle: &dyn WindowLifecycle) -> Result<()> {
        let Some(index) = self.windows.get_index_of(handle) else {
            return Ok(());
        };

        if self.current.as_ref() == Some(handle) {
            let neighbor_index = if index == 0 { index + 1 } else { index - 1 };
            match self.windows.get_index(neighbor_index) {
                Some((neighbor, _)) => {
                    let neighbor = neighbor.clone();
                    self.change_current_window_to(&neighbor, lifecycle)?;
                }
                None => self.current = None,
            }
        }

        self.windows.shift_remove(handle);
        Ok(())
    }

    /// Reconcile against the live handle set. Returns `true` when the
    /// registry changed; a set-equal snapshot is a no-op.
    pub fn update(
        &mut self,
        handles: &[WindowHandle],
        lifecycle: &dyn WindowLifecycle,
    ) -> Result<bool> {
        let unchanged = handles.len() == self.windows.len()
            && handles.iter().all(|handle| self.windows.contains_key(handle));
        if unchanged {
            return Ok(false);
        }

        let stale: Vec<WindowHandle> = self
            .windows
            .keys()
            .filter(|known| !handles.contains(known))
            .cloned()
            .collect();
        for handle in &stale {
            self.remove(handle, lifecycle)?;
        }

        for handle in handles {
            self.add(handle.clone(), lifecycle)?;
        }

        Ok(true)
    }

    /// Make `handle` current. Switching to the current window or to an
    /// unknown handle is a no-op; a failed switch leaves the pointer
    /// untouched.
    pub fn change_current_window_to(
        &mut self,
        handle: &WindowHandle,
        lifecycle: &dyn WindowLifecycle,
    ) -> Result<()> {
        if !self.windows.contains_key(handle) {
            return Ok(());
        }

        if self.current.as_ref() == Some(handle) {
            return Ok(());
        }

        lifecycle.switch_to(handle)?;
        self.current = Some(handle.clone());
        Ok(())
    }

    pub fn change_current_window_by_index_to(
        &mut self,
        index: usize,
        lifecycle: &dyn WindowLifecycle,
    ) -> Result<()> {
        let handle = self
            .windows
            .get_index(index)
            .map(|(handle, _)| handle.clone())
            .ok_or_else(|| {
                CaptureError::WindowOperationFailed(format!("No window at index {}", index))
            })?;
        self.change_current_window_to(&handle, lifecycle)
    }
}
