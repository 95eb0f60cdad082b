//! Remote-protocol boundary between the engine and a live browser.
//!
//! The engine never talks to a browser directly; it depends on
//! [`WebDriverClient`] (plus the [`PageInstrumentation`](crate::script::PageInstrumentation)
//! contract) so that tests can script a fake browser and the production
//! backend can be swapped. Every call is a suspension point: the browser's
//! real state may change arbitrarily between any two calls, so callers must
//! re-read ground truth rather than cache across them.

pub mod chrome;

pub use chrome::{ChromeClient, LaunchOptions};

use crate::error::Result;
use crate::operation::WindowHandle;

/// Synchronous client for driving one browser instance.
pub trait WebDriverClient {
    /// Open a URL in the current window.
    fn open(&self, url: &str) -> Result<()>;

    /// Close the browser.
    fn close(&self) -> Result<()>;

    /// Reload the current window.
    fn refresh(&self) -> Result<()>;

    /// Ground-truth list of live window handles.
    fn window_handles(&self) -> Result<Vec<WindowHandle>>;

    /// Move the client's window context (and browser focus) to a window.
    fn switch_window_to(&self, handle: &WindowHandle) -> Result<()>;

    /// Move the client's document context into the iframe at `index`.
    /// Requires the frame lock to be held under `lock_id`.
    fn switch_frame_to(&self, index: usize, lock_id: &str) -> Result<()>;

    /// Return the document context to the top document.
    fn switch_default_content(&self, lock_id: &str) -> Result<()>;

    /// Take the named frame lock. Callers must have observed the lock free
    /// via [`WebDriverClient::wait_until_frame_unlock`] first; the
    /// [`FrameLockGuard`] helper does both.
    fn lock_frame(&self, lock_id: &str);

    /// Release the frame lock.
    fn unlock_frame(&self);

    /// Block until no frame lock is held.
    fn wait_until_frame_unlock(&self);

    fn current_url(&self) -> Result<String>;

    fn current_title(&self) -> Result<String>;

    /// Full source of the current document.
    fn page_source(&self) -> Result<String>;

    /// PNG screenshot of the current window.
    fn take_screenshot(&self) -> Result<Vec<u8>>;

    /// Whether a modal dialog (alert/confirm/prompt) is currently shown.
    /// Scripts cannot run while one is up, so capture must be skipped.
    fn alert_is_visible(&self) -> Result<bool>;

    fn navigate_back(&self) -> Result<()>;

    fn navigate_forward(&self) -> Result<()>;

    /// Click the element at the given XPath.
    fn click_element(&self, xpath: &str) -> Result<()>;

    /// Replace the value of the element at the given XPath and fire its
    /// change event.
    fn set_element_value(&self, xpath: &str, value: &str) -> Result<()>;

    /// Set the checked state of a checkbox or radio button.
    fn set_element_checked(&self, xpath: &str, checked: bool) -> Result<()>;

    /// Select the option with the given value in a `select` element.
    fn select_element_value(&self, xpath: &str, value: &str) -> Result<()>;
}

/// Holds the frame lock for the duration of a frame traversal and releases
/// it on every exit path, including panics and early `?` returns.
pub struct FrameLockGuard<'a, C: WebDriverClient + ?Sized> {
    client: &'a C,
    lock_id: String,
}

impl<'a, C: WebDriverClient + ?Sized> FrameLockGuard<'a, C> {
    /// Wait for any in-flight frame traversal to finish, then take the lock.
    pub fn acquire(client: &'a C, lock_id: &str) -> Self {
        client.wait_until_frame_unlock();
        client.lock_frame(lock_id);
        Self {
            client,
            lock_id: lock_id.to_string(),
        }
    }

    pub fn id(&self) -> &str {
        &self.lock_id
    }
}

impl<C: WebDriverClient + ?Sized> Drop for FrameLockGuard<'_, C> {
    fn drop(&mut self) {
        self.client.unlock_frame();
    }
}
