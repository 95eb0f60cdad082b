//! End-to-end engine tests over a scripted in-memory browser client.

use capture_session::capture::set_shield_in_all_frames;
use capture_session::error::{CaptureError, Result};
use capture_session::events::{
    BrowserHistoryState, CaptureEventListener, ScreenMutation, WindowsChangedEvent,
};
use capture_session::operation::{
    ClientSize, ElementInfo, InputValueSet, Operation, ScreenTransition, ScrollPosition,
    TargetOperation, WindowHandle,
};
use capture_session::script::{
    CaptureDataRequest, CaptureDump, CapturedItem, CapturedMutation, CapturedOperation,
    ElementLocator, ElementMutation, EventInfo, PageInstrumentation, ShieldStyle,
    WindowSwitchDetection,
};
use capture_session::webdriver::WebDriverClient;
use capture_session::{CaptureConfig, CaptureSession};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Clone)]
struct MockWindow {
    handle: String,
    url: String,
    title: String,
}

#[derive(Default)]
struct MockState {
    windows: Vec<MockWindow>,
    current: Option<String>,
    focused: Option<String>,
    alert: bool,
    iframe_count: usize,
    paused: bool,
    guarded: HashSet<String>,
    dumps: VecDeque<CaptureDump>,
}

/// Scripted browser double. All state lives behind one mutex; the frame
/// lock uses the same mutex + condvar shape as the real client.
struct MockClient {
    state: Mutex<MockState>,
    frame_lock: Mutex<Option<String>>,
    frame_unlocked: Condvar,
    current_frame: Mutex<Option<usize>>,
    log: Mutex<Vec<String>>,
    shield_active: AtomicUsize,
    shield_overlap: AtomicBool,
}

impl MockClient {
    fn new(windows: &[(&str, &str)]) -> Self {
        let client = Self {
            state: Mutex::new(MockState::default()),
            frame_lock: Mutex::new(None),
            frame_unlocked: Condvar::new(),
            current_frame: Mutex::new(None),
            log: Mutex::new(Vec::new()),
            shield_active: AtomicUsize::new(0),
            shield_overlap: AtomicBool::new(false),
        };
        client.set_windows(windows);
        client
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn set_windows(&self, windows: &[(&str, &str)]) {
        let mut state = self.state();
        state.windows = windows
            .iter()
            .map(|(handle, url)| MockWindow {
                handle: handle.to_string(),
                url: url.to_string(),
                title: format!("title of {}", handle),
            })
            .collect();
    }

    fn set_focused(&self, handle: Option<&str>) {
        self.state().focused = handle.map(str::to_string);
    }

    fn set_alert(&self, visible: bool) {
        self.state().alert = visible;
    }

    fn set_current_url(&self, url: &str) {
        let mut state = self.state();
        let current = state.current.clone().expect("no current window");
        for window in &mut state.windows {
            if window.handle == current {
                window.url = url.to_string();
            }
        }
    }

    fn queue_dump(&self, dump: CaptureDump) {
        self.state().dumps.push_back(dump);
    }

    fn log_contains(&self, needle: &str) -> bool {
        self.log.lock().unwrap().iter().any(|line| line.contains(needle))
    }

    fn log_entry(&self, entry: &str) {
        self.log.lock().unwrap().push(entry.to_string());
    }

    fn current_window(&self) -> Option<MockWindow> {
        let state = self.state();
        let current = state.current.clone()?;
        state.windows.iter().find(|w| w.handle == current).cloned()
    }

    fn lock_held_by(&self, lock_id: &str) -> bool {
        self.frame_lock.lock().unwrap().as_deref() == Some(lock_id)
    }
}

impl WebDriverClient for MockClient {
    fn open(&self, url: &str) -> Result<()> {
        self.log_entry(&format!("open {}", url));
        let mut state = self.state();
        state.windows = vec![MockWindow {
            handle: "w1".to_string(),
            url: url.to_string(),
            title: "title of w1".to_string(),
        }];
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.log_entry("close");
        self.state().windows.clear();
        Ok(())
    }

    fn refresh(&self) -> Result<()> {
        self.log_entry("refresh");
        Ok(())
    }

    fn window_handles(&self) -> Result<Vec<WindowHandle>> {
        Ok(self
            .state()
            .windows
            .iter()
            .map(|w| WindowHandle::from(w.handle.as_str()))
            .collect())
    }

    fn switch_window_to(&self, handle: &WindowHandle) -> Result<()> {
        let mut state = self.state();
        if !state.windows.iter().any(|w| w.handle == handle.as_str()) {
            return Err(CaptureError::WindowOperationFailed(format!(
                "no window {}",
                handle
            )));
        }
        state.current = Some(handle.as_str().to_string());
        drop(state);
        self.log_entry(&format!("switch_window {}", handle));
        Ok(())
    }

    fn switch_frame_to(&self, index: usize, lock_id: &str) -> Result<()> {
        if !self.lock_held_by(lock_id) {
            return Err(CaptureError::FrameOperationFailed(format!(
                "frame lock not held by {}",
                lock_id
            )));
        }
        *self.current_frame.lock().unwrap() = Some(index);
        Ok(())
    }

    fn switch_default_content(&self, lock_id: &str) -> Result<()> {
        if !self.lock_held_by(lock_id) {
            return Err(CaptureError::FrameOperationFailed(format!(
                "frame lock not held by {}",
                lock_id
            )));
        }
        *self.current_frame.lock().unwrap() = None;
        Ok(())
    }

    fn lock_frame(&self, lock_id: &str) {
        let mut held = self.frame_lock.lock().unwrap();
        while held.is_some() {
            held = self.frame_unlocked.wait(held).unwrap();
        }
        *held = Some(lock_id.to_string());
    }

    fn unlock_frame(&self) {
        *self.frame_lock.lock().unwrap() = None;
        self.frame_unlocked.notify_all();
    }

    fn wait_until_frame_unlock(&self) {
        let mut held = self.frame_lock.lock().unwrap();
        while held.is_some() {
            held = self.frame_unlocked.wait(held).unwrap();
        }
    }

    fn current_url(&self) -> Result<String> {
        self.current_window()
            .map(|w| w.url)
            .ok_or_else(|| CaptureError::WindowOperationFailed("no current window".into()))
    }

    fn current_title(&self) -> Result<String> {
        self.current_window()
            .map(|w| w.title)
            .ok_or_else(|| CaptureError::WindowOperationFailed("no current window".into()))
    }

    fn page_source(&self) -> Result<String> {
        self.current_window()
            .map(|w| format!("source-of-{}", w.handle))
            .ok_or_else(|| CaptureError::WindowOperationFailed("no current window".into()))
    }

    fn take_screenshot(&self) -> Result<Vec<u8>> {
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }

    fn alert_is_visible(&self) -> Result<bool> {
        Ok(self.state().alert)
    }

    fn navigate_back(&self) -> Result<()> {
        self.log_entry("navigate_back");
        Ok(())
    }

    fn navigate_forward(&self) -> Result<()> {
        self.log_entry("navigate_forward");
        Ok(())
    }

    fn click_element(&self, xpath: &str) -> Result<()> {
        let frame = *self.current_frame.lock().unwrap();
        self.log_entry(&format!("click {} frame={:?}", xpath, frame));
        Ok(())
    }

    fn set_element_value(&self, xpath: &str, value: &str) -> Result<()> {
        if xpath.contains("missing") {
            return Err(CaptureError::ElementNotFound(xpath.to_string()));
        }
        self.log_entry(&format!("set_value {}={}", xpath, value));
        Ok(())
    }

    fn set_element_checked(&self, xpath: &str, checked: bool) -> Result<()> {
        self.log_entry(&format!("set_checked {}={}", xpath, checked));
        Ok(())
    }

    fn select_element_value(&self, xpath: &str, value: &str) -> Result<()> {
        self.log_entry(&format!("select {}={}", xpath, value));
        Ok(())
    }
}

impl PageInstrumentation for MockClient {
    fn init_guard(&self, _shield_style: &ShieldStyle) -> Result<bool> {
        let mut state = self.state();
        let current = state
            .current
            .clone()
            .ok_or_else(|| CaptureError::WindowOperationFailed("no current window".into()))?;
        Ok(state.guarded.insert(current))
    }

    fn arm_window_switch_detection(&self, detection: &WindowSwitchDetection) -> Result<()> {
        self.log_entry(&format!("arm_detection {}", detection.window_handle));
        Ok(())
    }

    fn capture_data(&self, request: &CaptureDataRequest) -> Result<CaptureDump> {
        if request.iframe_index.is_some() {
            return Ok(empty_dump());
        }
        Ok(self.state().dumps.pop_front().unwrap_or_else(empty_dump))
    }

    fn attach_shield(&self, _shield_id: &str) -> Result<()> {
        let previous = self.shield_active.fetch_add(1, Ordering::SeqCst);
        if previous != 0 {
            self.shield_overlap.store(true, Ordering::SeqCst);
        }
        std::thread::sleep(Duration::from_millis(2));
        self.shield_active.fetch_sub(1, Ordering::SeqCst);
        self.log_entry("attach_shield");
        Ok(())
    }

    fn detach_shield(&self, _shield_id: &str) -> Result<()> {
        let previous = self.shield_active.fetch_add(1, Ordering::SeqCst);
        if previous != 0 {
            self.shield_overlap.store(true, Ordering::SeqCst);
        }
        std::thread::sleep(Duration::from_millis(2));
        self.shield_active.fetch_sub(1, Ordering::SeqCst);
        self.log_entry("detach_shield");
        Ok(())
    }

    fn unblock_user_operations(&self, window_handle: &WindowHandle, _shield_id: &str) -> Result<()> {
        self.log_entry(&format!("unblock {}", window_handle));
        Ok(())
    }

    fn set_shield_in_document(&self, _enabled: bool) -> Result<()> {
        Ok(())
    }

    fn pause_capturing(&self) -> Result<()> {
        self.state().paused = true;
        Ok(())
    }

    fn resume_capturing(&self) -> Result<()> {
        self.state().paused = false;
        Ok(())
    }

    fn capturing_is_paused(&self) -> Result<bool> {
        Ok(self.state().paused)
    }

    fn browsing_window_handle(&self) -> Result<Option<WindowHandle>> {
        Ok(self.state().focused.as_deref().map(WindowHandle::from))
    }

    fn refire_event(&self, event: &EventInfo) -> Result<()> {
        self.log_entry(&format!("refire {}", event.id));
        Ok(())
    }

    fn collect_screen_elements(&self) -> Result<Vec<ElementInfo>> {
        Ok(vec![ElementInfo {
            tagname: "BODY".to_string(),
            xpath: "/html/body".to_string(),
            ..Default::default()
        }])
    }

    fn iframe_count(&self) -> Result<usize> {
        Ok(self.state().iframe_count)
    }

    fn focus_window(&self, window_handle: &WindowHandle) -> Result<()> {
        self.log_entry(&format!("focus {}", window_handle));
        Ok(())
    }
}

fn empty_dump() -> CaptureDump {
    CaptureDump {
        captured_items: Vec::new(),
        screen_elements: Vec::new(),
        mutated_items: Vec::new(),
        client_size: ClientSize::default(),
    }
}

#[derive(Debug, Clone)]
enum Recorded {
    Operation(Operation),
    Transition(ScreenTransition),
    Mutation(ScreenMutation),
    History(BrowserHistoryState),
    WindowsChanged(WindowsChangedEvent),
    Alert(bool),
    BrowserClosed,
    Error(String),
}

#[derive(Clone, Default)]
struct RecordingListener {
    events: Arc<Mutex<Vec<Recorded>>>,
}

impl RecordingListener {
    fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    fn operations(&self) -> Vec<Operation> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Recorded::Operation(operation) => Some(operation),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Recorded) {
        self.events.lock().unwrap().push(event);
    }
}

impl CaptureEventListener for RecordingListener {
    fn on_operation(&self, operation: &Operation) {
        self.push(Recorded::Operation(operation.clone()));
    }

    fn on_screen_transition(&self, transition: &ScreenTransition) {
        self.push(Recorded::Transition(transition.clone()));
    }

    fn on_mutation(&self, mutation: &ScreenMutation) {
        self.push(Recorded::Mutation(mutation.clone()));
    }

    fn on_history_changed(&self, state: BrowserHistoryState) {
        self.push(Recorded::History(state));
    }

    fn on_windows_changed(&self, event: &WindowsChangedEvent) {
        self.push(Recorded::WindowsChanged(event.clone()));
    }

    fn on_alert_visibility_changed(&self, visible: bool) {
        self.push(Recorded::Alert(visible));
    }

    fn on_browser_closed(&self) {
        self.push(Recorded::BrowserClosed);
    }

    fn on_error(&self, error: &CaptureError) {
        self.push(Recorded::Error(error.to_string()));
    }
}

fn session(
    client: MockClient,
) -> (CaptureSession<MockClient, RecordingListener>, RecordingListener) {
    let listener = RecordingListener::default();
    let session = CaptureSession::new(
        client,
        CaptureConfig::new().polling_interval_ms(1),
        listener.clone(),
    );
    (session, listener)
}

fn click_item(xpath: &str, timestamp: u64) -> CapturedItem {
    CapturedItem {
        operation: CapturedOperation {
            input: String::new(),
            operation_type: "click".to_string(),
            element_info: ElementInfo {
                tagname: "BUTTON".to_string(),
                xpath: xpath.to_string(),
                ..Default::default()
            },
            title: "title of w1".to_string(),
            url: "https://app.example/".to_string(),
            scroll_position: ScrollPosition::default(),
            timestamp,
        },
        iframe: None,
        suspended_event: None,
    }
}

#[test]
fn test_registry_follows_window_growth_and_shrink() {
    let client = MockClient::new(&[("A", "https://app.example/")]);
    let (mut session, listener) = session(client);

    session.tick().unwrap();
    assert!(session.client().log_contains("switch_window A"));

    // A second window opens and takes focus.
    session.client().set_windows(&[
        ("A", "https://app.example/"),
        ("B", "https://app.example/child"),
    ]);
    session.client().set_focused(Some("B"));
    session.tick().unwrap();

    // The move is recorded as an operation attributed to the window the
    // user left, with the new handle as input.
    let operations = listener.operations();
    let switch = operations
        .iter()
        .find(|op| op.operation_type == "switch_window")
        .expect("no switch_window operation");
    assert_eq!(switch.input, "B");
    assert_eq!(switch.window_handle.as_str(), "A");
    assert_eq!(switch.page_source, "source-of-A");

    // The growth event already knows the new window's first-paint url,
    // read when the window was instrumented in the background.
    let growth = listener
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Recorded::WindowsChanged(event) => Some(event),
            _ => None,
        })
        .find(|event| event.windows.len() == 2)
        .expect("no two-window event");
    let summary = growth
        .windows
        .iter()
        .find(|window| window.window_handle.as_str() == "B")
        .expect("window B missing from event");
    assert_eq!(summary.url, "https://app.example/child");
    assert_eq!(summary.title, "title of B");

    // The first window closes.
    session
        .client()
        .set_windows(&[("B", "https://app.example/child")]);
    session.tick().unwrap();

    let changed: Vec<WindowsChangedEvent> = listener
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Recorded::WindowsChanged(event) => Some(event),
            _ => None,
        })
        .collect();
    let last = changed.last().expect("no windows-changed events");
    assert_eq!(last.current_window_handle.as_str(), "B");
    assert_eq!(last.windows.len(), 1);
}

#[test]
fn test_closing_current_window_falls_back_to_neighbor() {
    let client = MockClient::new(&[("A", "https://a.example/"), ("B", "https://b.example/")]);
    client.set_focused(Some("A"));
    let (mut session, listener) = session(client);
    session.tick().unwrap();

    // The current window vanishes; no focused window is reported while the
    // browser settles. The unreadable page must not fail the tick.
    session.client().set_focused(None);
    session.client().set_windows(&[("B", "https://b.example/")]);
    session.tick().unwrap();

    assert!(session.client().log_contains("switch_window B"));

    // No departure operation: the window the user left no longer exists.
    let operations = listener.operations();
    assert!(operations.iter().all(|op| op.operation_type != "switch_window"));

    // Capture continues on the surviving window.
    session.tick().unwrap();
}

#[test]
fn test_switching_to_unknown_window_is_ignored() {
    let client = MockClient::new(&[("A", "https://a.example/")]);
    let (mut session, _listener) = session(client);
    session.tick().unwrap();

    session
        .switch_capturing_window(&WindowHandle::from("ghost"))
        .unwrap();

    assert!(!session.client().log_contains("switch_window ghost"));
    session.tick().unwrap();
}

#[test]
fn test_host_change_reshields_even_with_shield_disabled() {
    let client = MockClient::new(&[("A", "https://a.example/")]);
    let listener = RecordingListener::default();
    let mut session = CaptureSession::new(
        client,
        CaptureConfig::new()
            .polling_interval_ms(1)
            .shield_enabled(false),
        listener.clone(),
    );
    session.tick().unwrap();
    assert!(!session.client().log_contains("attach_shield"));

    session
        .client()
        .set_windows(&[("A", "https://a.example/"), ("B", "https://b.example/")]);
    session.client().set_focused(Some("B"));
    session.tick().unwrap();

    // Crossing to a new host re-arms the overlay on every window.
    assert!(session.client().log_contains("attach_shield"));
    let changed = listener
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Recorded::WindowsChanged(event) => Some(event),
            _ => None,
        })
        .last()
        .expect("no windows-changed event");
    assert!(changed.current_window_host_name_changed);
}

#[test]
fn test_browser_closed_ends_run_loop() {
    let client = MockClient::new(&[]);
    let (mut session, listener) = session(client);

    session.run().unwrap();

    assert!(matches!(listener.events().last(), Some(Recorded::BrowserClosed)));
}

#[test]
fn test_screen_transitions_and_history() {
    let client = MockClient::new(&[("w1", "https://app.example/start")]);
    let (mut session, listener) = session(client);

    session.tick().unwrap();
    session.client().set_current_url("https://app.example/next");
    session.tick().unwrap();

    let transitions: Vec<ScreenTransition> = listener
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Recorded::Transition(transition) => Some(transition),
            _ => None,
        })
        .collect();
    assert_eq!(transitions.len(), 2);
    assert_eq!(transitions[1].url, "https://app.example/next");
    assert!(transitions[1].image_data.starts_with("data:image/png;base64,"));

    let histories: Vec<BrowserHistoryState> = listener
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Recorded::History(state) => Some(state),
            _ => None,
        })
        .collect();
    assert!(histories.last().unwrap().can_go_back);

    // Going back is itself recorded, and navigates the browser.
    session.browser_back().unwrap();
    assert!(session.client().log_contains("navigate_back"));
    let operations = listener.operations();
    assert!(operations.iter().any(|op| op.operation_type == "browser_back"));

    // Forward is possible again after back.
    session.browser_forward().unwrap();
    assert!(session.client().log_contains("navigate_forward"));
}

#[test]
fn test_browser_back_without_history_is_rejected() {
    let client = MockClient::new(&[("w1", "https://app.example/")]);
    let (mut session, _listener) = session(client);
    session.tick().unwrap();

    assert!(session.browser_back().is_err());
}

#[test]
fn test_drained_operations_keep_capture_timestamps() {
    let client = MockClient::new(&[("w1", "https://app.example/")]);
    client.queue_dump(CaptureDump {
        captured_items: vec![click_item("//button[2]", 2000), click_item("//button[1]", 1000)],
        screen_elements: Vec::new(),
        mutated_items: Vec::new(),
        client_size: ClientSize {
            width: 1280,
            height: 800,
        },
    });
    let (mut session, listener) = session(client);

    session.tick().unwrap();

    let operations = listener.operations();
    let clicks: Vec<&Operation> = operations
        .iter()
        .filter(|op| op.operation_type == "click")
        .collect();
    assert_eq!(clicks.len(), 2);
    // Capture order and capture-time timestamps survive normalization.
    assert_eq!(clicks[0].timestamp, 2000);
    assert_eq!(clicks[1].timestamp, 1000);
    assert_eq!(clicks[0].window_handle.as_str(), "w1");
    assert!(clicks[0].image_data.starts_with("data:image/png;base64,"));
}

#[test]
fn test_mutations_pass_through_with_context() {
    let mutations = vec![ElementMutation::AttributeChange {
        target_element: ElementLocator {
            xpath: "//div[1]".to_string(),
            iframe: None,
        },
        attribute_name: "class".to_string(),
        new_value: "active".to_string(),
        old_value: "idle".to_string(),
    }];
    let client = MockClient::new(&[("w1", "https://app.example/")]);
    client.queue_dump(CaptureDump {
        captured_items: Vec::new(),
        screen_elements: Vec::new(),
        mutated_items: vec![CapturedMutation {
            timestamp: 7777,
            element_mutations: mutations.clone(),
            scroll_position: ScrollPosition { x: 0.0, y: 42.0 },
        }],
        client_size: ClientSize::default(),
    });
    let (mut session, listener) = session(client);

    session.tick().unwrap();

    let recorded: Vec<ScreenMutation> = listener
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Recorded::Mutation(mutation) => Some(mutation),
            _ => None,
        })
        .collect();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].timestamp, 7777);
    assert_eq!(recorded[0].element_mutations, mutations);
    assert_eq!(recorded[0].window_handle.as_str(), "w1");
}

#[test]
fn test_alert_suspends_capture_and_reports_edges() {
    let client = MockClient::new(&[("w1", "https://app.example/")]);
    let (mut session, listener) = session(client);
    session.tick().unwrap();

    session.client().queue_dump(CaptureDump {
        captured_items: vec![click_item("//button[1]", 1000)],
        screen_elements: Vec::new(),
        mutated_items: Vec::new(),
        client_size: ClientSize::default(),
    });

    session.client().set_alert(true);
    session.tick().unwrap();
    // Nothing was drained while the alert was up.
    assert!(listener.operations().iter().all(|op| op.operation_type != "click"));

    session.client().set_alert(false);
    session.tick().unwrap();
    assert!(listener.operations().iter().any(|op| op.operation_type == "click"));

    let alerts: Vec<bool> = listener
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Recorded::Alert(visible) => Some(visible),
            _ => None,
        })
        .collect();
    assert_eq!(alerts, vec![true, false]);
}

#[test]
fn test_pause_and_resume_are_recorded() {
    let client = MockClient::new(&[("w1", "https://app.example/")]);
    let (mut session, listener) = session(client);
    session.tick().unwrap();

    session.pause().unwrap();
    assert!(session.is_paused());
    assert!(session.client().capturing_is_paused().unwrap());
    // Pausing twice records once.
    session.pause().unwrap();

    session.resume().unwrap();
    assert!(!session.is_paused());

    let types: Vec<String> = listener
        .operations()
        .into_iter()
        .map(|op| op.operation_type)
        .collect();
    assert_eq!(
        types
            .iter()
            .filter(|t| *t == "pause_capturing")
            .count(),
        1
    );
    assert_eq!(
        types
            .iter()
            .filter(|t| *t == "resume_capturing")
            .count(),
        1
    );
}

#[test]
fn test_run_operation_replays_clicks_and_inputs() {
    let client = MockClient::new(&[("w1", "https://app.example/")]);
    let (mut session, _listener) = session(client);
    session.tick().unwrap();

    session
        .run_operation(&TargetOperation {
            input: String::new(),
            operation_type: "click".to_string(),
            element_info: Some(ElementInfo {
                tagname: "BUTTON".to_string(),
                xpath: "//button[1]".to_string(),
                ..Default::default()
            }),
            scroll_position: ScrollPosition::default(),
            client_size: ClientSize::default(),
        })
        .unwrap();
    assert!(session.client().log_contains("click //button[1] frame=None"));

    // A change inside an iframe switches into the frame first.
    session
        .run_operation(&TargetOperation {
            input: "hello".to_string(),
            operation_type: "change".to_string(),
            element_info: Some(ElementInfo {
                tagname: "INPUT".to_string(),
                xpath: "//input[1]".to_string(),
                iframe: Some(capture_session::operation::Iframe {
                    index: 1,
                    ..Default::default()
                }),
                ..Default::default()
            }),
            scroll_position: ScrollPosition::default(),
            client_size: ClientSize::default(),
        })
        .unwrap();
    assert!(session.client().log_contains("set_value //input[1]=hello"));

    // Unknown types are rejected.
    assert!(
        session
            .run_operation(&TargetOperation {
                input: String::new(),
                operation_type: "hover".to_string(),
                element_info: None,
                scroll_position: ScrollPosition::default(),
                client_size: ClientSize::default(),
            })
            .is_err()
    );
}

#[test]
fn test_enter_values_shields_and_survives_failures() {
    let client = MockClient::new(&[("w1", "https://app.example/")]);
    let (mut session, listener) = session(client);
    session.tick().unwrap();

    session
        .enter_values(&[
            InputValueSet {
                xpath: "//input[@name='user']".to_string(),
                input_value: "alice".to_string(),
                iframe_index: None,
            },
            InputValueSet {
                xpath: "//input[@name='missing']".to_string(),
                input_value: "x".to_string(),
                iframe_index: None,
            },
            InputValueSet {
                xpath: "//input[@name='pass']".to_string(),
                input_value: "secret".to_string(),
                iframe_index: None,
            },
        ])
        .unwrap();

    let log = session.client().log.lock().unwrap().clone();
    let attach_index = log.iter().position(|l| l == "attach_shield").unwrap();
    let first_fill = log
        .iter()
        .position(|l| l.starts_with("set_value //input[@name='user']"))
        .unwrap();
    assert!(attach_index < first_fill);

    // The failing field was reported but did not stop the batch.
    assert!(session.client().log_contains("set_value //input[@name='pass']=secret"));
    assert!(
        listener
            .events()
            .iter()
            .any(|event| matches!(event, Recorded::Error(_)))
    );
}

#[test]
fn test_window_selection_defers_focus_alignment() {
    let client = MockClient::new(&[("A", "https://a.example/"), ("B", "https://b.example/")]);
    client.set_focused(Some("A"));
    let (mut session, _listener) = session(client);
    session.tick().unwrap();

    session.select_capturing_window().unwrap();
    session.client().set_focused(Some("B"));
    let before = session.client().log.lock().unwrap().len();
    session.tick().unwrap();
    // Focus alignment is held while the embedder chooses.
    let during_selection = session.client().log.lock().unwrap()[before..].to_vec();
    assert!(during_selection.iter().all(|line| !line.starts_with("switch_window")));

    session
        .switch_capturing_window(&WindowHandle::from("B"))
        .unwrap();
    session.unselect_capturing_window().unwrap();
    let after_selection = session.client().log.lock().unwrap()[before..].to_vec();
    assert!(after_selection.iter().any(|line| line == "switch_window B"));
}

#[test]
fn test_suspended_events_are_refired_once() {
    let suspended = capture_session::script::SuspendedEvent {
        refire_type: "click".to_string(),
        event_info: EventInfo {
            id: "evt-9".to_string(),
            target_x_path: "//button[1]".to_string(),
            event_type: "click".to_string(),
            bubbles: true,
            cancelable: true,
        },
    };
    let mut item = click_item("//button[1]", 1000);
    item.suspended_event = Some(suspended);

    let client = MockClient::new(&[("w1", "https://app.example/")]);
    client.queue_dump(CaptureDump {
        captured_items: vec![item.clone()],
        screen_elements: Vec::new(),
        mutated_items: Vec::new(),
        client_size: ClientSize::default(),
    });
    let (mut session, _listener) = session(client);
    session.tick().unwrap();

    // The same item redelivered later is deduplicated, so no second refire.
    session.client().queue_dump(CaptureDump {
        captured_items: vec![item],
        screen_elements: Vec::new(),
        mutated_items: Vec::new(),
        client_size: ClientSize::default(),
    });
    session.tick().unwrap();

    let log = session.client().log.lock().unwrap().clone();
    assert_eq!(log.iter().filter(|l| l.as_str() == "refire evt-9").count(), 1);
}

#[test]
fn test_stop_handle_ends_run_loop() {
    let client = MockClient::new(&[("w1", "https://app.example/")]);
    let (mut session, _listener) = session(client);
    let stop = session.stop_handle();

    let runner = std::thread::spawn(move || session.run());
    std::thread::sleep(Duration::from_millis(20));
    stop.stop();

    runner.join().unwrap().unwrap();
}

#[test]
fn test_shield_traversals_are_mutually_exclusive() {
    let client = Arc::new(MockClient::new(&[("w1", "https://app.example/")]));
    client.state().current = Some("w1".to_string());
    client.state().iframe_count = 3;

    let handle = WindowHandle::from("w1");
    let mut threads = Vec::new();
    for enabled in [true, false, true, false] {
        let client = Arc::clone(&client);
        let handle = handle.clone();
        threads.push(std::thread::spawn(move || {
            set_shield_in_all_frames(&*client, &handle, enabled).unwrap();
        }));
    }
    for thread in threads {
        thread.join().unwrap();
    }

    assert!(!client.shield_overlap.load(Ordering::SeqCst));
    // Every traversal released the lock.
    assert!(client.frame_lock.lock().unwrap().is_none());
}
