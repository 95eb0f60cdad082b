//! Turns raw page-side capture data into the records the listener sees.
//!
//! Timestamps were assigned in the page at capture time and are never
//! rewritten here; output order follows input order. The normalizer only
//! drops duplicates, attributes elements to their frames, and fills in the
//! screen context the page cannot know (window handle, screenshot).

use crate::events::ScreenMutation;
use crate::operation::{
    ClientSize, ElementInfo, Operation, ScreenElements, WindowHandle,
};
use crate::script::{CaptureDump, CapturedItem, CapturedMutation, SuspendedEvent};
use std::collections::HashSet;
use std::collections::VecDeque;

/// How many dedup keys to remember. Buffers on the page side are bounded
/// at 1000 items, so anything older cannot reappear.
const DEDUP_CAPACITY: usize = 1000;

/// Screen context shared by every record normalized from one drain of one
/// window.
pub struct CaptureContext<'a> {
    pub window_handle: &'a WindowHandle,
    pub title: &'a str,
    pub url: &'a str,
    pub image_data: &'a str,
    pub page_source: &'a str,
}

/// Output of normalizing one capture dump.
#[derive(Default)]
pub struct NormalizedCapture {
    pub operations: Vec<Operation>,
    pub mutations: Vec<ScreenMutation>,
    /// Events the page held back while capturing; the engine refires them
    /// once processing is done.
    pub suspended_events: Vec<SuspendedEvent>,
}

/// Stateful deduplicating normalizer. One instance lives for the whole
/// session so re-delivered items are recognized across ticks.
pub struct OperationNormalizer {
    seen: HashSet<String>,
    seen_order: VecDeque<String>,
}

impl Default for OperationNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationNormalizer {
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
        }
    }

    /// Normalize a drained dump against the given screen context.
    pub fn normalize(&mut self, dump: CaptureDump, context: &CaptureContext<'_>) -> NormalizedCapture {
        let CaptureDump {
            captured_items,
            screen_elements,
            mutated_items,
            client_size,
        } = dump;

        let mut result = NormalizedCapture::default();

        for item in captured_items {
            if !self.remember(dedup_key(&item)) {
                continue;
            }
            if let Some(suspended) = &item.suspended_event {
                result.suspended_events.push(suspended.clone());
            }
            result
                .operations
                .push(to_operation(item, &screen_elements, client_size, context));
        }

        result.mutations = mutated_items
            .into_iter()
            .map(|mutation| to_screen_mutation(mutation, context))
            .collect();

        result
    }

    /// Record a key; false when it was already known.
    fn remember(&mut self, key: String) -> bool {
        if self.seen.contains(&key) {
            return false;
        }
        if self.seen_order.len() == DEDUP_CAPACITY {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(key.clone());
        self.seen_order.push_back(key);
        true
    }
}

fn dedup_key(item: &CapturedItem) -> String {
    // Suspended events carry a page-assigned id; everything else is keyed
    // by target, type, and capture time.
    if let Some(suspended) = &item.suspended_event {
        if !suspended.event_info.id.is_empty() {
            return suspended.event_info.id.clone();
        }
    }
    format!(
        "{}#{}#{}",
        item.operation.element_info.xpath, item.operation.operation_type, item.operation.timestamp
    )
}

fn to_operation(
    item: CapturedItem,
    screen_elements: &[ScreenElements],
    client_size: ClientSize,
    context: &CaptureContext<'_>,
) -> Operation {
    let CapturedItem {
        operation, iframe, ..
    } = item;

    let element_info = ElementInfo {
        iframe,
        ..operation.element_info
    };

    Operation {
        input: operation.input,
        operation_type: operation.operation_type,
        element_info: Some(element_info),
        scroll_position: operation.scroll_position,
        client_size,
        title: operation.title,
        url: operation.url,
        image_data: context.image_data.to_string(),
        window_handle: context.window_handle.clone(),
        timestamp: operation.timestamp,
        screen_elements: screen_elements.to_vec(),
        page_source: context.page_source.to_string(),
    }
}

fn to_screen_mutation(mutation: CapturedMutation, context: &CaptureContext<'_>) -> ScreenMutation {
    ScreenMutation {
        element_mutations: mutation.element_mutations,
        timestamp: mutation.timestamp,
        image_data: context.image_data.to_string(),
        window_handle: context.window_handle.clone(),
        title: context.title.to_string(),
        url: context.url.to_string(),
        scroll_position: Some(mutation.scroll_position),
    }
}
