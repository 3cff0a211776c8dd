//! Cursor-based device listing
//!
//! `GET /v2.0/cloud/thing/device` pages by the id of the last device of the
//! previous page (`last_id`). A page is requested, its devices kept, and the
//! loop stops on the first of:
//!
//! 1. an empty (or non-array) page
//! 2. single-page mode
//! 3. a last device without an id
//! 4. a page shorter than the page size
//! 5. a cursor that was already followed
//!
//! The cursor is updated before the short-page check, so the devices of a
//! short final page are always included.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use crate::dispatch::RequestDispatcher;
use crate::error::{Result, ResultExt};
use crate::sign::rfc3986_encode;
use crate::types::Device;

pub const DEVICE_LIST_PATH: &str = "/v2.0/cloud/thing/device";

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 200;

/// Walks the device list one page at a time
///
/// Not restartable: once finished, [`next_page`](Self::next_page) keeps
/// returning `None`.
#[derive(Debug)]
pub struct DevicePaginator<'a> {
    dispatcher: &'a RequestDispatcher,
    page_size: u32,
    fetch_all: bool,
    last_id: Option<String>,
    seen_cursors: HashSet<String>,
    pages: usize,
    finished: bool,
}

impl<'a> DevicePaginator<'a> {
    /// `page_size` is clamped to `1..=200`
    pub fn new(dispatcher: &'a RequestDispatcher, page_size: u32, fetch_all: bool) -> Self {
        Self {
            dispatcher,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            fetch_all,
            last_id: None,
            seen_cursors: HashSet::new(),
            pages: 0,
            finished: false,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of pages fetched so far
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Request path of the next page
    fn page_path(&self) -> String {
        let mut path = format!("{}?page_size={}", DEVICE_LIST_PATH, self.page_size);
        if let Some(last_id) = &self.last_id {
            path.push_str("&last_id=");
            path.push_str(&rfc3986_encode(last_id));
        }
        path
    }

    /// Fetch the next page, or `None` once the listing is exhausted
    pub async fn next_page(&mut self) -> Result<Option<Vec<Device>>> {
        if self.finished {
            return Ok(None);
        }

        let path = self.page_path();
        let result = self
            .dispatcher
            .get(&path)
            .await
            .with_context(|| format!("device page {}", self.pages + 1))?;
        self.pages += 1;

        let items = match result {
            Value::Array(items) if !items.is_empty() => items,
            _ => {
                debug!(page = self.pages, "Empty device page, listing complete");
                self.finished = true;
                return Ok(None);
            }
        };

        let count = items.len();
        let next_cursor = items.last().and_then(cursor_of);
        let devices: Vec<Device> = items.into_iter().map(Device::from_value).collect();

        debug!(page = self.pages, count, "Fetched device page");

        if !self.fetch_all {
            self.finished = true;
            return Ok(Some(devices));
        }

        match next_cursor {
            None => {
                debug!("Last device has no id, stopping pagination");
                self.finished = true;
            }
            Some(cursor) => {
                if !self.seen_cursors.insert(cursor.clone()) {
                    warn!(cursor = %cursor, "Cursor repeated, stopping pagination");
                    self.finished = true;
                }
                self.last_id = Some(cursor);
                if count < self.page_size as usize {
                    self.finished = true;
                }
            }
        }

        Ok(Some(devices))
    }

    /// Drain every remaining page into one list
    pub async fn collect(mut self) -> Result<Vec<Device>> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page);
        }
        Ok(all)
    }
}

/// The `id` of a raw device record, usable as the next `last_id`
fn cursor_of(item: &Value) -> Option<String> {
    match item.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
