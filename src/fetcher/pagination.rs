//! Cursor pagination over Mindat list endpoints
//!
//! The API answers list requests in one of two shapes:
//!
//! - a bare JSON array: a single page without cursor
//! - `{"count": n, "next": url|null, "results": [...]}`: follow `next` until null
//!
//! [`Paged`] is a pull producer over either shape. It is finite, forward-only
//! and cannot be rewound; starting over means issuing the request again.

use crate::downloader::config::MAX_PAGES;
use crate::fetcher::{FetcherError, FetcherResult, QueryParams, Transport};
use crate::Locality;
use futures_util::stream::{self, Stream};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// One decoded page of a list response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    /// Items in arrival order
    pub items: Vec<Value>,
    /// Absolute URL of the next page
    pub next: Option<String>,
    /// Total number of items reported by the server
    pub count: Option<u64>,
}

/// Split a list response into items, cursor and count
///
/// Anything other than a list or a dict carrying a `results` list is an empty
/// terminal page.
pub fn extract_page(data: Value) -> Page {
    match data {
        Value::Array(items) => Page {
            items,
            next: None,
            count: None,
        },
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(items)) => Page {
                items,
                next: map
                    .get("next")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
                count: map.get("count").and_then(Value::as_u64),
            },
            _ => Page::default(),
        },
        _ => Page::default(),
    }
}

enum Cursor {
    Start { url: String, params: QueryParams },
    Next(String),
    Done,
}

/// Lazily paged sequence of `T`
pub struct Paged<T> {
    transport: Arc<dyn Transport>,
    cursor: Cursor,
    convert: fn(Value) -> Option<T>,
    buffer: VecDeque<T>,
    pages: usize,
    total: Option<u64>,
}

/// Paged locality search results
pub type LocalityPages = Paged<Locality>;

/// Paged mineral records of one locality
pub type MineralPages = Paged<Value>;

impl<T> Paged<T> {
    /// Prepare a walk; nothing is requested until the first pull
    pub fn new(
        transport: Arc<dyn Transport>,
        url: impl Into<String>,
        params: QueryParams,
        convert: fn(Value) -> Option<T>,
    ) -> Self {
        Self {
            transport,
            cursor: Cursor::Start {
                url: url.into(),
                params,
            },
            convert,
            buffer: VecDeque::new(),
            pages: 0,
            total: None,
        }
    }

    /// Total reported by the server on the most recent page
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Pages fetched so far
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Whether no further pages will be requested
    pub fn is_finished(&self) -> bool {
        matches!(self.cursor, Cursor::Done)
    }

    /// Fetch the next page and return its converted items
    ///
    /// Returns `None` once the cursor is exhausted. Items buffered by
    /// [`Paged::next_item`] are not included. A failed request ends the walk.
    pub async fn next_page(&mut self) -> FetcherResult<Option<Vec<T>>> {
        let (url, params) = match std::mem::replace(&mut self.cursor, Cursor::Done) {
            Cursor::Done => return Ok(None),
            Cursor::Start { url, params } => (url, params),
            // Cursor URLs already carry the query string
            Cursor::Next(url) => (url, Vec::new()),
        };

        if self.pages >= MAX_PAGES {
            return Err(FetcherError::TooManyPages {
                limit: MAX_PAGES,
                url,
            });
        }

        let data = self.transport.get_json(&url, &params).await?;
        self.pages += 1;

        let page = extract_page(data);
        if page.count.is_some() {
            self.total = page.count;
        }
        debug!(
            url = %url,
            page = self.pages,
            items = page.items.len(),
            has_next = page.next.is_some(),
            "Fetched page"
        );

        if let Some(next) = page.next {
            self.cursor = Cursor::Next(next);
        }

        let convert = self.convert;
        let mut items = Vec::with_capacity(page.items.len());
        for raw in page.items {
            match convert(raw) {
                Some(item) => items.push(item),
                None => warn!(url = %url, "Skipping list item that is not a JSON object"),
            }
        }
        Ok(Some(items))
    }

    /// Pull the next item, fetching pages as needed
    ///
    /// Empty pages that still carry a cursor are skipped over.
    pub async fn next_item(&mut self) -> FetcherResult<Option<T>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            match self.next_page().await? {
                Some(items) => self.buffer.extend(items),
                None => return Ok(None),
            }
        }
    }

    /// Drain every remaining item
    pub async fn collect_all(mut self) -> FetcherResult<Vec<T>> {
        let mut out = Vec::new();
        while let Some(item) = self.next_item().await? {
            out.push(item);
        }
        Ok(out)
    }

    /// Adapt into a `Stream`
    pub fn into_stream(self) -> impl Stream<Item = FetcherResult<T>>
    where
        T: Send + 'static,
    {
        stream::try_unfold(self, |mut paged| async move {
            let item = paged.next_item().await?;
            Ok::<_, FetcherError>(item.map(|item| (item, paged)))
        })
    }
}

/// Converter for locality lists: objects only
pub fn to_locality(value: Value) -> Option<Locality> {
    Locality::from_value(value)
}

/// Converter for mineral lists: objects only
pub fn to_object(value: Value) -> Option<Value> {
    value.is_object().then_some(value)
}
