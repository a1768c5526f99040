//! Lazy page-by-page traversal of listing endpoints.
//!
//! A [`PageSource`] knows how to fetch one page for a cursor; [`paginate`]
//! drives it until the listing is exhausted, the reported total is reached,
//! the server stops handing out cursors, or the caller's `nmax` is met.

use async_trait::async_trait;
use futures::Stream;
use tracing::debug;

use crate::error::FetchError;
use crate::table::Record;

/// Where the next page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    Offset(usize),
    Token(String),
    NextUrl(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Record>,
    pub total: Option<usize>,
    pub next: Option<PageCursor>,
}

impl Page {
    /// A page of an offset-paged listing that started at `offset`.
    pub fn offset(items: Vec<Record>, total: Option<usize>, offset: usize) -> Self {
        let next = Some(PageCursor::Offset(offset + items.len()));
        Self { items, total, next }
    }

    pub fn token(items: Vec<Record>, total: Option<usize>, token: Option<String>) -> Self {
        Self {
            items,
            total,
            next: token.filter(|t| !t.is_empty()).map(PageCursor::Token),
        }
    }

    pub fn next_url(items: Vec<Record>, total: Option<usize>, url: Option<String>) -> Self {
        Self {
            items,
            total,
            next: url.filter(|u| !u.is_empty()).map(PageCursor::NextUrl),
        }
    }
}

#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, cursor: &PageCursor, page_size: usize) -> Result<Page, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginateOptions {
    pub page_size: usize,
    pub nmax: Option<usize>,
    pub skip: usize,
}

impl Default for PaginateOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            nmax: None,
            skip: 0,
        }
    }
}

struct Walk<'a, S: ?Sized> {
    source: &'a S,
    options: PaginateOptions,
    cursor: Option<PageCursor>,
    seen: usize,
    total: Option<usize>,
    pages: usize,
}

impl<S: ?Sized> Walk<'_, S> {
    fn remaining(&self) -> Option<usize> {
        self.options.nmax.map(|n| n.saturating_sub(self.seen))
    }

    fn exhausted(&self) -> bool {
        let past_total = self
            .total
            .is_some_and(|total| self.options.skip + self.seen >= total);
        past_total || self.remaining() == Some(0)
    }
}

/// Streams pages starting at `Offset(options.skip)`.
///
/// The empty page that ends a listing is not yielded. A failed page is
/// yielded once as `Err` and ends the stream.
pub fn paginate<'a, S>(
    source: &'a S,
    options: PaginateOptions,
) -> impl Stream<Item = Result<Page, FetchError>> + 'a
where
    S: PageSource + ?Sized,
{
    let walk = Walk {
        source,
        options,
        cursor: Some(PageCursor::Offset(options.skip)),
        seen: 0,
        total: None,
        pages: 0,
    };

    futures::stream::unfold(walk, |mut walk| async move {
        let cursor = walk.cursor.take()?;
        if walk.exhausted() {
            return None;
        }
        let page_size = match walk.remaining() {
            Some(remaining) => walk.options.page_size.min(remaining),
            None => walk.options.page_size,
        }
        .max(1);

        let mut page = match walk.source.fetch_page(&cursor, page_size).await {
            Ok(page) => page,
            Err(err) => return Some((Err(err), walk)),
        };
        if page.items.is_empty() {
            debug!(pages = walk.pages, seen = walk.seen, "Listing ended with an empty page");
            return None;
        }
        if let Some(remaining) = walk.remaining() {
            page.items.truncate(remaining);
        }

        walk.pages += 1;
        walk.seen += page.items.len();
        if page.total.is_some() {
            walk.total = page.total;
        }
        debug!(
            page = walk.pages,
            items = page.items.len(),
            seen = walk.seen,
            total = ?walk.total,
            "Fetched page"
        );

        walk.cursor = page.next.take();
        Some((Ok(page), walk))
    })
}
