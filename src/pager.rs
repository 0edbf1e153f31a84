//! Cursor pagination over compiled filters.

use serde::Serialize;

use crate::error::{CatalogError, CatalogResult};
use crate::query::{CompiledQuery, Filter};
use crate::record::VideoRecord;
use crate::store::{DocumentStore, VideoId};

pub const DEFAULT_PAGE_LIMIT: u64 = 10_000;
pub const MAX_PAGE_LIMIT: u64 = 30_000_000;

/// One page of the listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub data: Vec<VideoRecord>,
    pub next_cursor: Option<String>,
    pub count: usize,
    pub estimated_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_counts: Option<FilterCounts>,
}

/// How many documents each supplied filter matches on its own. Filters that
/// were not supplied report zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterCounts {
    pub title: u64,
    pub description: u64,
    #[serde(rename = "transcriptText")]
    pub transcript_text: u64,
    pub search: u64,
}

#[derive(Debug, Clone)]
pub struct PageRequest {
    pub limit: u64,
    pub last_id: Option<String>,
    pub with_filter_counts: bool,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            last_id: None,
            with_filter_counts: false,
        }
    }
}

/// Rejects a page size outside `1..=max_limit`.
pub fn check_limit(limit: u64, max_limit: u64) -> CatalogResult<()> {
    if (1..=max_limit).contains(&limit) {
        Ok(())
    } else {
        Err(CatalogError::validation(format!(
            "limit must be between 1 and {max_limit}, got {limit}"
        )))
    }
}

/// Parses the cursor token handed out as `next_cursor`.
pub fn parse_cursor(token: &str) -> CatalogResult<VideoId> {
    token
        .parse()
        .map_err(|_| CatalogError::InvalidCursor(token.to_owned()))
}

/// Fetches the page after `request.last_id`.
///
/// `next_cursor` is set exactly when the page is full. A final page that
/// happens to hold `limit` records therefore still hands out a cursor, and
/// the following request returns an empty page.
pub fn fetch_page<S: DocumentStore>(
    store: &S,
    query: &CompiledQuery,
    request: &PageRequest,
    max_limit: u64,
) -> CatalogResult<Page> {
    check_limit(request.limit, max_limit)?;

    let cursor = request
        .last_id
        .as_deref()
        .filter(|token| !token.is_empty())
        .map(parse_cursor)
        .transpose()?;

    let filter_counts = if request.with_filter_counts {
        Some(count_filters(store, query)?)
    } else {
        None
    };

    let filter = match cursor {
        Some(id) => query.filter.clone().and(Filter::IdAfter(id)),
        None => query.filter.clone(),
    };

    let docs = store.find_matching(&filter, &query.projection, request.limit)?;
    let next_cursor = if docs.len() as u64 == request.limit {
        docs.last().map(|doc| doc.id.to_string())
    } else {
        None
    };

    let data: Vec<VideoRecord> = docs
        .iter()
        .map(|stored| VideoRecord::from_document(stored.id, &stored.doc, &query.paths))
        .collect();

    let estimated_count = store.count_estimate()?;

    tracing::debug!(
        returned = data.len(),
        limit = request.limit,
        cursor = ?cursor,
        has_next = next_cursor.is_some(),
        "fetched video page"
    );

    Ok(Page {
        count: data.len(),
        data,
        next_cursor,
        estimated_count,
        filter_counts,
    })
}

fn count_filters<S: DocumentStore>(
    store: &S,
    query: &CompiledQuery,
) -> CatalogResult<FilterCounts> {
    let parts = &query.parts;
    let slots = [
        &parts.title,
        &parts.description,
        &parts.transcript_text,
        &parts.search,
    ];
    let supplied: Vec<Filter> = slots.iter().filter_map(|slot| (*slot).clone()).collect();
    let mut counts = store.count_each(&supplied)?.into_iter();

    let mut next = |slot: &Option<Filter>| match slot {
        Some(_) => counts.next().unwrap_or(0),
        None => 0,
    };

    Ok(FilterCounts {
        title: next(slots[0]),
        description: next(slots[1]),
        transcript_text: next(slots[2]),
        search: next(slots[3]),
    })
}
