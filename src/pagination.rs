use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

use crate::{
    config::MAX_PAGE_SIZE,
    error::{ApiError, ApiResult},
    repository::{Page, PageRequest},
};

/// PageParams
///
/// Page-number pagination accepted by every list endpoint.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
pub struct PageParams {
    /// 1-based page number (default 1).
    pub page: Option<u32>,
    /// Items per page (default from configuration, capped at 100).
    pub page_size: Option<u32>,
}

impl PageParams {
    /// Resolves the query into a concrete request. Page 0 is treated as page 1.
    pub fn resolve(self, default_size: u32) -> PageRequest {
        PageRequest {
            page: self.page.unwrap_or(1).max(1),
            page_size: self
                .page_size
                .unwrap_or(default_size)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }
}

/// Paginated
///
/// Envelope returned by every list endpoint. `next`/`previous` are page numbers,
/// `null` at either end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub count: u64,
    pub next: Option<u32>,
    pub previous: Option<u32>,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    /// Wraps a repository page. A page past the last one is a 404; the first
    /// page of an empty listing is not.
    pub fn from_page<U>(page: Page<U>, request: PageRequest) -> ApiResult<Self>
    where
        U: Into<T>,
    {
        let size = u64::from(request.page_size);
        let last_page = page.count.div_ceil(size).max(1);
        if u64::from(request.page) > last_page {
            return Err(ApiError::NotFound("Invalid page.".to_string()));
        }

        Ok(Self {
            count: page.count,
            next: (u64::from(request.page) < last_page).then(|| request.page + 1),
            previous: (request.page > 1).then(|| request.page - 1),
            results: page.items.into_iter().map(Into::into).collect(),
        })
    }
}
