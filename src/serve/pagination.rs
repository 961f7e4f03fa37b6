use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// Raw `page`/`limit` query params. They arrive as strings so that anything
/// unparseable can fall back to the defaults instead of failing extraction.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

fn parse_or(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|s| s.parse().ok()).unwrap_or(default)
}

impl PageRequest {
    pub fn from_query(query: &PageQuery) -> Self {
        let page = parse_or(query.page.as_deref(), DEFAULT_PAGE);
        let limit = parse_or(query.limit.as_deref(), DEFAULT_LIMIT);

        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_LIMIT),
        }
    }

    /// Saturating: an absurdly large page clamps to the end of the keyspace
    /// and reads back as a valid empty page instead of overflowing.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: i64,
    pub page_size: i64,
    pub total_items: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl Pagination {
    pub fn new(request: &PageRequest, total_items: i64) -> Self {
        let total_pages = if total_items == 0 {
            0
        } else {
            (total_items + request.limit - 1) / request.limit
        };

        Self {
            current_page: request.page,
            page_size: request.limit,
            total_items,
            total_pages,
            has_next: request.page < total_pages,
            has_previous: request.page > 1,
        }
    }
}

#[derive(Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}
