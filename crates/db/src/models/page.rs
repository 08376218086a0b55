use sea_orm::{ConnectionTrait, EntityTrait, Order, PaginatorTrait, Select};
use serde::Serialize;

use super::validation::ModelError;

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

/// 1-based page number pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub page_size: u64,
}

impl PageRequest {
    pub fn new(page: Option<u64>, page_size: Option<u64>, default_page_size: u64) -> Self {
        let page_size = page_size
            .filter(|size| *size > 0)
            .unwrap_or(default_page_size)
            .clamp(1, MAX_PAGE_SIZE);
        Self {
            page: page.filter(|page| *page > 0).unwrap_or(1),
            page_size,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: u64,
    pub page: u64,
    pub page_size: u64,
    pub next: Option<u64>,
    pub previous: Option<u64>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        let results = self.results.into_iter().map(f).collect();
        Page {
            count: self.count,
            page: self.page,
            page_size: self.page_size,
            next: self.next,
            previous: self.previous,
            results,
        }
    }
}

/// Runs `select` as one page. Asking for a page past the end is `NotFound`,
/// except page 1 which is always valid (and empty for an empty set).
pub async fn fetch_page<C, E>(
    db: &C,
    select: Select<E>,
    request: PageRequest,
) -> Result<Page<E::Model>, ModelError>
where
    C: ConnectionTrait,
    E: EntityTrait,
    E::Model: Send + Sync,
{
    let paginator = select.paginate(db, request.page_size);
    let count = paginator.num_items().await?;
    let num_pages = count.div_ceil(request.page_size);
    if request.page > 1 && request.page > num_pages {
        return Err(ModelError::NotFound("Page"));
    }

    let results = paginator.fetch_page(request.page - 1).await?;
    Ok(Page {
        count,
        page: request.page,
        page_size: request.page_size,
        next: (request.page < num_pages).then_some(request.page + 1),
        previous: (request.page > 1).then_some(request.page - 1),
        results,
    })
}

/// Parses a `?ordering=` value such as `-created_at`. Unknown fields fall
/// back to `default`.
pub fn parse_ordering<'a>(
    raw: Option<&'a str>,
    allowed: &[&'a str],
    default: (&'a str, Order),
) -> (&'a str, Order) {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return default;
    };
    let (field, order) = match raw.strip_prefix('-') {
        Some(field) => (field, Order::Desc),
        None => (raw, Order::Asc),
    };
    if allowed.contains(&field) {
        (field, order)
    } else {
        tracing::debug!("Ignoring unknown ordering field '{}'", field);
        default
    }
}
