//! Product query model: filters, sort order, pagination and result views.
//!
//! [`select_products`] is the reference evaluation of a [`ProductQuery`] over
//! an in-memory product set. SQL backends must produce the same order: the
//! chosen sort key in the chosen direction, then product id ascending.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use shopswift_core::{CategoryId, DomainError, DomainResult, Money};

use crate::category::Category;
use crate::product::Product;
use crate::rating::{RatingIndex, RatingSummary};

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

/// Conjunctive product filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub category_id: Option<CategoryId>,
    /// Case-insensitive substring matched against name or description.
    pub search: Option<String>,
    /// Inclusive lower price bound.
    pub min_price: Option<Money>,
    /// Inclusive upper price bound.
    pub max_price: Option<Money>,
    pub featured_only: bool,
    /// Admin listings also see soft-deleted products.
    pub include_inactive: bool,
}

impl ProductFilter {
    /// Search term normalised for matching; blank terms are ignored.
    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches(&self, product: &Product) -> bool {
        if !self.include_inactive && !product.is_active {
            return false;
        }
        if let Some(category_id) = self.category_id {
            if product.category_id != Some(category_id) {
                return false;
            }
        }
        if let Some(min) = self.min_price {
            if product.price < min {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if product.price > max {
                return false;
            }
        }
        if self.featured_only && !product.is_featured {
            return false;
        }
        if let Some(term) = self.search_term() {
            let in_name = product.name.to_lowercase().contains(&term);
            let in_description = product
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&term));
            if !in_name && !in_description {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Price,
    /// Byte-wise and case-sensitive: uppercase sorts before lowercase, so
    /// "Zebra" comes before "apple". Postgres matches this with `COLLATE "C"`.
    Name,
    #[default]
    CreatedAt,
    Rating,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ProductSort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl ProductSort {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Newest first, used by the featured listing.
    pub fn newest_first() -> Self {
        Self::new(SortField::CreatedAt, SortDirection::Desc)
    }

    /// Total order over products. Ties on the primary key fall back to id ascending.
    pub fn compare(&self, a: &Product, b: &Product, ratings: &RatingIndex) -> Ordering {
        let primary = match self.field {
            SortField::Price => a.price.cmp(&b.price),
            SortField::Name => a.name.as_bytes().cmp(b.name.as_bytes()),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::Rating => ratings.average(a.id).total_cmp(&ratings.average(b.id)),
        };
        self.direction.apply(primary).then_with(|| a.id.cmp(&b.id))
    }
}

/// Offset pagination window.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PageRequest {
    skip: u64,
    limit: u32,
}

impl PageRequest {
    pub fn new(skip: u64, limit: u32) -> DomainResult<Self> {
        Self::bounded(skip, limit, MAX_LIMIT)
    }

    /// Like [`PageRequest::new`] with a tighter upper bound on `limit`.
    pub fn bounded(skip: u64, limit: u32, max_limit: u32) -> DomainResult<Self> {
        if limit == 0 || limit > max_limit {
            return Err(DomainError::validation(format!(
                "limit must be between 1 and {max_limit}"
            )));
        }
        Ok(Self { skip, limit })
    }

    pub fn skip(&self) -> u64 {
        self.skip
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductQuery {
    pub filter: ProductFilter,
    pub sort: ProductSort,
    pub page: PageRequest,
}

/// Product as returned by read operations, with derived rating fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub category: Option<Category>,
    pub average_rating: f64,
    pub review_count: u32,
}

impl ProductView {
    pub fn new(product: Product, category: Option<Category>, rating: RatingSummary) -> Self {
        Self {
            product,
            category,
            average_rating: rating.average_rating,
            review_count: rating.review_count,
        }
    }
}

/// One page of results plus the pre-pagination total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub skip: u64,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, page: PageRequest) -> Self {
        Self {
            items,
            total,
            skip: page.skip(),
            limit: page.limit(),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            skip: self.skip,
            limit: self.limit,
        }
    }
}

/// Filter, globally sort, then paginate. Returns the page and the filtered total.
pub fn select_products<'a, I>(
    products: I,
    ratings: &RatingIndex,
    query: &ProductQuery,
) -> (Vec<Product>, u64)
where
    I: IntoIterator<Item = &'a Product>,
{
    let mut matching: Vec<&Product> = products
        .into_iter()
        .filter(|p| query.filter.matches(p))
        .collect();
    let total = matching.len() as u64;

    matching.sort_by(|a, b| query.sort.compare(a, b, ratings));

    let skip = usize::try_from(query.page.skip()).unwrap_or(usize::MAX);
    let items = matching
        .into_iter()
        .skip(skip)
        .take(query.page.limit() as usize)
        .cloned()
        .collect();
    (items, total)
}
