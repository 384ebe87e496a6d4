use std::str::FromStr;

use serde::{Deserialize, Serialize};

use shopswift_catalog::query::DEFAULT_LIMIT;
use shopswift_catalog::{
    PageRequest, Product, ProductFilter, ProductQuery, ProductSort, SortDirection, SortField,
};
use shopswift_core::{CategoryId, DomainError, Money, ProductId};
use shopswift_orders::OrderStatus;

use crate::app::errors::ApiError;

// -------------------------
// Query parameters
// -------------------------

/// `GET /products` and `GET /admin/products`. Prices are in cents.
#[derive(Debug, Default, Deserialize)]
pub struct ProductListParams {
    #[serde(default)]
    pub skip: u64,
    pub limit: Option<u32>,
    pub category_id: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub sort_by: Option<SortField>,
    pub order: Option<SortDirection>,
    #[serde(default)]
    pub featured_only: bool,
    #[serde(default)]
    pub include_inactive: bool,
}

impl ProductListParams {
    pub fn into_query(self) -> Result<ProductQuery, ApiError> {
        let category_id = self
            .category_id
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(parse_id::<CategoryId>)
            .transpose()?;

        Ok(ProductQuery {
            filter: ProductFilter {
                category_id,
                search: self.search,
                min_price: self.min_price.map(Money::from_cents),
                max_price: self.max_price.map(Money::from_cents),
                featured_only: self.featured_only,
                include_inactive: self.include_inactive,
            },
            sort: ProductSort::new(self.sort_by.unwrap_or_default(), self.order.unwrap_or_default()),
            page: PageRequest::new(self.skip, self.limit.unwrap_or(DEFAULT_LIMIT))?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FeaturedParams {
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewListParams {
    #[serde(default)]
    pub skip: u64,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteProductParams {
    #[serde(default)]
    pub permanent: bool,
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AddCartItemRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartItemRequest {
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct ImageUploadResponse {
    pub image_url: Option<String>,
    pub product: Product,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
    pub permanent: bool,
}

// -------------------------
// Helpers
// -------------------------

/// Parse a path or query identifier; malformed values are a 400.
pub fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = DomainError>,
{
    T::from_str(raw.trim()).map_err(ApiError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_default_to_first_page_newest_first() {
        let query = ProductListParams::default().into_query().unwrap();
        assert_eq!(query.page.skip(), 0);
        assert_eq!(query.page.limit(), DEFAULT_LIMIT);
        assert_eq!(query.sort, ProductSort::default());
        assert!(!query.filter.include_inactive);
    }

    #[test]
    fn list_params_carry_filters_in_cents() {
        let category = CategoryId::new();
        let params = ProductListParams {
            category_id: Some(category.to_string()),
            min_price: Some(500),
            max_price: Some(2_000),
            sort_by: Some(SortField::Price),
            order: Some(SortDirection::Asc),
            limit: Some(5),
            ..ProductListParams::default()
        };
        let query = params.into_query().unwrap();
        assert_eq!(query.filter.category_id, Some(category));
        assert_eq!(query.filter.min_price, Some(Money::from_cents(500)));
        assert_eq!(query.filter.max_price, Some(Money::from_cents(2_000)));
        assert_eq!(query.sort, ProductSort::new(SortField::Price, SortDirection::Asc));
        assert_eq!(query.page.limit(), 5);
    }

    #[test]
    fn out_of_range_limit_is_rejected() {
        let params = ProductListParams {
            limit: Some(101),
            ..ProductListParams::default()
        };
        assert!(params.into_query().is_err());
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert!(parse_id::<ProductId>("not-a-uuid").is_err());
        let id = ProductId::new();
        assert_eq!(parse_id::<ProductId>(&id.to_string()).unwrap(), id);
    }
}
