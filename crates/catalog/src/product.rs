use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopswift_core::{CategoryId, DomainError, DomainResult, Entity, Money, Patch, ProductId};

const MAX_NAME_LEN: usize = 200;
const MAX_IMAGE_LEN: usize = 500;

/// A sellable catalog entry.
///
/// Invariants: `price > 0`; `stock_quantity` is never negative (enforced by the type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    /// Price in smallest currency unit (e.g., cents).
    pub price: Money,
    pub stock_quantity: u32,
    pub category_id: Option<CategoryId>,
    pub image: Option<String>,
    pub is_active: bool,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> ProductId {
        self.id
    }
}

/// Request: create a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Money,
    #[serde(default)]
    pub stock_quantity: u32,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub is_featured: bool,
}

/// Request: partial product update.
///
/// `Option` fields are non-nullable (absent = unchanged); `Patch` fields may also be cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Patch<String>,
    pub price: Option<Money>,
    pub stock_quantity: Option<u32>,
    pub category_id: Patch<CategoryId>,
    pub image: Patch<String>,
    pub is_featured: Option<bool>,
    pub is_active: Option<bool>,
}

impl ProductUpdate {
    /// Category the product will reference once the update is applied, if it changes.
    pub fn new_category(&self) -> Option<CategoryId> {
        match &self.category_id {
            Patch::Set(id) => Some(*id),
            _ => None,
        }
    }
}

impl Product {
    /// Build a new, active product from a creation request.
    pub fn create(request: NewProduct, now: DateTime<Utc>) -> DomainResult<Self> {
        let product = Self {
            id: ProductId::new(),
            name: request.name.trim().to_string(),
            description: request.description,
            price: request.price,
            stock_quantity: request.stock_quantity,
            category_id: request.category_id,
            image: request.image,
            is_active: true,
            is_featured: request.is_featured,
            created_at: now,
            updated_at: None,
        };
        product.validate()?;
        Ok(product)
    }

    /// Merge a partial update. On validation failure the product is left untouched.
    pub fn apply_update(&mut self, update: ProductUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        let mut next = self.clone();

        if let Some(name) = update.name {
            next.name = name.trim().to_string();
        }
        update.description.apply_to(&mut next.description);
        if let Some(price) = update.price {
            next.price = price;
        }
        if let Some(stock) = update.stock_quantity {
            next.stock_quantity = stock;
        }
        update.category_id.apply_to(&mut next.category_id);
        update.image.apply_to(&mut next.image);
        if let Some(featured) = update.is_featured {
            next.is_featured = featured;
        }
        if let Some(active) = update.is_active {
            next.is_active = active;
        }

        next.validate()?;
        next.updated_at = Some(now);
        *self = next;
        Ok(())
    }

    /// Soft delete: hide the product without removing its row.
    pub fn deactivate(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_active {
            return Err(DomainError::AlreadyInactive("product"));
        }
        self.is_active = false;
        self.updated_at = Some(now);
        Ok(())
    }

    /// Undo a soft delete.
    pub fn restore(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.is_active {
            return Err(DomainError::AlreadyActive("product"));
        }
        self.is_active = true;
        self.updated_at = Some(now);
        Ok(())
    }

    /// Flip the featured flag, returning the new value.
    pub fn toggle_featured(&mut self, now: DateTime<Utc>) -> bool {
        self.is_featured = !self.is_featured;
        self.updated_at = Some(now);
        self.is_featured
    }

    /// Replace the image reference, returning the previous one.
    pub fn replace_image(&mut self, uri: String, now: DateTime<Utc>) -> Option<String> {
        self.updated_at = Some(now);
        self.image.replace(uri)
    }

    /// Fail with `InsufficientStock` when `requested` exceeds the current stock.
    pub fn ensure_stock(&self, requested: u32) -> DomainResult<()> {
        if requested > self.stock_quantity {
            return Err(DomainError::insufficient_stock(
                self.id,
                requested,
                self.stock_quantity,
            ));
        }
        Ok(())
    }

    fn validate(&self) -> DomainResult<()> {
        if self.name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.name.chars().count() > MAX_NAME_LEN {
            return Err(DomainError::validation(format!(
                "name cannot exceed {MAX_NAME_LEN} characters"
            )));
        }
        if self.price.is_zero() {
            return Err(DomainError::validation("price must be greater than zero"));
        }
        if let Some(image) = &self.image {
            if image.len() > MAX_IMAGE_LEN {
                return Err(DomainError::validation(format!(
                    "image reference cannot exceed {MAX_IMAGE_LEN} characters"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_product() -> NewProduct {
        NewProduct {
            name: "Desk Lamp".to_string(),
            description: Some("Warm light".to_string()),
            price: Money::from_cents(2_499),
            stock_quantity: 5,
            category_id: None,
            image: None,
            is_featured: false,
        }
    }

    #[test]
    fn create_product_starts_active() {
        let product = Product::create(new_product(), Utc::now()).unwrap();
        assert!(product.is_active);
        assert!(!product.is_featured);
        assert_eq!(product.updated_at, None);
    }

    #[test]
    fn create_product_trims_and_rejects_empty_name() {
        let mut request = new_product();
        request.name = "   ".to_string();
        let err = Product::create(request, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_product_rejects_zero_price() {
        let mut request = new_product();
        request.price = Money::ZERO;
        let err = Product::create(request, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn update_changes_only_provided_fields() {
        let mut product = Product::create(new_product(), Utc::now()).unwrap();
        let update = ProductUpdate {
            price: Some(Money::from_cents(1_999)),
            description: Patch::Clear,
            ..Default::default()
        };

        product.apply_update(update, Utc::now()).unwrap();

        assert_eq!(product.price, Money::from_cents(1_999));
        assert_eq!(product.description, None);
        assert_eq!(product.name, "Desk Lamp");
        assert_eq!(product.stock_quantity, 5);
        assert!(product.updated_at.is_some());
    }

    #[test]
    fn rejected_update_leaves_product_untouched() {
        let mut product = Product::create(new_product(), Utc::now()).unwrap();
        let before = product.clone();
        let update = ProductUpdate {
            name: Some("Lamp v2".to_string()),
            price: Some(Money::ZERO),
            ..Default::default()
        };

        assert!(product.apply_update(update, Utc::now()).is_err());
        assert_eq!(product, before);
    }

    #[test]
    fn update_deserialises_absent_null_and_values() {
        let update: ProductUpdate =
            serde_json::from_str(r#"{"stock_quantity": 3, "image": null}"#).unwrap();
        assert_eq!(update.stock_quantity, Some(3));
        assert_eq!(update.image, Patch::Clear);
        assert_eq!(update.description, Patch::Unchanged);
        assert_eq!(update.name, None);
    }

    #[test]
    fn soft_delete_and_restore_report_current_state() {
        let mut product = Product::create(new_product(), Utc::now()).unwrap();

        assert_eq!(
            product.restore(Utc::now()).unwrap_err(),
            DomainError::AlreadyActive("product")
        );
        product.deactivate(Utc::now()).unwrap();
        assert!(!product.is_active);
        assert_eq!(
            product.deactivate(Utc::now()).unwrap_err(),
            DomainError::AlreadyInactive("product")
        );
        product.restore(Utc::now()).unwrap();
        assert!(product.is_active);
    }

    #[test]
    fn ensure_stock_names_the_product() {
        let product = Product::create(new_product(), Utc::now()).unwrap();
        assert!(product.ensure_stock(5).is_ok());
        assert_eq!(
            product.ensure_stock(6).unwrap_err(),
            DomainError::insufficient_stock(product.id, 6, 5)
        );
    }

    #[test]
    fn toggle_featured_flips_the_flag() {
        let mut product = Product::create(new_product(), Utc::now()).unwrap();
        assert!(product.toggle_featured(Utc::now()));
        assert!(!product.toggle_featured(Utc::now()));
    }
}
