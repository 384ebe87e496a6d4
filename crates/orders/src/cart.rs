use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopswift_catalog::{Product, ProductView};
use shopswift_core::{CartId, CartItemId, DomainError, DomainResult, Entity, Money, ProductId, UserId};

/// A user's mutable shopping cart. Exactly one exists per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Cart line: one per product; repeated adds are merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

impl Entity for Cart {
    type Id = CartId;

    fn id(&self) -> CartId {
        self.id
    }
}

impl Entity for CartItem {
    type Id = CartItemId;

    fn id(&self) -> CartItemId {
        self.id
    }
}

impl Cart {
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: CartId::new(),
            user_id,
            items: Vec::new(),
            created_at: now,
            updated_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, item_id: CartItemId) -> DomainResult<&CartItem> {
        self.items
            .iter()
            .find(|i| i.id == item_id)
            .ok_or(DomainError::NotFound("cart item"))
    }

    pub fn item_for_product(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    /// Add `quantity` of `product`, summing into an existing line for the same product.
    ///
    /// Stock is checked against the requested quantity only; nothing is reserved.
    pub fn add_item(
        &mut self,
        product: &Product,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<&CartItem> {
        ensure_positive(quantity)?;
        if !product.is_active {
            return Err(DomainError::NotFound("product"));
        }
        product.ensure_stock(quantity)?;

        let index = match self.items.iter().position(|i| i.product_id == product.id) {
            Some(index) => {
                let item = &mut self.items[index];
                item.quantity = item
                    .quantity
                    .checked_add(quantity)
                    .ok_or_else(|| DomainError::validation("quantity overflow"))?;
                index
            }
            None => {
                self.items.push(CartItem {
                    id: CartItemId::new(),
                    cart_id: self.id,
                    product_id: product.id,
                    quantity,
                    added_at: now,
                });
                self.items.len() - 1
            }
        };
        self.updated_at = Some(now);
        Ok(&self.items[index])
    }

    /// Overwrite a line's quantity, re-validated against the product's current stock.
    pub fn set_quantity(
        &mut self,
        item_id: CartItemId,
        quantity: u32,
        product: &Product,
        now: DateTime<Utc>,
    ) -> DomainResult<&CartItem> {
        ensure_positive(quantity)?;
        let index = self
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or(DomainError::NotFound("cart item"))?;
        if self.items[index].product_id != product.id {
            return Err(DomainError::validation("product does not match cart item"));
        }
        product.ensure_stock(quantity)?;

        self.items[index].quantity = quantity;
        self.updated_at = Some(now);
        Ok(&self.items[index])
    }

    pub fn remove_item(&mut self, item_id: CartItemId, now: DateTime<Utc>) -> DomainResult<CartItem> {
        let index = self
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or(DomainError::NotFound("cart item"))?;
        self.updated_at = Some(now);
        Ok(self.items.remove(index))
    }

    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.items.clear();
        self.updated_at = Some(now);
    }
}

fn ensure_positive(quantity: u32) -> DomainResult<()> {
    if quantity == 0 {
        return Err(DomainError::validation("quantity must be at least 1"));
    }
    Ok(())
}

/// Cart line joined with its live product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    pub product: ProductView,
    pub line_total: Money,
}

/// Cart as shown to its owner, priced at live product prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartView {
    pub id: CartId,
    pub user_id: UserId,
    pub items: Vec<CartLine>,
    pub subtotal: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CartView {
    /// Assemble the view. Lines whose product is missing from `products` are skipped.
    pub fn assemble(cart: Cart, mut products: impl FnMut(ProductId) -> Option<ProductView>) -> DomainResult<Self> {
        let mut lines = Vec::with_capacity(cart.items.len());
        for item in cart.items {
            let Some(product) = products(item.product_id) else {
                continue;
            };
            let line_total = product.product.price.times(item.quantity)?;
            lines.push(CartLine {
                item,
                product,
                line_total,
            });
        }
        let subtotal = Money::sum(lines.iter().map(|l| l.line_total))?;

        Ok(Self {
            id: cart.id,
            user_id: cart.user_id,
            items: lines,
            subtotal,
            created_at: cart.created_at,
            updated_at: cart.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopswift_catalog::{NewProduct, RatingSummary};

    fn product(stock: u32) -> Product {
        Product::create(
            NewProduct {
                name: "Mug".to_string(),
                description: None,
                price: Money::from_cents(1_250),
                stock_quantity: stock,
                category_id: None,
                image: None,
                is_featured: false,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn repeated_adds_sum_quantities() {
        let mug = product(10);
        let mut cart = Cart::new(UserId::new(), Utc::now());

        cart.add_item(&mug, 2, Utc::now()).unwrap();
        let item = cart.add_item(&mug, 3, Utc::now()).unwrap();

        assert_eq!(item.quantity, 5);
        assert_eq!(cart.items.len(), 1);
    }

    #[test]
    fn add_rejects_quantity_above_stock() {
        let mug = product(1);
        let mut cart = Cart::new(UserId::new(), Utc::now());

        let err = cart.add_item(&mug, 2, Utc::now()).unwrap_err();

        assert_eq!(err, DomainError::insufficient_stock(mug.id, 2, 1));
        assert!(cart.is_empty());
    }

    #[test]
    fn add_rejects_inactive_product_and_zero_quantity() {
        let mut mug = product(5);
        let mut cart = Cart::new(UserId::new(), Utc::now());
        assert!(matches!(
            cart.add_item(&mug, 0, Utc::now()),
            Err(DomainError::Validation(_))
        ));

        mug.deactivate(Utc::now()).unwrap();
        assert_eq!(
            cart.add_item(&mug, 1, Utc::now()).unwrap_err(),
            DomainError::NotFound("product")
        );
    }

    #[test]
    fn set_quantity_revalidates_stock() {
        let mug = product(4);
        let mut cart = Cart::new(UserId::new(), Utc::now());
        let item_id = cart.add_item(&mug, 1, Utc::now()).unwrap().id;

        assert_eq!(cart.set_quantity(item_id, 4, &mug, Utc::now()).unwrap().quantity, 4);
        assert!(matches!(
            cart.set_quantity(item_id, 5, &mug, Utc::now()),
            Err(DomainError::InsufficientStock { .. })
        ));
        assert_eq!(cart.item(item_id).unwrap().quantity, 4);
    }

    #[test]
    fn unknown_items_are_not_found() {
        let mug = product(4);
        let mut cart = Cart::new(UserId::new(), Utc::now());
        let stranger = CartItemId::new();

        assert_eq!(
            cart.remove_item(stranger, Utc::now()).unwrap_err(),
            DomainError::NotFound("cart item")
        );
        assert_eq!(
            cart.set_quantity(stranger, 1, &mug, Utc::now()).unwrap_err(),
            DomainError::NotFound("cart item")
        );
    }

    #[test]
    fn view_prices_lines_at_live_prices() {
        let mug = product(10);
        let mut cart = Cart::new(UserId::new(), Utc::now());
        cart.add_item(&mug, 3, Utc::now()).unwrap();

        let view = CartView::assemble(cart, |_| {
            Some(ProductView::new(mug.clone(), None, RatingSummary::EMPTY))
        })
        .unwrap();

        assert_eq!(view.items.len(), 1);
        assert_eq!(view.subtotal, Money::from_cents(3_750));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: any sequence of adds for one product collapses into a
            /// single line holding the summed quantity.
            #[test]
            fn adds_merge_into_one_line(quantities in proptest::collection::vec(1u32..50, 1..12)) {
                let mug = product(50);
                let mut cart = Cart::new(UserId::new(), Utc::now());
                for qty in &quantities {
                    cart.add_item(&mug, *qty, Utc::now()).unwrap();
                }

                prop_assert_eq!(cart.items.len(), 1);
                prop_assert_eq!(cart.items[0].quantity, quantities.iter().sum::<u32>());
            }
        }
    }
}
