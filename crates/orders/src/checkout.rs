//! Checkout planning.
//!
//! [`plan_checkout`] validates every cart line against product rows read
//! inside the checkout transaction and, only if all lines pass, produces the
//! order and the stock decrements to apply. It never mutates anything, so a
//! rejected plan leaves stock, orders and the cart exactly as they were.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopswift_catalog::Product;
use shopswift_core::{DomainError, DomainResult, Money, OrderId, OrderItemId, ProductId};

use crate::cart::Cart;
use crate::order::{Order, OrderItem, OrderStatus};

const MAX_ADDRESS_LEN: usize = 500;

/// Caller-supplied checkout details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub shipping_address: String,
    #[serde(default)]
    pub payment_reference: Option<String>,
}

impl CheckoutRequest {
    fn validate(&self) -> DomainResult<()> {
        let address = self.shipping_address.trim();
        if address.is_empty() {
            return Err(DomainError::validation("shipping address cannot be empty"));
        }
        if address.chars().count() > MAX_ADDRESS_LEN {
            return Err(DomainError::validation(format!(
                "shipping address cannot exceed {MAX_ADDRESS_LEN} characters"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StockDecrement {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Everything a successful checkout writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutPlan {
    pub order: Order,
    /// Sorted by product id, the order in which rows are locked.
    pub decrements: Vec<StockDecrement>,
}

/// Plan the conversion of `cart` into a pending order.
///
/// `products` must hold the rows of every product in the cart as read inside
/// the checkout transaction. A product that is missing or inactive fails with
/// `NotFound`; the first line whose quantity exceeds stock fails with
/// `InsufficientStock`.
pub fn plan_checkout(
    cart: &Cart,
    products: &HashMap<ProductId, Product>,
    request: CheckoutRequest,
    now: DateTime<Utc>,
) -> DomainResult<CheckoutPlan> {
    if cart.is_empty() {
        return Err(DomainError::EmptyCart);
    }
    request.validate()?;

    let order_id = OrderId::new();
    let mut items = Vec::with_capacity(cart.items.len());
    let mut line_totals = Vec::with_capacity(cart.items.len());

    for line in &cart.items {
        let product = products
            .get(&line.product_id)
            .filter(|p| p.is_active)
            .ok_or(DomainError::NotFound("product"))?;
        product.ensure_stock(line.quantity)?;

        line_totals.push(product.price.times(line.quantity)?);
        items.push(OrderItem {
            id: OrderItemId::new(),
            order_id,
            product_id: Some(product.id),
            quantity: line.quantity,
            price: product.price,
        });
    }

    let total_amount = Money::sum(line_totals)?;

    let mut decrements: Vec<StockDecrement> = cart
        .items
        .iter()
        .map(|line| StockDecrement {
            product_id: line.product_id,
            quantity: line.quantity,
        })
        .collect();
    decrements.sort_by_key(|d| d.product_id);

    Ok(CheckoutPlan {
        order: Order {
            id: order_id,
            user_id: cart.user_id,
            total_amount,
            status: OrderStatus::Pending,
            shipping_address: request.shipping_address.trim().to_string(),
            payment_reference: request.payment_reference,
            items,
            created_at: now,
            updated_at: None,
        },
        decrements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopswift_catalog::NewProduct;
    use shopswift_core::UserId;

    fn product(name: &str, cents: u64, stock: u32) -> Product {
        Product::create(
            NewProduct {
                name: name.to_string(),
                description: None,
                price: Money::from_cents(cents),
                stock_quantity: stock,
                category_id: None,
                image: None,
                is_featured: false,
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            shipping_address: "12 Harbour Road".to_string(),
            payment_reference: Some("pay_123".to_string()),
        }
    }

    fn index(products: &[&Product]) -> HashMap<ProductId, Product> {
        products.iter().map(|p| (p.id, (*p).clone())).collect()
    }

    #[test]
    fn empty_cart_is_rejected() {
        let cart = Cart::new(UserId::new(), Utc::now());
        assert_eq!(
            plan_checkout(&cart, &HashMap::new(), request(), Utc::now()).unwrap_err(),
            DomainError::EmptyCart
        );
    }

    #[test]
    fn single_line_order_totals_snapshot_price() {
        let a = product("A", 1_000, 5);
        let mut cart = Cart::new(UserId::new(), Utc::now());
        cart.add_item(&a, 2, Utc::now()).unwrap();

        let plan = plan_checkout(&cart, &index(&[&a]), request(), Utc::now()).unwrap();

        assert_eq!(plan.order.total_amount, Money::from_cents(2_000));
        assert_eq!(plan.order.total_amount.to_string(), "20.00");
        assert_eq!(plan.order.status, OrderStatus::Pending);
        assert_eq!(plan.order.items.len(), 1);
        assert_eq!(plan.order.items[0].price, a.price);
        assert_eq!(
            plan.decrements,
            vec![StockDecrement { product_id: a.id, quantity: 2 }]
        );
    }

    #[test]
    fn one_short_line_rejects_the_whole_order() {
        let a = product("A", 1_000, 5);
        let b = product("B", 750, 1);
        let mut cart = Cart::new(UserId::new(), Utc::now());
        cart.add_item(&a, 2, Utc::now()).unwrap();
        // Stock shrank after the line was added.
        let mut b_at_add = b.clone();
        b_at_add.stock_quantity = 2;
        cart.add_item(&b_at_add, 2, Utc::now()).unwrap();

        let err = plan_checkout(&cart, &index(&[&a, &b]), request(), Utc::now()).unwrap_err();

        assert_eq!(err, DomainError::insufficient_stock(b.id, 2, 1));
    }

    #[test]
    fn missing_or_inactive_product_is_not_found() {
        let a = product("A", 1_000, 5);
        let mut cart = Cart::new(UserId::new(), Utc::now());
        cart.add_item(&a, 1, Utc::now()).unwrap();

        assert_eq!(
            plan_checkout(&cart, &HashMap::new(), request(), Utc::now()).unwrap_err(),
            DomainError::NotFound("product")
        );

        let mut hidden = a.clone();
        hidden.deactivate(Utc::now()).unwrap();
        assert_eq!(
            plan_checkout(&cart, &index(&[&hidden]), request(), Utc::now()).unwrap_err(),
            DomainError::NotFound("product")
        );
    }

    #[test]
    fn blank_address_is_rejected() {
        let a = product("A", 1_000, 5);
        let mut cart = Cart::new(UserId::new(), Utc::now());
        cart.add_item(&a, 1, Utc::now()).unwrap();
        let blank = CheckoutRequest {
            shipping_address: "  ".to_string(),
            payment_reference: None,
        };

        assert!(matches!(
            plan_checkout(&cart, &index(&[&a]), blank, Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: a plan exists iff every line fits its stock, and then the
            /// total is the sum of price × quantity.
            #[test]
            fn plan_is_all_or_nothing(
                lines in proptest::collection::vec((1u64..10_000, 0u32..20, 1u32..20), 1..8)
            ) {
                let products: Vec<Product> = lines
                    .iter()
                    .map(|(cents, stock, _)| {
                        let mut p = product("P", *cents, 1_000);
                        p.stock_quantity = *stock;
                        p
                    })
                    .collect();
                let mut cart = Cart::new(UserId::new(), Utc::now());
                for (p, (_, _, qty)) in products.iter().zip(&lines) {
                    let mut roomy = p.clone();
                    roomy.stock_quantity = *qty;
                    cart.add_item(&roomy, *qty, Utc::now()).unwrap();
                }
                let rows: HashMap<_, _> = products.iter().map(|p| (p.id, p.clone())).collect();

                let fits = lines.iter().all(|(_, stock, qty)| qty <= stock);
                match plan_checkout(&cart, &rows, request(), Utc::now()) {
                    Ok(plan) => {
                        prop_assert!(fits);
                        let expected: u64 = lines.iter().map(|(c, _, q)| c * u64::from(*q)).sum();
                        prop_assert_eq!(plan.order.total_amount.cents(), expected);
                        prop_assert_eq!(plan.decrements.len(), lines.len());
                    }
                    Err(err) => {
                        prop_assert!(!fits);
                        let is_insufficient_stock = matches!(err, DomainError::InsufficientStock { .. });
                        prop_assert!(is_insufficient_stock);
                    }
                }
            }
        }
    }
}
