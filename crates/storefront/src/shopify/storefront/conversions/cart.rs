//! Cart type conversion functions.

use serde::Deserialize;
use tracing::warn;

use crate::shopify::types::{
    Cart, CartCost, CartLine, CartMerchandise, CartMerchandiseProduct, CartUserError,
    SelectedOption,
};
use crate::shopify::ShopifyError;

use super::{Connection, RawImage, RawMoney};

/// The `cart { ...CartFields }` selection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCart {
    id: String,
    checkout_url: String,
    cost: RawCartCost,
    #[serde(default)]
    lines: Connection<RawCartLine>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCartCost {
    total_amount: RawMoney,
    subtotal_amount: Option<RawMoney>,
    total_tax_amount: Option<RawMoney>,
}

#[derive(Debug, Deserialize)]
struct RawCartLine {
    id: String,
    quantity: i64,
    merchandise: Option<RawMerchandise>,
}

/// Merchandise selected through `... on ProductVariant`. Other merchandise
/// kinds come back as an empty object.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMerchandise {
    id: Option<String>,
    #[serde(default)]
    title: String,
    price: Option<RawMoney>,
    #[serde(default)]
    selected_options: Vec<SelectedOption>,
    product: Option<RawMerchandiseProduct>,
}

#[derive(Debug, Deserialize)]
struct RawMerchandiseProduct {
    title: String,
    #[serde(default)]
    handle: String,
    #[serde(default)]
    images: Connection<RawImage>,
}

/// `{ cart, userErrors }` returned by every cart mutation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartMutationPayload {
    cart: Option<RawCart>,
    #[serde(default)]
    user_errors: Vec<CartUserError>,
}

impl CartMutationPayload {
    /// The resulting cart, or the joined user error messages.
    pub fn into_cart(self, operation: &str) -> Result<Cart, ShopifyError> {
        if !self.user_errors.is_empty() {
            return Err(ShopifyError::UserError(
                self.user_errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; "),
            ));
        }

        self.cart.map(RawCart::into_cart).ok_or_else(|| {
            ShopifyError::GraphQL(vec![crate::shopify::GraphQLError {
                message: format!("{operation} returned no cart"),
                locations: vec![],
                path: vec![],
            }])
        })
    }
}

impl RawCart {
    pub fn into_cart(self) -> Cart {
        Cart {
            id: self.id,
            checkout_url: self.checkout_url,
            cost: CartCost {
                total_amount: self.cost.total_amount.into(),
                subtotal_amount: self.cost.subtotal_amount.map(Into::into),
                total_tax_amount: self.cost.total_tax_amount.map(Into::into),
            },
            lines: self.lines.into_nodes().filter_map(convert_line).collect(),
        }
    }
}

fn convert_line(line: RawCartLine) -> Option<CartLine> {
    let Some(merchandise) = line.merchandise else {
        warn!(line_id = %line.id, "Cart line has no merchandise, skipping");
        return None;
    };
    let (Some(id), Some(price), Some(product)) =
        (merchandise.id, merchandise.price, merchandise.product)
    else {
        warn!(line_id = %line.id, "Cart line merchandise is not a product variant, skipping");
        return None;
    };

    Some(CartLine {
        id: line.id,
        quantity: line.quantity,
        merchandise: CartMerchandise {
            id,
            title: merchandise.title,
            price: price.into(),
            selected_options: merchandise.selected_options,
            product: CartMerchandiseProduct {
                title: product.title,
                handle: product.handle,
                featured_image: product.images.into_nodes().next().map(Into::into),
            },
        },
    })
}
