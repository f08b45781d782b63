//! Domain types for the Shopify Storefront API.
//!
//! These are the flattened shapes the storefront returns as JSON. The raw
//! GraphQL connection shapes live in `storefront::conversions`.

use serde::{Deserialize, Serialize};

// =============================================================================
// Money Types
// =============================================================================

/// Monetary amount with currency code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    /// Decimal amount as string (preserves precision).
    pub amount: String,
    /// ISO 4217 currency code.
    pub currency_code: String,
}

// =============================================================================
// Image Types
// =============================================================================

/// Product or collection image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// Image URL.
    pub url: String,
    /// Alt text for accessibility.
    pub alt_text: Option<String>,
}

/// A variant option such as `Size: 8x10`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedOption {
    pub name: String,
    pub value: String,
}

// =============================================================================
// Product Types
// =============================================================================

/// A product option with its possible values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductOption {
    pub id: String,
    pub name: String,
    pub values: Vec<String>,
}

/// A purchasable variant of a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    pub id: String,
    pub title: String,
    pub price: Money,
    pub available_for_sale: bool,
    pub selected_options: Vec<SelectedOption>,
}

/// A product with its images and variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub handle: String,
    pub title: String,
    pub description: String,
    pub description_html: String,
    pub product_type: String,
    pub tags: Vec<String>,
    pub available_for_sale: bool,
    pub options: Vec<ProductOption>,
    pub images: Vec<Image>,
    /// Lowest variant price.
    pub price: Money,
    /// Lowest compare-at price, when the product is on sale.
    pub compare_at_price: Option<Money>,
    pub variants: Vec<ProductVariant>,
}

/// A collection and the first page of its products.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    pub handle: String,
    pub title: String,
    pub description: String,
    pub image: Option<Image>,
    pub products: Vec<Product>,
}

// =============================================================================
// Cart Types
// =============================================================================

/// Parent product info for cart merchandise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartMerchandiseProduct {
    pub title: String,
    pub handle: String,
    pub featured_image: Option<Image>,
}

/// The product variant on a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartMerchandise {
    /// Variant ID.
    pub id: String,
    pub title: String,
    pub price: Money,
    pub selected_options: Vec<SelectedOption>,
    pub product: CartMerchandiseProduct,
}

/// A line item in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Cart line ID.
    pub id: String,
    pub quantity: i64,
    pub merchandise: CartMerchandise,
}

/// Cart cost summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartCost {
    pub total_amount: Money,
    pub subtotal_amount: Option<Money>,
    pub total_tax_amount: Option<Money>,
}

/// A shopping cart as last reported by Shopify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: String,
    pub checkout_url: String,
    pub cost: CartCost,
    pub lines: Vec<CartLine>,
}

impl Cart {
    /// Sum of all line quantities.
    #[must_use]
    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|line| line.quantity).sum()
    }

    /// Whether any line holds the given variant.
    #[must_use]
    pub fn contains_merchandise(&self, merchandise_id: &str) -> bool {
        self.lines
            .iter()
            .any(|line| line.merchandise.id == merchandise_id)
    }
}

/// Input for adding a line to cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineInput {
    /// Product variant ID.
    pub merchandise_id: String,
    pub quantity: i64,
}

/// Input for changing a line's quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineUpdateInput {
    /// Cart line ID.
    pub id: String,
    pub quantity: i64,
}

/// User error from cart mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartUserError {
    /// Field path that caused the error.
    pub field: Option<Vec<String>>,
    /// Human-readable error message.
    pub message: String,
}
