//! Product type conversion functions.

use serde::Deserialize;

use crate::shopify::types::{Product, ProductOption, ProductVariant, SelectedOption};

use super::{Connection, RawImage, RawMoney};

/// The `...ProductFields` selection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProduct {
    id: String,
    handle: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    description_html: String,
    #[serde(default)]
    product_type: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    available_for_sale: bool,
    #[serde(default)]
    options: Vec<ProductOption>,
    #[serde(default)]
    images: Connection<RawImage>,
    price_range: RawPriceRange,
    compare_at_price_range: Option<RawPriceRange>,
    #[serde(default)]
    variants: Connection<RawVariant>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPriceRange {
    min_variant_price: RawMoney,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVariant {
    id: String,
    title: String,
    price: RawMoney,
    #[serde(default)]
    available_for_sale: bool,
    #[serde(default)]
    selected_options: Vec<SelectedOption>,
}

impl RawProduct {
    pub fn into_product(self) -> Product {
        // Shopify reports "0.0" as the compare-at price of products that are not on sale.
        let compare_at_price = self
            .compare_at_price_range
            .map(|range| range.min_variant_price)
            .filter(|money| money.amount.parse::<f64>().is_ok_and(|amount| amount > 0.0))
            .map(Into::into);

        Product {
            id: self.id,
            handle: self.handle,
            title: self.title,
            description: self.description,
            description_html: self.description_html,
            product_type: self.product_type,
            tags: self.tags,
            available_for_sale: self.available_for_sale,
            options: self.options,
            images: self.images.into_nodes().map(Into::into).collect(),
            price: self.price_range.min_variant_price.into(),
            compare_at_price,
            variants: self
                .variants
                .into_nodes()
                .map(|v| ProductVariant {
                    id: v.id,
                    title: v.title,
                    price: v.price.into(),
                    available_for_sale: v.available_for_sale,
                    selected_options: v.selected_options,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn raw(compare_at: &str) -> RawProduct {
        serde_json::from_value(serde_json::json!({
            "id": "gid://shopify/Product/1",
            "handle": "sunflower",
            "title": "Sunflower",
            "description": "Painted by Ava, age 6",
            "descriptionHtml": "<p>Painted by Ava, age 6</p>",
            "productType": "Print",
            "tags": ["ava"],
            "availableForSale": true,
            "options": [{"id": "o1", "name": "Size", "values": ["8x10", "11x14"]}],
            "images": {"edges": [{"node": {"url": "https://cdn/1.jpg", "altText": "Sunflower"}}]},
            "priceRange": {"minVariantPrice": {"amount": "25.0", "currencyCode": "USD"}},
            "compareAtPriceRange": {"minVariantPrice": {"amount": compare_at, "currencyCode": "USD"}},
            "variants": {"edges": [{"node": {
                "id": "gid://shopify/ProductVariant/9",
                "title": "8x10",
                "price": {"amount": "25.0", "currencyCode": "USD"},
                "availableForSale": true,
                "selectedOptions": [{"name": "Size", "value": "8x10"}]
            }}]}
        }))
        .unwrap()
    }

    #[test]
    fn test_convert_product() {
        let product = raw("0.0").into_product();
        assert_eq!(product.handle, "sunflower");
        assert_eq!(product.images.len(), 1);
        assert_eq!(product.variants[0].selected_options[0].value, "8x10");
        assert_eq!(product.price.amount, "25.0");
        assert!(product.compare_at_price.is_none());
    }

    #[test]
    fn test_compare_at_price_kept_when_on_sale() {
        let product = raw("30.0").into_product();
        assert_eq!(product.compare_at_price.unwrap().amount, "30.0");
    }
}
