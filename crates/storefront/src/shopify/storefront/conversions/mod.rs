//! Raw Storefront API response shapes and their conversion to domain types.

pub mod cart;
pub mod collections;
pub mod products;

use serde::Deserialize;

use crate::shopify::types::{Image, Money};

pub use cart::{CartMutationPayload, RawCart};
pub use collections::RawCollection;
pub use products::RawProduct;

/// A GraphQL connection (`{ edges { node } }`).
#[derive(Debug, Deserialize)]
pub struct Connection<T> {
    #[serde(default = "Vec::new")]
    pub edges: Vec<Edge<T>>,
}

impl<T> Default for Connection<T> {
    fn default() -> Self {
        Self { edges: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
pub struct Edge<T> {
    pub node: T,
}

impl<T> Connection<T> {
    /// Flatten the edges into their nodes.
    pub fn into_nodes(self) -> impl Iterator<Item = T> {
        self.edges.into_iter().map(|edge| edge.node)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMoney {
    pub amount: String,
    pub currency_code: String,
}

impl From<RawMoney> for Money {
    fn from(raw: RawMoney) -> Self {
        Self {
            amount: raw.amount,
            currency_code: raw.currency_code,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawImage {
    pub url: String,
    pub alt_text: Option<String>,
}

impl From<RawImage> for Image {
    fn from(raw: RawImage) -> Self {
        Self {
            url: raw.url,
            alt_text: raw.alt_text,
        }
    }
}
