//! Collection type conversion functions.

use serde::Deserialize;

use crate::shopify::types::Collection;

use super::{Connection, RawImage, RawProduct};

#[derive(Debug, Deserialize)]
pub struct RawCollection {
    id: String,
    handle: String,
    title: String,
    #[serde(default)]
    description: String,
    image: Option<RawImage>,
    #[serde(default)]
    products: Connection<RawProduct>,
}

impl RawCollection {
    pub fn into_collection(self) -> Collection {
        Collection {
            id: self.id,
            handle: self.handle,
            title: self.title,
            description: self.description,
            image: self.image.map(Into::into),
            products: self
                .products
                .into_nodes()
                .map(RawProduct::into_product)
                .collect(),
        }
    }
}
