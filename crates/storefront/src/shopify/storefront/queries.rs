//! GraphQL documents for the Shopify Storefront API.
//!
//! Every cart operation selects the same `CartFields` fragment so the
//! conversions only need one raw cart shape.

const CART_FRAGMENT: &str = r"
fragment CartFields on Cart {
  id
  checkoutUrl
  cost {
    totalAmount { amount currencyCode }
    subtotalAmount { amount currencyCode }
    totalTaxAmount { amount currencyCode }
  }
  lines(first: 100) {
    edges {
      node {
        id
        quantity
        merchandise {
          ... on ProductVariant {
            id
            title
            price { amount currencyCode }
            selectedOptions { name value }
            product {
              title
              handle
              images(first: 1) { edges { node { url altText } } }
            }
          }
        }
      }
    }
  }
}
";

const PRODUCT_FRAGMENT: &str = r"
fragment ProductFields on Product {
  id
  handle
  title
  description
  descriptionHtml
  productType
  tags
  availableForSale
  options { id name values }
  images(first: 10) { edges { node { url altText } } }
  priceRange { minVariantPrice { amount currencyCode } }
  compareAtPriceRange { minVariantPrice { amount currencyCode } }
  variants(first: 10) {
    edges {
      node {
        id
        title
        availableForSale
        price { amount currencyCode }
        selectedOptions { name value }
      }
    }
  }
}
";

/// Build a document from an operation and the fragment it spreads.
fn document(operation: &str, fragment: &str) -> String {
    format!("{operation}\n{fragment}")
}

pub fn cart_create() -> String {
    document(
        r"mutation cartCreate($input: CartInput!) {
  cartCreate(input: $input) {
    cart { ...CartFields }
    userErrors { field message }
  }
}",
        CART_FRAGMENT,
    )
}

pub fn cart_lines_add() -> String {
    document(
        r"mutation cartLinesAdd($cartId: ID!, $lines: [CartLineInput!]!) {
  cartLinesAdd(cartId: $cartId, lines: $lines) {
    cart { ...CartFields }
    userErrors { field message }
  }
}",
        CART_FRAGMENT,
    )
}

pub fn cart_lines_update() -> String {
    document(
        r"mutation cartLinesUpdate($cartId: ID!, $lines: [CartLineUpdateInput!]!) {
  cartLinesUpdate(cartId: $cartId, lines: $lines) {
    cart { ...CartFields }
    userErrors { field message }
  }
}",
        CART_FRAGMENT,
    )
}

pub fn cart_lines_remove() -> String {
    document(
        r"mutation cartLinesRemove($cartId: ID!, $lineIds: [ID!]!) {
  cartLinesRemove(cartId: $cartId, lineIds: $lineIds) {
    cart { ...CartFields }
    userErrors { field message }
  }
}",
        CART_FRAGMENT,
    )
}

pub fn get_cart() -> String {
    document(
        r"query getCart($cartId: ID!) {
  cart(id: $cartId) { ...CartFields }
}",
        CART_FRAGMENT,
    )
}

pub fn get_product_by_handle() -> String {
    document(
        r"query getProduct($handle: String!) {
  product(handle: $handle) { ...ProductFields }
}",
        PRODUCT_FRAGMENT,
    )
}

pub fn get_collection_by_handle() -> String {
    document(
        r"query getCollection($handle: String!, $first: Int!) {
  collection(handle: $handle) {
    id
    handle
    title
    description
    image { url altText }
    products(first: $first, sortKey: BEST_SELLING) {
      edges { node { ...ProductFields } }
    }
  }
}",
        PRODUCT_FRAGMENT,
    )
}
