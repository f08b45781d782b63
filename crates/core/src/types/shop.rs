//! Shopify shop domain type.

use core::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Errors that can occur when normalizing a [`ShopDomain`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ShopDomainError {
    /// Nothing left after trimming and stripping.
    #[error("shop domain cannot be empty")]
    Empty,
}

/// A normalized Shopify shop domain (e.g. `artfulfam.myshopify.com`).
///
/// Every token, OAuth state value and broker request is scoped to exactly one
/// shop, and lookups are keyed by this normalized form. Users paste shops in
/// many shapes (`https://x.myshopify.com/admin`, `X.myshopify.com`), so
/// normalization extracts the bare lowercase hostname.
///
/// ## Examples
///
/// ```
/// use artfulfam_core::ShopDomain;
///
/// let shop = ShopDomain::normalize(" https://Artfulfam.myshopify.com/admin ").unwrap();
/// assert_eq!(shop.as_str(), "artfulfam.myshopify.com");
///
/// let shop = ShopDomain::normalize("artfulfam.myshopify.com").unwrap();
/// assert_eq!(shop.as_str(), "artfulfam.myshopify.com");
///
/// assert!(ShopDomain::normalize("   ").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct ShopDomain(String);

impl ShopDomain {
    /// Normalize user or header input into a bare shop hostname.
    ///
    /// Inputs without a scheme are parsed as `https://{input}`. When the input
    /// is not a parseable URL, the scheme is stripped and everything from the
    /// first `/` on is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ShopDomainError::Empty`] if nothing remains.
    pub fn normalize(input: &str) -> Result<Self, ShopDomainError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(ShopDomainError::Empty);
        }

        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("https://{raw}")
        };

        let host = match Url::parse(&with_scheme) {
            Ok(url) => url.host_str().map(str::to_lowercase),
            Err(_) => None,
        }
        .unwrap_or_else(|| fallback_host(raw));

        if host.is_empty() {
            return Err(ShopDomainError::Empty);
        }

        Ok(Self(host))
    }

    /// Returns the domain as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shopify Admin GraphQL endpoint for this shop.
    #[must_use]
    pub fn admin_graphql_url(&self, api_version: &str) -> String {
        format!("https://{}/admin/api/{api_version}/graphql.json", self.0)
    }

    /// Shopify Storefront GraphQL endpoint for this shop.
    #[must_use]
    pub fn storefront_graphql_url(&self, api_version: &str) -> String {
        format!("https://{}/api/{api_version}/graphql.json", self.0)
    }
}

fn fallback_host(raw: &str) -> String {
    let stripped = raw
        .strip_prefix("https://")
        .or_else(|| raw.strip_prefix("http://"))
        .unwrap_or(raw);
    stripped.split('/').next().unwrap_or_default().to_string()
}

impl fmt::Display for ShopDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ShopDomain {
    type Err = ShopDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}

impl TryFrom<String> for ShopDomain {
    type Error = ShopDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::normalize(&value)
    }
}

impl From<ShopDomain> for String {
    fn from(shop: ShopDomain) -> Self {
        shop.0
    }
}

impl AsRef<str> for ShopDomain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// SQLx support (with postgres feature)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for ShopDomain {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ShopDomain {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::normalize(&s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for ShopDomain {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bare_domain() {
        let shop = ShopDomain::normalize("artfulfam.myshopify.com").unwrap();
        assert_eq!(shop.as_str(), "artfulfam.myshopify.com");
    }

    #[test]
    fn test_normalize_strips_scheme_and_path() {
        let shop = ShopDomain::normalize("https://artfulfam.myshopify.com/admin/apps").unwrap();
        assert_eq!(shop.as_str(), "artfulfam.myshopify.com");

        let shop = ShopDomain::normalize("http://artfulfam.myshopify.com").unwrap();
        assert_eq!(shop.as_str(), "artfulfam.myshopify.com");
    }

    #[test]
    fn test_normalize_lowercases_and_trims() {
        let shop = ShopDomain::normalize("  ArtfulFam.MyShopify.com  ").unwrap();
        assert_eq!(shop.as_str(), "artfulfam.myshopify.com");
    }

    #[test]
    fn test_normalize_drops_port() {
        let shop = ShopDomain::normalize("localhost:3000/callback").unwrap();
        assert_eq!(shop.as_str(), "localhost");
    }

    #[test]
    fn test_normalize_fallback_for_unparseable_input() {
        let shop = ShopDomain::normalize("https://bad host/x").unwrap();
        assert_eq!(shop.as_str(), "bad host");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(ShopDomain::normalize(""), Err(ShopDomainError::Empty));
        assert_eq!(ShopDomain::normalize("   "), Err(ShopDomainError::Empty));
    }

    #[test]
    fn test_equivalent_inputs_share_a_key() {
        let a = ShopDomain::normalize("https://Shop.myshopify.com/").unwrap();
        let b = ShopDomain::normalize("shop.myshopify.com").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_endpoints() {
        let shop = ShopDomain::normalize("shop.myshopify.com").unwrap();
        assert_eq!(
            shop.admin_graphql_url("2025-10"),
            "https://shop.myshopify.com/admin/api/2025-10/graphql.json"
        );
        assert_eq!(
            shop.storefront_graphql_url("2025-10"),
            "https://shop.myshopify.com/api/2025-10/graphql.json"
        );
    }
}
