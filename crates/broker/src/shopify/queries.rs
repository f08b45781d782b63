//! GraphQL documents for the Shopify Admin API.

pub const CUSTOMER_BY_EMAIL: &str = r"
query CustomerByEmail($query: String!) {
  customers(first: 1, query: $query) {
    nodes { id email }
  }
}
";

pub const CUSTOMER_CREATE: &str = r"
mutation CustomerCreate($input: CustomerInput!) {
  customerCreate(input: $input) {
    customer { id email }
    userErrors { field message }
  }
}
";

pub const CUSTOMER_UPDATE: &str = r"
mutation CustomerUpdate($input: CustomerInput!) {
  customerUpdate(input: $input) {
    customer { id }
    userErrors { field message }
  }
}
";

pub const CUSTOMER_SMS_CONSENT_UPDATE: &str = r"
mutation CustomerSmsMarketingConsentUpdate($input: CustomerSmsMarketingConsentUpdateInput!) {
  customerSmsMarketingConsentUpdate(input: $input) {
    customer { id }
    userErrors { field message }
  }
}
";
