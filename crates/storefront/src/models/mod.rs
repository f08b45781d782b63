//! Session-stored state for the storefront.

pub mod session;

pub use session::{Expiring, keys as session_keys};
