//! Core types for artfulfam.
//!
//! This module provides type-safe wrappers for the values that cross service
//! boundaries: shop domains, customer emails and phone numbers.

pub mod email;
pub mod phone;
pub mod shop;

pub use email::{Email, EmailError};
pub use phone::{PhoneError, PhoneNumber};
pub use shop::{ShopDomain, ShopDomainError};
