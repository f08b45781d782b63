//! Artfulfam Core - Shared types and signing primitives.
//!
//! This crate provides the pieces shared by every artfulfam component:
//! - `storefront` - Public headless storefront API (customer auth, cart, store gate)
//! - `broker` - Private Admin API broker (Admin OAuth, customer writes)
//! - `cli` - Operator tooling (migrations, token inspection)
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Everything that signs or verifies a value lives here
//! so the storefront and broker can never disagree on a wire format.
//!
//! # Modules
//!
//! - [`types`] - Validated newtypes for shop domains, emails and phone numbers
//! - [`crypto`] - HMAC signing, signup tokens, broker request signatures, PKCE

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod crypto;
pub mod types;

pub use types::*;
