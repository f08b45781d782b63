//! Consumed signup token ledger.
//!
//! A signup token authorizes one phone/SMS write. The ledger remembers each
//! token's signature until the token would have expired anyway, so memory
//! stays bounded by the tokens issued in the last TTL window. It is
//! process-local; a restart forgets it.

use std::time::{Duration, Instant};

use chrono::Utc;
use moka::Expiry;
use moka::future::Cache;

/// Upper bound on remembered tokens.
const MAX_ENTRIES: u64 = 100_000;

/// Keeps each entry until the token's `exp` (Unix seconds) passes.
struct UntilTokenExpiry;

impl Expiry<String, i64> for UntilTokenExpiry {
    fn expire_after_create(&self, _key: &String, exp: &i64, _created_at: Instant) -> Option<Duration> {
        let remaining = exp.saturating_sub(Utc::now().timestamp()).max(1);
        Some(Duration::from_secs(remaining.unsigned_abs()))
    }
}

/// Outcome of [`ConsumedTokens::claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// First use; the caller now owns the token.
    Fresh,
    /// Already used.
    AlreadyUsed,
}

#[derive(Clone)]
pub struct ConsumedTokens {
    cache: Cache<String, i64>,
}

impl Default for ConsumedTokens {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsumedTokens {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .expire_after(UntilTokenExpiry)
                .build(),
        }
    }

    /// Atomically mark the token with `signature` as used.
    pub async fn claim(&self, signature: &str, exp: i64) -> Claim {
        let entry = self.cache.entry(signature.to_string()).or_insert(exp).await;
        if entry.is_fresh() {
            Claim::Fresh
        } else {
            Claim::AlreadyUsed
        }
    }

    /// Undo a claim whose write did not go through.
    pub async fn release(&self, signature: &str) {
        self.cache.invalidate(signature).await;
    }
}
