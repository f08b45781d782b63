//! Cart coordination on top of the Storefront API.
//!
//! Shopify owns the cart. This module only orders the mutations we send it:
//!
//! - Mutations on one cart run one at a time (per-cart `tokio` mutex kept in a
//!   `moka` cache that forgets idle carts).
//! - `add_item` publishes an optimistic line, keyed by merchandise ID, that
//!   readers see until the add settles.
//! - Quantity changes inside the debounce window are coalesced into one
//!   `cartLinesUpdate`; every waiting caller gets the same resulting cart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, instrument, warn};

use crate::shopify::{Cart, CartApi, CartLineInput, CartLineUpdateInput, ShopifyError};

/// How long an idle cart's lock is remembered.
const CART_LOCK_IDLE: Duration = Duration::from_secs(600);

/// Errors surfaced by cart operations.
///
/// `Clone` so one debounced result can be handed to every waiter.
#[derive(Debug, Clone, Error)]
pub enum CartError {
    #[error("Cart not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    UserError(String),

    #[error("Shopify request failed: {0}")]
    Upstream(Arc<ShopifyError>),

    #[error("Cart update was cancelled")]
    Cancelled,
}

impl From<ShopifyError> for CartError {
    fn from(err: ShopifyError) -> Self {
        match err {
            ShopifyError::NotFound(msg) => Self::NotFound(msg),
            ShopifyError::UserError(msg) => Self::UserError(msg),
            other => Self::Upstream(Arc::new(other)),
        }
    }
}

/// An add that has been accepted but not yet confirmed by Shopify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingLine {
    pub merchandise_id: String,
    pub quantity: i64,
}

/// The authoritative cart plus any adds still in flight.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub cart: Cart,
    pub pending_lines: Vec<PendingLine>,
}

type Waiter = oneshot::Sender<Result<Cart, CartError>>;

#[derive(Default)]
struct Batch {
    /// Last requested quantity per line ID.
    updates: HashMap<String, i64>,
    waiters: Vec<Waiter>,
    generation: u64,
}

/// Serializes and batches cart mutations.
#[derive(Clone)]
pub struct CartService {
    inner: Arc<CartServiceInner>,
}

struct CartServiceInner {
    api: Arc<dyn CartApi>,
    locks: Cache<String, Arc<Mutex<()>>>,
    pending: StdMutex<HashMap<String, Vec<PendingLine>>>,
    batches: StdMutex<HashMap<String, Batch>>,
    next_generation: AtomicU64,
    debounce: Duration,
}

/// Locks a std mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CartService {
    #[must_use]
    pub fn new(api: Arc<dyn CartApi>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(CartServiceInner {
                api,
                locks: Cache::builder()
                    .max_capacity(10_000)
                    .time_to_idle(CART_LOCK_IDLE)
                    .build(),
                pending: StdMutex::new(HashMap::new()),
                batches: StdMutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                debounce,
            }),
        }
    }

    async fn cart_lock(&self, cart_id: &str) -> Arc<Mutex<()>> {
        self.inner
            .locks
            .get_with(cart_id.to_string(), async { Arc::new(Mutex::new(())) })
            .await
    }

    /// Create a cart, optionally with initial lines.
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] if Shopify rejects the cart.
    #[instrument(skip(self, lines))]
    pub async fn create(&self, lines: Vec<CartLineInput>) -> Result<Cart, CartError> {
        Ok(self.inner.api.create_cart(lines).await?)
    }

    /// Fetch the cart together with optimistic lines for in-flight adds.
    ///
    /// Reads do not wait for the cart lock.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::NotFound`] for an unknown cart.
    #[instrument(skip(self))]
    pub async fn get(&self, cart_id: &str) -> Result<CartView, CartError> {
        let cart = self.inner.api.get_cart(cart_id).await?;
        Ok(CartView {
            pending_lines: self.pending_lines(cart_id),
            cart,
        })
    }

    /// Optimistic lines currently visible for `cart_id`.
    #[must_use]
    pub fn pending_lines(&self, cart_id: &str) -> Vec<PendingLine> {
        lock(&self.inner.pending)
            .get(cart_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Add `quantity` of a variant.
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] if the add fails. The optimistic line is
    /// withdrawn either way.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        cart_id: &str,
        merchandise_id: &str,
        quantity: i64,
    ) -> Result<Cart, CartError> {
        let _pending = PendingGuard::register(self, cart_id, merchandise_id, quantity);

        let lock = self.cart_lock(cart_id).await;
        let _guard = lock.lock().await;

        let cart = self
            .inner
            .api
            .add_lines(
                cart_id,
                vec![CartLineInput {
                    merchandise_id: merchandise_id.to_string(),
                    quantity,
                }],
            )
            .await?;

        if !cart.contains_merchandise(merchandise_id) {
            warn!("Shopify accepted the add but the cart lacks the merchandise");
        }
        Ok(cart)
    }

    /// Remove lines by ID.
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] if the removal fails.
    #[instrument(skip(self))]
    pub async fn remove_lines(
        &self,
        cart_id: &str,
        line_ids: Vec<String>,
    ) -> Result<Cart, CartError> {
        let lock = self.cart_lock(cart_id).await;
        let _guard = lock.lock().await;
        Ok(self.inner.api.remove_lines(cart_id, line_ids).await?)
    }

    /// Set a line's quantity. Changes arriving within the debounce window are
    /// sent together; quantity `0` removes the line.
    ///
    /// # Errors
    ///
    /// Returns the batch's [`CartError`], shared by every caller in the batch.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        cart_id: &str,
        line_id: &str,
        quantity: i64,
    ) -> Result<Cart, CartError> {
        let (tx, rx) = oneshot::channel();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        {
            let mut batches = lock(&self.inner.batches);
            let batch = batches.entry(cart_id.to_string()).or_default();
            batch.updates.insert(line_id.to_string(), quantity);
            batch.waiters.push(tx);
            batch.generation = generation;
        }

        let service = self.clone();
        let cart_id = cart_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(service.inner.debounce).await;
            service.flush_if_latest(&cart_id, generation).await;
        });

        rx.await.unwrap_or(Err(CartError::Cancelled))
    }

    /// Send the batch for `cart_id` if no newer update arrived meanwhile.
    async fn flush_if_latest(&self, cart_id: &str, generation: u64) {
        let batch = {
            let mut batches = lock(&self.inner.batches);
            match batches.get(cart_id) {
                Some(batch) if batch.generation == generation => batches.remove(cart_id),
                _ => None,
            }
        };
        let Some(batch) = batch else {
            return;
        };

        debug!(
            cart_id,
            lines = batch.updates.len(),
            waiters = batch.waiters.len(),
            "Flushing debounced quantity updates"
        );

        let result = self.apply_updates(cart_id, batch.updates).await;
        for waiter in batch.waiters {
            // A dropped receiver just means the caller went away.
            let _ = waiter.send(result.clone());
        }
    }

    async fn apply_updates(
        &self,
        cart_id: &str,
        updates: HashMap<String, i64>,
    ) -> Result<Cart, CartError> {
        let (removals, changes): (Vec<_>, Vec<_>) =
            updates.into_iter().partition(|(_, quantity)| *quantity <= 0);

        let lock = self.cart_lock(cart_id).await;
        let _guard = lock.lock().await;

        let mut cart = None;
        if !changes.is_empty() {
            let lines = changes
                .into_iter()
                .map(|(id, quantity)| CartLineUpdateInput { id, quantity })
                .collect();
            cart = Some(self.inner.api.update_lines(cart_id, lines).await?);
        }
        if !removals.is_empty() {
            let line_ids = removals.into_iter().map(|(id, _)| id).collect();
            cart = Some(self.inner.api.remove_lines(cart_id, line_ids).await?);
        }

        match cart {
            Some(cart) => Ok(cart),
            None => Ok(self.inner.api.get_cart(cart_id).await?),
        }
    }
}

/// Keeps an optimistic line visible for as long as the add is in flight.
struct PendingGuard<'a> {
    service: &'a CartService,
    cart_id: String,
    merchandise_id: String,
    quantity: i64,
}

impl<'a> PendingGuard<'a> {
    fn register(
        service: &'a CartService,
        cart_id: &str,
        merchandise_id: &str,
        quantity: i64,
    ) -> Self {
        let mut pending = lock(&service.inner.pending);
        let lines = pending.entry(cart_id.to_string()).or_default();
        match lines.iter_mut().find(|l| l.merchandise_id == merchandise_id) {
            Some(line) => line.quantity += quantity,
            None => lines.push(PendingLine {
                merchandise_id: merchandise_id.to_string(),
                quantity,
            }),
        }

        Self {
            service,
            cart_id: cart_id.to_string(),
            merchandise_id: merchandise_id.to_string(),
            quantity,
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut pending = lock(&self.service.inner.pending);
        if let Some(lines) = pending.get_mut(&self.cart_id) {
            for line in lines.iter_mut() {
                if line.merchandise_id == self.merchandise_id {
                    line.quantity -= self.quantity;
                }
            }
            lines.retain(|l| l.quantity > 0);
            if lines.is_empty() {
                pending.remove(&self.cart_id);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
pub(crate) mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::shopify::{CartCost, CartLine, CartMerchandise, CartMerchandiseProduct, Money};

    /// In-memory cart that merges lines by merchandise like Shopify does.
    ///
    /// Mutations read, pause, then write, so unserialized callers lose updates.
    #[derive(Default)]
    pub(crate) struct FakeCartApi {
        carts: StdMutex<HashMap<String, Cart>>,
        next_line: AtomicUsize,
        pub add_delay: Duration,
        pub update_calls: AtomicUsize,
        pub remove_calls: AtomicUsize,
    }

    fn money(amount: &str) -> Money {
        Money {
            amount: amount.to_string(),
            currency_code: "USD".to_string(),
        }
    }

    impl FakeCartApi {
        pub(crate) fn with_add_delay(add_delay: Duration) -> Self {
            Self {
                add_delay,
                ..Self::default()
            }
        }

        fn snapshot(&self, cart_id: &str) -> Result<Cart, ShopifyError> {
            lock(&self.carts)
                .get(cart_id)
                .cloned()
                .ok_or_else(|| ShopifyError::NotFound(format!("Cart not found: {cart_id}")))
        }

        fn store(&self, cart: Cart) -> Cart {
            lock(&self.carts).insert(cart.id.clone(), cart.clone());
            cart
        }

        fn merge_lines(&self, cart: &mut Cart, lines: Vec<CartLineInput>) {
            for input in lines {
                if let Some(line) = cart
                    .lines
                    .iter_mut()
                    .find(|l| l.merchandise.id == input.merchandise_id)
                {
                    line.quantity += input.quantity;
                } else {
                    let n = self.next_line.fetch_add(1, Ordering::Relaxed);
                    cart.lines.push(CartLine {
                        id: format!("gid://shopify/CartLine/{n}"),
                        quantity: input.quantity,
                        merchandise: CartMerchandise {
                            id: input.merchandise_id,
                            title: "8x10".to_string(),
                            price: money("25.0"),
                            selected_options: vec![],
                            product: CartMerchandiseProduct {
                                title: "Print".to_string(),
                                handle: "print".to_string(),
                                featured_image: None,
                            },
                        },
                    });
                }
            }
        }
    }

    #[async_trait]
    impl CartApi for FakeCartApi {
        async fn create_cart(&self, lines: Vec<CartLineInput>) -> Result<Cart, ShopifyError> {
            let n = lock(&self.carts).len();
            let mut cart = Cart {
                id: format!("gid://shopify/Cart/{n}"),
                checkout_url: format!("https://artfulfam.myshopify.com/cart/c/{n}"),
                cost: CartCost {
                    total_amount: money("0.0"),
                    subtotal_amount: None,
                    total_tax_amount: None,
                },
                lines: vec![],
            };
            self.merge_lines(&mut cart, lines);
            Ok(self.store(cart))
        }

        async fn get_cart(&self, cart_id: &str) -> Result<Cart, ShopifyError> {
            self.snapshot(cart_id)
        }

        async fn add_lines(
            &self,
            cart_id: &str,
            lines: Vec<CartLineInput>,
        ) -> Result<Cart, ShopifyError> {
            let mut cart = self.snapshot(cart_id)?;
            tokio::time::sleep(self.add_delay).await;
            self.merge_lines(&mut cart, lines);
            Ok(self.store(cart))
        }

        async fn update_lines(
            &self,
            cart_id: &str,
            lines: Vec<CartLineUpdateInput>,
        ) -> Result<Cart, ShopifyError> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            let mut cart = self.snapshot(cart_id)?;
            for update in lines {
                let line = cart
                    .lines
                    .iter_mut()
                    .find(|l| l.id == update.id)
                    .ok_or_else(|| ShopifyError::UserError("The merchandise line was not found".to_string()))?;
                line.quantity = update.quantity;
            }
            Ok(self.store(cart))
        }

        async fn remove_lines(
            &self,
            cart_id: &str,
            line_ids: Vec<String>,
        ) -> Result<Cart, ShopifyError> {
            self.remove_calls.fetch_add(1, Ordering::SeqCst);
            let mut cart = self.snapshot(cart_id)?;
            cart.lines.retain(|l| !line_ids.contains(&l.id));
            Ok(self.store(cart))
        }
    }

    fn service(api: &Arc<FakeCartApi>, debounce_ms: u64) -> CartService {
        CartService::new(api.clone(), Duration::from_millis(debounce_ms))
    }

    #[tokio::test]
    async fn test_rapid_adds_both_apply() {
        let api = Arc::new(FakeCartApi::with_add_delay(Duration::from_millis(30)));
        let service = service(&api, 10);
        let cart = service.create(vec![]).await.unwrap();

        let (a, b) = tokio::join!(
            service.add_item(&cart.id, "gid://shopify/ProductVariant/1", 1),
            service.add_item(&cart.id, "gid://shopify/ProductVariant/1", 2),
        );
        a.unwrap();
        b.unwrap();

        let view = service.get(&cart.id).await.unwrap();
        assert_eq!(view.cart.lines.len(), 1);
        assert_eq!(view.cart.lines[0].quantity, 3);
        assert!(view.pending_lines.is_empty());
    }

    #[tokio::test]
    async fn test_rapid_adds_of_different_variants() {
        let api = Arc::new(FakeCartApi::with_add_delay(Duration::from_millis(30)));
        let service = service(&api, 10);
        let cart = service.create(vec![]).await.unwrap();

        let (a, b) = tokio::join!(
            service.add_item(&cart.id, "v1", 1),
            service.add_item(&cart.id, "v2", 1),
        );
        a.unwrap();
        b.unwrap();

        let cart = service.get(&cart.id).await.unwrap().cart;
        assert!(cart.contains_merchandise("v1"));
        assert!(cart.contains_merchandise("v2"));
        assert_eq!(cart.total_quantity(), 2);
    }

    #[tokio::test]
    async fn test_pending_line_visible_while_in_flight() {
        let api = Arc::new(FakeCartApi::with_add_delay(Duration::from_millis(100)));
        let service = service(&api, 10);
        let cart = service.create(vec![]).await.unwrap();

        let adder = {
            let service = service.clone();
            let cart_id = cart.id.clone();
            tokio::spawn(async move { service.add_item(&cart_id, "v1", 2).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        let view = service.get(&cart.id).await.unwrap();
        assert_eq!(
            view.pending_lines,
            vec![PendingLine {
                merchandise_id: "v1".to_string(),
                quantity: 2
            }]
        );
        assert!(view.cart.lines.is_empty());

        adder.await.unwrap().unwrap();
        let view = service.get(&cart.id).await.unwrap();
        assert!(view.pending_lines.is_empty());
        assert!(view.cart.contains_merchandise("v1"));
    }

    #[tokio::test]
    async fn test_pending_line_withdrawn_on_failure() {
        let api = Arc::new(FakeCartApi::default());
        let service = service(&api, 10);

        let err = service.add_item("missing", "v1", 1).await.unwrap_err();
        assert!(matches!(err, CartError::NotFound(_)));
        assert!(service.pending_lines("missing").is_empty());
    }

    #[tokio::test]
    async fn test_debounced_updates_coalesce() {
        let api = Arc::new(FakeCartApi::default());
        let service = service(&api, 50);
        let cart = service
            .create(vec![
                CartLineInput {
                    merchandise_id: "v1".to_string(),
                    quantity: 1,
                },
                CartLineInput {
                    merchandise_id: "v2".to_string(),
                    quantity: 1,
                },
            ])
            .await
            .unwrap();
        let l1 = cart.lines[0].id.clone();
        let l2 = cart.lines[1].id.clone();

        let (a, b, c) = tokio::join!(
            service.update_quantity(&cart.id, &l1, 2),
            service.update_quantity(&cart.id, &l1, 3),
            service.update_quantity(&cart.id, &l2, 5),
        );
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert_eq!(api.update_calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, b);
        assert_eq!(b, c);
        let quantities: HashMap<_, _> = a.lines.iter().map(|l| (l.id.clone(), l.quantity)).collect();
        assert_eq!(quantities[&l1], 3);
        assert_eq!(quantities[&l2], 5);
    }

    #[tokio::test]
    async fn test_updates_outside_window_are_separate() {
        let api = Arc::new(FakeCartApi::default());
        let service = service(&api, 10);
        let cart = service
            .create(vec![CartLineInput {
                merchandise_id: "v1".to_string(),
                quantity: 1,
            }])
            .await
            .unwrap();
        let line = cart.lines[0].id.clone();

        service.update_quantity(&cart.id, &line, 2).await.unwrap();
        service.update_quantity(&cart.id, &line, 4).await.unwrap();
        assert_eq!(api.update_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_quantity_removes_line() {
        let api = Arc::new(FakeCartApi::default());
        let service = service(&api, 10);
        let cart = service
            .create(vec![CartLineInput {
                merchandise_id: "v1".to_string(),
                quantity: 1,
            }])
            .await
            .unwrap();

        let updated = service
            .update_quantity(&cart.id, &cart.lines[0].id, 0)
            .await
            .unwrap();
        assert!(updated.lines.is_empty());
        assert_eq!(api.update_calls.load(Ordering::SeqCst), 0);
        assert_eq!(api.remove_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batch_error_reaches_every_waiter() {
        let api = Arc::new(FakeCartApi::default());
        let service = service(&api, 20);
        let cart = service.create(vec![]).await.unwrap();

        let (a, b) = tokio::join!(
            service.update_quantity(&cart.id, "gid://shopify/CartLine/404", 1),
            service.update_quantity(&cart.id, "gid://shopify/CartLine/405", 1),
        );
        assert!(matches!(a, Err(CartError::UserError(_))));
        assert!(matches!(b, Err(CartError::UserError(_))));
    }

    #[test]
    fn test_shopify_error_mapping() {
        assert!(matches!(
            CartError::from(ShopifyError::NotFound("c".to_string())),
            CartError::NotFound(_)
        ));
        assert!(matches!(
            CartError::from(ShopifyError::RateLimited(1)),
            CartError::Upstream(_)
        ));
    }
}
