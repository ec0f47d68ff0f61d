//! In-process catalog for tests.
//!
//! [`MemoryCatalog`] answers like the remote service does (server-assigned ids,
//! 404 as "not found", rejected duplicate registrations) and counts how often
//! each operation was called, so tests can assert on request deduplication.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{AccessToken, CatalogApi, Credentials, NewProduct, Product, RegisterData};
use crate::subscription::http::QueryError;

#[derive(Debug, Default)]
pub struct MemoryCatalog {
    products: DashMap<u64, Product>,
    users: DashMap<String, RegisterData>,
    next_id: AtomicU64,
    calls: DashMap<&'static str, usize>,
    failing: AtomicBool,
    latency: Option<Duration>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog already holding `products`, with ids assigned in order.
    pub fn with_products(products: impl IntoIterator<Item = NewProduct>) -> Self {
        let catalog = Self::new();
        for product in products {
            catalog.insert(product);
        }
        catalog
    }

    /// Delays every answer by `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes every following call fail with a 500 until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// How many times `operation` (a [`CatalogApi`] method name) was called.
    pub fn calls(&self, operation: &str) -> usize {
        self.calls.get(operation).map_or(0, |count| *count)
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    fn insert(&self, product: NewProduct) -> Product {
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let product = product.with_id(seq.to_string());
        self.products.insert(seq, product.clone());
        product
    }

    fn find(&self, id: &str) -> Option<u64> {
        id.parse().ok().filter(|seq| self.products.contains_key(seq))
    }

    async fn enter(&self, operation: &'static str) -> Result<(), QueryError> {
        *self.calls.entry(operation).or_insert(0) += 1;
        debug!(operation, "memory catalog call");

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(QueryError::Status {
                status: 500,
                message: "Internal Server Error".to_string(),
            });
        }
        Ok(())
    }
}

fn not_found() -> QueryError {
    QueryError::Status {
        status: 404,
        message: "Not Found".to_string(),
    }
}

fn bad_request(detail: &str) -> QueryError {
    QueryError::Status {
        status: 400,
        message: format!(r#"{{"detail":"{detail}"}}"#),
    }
}

#[async_trait]
impl CatalogApi for MemoryCatalog {
    async fn list_products(&self) -> Result<Vec<Product>, QueryError> {
        self.enter("list_products").await?;
        let mut products: Vec<(u64, Product)> = self
            .products
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        products.sort_by_key(|(seq, _)| *seq);
        Ok(products.into_iter().map(|(_, product)| product).collect())
    }

    async fn get_product(&self, id: &str) -> Result<Option<Product>, QueryError> {
        self.enter("get_product").await?;
        Ok(self
            .find(id)
            .and_then(|seq| self.products.get(&seq).map(|entry| entry.value().clone())))
    }

    async fn create_product(&self, product: NewProduct) -> Result<(), QueryError> {
        self.enter("create_product").await?;
        self.insert(product);
        Ok(())
    }

    async fn delete_product(&self, id: &str) -> Result<(), QueryError> {
        self.enter("delete_product").await?;
        let seq = self.find(id).ok_or_else(not_found)?;
        self.products.remove(&seq);
        Ok(())
    }

    async fn register(&self, data: RegisterData) -> Result<(), QueryError> {
        self.enter("register").await?;
        if self.users.contains_key(&data.login) {
            return Err(bad_request("REGISTER_USER_ALREADY_EXISTS"));
        }
        self.users.insert(data.login.clone(), data);
        Ok(())
    }

    async fn login(&self, credentials: Credentials) -> Result<AccessToken, QueryError> {
        self.enter("login").await?;
        let known = self
            .users
            .get(&credentials.login)
            .is_some_and(|user| user.password == credentials.password);
        if !known {
            return Err(bad_request("LOGIN_BAD_CREDENTIALS"));
        }
        Ok(AccessToken {
            access_token: format!("token-{}", credentials.login),
            token_type: "bearer".to_string(),
            refresh_token: None,
        })
    }
}
