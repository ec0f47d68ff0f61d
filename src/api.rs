//! The remote catalog service.
//!
//! Pages talk to the service through [`CatalogApi`]. [`HttpClient`] is the
//! real transport; [`memory::MemoryCatalog`] keeps everything in process for
//! tests and offline runs.

pub mod auth;
pub mod client;
pub mod memory;
pub mod products;

use async_trait::async_trait;

pub use auth::{AccessToken, Credentials, RegisterData};
pub use client::HttpClient;
pub use memory::MemoryCatalog;
pub use products::{NewProduct, Product};

use crate::subscription::http::QueryError;

/// Domain operations offered by the catalog service.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn list_products(&self) -> Result<Vec<Product>, QueryError>;

    /// `Ok(None)` when no product has this id.
    async fn get_product(&self, id: &str) -> Result<Option<Product>, QueryError>;

    async fn create_product(&self, product: NewProduct) -> Result<(), QueryError>;

    async fn delete_product(&self, id: &str) -> Result<(), QueryError>;

    async fn register(&self, data: RegisterData) -> Result<(), QueryError>;

    async fn login(&self, credentials: Credentials) -> Result<AccessToken, QueryError>;
}

#[async_trait]
impl CatalogApi for HttpClient {
    async fn list_products(&self) -> Result<Vec<Product>, QueryError> {
        products::list(self).await
    }

    async fn get_product(&self, id: &str) -> Result<Option<Product>, QueryError> {
        products::get(self, id).await
    }

    async fn create_product(&self, product: NewProduct) -> Result<(), QueryError> {
        products::create(self, &product).await
    }

    async fn delete_product(&self, id: &str) -> Result<(), QueryError> {
        products::delete(self, id).await
    }

    async fn register(&self, data: RegisterData) -> Result<(), QueryError> {
        auth::register(self, &data).await
    }

    async fn login(&self, credentials: Credentials) -> Result<AccessToken, QueryError> {
        auth::login(self, &credentials).await
    }
}
