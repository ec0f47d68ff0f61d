use serde::{Deserialize, Serialize};

use super::client::HttpClient;
use crate::subscription::http::QueryError;

/// A catalog entry. `id` is assigned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub description: String,
    pub author: String,
}

/// Body of a create request: a product without its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub avatar: String,
    pub description: String,
    pub author: String,
}

impl NewProduct {
    /// The stored product once the server has assigned `id`.
    pub fn with_id(self, id: impl Into<String>) -> Product {
        Product {
            id: id.into(),
            name: self.name,
            avatar: self.avatar,
            description: self.description,
            author: self.author,
        }
    }
}

fn product_path(id: &str) -> String {
    format!("/products/{id}")
}

pub async fn list(client: &HttpClient) -> Result<Vec<Product>, QueryError> {
    client.get("/products").await
}

pub async fn get(client: &HttpClient, id: &str) -> Result<Option<Product>, QueryError> {
    client.get_optional(&product_path(id)).await
}

pub async fn create(client: &HttpClient, product: &NewProduct) -> Result<(), QueryError> {
    client.post_json("/products", product).await
}

pub async fn delete(client: &HttpClient, id: &str) -> Result<(), QueryError> {
    client.delete(&product_path(id)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_decodes_from_service_json() {
        let json = r#"{"id":"7","name":"A","avatar":"https://x.com/a.png","description":"d","author":"me"}"#;
        let product: Product = serde_json::from_str(json).expect("valid product json");
        assert_eq!(product.id, "7");
        assert_eq!(product.author, "me");
    }

    #[test]
    fn test_new_product_has_no_id_field() {
        let body = serde_json::to_value(NewProduct {
            name: "A".to_string(),
            avatar: "https://x.com/a.png".to_string(),
            description: "d".to_string(),
            author: "me".to_string(),
        })
        .expect("serializable");
        assert!(body.get("id").is_none());
        assert_eq!(body["name"], "A");
    }
}
