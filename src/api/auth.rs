use std::fmt;

use serde::{Deserialize, Serialize};

use super::client::HttpClient;
use crate::subscription::http::QueryError;

/// A new account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterData {
    pub login: String,
    pub phone: String,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub password: String,
}

impl fmt::Debug for RegisterData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterData")
            .field("login", &self.login)
            .field("phone", &self.phone)
            .field("first_name", &self.first_name)
            .field("middle_name", &self.middle_name)
            .field("last_name", &self.last_name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Login form input. Sent form-encoded as `username` and `password`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "username")]
    pub login: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Response of a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

pub async fn register(client: &HttpClient, data: &RegisterData) -> Result<(), QueryError> {
    client.post_json("/users/register", data).await
}

pub async fn login(client: &HttpClient, credentials: &Credentials) -> Result<AccessToken, QueryError> {
    client.post_form("/auth/jwt/login", credentials).await
}
