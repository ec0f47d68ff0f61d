use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::subscription::http::QueryError;

impl From<reqwest::Error> for QueryError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::FetchError(error.to_string())
        } else {
            Self::NetworkError(error.to_string())
        }
    }
}

/// REST transport for the catalog service.
///
/// Every request is resolved against `base_url`; non-2xx answers become
/// [`QueryError::Status`] carrying the response body.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    base_url: Url,
}

impl HttpClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, QueryError> {
        let inner = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { inner, base_url })
    }

    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, QueryError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| QueryError::FetchError(format!("invalid request path {path}: {e}")))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, QueryError> {
        let url = self.url(path)?;
        debug!(%method, %url, "sending request");
        Ok(self.inner.request(method, url))
    }

    async fn send(request: RequestBuilder) -> Result<Response, QueryError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), %message, "request rejected");
        Err(QueryError::Status {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, QueryError> {
        let response = Self::send(self.request(Method::GET, path)?).await?;
        Ok(response.json().await?)
    }

    /// Like [`get`](Self::get), with a 404 answered as `None`.
    pub async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, QueryError> {
        match self.get(path).await {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Posts `body` as JSON and discards the response body.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), QueryError> {
        Self::send(self.request(Method::POST, path)?.json(body)).await?;
        Ok(())
    }

    /// Posts `form` url-encoded and decodes the JSON response.
    pub async fn post_form<F, T>(&self, path: &str, form: &F) -> Result<T, QueryError>
    where
        F: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = Self::send(self.request(Method::POST, path)?.form(form)).await?;
        Ok(response.json().await?)
    }

    pub async fn delete(&self, path: &str) -> Result<(), QueryError> {
        Self::send(self.request(Method::DELETE, path)?).await?;
        Ok(())
    }
}
