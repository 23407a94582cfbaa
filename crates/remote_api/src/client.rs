use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::types::{ApiConfig, GatewayError};

/// HTTP client for the park API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new client from configuration
    pub fn new(config: &ApiConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Full URL for a path made of raw segments; each segment is percent-encoded.
    pub fn url(&self, segments: &[&str]) -> String {
        build_url(&self.base_url, segments)
    }

    /// GET a JSON document.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
    ) -> Result<T, GatewayError> {
        let url = self.url(segments);
        log::debug!("GET {}", url);
        let response = self.send(self.client.get(&url)).await?;
        decode(response).await
    }

    /// POST a JSON body and decode the JSON reply.
    pub async fn post_json<B, T>(&self, segments: &[&str], body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(segments);
        log::debug!("POST {}", url);
        let response = self.send(self.client.post(&url).json(body)).await?;
        decode(response).await
    }

    /// PUT with query parameters and decode the JSON reply.
    pub async fn put_query<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let url = self.url(segments);
        log::debug!("PUT {}", url);
        let response = self.send(self.client.put(&url).query(query)).await?;
        decode(response).await
    }

    /// DELETE a resource. The reply body is ignored.
    pub async fn delete(&self, segments: &[&str]) -> Result<(), GatewayError> {
        let url = self.url(segments);
        log::debug!("DELETE {}", url);
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        log::warn!("Park API answered {}: {}", status, body);
        Err(status_error(status, body))
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| GatewayError::Decode(e.to_string()))
}

/// Joins `base` with percent-encoded `segments`.
pub fn build_url(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        url.push('/');
        url.push_str(&urlencoding::encode(segment));
    }
    url
}

/// Maps a non-success status onto a [`GatewayError`].
pub fn status_error(status: StatusCode, body: String) -> GatewayError {
    match status {
        StatusCode::NOT_FOUND => GatewayError::NotFound,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => GatewayError::Timeout,
        _ => GatewayError::Server {
            status: status.as_u16(),
            message: body,
        },
    }
}
