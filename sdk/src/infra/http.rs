//! HTTP transport shared by all services

use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Prefix of every API route on the server
const API_PREFIX: &str = "/api/v1";

/// HTTP transport for request/response and event-stream calls
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    request_timeout: std::time::Duration,
}

impl HttpTransport {
    /// Create a transport from client configuration
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let parsed = Url::parse(&config.api_url)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", config.api_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl(format!(
                "{}: scheme must be http or https",
                config.api_url
            )));
        }

        // No client-wide timeout: event streams must be able to outlive it
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_timeout: config.request_timeout,
        })
    }

    /// Full URL of an API route
    pub fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    /// Full socket URL of an API route, with the scheme rewritten to ws/wss
    pub fn socket_url(&self, path: &str) -> String {
        let url = self.url(path);
        if let Some(rest) = url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            url
        }
    }

    /// Bearer token, if configured
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Request with the configured per-request timeout applied
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.raw_request(method, path).timeout(self.request_timeout)
    }

    /// Request without a total timeout, for long-lived or caller-bounded calls
    pub fn raw_request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Send a request and translate non-success responses
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build()?;
        let url = request.url().to_string();
        debug!("{} {}", request.method(), url);

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|source| Error::Connection { url, source })?;

        check_status(response).await
    }

    /// Send a request and decode the JSON body
    pub async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.send(builder).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json(self.request(Method::GET, path)).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send_json(self.request(Method::POST, path).json(body))
            .await
    }

    /// POST whose response body is ignored
    pub async fn post_unit<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send(self.request(Method::POST, path).json(body))
            .await?;
        Ok(())
    }

    /// DELETE whose response body is ignored
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, path)).await?;
        Ok(())
    }
}

/// Pass success responses through, translate everything else
pub async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    debug!("Request failed with status {}: {}", status, body);
    Err(Error::from_response_body(status, &body))
}
