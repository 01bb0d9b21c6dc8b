use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, ClientBuilder};
use types::config::PredictConfig;
use types::error::{InferenceError, InferenceResult};
use url::Url;

/// Submits one encoded instances envelope and returns the raw response body.
#[async_trait]
pub trait PredictClient: Send + Sync + 'static {
    async fn predict(&self, request_body: Vec<u8>) -> InferenceResult<Bytes>;
}

/// Client for the model server's loopback REST endpoint.
///
/// The model server reports prediction failures inside the response body, so
/// the body is returned regardless of HTTP status and the transcoder decides
/// what it means.
pub struct HttpPredictClient {
    url: Url,
    client: Client,
}

impl HttpPredictClient {
    pub fn new(url: Url) -> InferenceResult<Self> {
        Ok(Self {
            url,
            client: ClientBuilder::new()
                .pool_idle_timeout(None)
                .build()
                .map_err(|e| InferenceError::Request(e.to_string()))?,
        })
    }

    pub fn for_config(config: &PredictConfig) -> InferenceResult<Self> {
        let url = Url::parse(&config.predict_url())
            .map_err(|e| InferenceError::Request(e.to_string()))?;
        Self::new(url)
    }
}

#[async_trait]
impl PredictClient for HttpPredictClient {
    async fn predict(&self, request_body: Vec<u8>) -> InferenceResult<Bytes> {
        let response = self
            .client
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(request_body)
            .send()
            .await
            .map_err(|e| InferenceError::Request(e.to_string()))?;

        response
            .bytes()
            .await
            .map_err(|e| InferenceError::Request(e.to_string()))
    }
}
