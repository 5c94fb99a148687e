//! Embedding provider backed by the OpenAI embeddings API.
//!
//! Only available with the `openai` feature.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RetrievalError, Result};

const PROVIDER: &str = "OpenAI";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Model the index is built with unless overridden.
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

const DEFAULT_DIMENSIONS: usize = 1536;

/// An [`EmbeddingProvider`] calling `POST {base_url}/embeddings`.
///
/// The model is pinned at construction. Since the model name is recorded in
/// the embedding cache, changing it here makes the next startup rebuild the
/// index.
///
/// ```rust,ignore
/// use chabad_retrieval::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::from_env()?.with_dimensions(512);
/// let embedding = provider.embed("מהי אהבת ישראל").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    request_dimensions: Option<usize>,
}

fn provider_error(message: impl Into<String>) -> RetrievalError {
    RetrievalError::EmbeddingProviderError { provider: PROVIDER.into(), message: message.into() }
}

impl OpenAIEmbeddingProvider {
    /// Create a provider for [`DEFAULT_MODEL`].
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::EmbeddingProviderError`] if `api_key` is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(provider_error("API key must not be empty"));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Create a provider from `OPENAI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::EmbeddingProviderError`] if the variable is
    /// unset or empty.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| provider_error("OPENAI_API_KEY environment variable not set"))?;
        Self::new(api_key)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Request shortened embeddings of `dims` dimensions.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    /// Send requests to a compatible endpoint instead of api.openai.com.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Order vectors by their `index` and check there is exactly one per input.
fn into_ordered_vectors(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    data.sort_by_key(|d| d.index);
    if data.len() != expected || data.iter().enumerate().any(|(i, d)| d.index != i) {
        return Err(provider_error(format!(
            "expected {expected} embeddings, received {} with mismatched indices",
            data.len()
        )));
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| provider_error("API returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // The API rejects empty strings.
        let input: Vec<&str> =
            texts.iter().map(|t| if t.trim().is_empty() { " " } else { *t }).collect();

        debug!(provider = PROVIDER, batch_size = input.len(), model = %self.model, "embedding batch");

        let request = EmbeddingRequest {
            model: &self.model,
            input,
            dimensions: self.request_dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                provider_error(format!("request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail =
                serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
            error!(provider = PROVIDER, %status, "API error");
            return Err(provider_error(format!("API returned {status}: {detail}")));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            provider_error(format!("failed to parse response: {e}"))
        })?;

        into_ordered_vectors(parsed.data, texts.len())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }
}
