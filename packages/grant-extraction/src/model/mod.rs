//! Model inference service interface.
//!
//! The extractor talks to the model through [`ModelClient`], so tests can
//! script answers with [`MockModel`](crate::testing::MockModel) and real runs
//! use [`OpenAiModel`].

pub mod openai;

pub use openai::OpenAiModel;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::ModelError;

/// One structured-extraction request.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// System instructions, including the current date
    pub system: String,

    /// User message: page content plus the output contract
    pub user: String,

    /// JSON schema of the expected answer
    pub schema: serde_json::Value,

    /// Page the content came from
    pub url: String,

    /// Date the extraction is evaluated against
    pub today: NaiveDate,
}

/// A model that answers an extraction request with JSON text.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one completion and return the raw answer text.
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError>;

    /// Model identifier for logging.
    fn name(&self) -> &str {
        "model"
    }
}

#[async_trait]
impl<M: ModelClient + ?Sized> ModelClient for Arc<M> {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        (**self).complete(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
