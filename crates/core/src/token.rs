//! Bearer-token seam.
//!
//! Token acquisition (the signed-assertion OAuth2 exchange) lives outside this
//! crate; the pipeline consumes an opaque bearer string from a provider. A run
//! is assumed short enough for one token to cover it.

use crate::PipelineResult;
use async_trait::async_trait;

/// Supplies a bearer token valid for the export API.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> PipelineResult<String>;
}

/// Token provider over a pre-issued token resolved at startup
/// (see [`crate::config::RunConfig`]).
#[derive(Clone, Debug)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> PipelineResult<String> {
        Ok(self.token.clone())
    }
}
