//! Image service trait.

use crate::error::Result;
use crate::image::types::{GenerationRequest, GenerationResponse};
use async_trait::async_trait;

/// A backend that turns instructions (plus optional reference images and
/// conversation history) into at most one image and some text.
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Sends one request and waits for the result.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse>;

    /// Returns the name of this service for display.
    fn name(&self) -> &str;
}
