//! Query embedding for the dense retrieval signal.

use async_trait::async_trait;

use crate::error::Result;

/// Turns query text into a dense vector.
///
/// The corpus was embedded at ingestion time; implementations must use the
/// same model so query and passage vectors share one space.
///
/// # Example
///
/// ```rust,ignore
/// use medlight_rag::EmbeddingProvider;
///
/// let embedding = provider.embed("statins and liver enzymes").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Embed one query.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of the vectors this provider returns.
    fn dimensions(&self) -> usize;
}
