//! Chat-completion transports for clinreact.
//!
//! All providers implement the `clinreact_core::Provider` trait.
//! [`build_from_config`] assembles the transport the CLI uses.

pub mod openai_compat;
pub mod retry;

pub use openai_compat::OpenAiCompatProvider;
pub use retry::{RetryPolicy, RetryingProvider};

use clinreact_core::Provider;
use clinreact_core::error::ProviderError;
use std::sync::Arc;

/// Build the configured transport: an OpenAI-compatible endpoint wrapped
/// in the retry policy from `[provider]`.
pub fn build_from_config(
    config: &clinreact_config::AppConfig,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let endpoint = OpenAiCompatProvider::new(
        "openai-compat",
        config.provider.base_url.clone(),
        config.provider.api_key.clone(),
    )?;

    tracing::debug!(
        base_url = %config.provider.base_url,
        model = %config.provider.model,
        "Configured chat endpoint"
    );

    Ok(Arc::new(RetryingProvider::new(
        Arc::new(endpoint),
        RetryPolicy::from_config(&config.provider),
    )))
}
