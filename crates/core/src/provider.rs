//! Provider trait: the abstraction over the chat-completion transport.
//!
//! A Provider knows how to send a rendered message list to a model-serving
//! endpoint and get the reply text back. The loop never sees HTTP.

use crate::error::ProviderError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A rendered request, ready for the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "mistral-7b-instruct-v0.3")
    pub model: String,

    /// The role-tagged entries, in order
    pub messages: Vec<Message>,

    /// Whether to stream the response (always false for the reasoning loop)
    #[serde(default)]
    pub stream: bool,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated text; empty when the model returned nothing
    pub content: String,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// The core Provider trait.
///
/// Every chat backend implements this trait. The loop controller calls
/// `complete()` without knowing which endpoint is being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "lmstudio").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_roles_and_stream_flag() {
        let req = ProviderRequest {
            model: "mistral-7b-instruct-v0.3".into(),
            messages: vec![Message::system("rules"), Message::user("hi")],
            stream: false,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }
}
