//! LLM provider clients.

pub mod gemini;
pub mod openai;
pub mod shared;

pub use shared::{
    ChatMessage, ProviderError, ProviderErrorKind, ProviderResult, ProviderStream, StreamEvent,
    resolve_api_key, resolve_base_url,
};
