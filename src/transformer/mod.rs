//! Transformer module for protocol conversion.
//!
//! Converts between the Claude Messages shape the relay speaks to its
//! callers and the OpenAI-compatible shape third-party providers speak.
//!
//! # Architecture
//!
//! Each provider names a [`Transformer`] in its configuration. The
//! transformer covers three conversion points:
//!
//! ```text
//! Claude request
//!     ↓
//! [transform_request]   ← Claude shape → provider wire body
//!     ↓
//! Provider backend
//!     ↓
//! [transform_response]  ← provider JSON reply → Claude response
//! [stream_transform]    ← provider SSE stream → Claude SSE stream
//!     ↓
//! Claude-shaped reply
//! ```

pub mod claude;
pub mod openai;
pub mod stream;

use std::collections::HashMap;
use std::sync::Arc;

pub use claude::{
    ClaudeMessage, ClaudeRequest, ClaudeResponse, ClaudeTool, ClaudeUsage, ContentBlock,
    ContentDelta, MessageContent, MessageDelta, Role, StopReason, StreamEvent, StreamMessage,
    SystemPrompt,
};
pub use openai::ClaudeToOpenAi;
pub use stream::{transform_sse_stream, OpenAiToClaudeStream};

use crate::core::error::Result;

/// Name resolved when a provider record does not specify a transformer.
pub const DEFAULT_TRANSFORMER: &str = "claude-to-openai";

// ============================================================================
// Transformer Trait
// ============================================================================

/// Protocol transformer for one provider wire format.
pub trait Transformer: Send + Sync {
    /// Registry name used by provider configuration.
    fn name(&self) -> &'static str;

    /// Claude-shaped request → provider wire body.
    ///
    /// Pure: no I/O, deterministic for a given input.
    fn transform_request(&self, request: &ClaudeRequest) -> Result<serde_json::Value>;

    /// Provider JSON reply → Claude-shaped response.
    fn transform_response(&self, raw: serde_json::Value) -> Result<ClaudeResponse>;

    /// Fresh per-stream transducer for provider SSE replies.
    fn stream_transform(&self) -> Box<dyn StreamTransform>;
}

/// Stateful, single-stream SSE transducer.
///
/// Implementations carry only invocation-local state; one instance serves
/// exactly one stream.
pub trait StreamTransform: Send {
    /// Feed one upstream read; returns the outbound SSE frames it produced.
    fn process_chunk(&mut self, chunk: &[u8]) -> Result<Vec<String>>;

    /// The upstream ended without a terminal frame; emit closing frames.
    fn finish(&mut self) -> Result<Vec<String>>;

    /// Best-effort close after an upstream failure.
    fn abort(&mut self) -> Vec<String>;

    /// Whether the terminal event has been emitted.
    fn is_completed(&self) -> bool;
}

// ============================================================================
// Transformer Registry
// ============================================================================

/// Registry of named transformers.
///
/// Built once at startup and passed by reference to the router; registration
/// is a constructor step, not a mutation scattered across call sites.
pub struct TransformerRegistry {
    transformers: HashMap<String, Arc<dyn Transformer>>,
}

impl TransformerRegistry {
    /// Create a registry with the built-in transformers.
    pub fn new() -> Self {
        let mut registry = Self {
            transformers: HashMap::new(),
        };
        registry.register(Arc::new(ClaudeToOpenAi::new()));
        registry
    }

    fn register(&mut self, transformer: Arc<dyn Transformer>) {
        self.transformers
            .insert(transformer.name().to_string(), transformer);
    }

    /// Look a transformer up by its configured name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Transformer>> {
        self.transformers.get(name).cloned()
    }

    /// List all registered transformer names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.transformers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_default_transformer() {
        let registry = TransformerRegistry::new();
        assert!(registry.get(DEFAULT_TRANSFORMER).is_some());
        assert_eq!(registry.names(), vec![DEFAULT_TRANSFORMER.to_string()]);
    }

    #[test]
    fn test_registry_unknown_name() {
        let registry = TransformerRegistry::new();
        assert!(registry.get("claude-to-carrier-pigeon").is_none());
    }

    #[test]
    fn test_stream_transform_instances_are_independent() {
        let registry = TransformerRegistry::new();
        let transformer = registry.get(DEFAULT_TRANSFORMER).unwrap();

        let mut first = transformer.stream_transform();
        let second = transformer.stream_transform();

        first.process_chunk(b"data: [DONE]\n").unwrap();
        assert!(first.is_completed());
        assert!(!second.is_completed());
    }
}
