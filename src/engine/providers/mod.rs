// ── Mentor Providers ───────────────────────────────────────────────────────
// AnyProvider wraps Box<dyn ModelProvider> so adding a new provider never
// requires modifying callers — implement the trait and add a factory arm.

pub mod openai;

pub use openai::OpenAiCompatProvider;

use crate::atoms::traits::{CompletionStream, ModelProvider, ProviderError};
use crate::atoms::types::{ProviderConfig, ProviderKind};

/// Type-erased model provider. Callers hold `AnyProvider` and call
/// `stream_completion` without knowing which concrete backend is in use.
pub struct AnyProvider(Box<dyn ModelProvider>);

impl AnyProvider {
    /// Construct the right concrete provider from a `ProviderConfig`.
    ///
    /// All shipped kinds (OpenAI, Ollama, OpenRouter, Custom) speak the
    /// OpenAI-compatible wire format; a provider with a unique format gets
    /// its own module and a match arm here.
    pub fn from_config(config: &ProviderConfig) -> Self {
        let provider: Box<dyn ModelProvider> = match config.kind {
            ProviderKind::OpenAi
            | ProviderKind::Ollama
            | ProviderKind::OpenRouter
            | ProviderKind::Custom => Box::new(OpenAiCompatProvider::new(config)),
        };
        AnyProvider(provider)
    }

    /// Wrap an already-built provider (used by tests with fakes).
    pub fn from_boxed(provider: Box<dyn ModelProvider>) -> Self {
        AnyProvider(provider)
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn kind(&self) -> ProviderKind {
        self.0.kind()
    }

    pub async fn stream_completion(&self, prompt: &str) -> Result<CompletionStream, ProviderError> {
        self.0.stream_completion(prompt).await
    }
}
