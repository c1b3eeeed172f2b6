use std::sync::Arc;
use tracing::debug;

/// Fixed model ids for the shorthand names accepted in agent specs.
pub const MODEL_HAIKU: &str = "claude-3-5-haiku-20241022";
pub const MODEL_SONNET: &str = "claude-sonnet-4-5-20250929";
pub const MODEL_OPUS: &str = "claude-opus-4-5-20250514";

/// Provider-side model selection, consumed by the engine's scoped switch.
///
/// `set_model` takes effect for subsequent AI calls made through the
/// conversation service backed by the same provider.
pub trait ModelProvider: Send + Sync {
    fn current_model(&self) -> String;
    fn set_model(&self, model: &str);
}

/// Resolve an agent-spec model string to a concrete model id.
///
/// Shorthand names map to fixed ids, `inherit` and empty mean "no change",
/// anything else is passed through as a full model id.
pub fn resolve_model(model: &str) -> Option<&str> {
    match model {
        "haiku" => Some(MODEL_HAIKU),
        "sonnet" => Some(MODEL_SONNET),
        "opus" => Some(MODEL_OPUS),
        "" | "inherit" => None,
        other => Some(other),
    }
}

/// RAII guard for a scoped model switch.
///
/// Saves the provider's current model and installs `target` only when they
/// differ; the saved model is restored exactly once when the guard drops,
/// on every exit path.
pub struct ModelScope {
    provider: Arc<dyn ModelProvider>,
    saved: Option<String>,
}

impl ModelScope {
    pub fn switch(provider: Arc<dyn ModelProvider>, target: &str) -> Self {
        let current = provider.current_model();
        let saved = if current == target {
            None
        } else {
            debug!("switching model: {} -> {}", current, target);
            provider.set_model(target);
            Some(current)
        };
        Self { provider, saved }
    }

    /// Whether the guard actually changed the provider's model.
    pub fn switched(&self) -> bool {
        self.saved.is_some()
    }
}

impl Drop for ModelScope {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            debug!("restoring model: {}", saved);
            self.provider.set_model(&saved);
        }
    }
}
