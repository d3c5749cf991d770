//! A deterministic fallback [`CompletionProvider`], used when the facade is
//! constructed without one (e.g. `smoke-test`, or a caller that only wants
//! memory/recall behavior). Mirrors the core's `coerce_summary` deterministic
//! fallback: no network dependency, always succeeds.

use async_trait::async_trait;

use fractal_memory_core::error::Result;
use fractal_memory_core::providers::CompletionProvider;

/// Echoes the user's message back as an acknowledgement rather than failing
/// outright when no real completion backend is configured.
pub struct EchoCompletionProvider;

#[async_trait]
impl CompletionProvider for EchoCompletionProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let user_line = prompt.rsplit("User: ").next().unwrap_or(prompt);
        Ok(format!("(no completion backend configured) received: {user_line}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_the_final_user_line() {
        let provider = EchoCompletionProvider;
        let out = provider.complete("preamble\nUser: hello there").await.unwrap();
        assert!(out.contains("hello there"));
    }
}
