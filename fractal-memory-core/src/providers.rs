//! Traits for the three model-backed external collaborators the core
//! consumes but does not implement (§1, §6.4): an embedding provider, a
//! batch summariser used by L0→L1 consolidation, and a completion provider
//! used by the Agent Facade's fast path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Produces a fixed-dimension embedding for a piece of text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn dimensions(&self) -> usize;
}

/// The coerced JSON shape a summariser is expected to return (§4.3 Step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub summary: String,
    pub importance: f32,
    pub source_count: u32,
}

/// Summarises a batch of L0 texts into one [`BatchSummary`].
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, texts: &[String]) -> Result<String>;
}

/// An L0 item's text plus its pre-summarisation importance, used to compute
/// the deterministic fallback's mean importance.
#[derive(Debug, Clone)]
pub struct SummaryInput {
    pub text: String,
    pub importance: f32,
}

/// Parses a summariser's raw response into a [`BatchSummary`], stripping
/// leading code fences and non-JSON prefixes before falling back to a
/// deterministic summary if parsing still fails (§4.3 Step 1).
#[must_use]
pub fn coerce_summary(raw: &str, inputs: &[SummaryInput]) -> BatchSummary {
    if let Some(parsed) = try_parse_json(raw) {
        return parsed;
    }
    deterministic_fallback(inputs)
}

fn try_parse_json(raw: &str) -> Option<BatchSummary> {
    let trimmed = strip_code_fence(raw.trim());
    let start = trimmed.find('{')?;
    let candidate = &trimmed[start..];
    serde_json::from_str(candidate).ok()
}

fn strip_code_fence(s: &str) -> &str {
    let s = s.strip_prefix("```json").or_else(|| s.strip_prefix("```")).unwrap_or(s);
    s.strip_suffix("```").unwrap_or(s).trim()
}

fn deterministic_fallback(inputs: &[SummaryInput]) -> BatchSummary {
    let summary = inputs
        .iter()
        .filter_map(|t| t.text.split(['.', '!', '?']).find(|s| !s.trim().is_empty()))
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(". ");
    let mean_importance = if inputs.is_empty() {
        0.5
    } else {
        inputs.iter().map(|i| i.importance).sum::<f32>() / inputs.len() as f32
    };
    BatchSummary {
        summary: if summary.is_empty() {
            "summary unavailable".to_string()
        } else {
            summary
        },
        importance: mean_importance,
        #[allow(clippy::cast_possible_truncation)]
        source_count: inputs.len() as u32,
    }
}

/// Produces a chat completion from a prompt.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}
