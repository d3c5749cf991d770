//! Core data model: episodes, entities, strategies, experiences, and the
//! small value types shared by every component.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::defaults::MAX_EPISODE_CONTENT_LEN;
use crate::error::{Error, Result};

/// Opaque JSON-ish scalar used in experience context snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Primitive {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

/// Tier an [`Episode`] currently resides in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    L0 = 0,
    L1 = 1,
    L2 = 2,
    L3 = 3,
}

impl Tier {
    #[must_use]
    pub fn as_source_tag(self) -> &'static str {
        match self {
            Tier::L0 => "L0",
            Tier::L1 => "L1",
            Tier::L2 => "L2",
            Tier::L3 => "L3",
        }
    }
}

/// Coarse granularity of an [`Episode`]'s content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    Micro,
    Meso,
    Macro,
}

/// Outcome recorded against an episode or experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Partial,
    Unknown,
    None,
}

/// A single dated textual observation, the atomic unit moved through the
/// tier hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub content: String,
    pub summary: Option<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub importance: f32,
    pub access_count: u64,
    pub tier: Tier,
    pub outcome: Outcome,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub scale: Scale,
    pub user_id: String,
    pub embedding: Option<Vec<f32>>,
    /// Foreign store-managed attributes preserved verbatim (§6.3).
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Episode {
    /// Creates a fresh L0 episode for `user_id` with `importance` clamped to
    /// `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `content` is empty or exceeds
    /// [`MAX_EPISODE_CONTENT_LEN`].
    pub fn new(user_id: impl Into<String>, content: impl Into<String>, importance: f32) -> Result<Self> {
        let content = content.into();
        if content.is_empty() {
            return Err(Error::Validation("episode content must not be empty".into()));
        }
        if content.len() > MAX_EPISODE_CONTENT_LEN {
            return Err(Error::Validation(format!(
                "episode content exceeds {MAX_EPISODE_CONTENT_LEN} bytes"
            )));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            content,
            summary: None,
            source: "conversation".to_string(),
            created_at: now,
            last_accessed: now,
            importance: importance.clamp(0.0, 1.0),
            access_count: 0,
            tier: Tier::L0,
            outcome: Outcome::None,
            deleted: false,
            deleted_at: None,
            scale: Scale::Micro,
            user_id: user_id.into(),
            embedding: None,
            extra: HashMap::new(),
        })
    }

    /// Records an access: bumps `access_count` and `last_accessed`. Never
    /// increases `importance` (invariant 2 — decay only decreases it; an
    /// explicit promotion path may raise it separately).
    pub fn touch(&mut self) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = Utc::now();
    }

    #[must_use]
    pub fn content_hash(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.content.hash(&mut hasher);
        hasher.finish()
    }
}

/// A referent (person, project, concept) extracted from episodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub entity_type: String,
    pub importance: f32,
    pub access_count: u64,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub user_id: String,
}

impl Entity {
    #[must_use]
    pub fn new(user_id: impl Into<String>, name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            entity_type: entity_type.into(),
            importance: 0.5,
            access_count: 0,
            embedding: None,
            created_at: now,
            last_accessed: now,
            deleted: false,
            deleted_at: None,
            user_id: user_id.into(),
        }
    }
}

/// A recipe for a class of tasks, derived by the reasoning bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub description: String,
    pub task_types: Vec<String>,
    pub success_count: u64,
    pub failure_count: u64,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub user_id: String,
    pub anti_pattern: bool,
    pub deleted: bool,
}

impl Strategy {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        description: impl Into<String>,
        task_type: impl Into<String>,
        confidence: f32,
        anti_pattern: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            task_types: vec![task_type.into()],
            success_count: 0,
            failure_count: 0,
            confidence: confidence.clamp(0.0, 1.0),
            created_at: Utc::now(),
            last_used_at: None,
            user_id: user_id.into(),
            anti_pattern,
            deleted: false,
        }
    }
}

/// A record of one attempt at a task, immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub id: String,
    pub task_description: String,
    pub task_type: String,
    pub context: HashMap<String, Primitive>,
    pub action: String,
    pub outcome: Outcome,
    pub reasoning: String,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub episode_id: Option<String>,
    pub strategy_id: Option<String>,
    pub user_id: String,
}

/// A ranked recall hit, the single stable result record crossed by every
/// tier and search arm (§9 Design Notes: "soft structural typing ... must be
/// enforced into one stable result record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallResult {
    pub episode_id: String,
    pub content: String,
    pub score: f32,
    pub source: Tier,
    pub created_at: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Aggregate counters returned by [`crate::memory::FractalMemory::consolidate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationCounters {
    pub promoted: u64,
    pub decayed: u64,
    pub forgotten: u64,
}

/// Aggregate counters returned by [`crate::memory::FractalMemory::garbage_collect`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcCounters {
    pub soft_deleted: u64,
    pub hard_deleted: u64,
}

/// Per-tier counters plus the last consolidation timestamp, for `get_stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub l0_size: u64,
    pub l1_size: u64,
    pub l2_size: u64,
    pub l3_size: u64,
    pub last_consolidation_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn episode_new_clamps_importance() {
        let e = Episode::new("u1", "hello", 5.0).unwrap();
        assert_eq!(e.importance, 1.0);
        let e = Episode::new("u1", "hello", -5.0).unwrap();
        assert_eq!(e.importance, 0.0);
    }

    #[test]
    fn episode_new_rejects_empty_content() {
        assert!(Episode::new("u1", "", 0.5).is_err());
    }

    #[test]
    fn touch_never_decreases_access_count() {
        let mut e = Episode::new("u1", "hi", 0.5).unwrap();
        assert_eq!(e.access_count, 0);
        e.touch();
        e.touch();
        assert_eq!(e.access_count, 2);
    }

    #[test]
    fn identical_content_has_identical_hash() {
        let a = Episode::new("u1", "same text", 0.5).unwrap();
        let b = Episode::new("u1", "same text", 0.9).unwrap();
        assert_eq!(a.content_hash(), b.content_hash());
    }
}
