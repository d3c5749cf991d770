//! Durable schema for the Graph Store: episodes (L2/L3), entities, the
//! episode-entity mention relation used by bounded-hop graph traversal, and
//! an FTS5 shadow index for keyword search.

pub(crate) const CREATE_EPISODES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS episodes (
    id              TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL,
    content         TEXT NOT NULL,
    summary         TEXT,
    source          TEXT NOT NULL,
    tier            TEXT NOT NULL,
    scale           TEXT NOT NULL,
    outcome         TEXT NOT NULL,
    importance      REAL NOT NULL,
    access_count    INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    last_accessed   TEXT NOT NULL,
    deleted         INTEGER NOT NULL DEFAULT 0,
    deleted_at      TEXT,
    content_hash    INTEGER NOT NULL,
    extra           TEXT NOT NULL DEFAULT '{}'
)";

pub(crate) const CREATE_EPISODES_USER_TIER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_episodes_user_tier ON episodes(user_id, tier, deleted)";

pub(crate) const CREATE_EPISODES_USER_HASH_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_episodes_user_hash ON episodes(user_id, content_hash)";

pub(crate) const CREATE_EPISODES_USER_DELETED_AT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_episodes_user_deleted_at ON episodes(user_id, deleted_at)";

pub(crate) const CREATE_EMBEDDINGS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS embeddings (
    episode_id  TEXT PRIMARY KEY REFERENCES episodes(id),
    user_id     TEXT NOT NULL,
    vector_json TEXT NOT NULL
)";

pub(crate) const CREATE_EMBEDDINGS_USER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_embeddings_user ON embeddings(user_id)";

pub(crate) const CREATE_ENTITIES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS entities (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    name        TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    deleted     INTEGER NOT NULL DEFAULT 0,
    deleted_at  TEXT,
    extra       TEXT NOT NULL DEFAULT '{}'
)";

pub(crate) const CREATE_ENTITIES_USER_NAME_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_entities_user_name ON entities(user_id, name)";

pub(crate) const CREATE_MENTIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS mentions (
    episode_id TEXT NOT NULL REFERENCES episodes(id),
    entity_id  TEXT NOT NULL REFERENCES entities(id),
    PRIMARY KEY (episode_id, entity_id)
)";

pub(crate) const CREATE_MENTIONS_ENTITY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_mentions_entity ON mentions(entity_id)";

pub(crate) const CREATE_MENTIONS_EPISODE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_mentions_episode ON mentions(episode_id)";

/// Tracks applied schema versions (§6.5 `migrate`): one row per version, as
/// `Migration{version, applied_at, name}`.
pub(crate) const CREATE_MIGRATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version     INTEGER PRIMARY KEY,
    name        TEXT NOT NULL,
    applied_at  TEXT NOT NULL
)";

pub(crate) const ALL_SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_EPISODES_TABLE,
    CREATE_EPISODES_USER_TIER_INDEX,
    CREATE_EPISODES_USER_HASH_INDEX,
    CREATE_EPISODES_USER_DELETED_AT_INDEX,
    CREATE_EMBEDDINGS_TABLE,
    CREATE_EMBEDDINGS_USER_INDEX,
    CREATE_ENTITIES_TABLE,
    CREATE_ENTITIES_USER_NAME_INDEX,
    CREATE_MENTIONS_TABLE,
    CREATE_MENTIONS_ENTITY_INDEX,
    CREATE_MIGRATIONS_TABLE,
    CREATE_MENTIONS_EPISODE_INDEX,
];
