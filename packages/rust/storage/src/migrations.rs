//! SQL migration definitions for the dragnet database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: posts, post_status_log, keywords",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Harvested posts. source_id and permalink are the two dedup keys;
-- either may be NULL but each is unique when present.
CREATE TABLE IF NOT EXISTS posts (
    id            TEXT PRIMARY KEY,
    source_id     TEXT UNIQUE,
    permalink     TEXT UNIQUE,
    channel       TEXT NOT NULL,
    title         TEXT NOT NULL,
    body          TEXT NOT NULL DEFAULT '',
    author        TEXT NOT NULL,
    upvotes       INTEGER NOT NULL DEFAULT 0,
    comment_count INTEGER NOT NULL DEFAULT 0,
    status        TEXT NOT NULL DEFAULT 'intake'
                  CHECK (status IN ('intake', 'pending', 'assigned', 'resolved', 'archived')),
    assigned_to   TEXT,
    posted_at     TEXT NOT NULL,
    fetched_at    TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_posts_status ON posts(status);
CREATE INDEX IF NOT EXISTS idx_posts_fetched_at ON posts(fetched_at);

-- Append-only audit trail, one row per successful transition
CREATE TABLE IF NOT EXISTS post_status_log (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    post_id    TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    old_status TEXT NOT NULL,
    new_status TEXT NOT NULL,
    actor      TEXT NOT NULL,
    reason     TEXT NOT NULL,
    changed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_status_log_post ON post_status_log(post_id);

-- Relevance keywords, two AND-combined classes per tenant
CREATE TABLE IF NOT EXISTS keywords (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    word       TEXT NOT NULL,
    class      TEXT NOT NULL CHECK (class IN ('primary', 'secondary')),
    tenant     TEXT NOT NULL DEFAULT 'default',
    enabled    INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(word, class, tenant)
);

CREATE INDEX IF NOT EXISTS idx_keywords_tenant ON keywords(tenant, class);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
