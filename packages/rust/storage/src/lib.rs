//! libSQL storage layer for dragnet.
//!
//! The [`Store`] struct wraps a libSQL database holding harvested posts, the
//! append-only status-change log, and the keyword lists. It is the bounded
//! store of the system: [`Store::cleanup_old_posts`] evicts the oldest rows
//! by fetch time once the configured capacity is exceeded.
//!
//! **Atomicity rule:** a lifecycle transition and its audit record commit as
//! one transaction ([`Store::record_transition`]). The UPDATE is guarded on
//! the expected old status, so a concurrent transition loses cleanly instead
//! of writing a partial result.

mod migrations;

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use dragnet_shared::{
    DragnetError, Keyword, KeywordClass, KeywordsConfig, KnownKeys, Post, PostId, PostStatus,
    Result, StatusChange,
};
use libsql::{Connection, Database, params};

/// Result of a create attempt. Duplicate detection is a normal branch,
/// not an error: the unique indexes on `source_id` and `permalink` turn a
/// race-induced duplicate into `AlreadyExists`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new row was written.
    Created,
    /// A row with the same source_id or permalink already exists.
    AlreadyExists,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Store {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Store {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DragnetError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DragnetError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| DragnetError::Storage(e.to_string()))?;

        let store = Self { db, conn };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    DragnetError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Post operations
    // -----------------------------------------------------------------------

    /// Insert a new post. Empty-string dedup keys are stored as NULL so the
    /// unique indexes only apply to usable keys.
    pub async fn create_post(&self, post: &Post) -> Result<CreateOutcome> {
        let affected = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO posts
                   (id, source_id, permalink, channel, title, body, author,
                    upvotes, comment_count, status, assigned_to,
                    posted_at, fetched_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    post.id.to_string(),
                    post.source_key(),
                    post.permalink_key(),
                    post.channel.as_str(),
                    post.title.as_str(),
                    post.body.as_str(),
                    post.author.as_str(),
                    post.upvotes,
                    post.comment_count,
                    post.status.as_str(),
                    post.assigned_to.as_deref(),
                    post.posted_at.to_rfc3339(),
                    post.fetched_at.to_rfc3339(),
                    post.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DragnetError::Storage(e.to_string()))?;

        if affected == 0 {
            Ok(CreateOutcome::AlreadyExists)
        } else {
            Ok(CreateOutcome::Created)
        }
    }

    /// Get a post by ID.
    pub async fn get_post(&self, id: PostId) -> Result<Option<Post>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DragnetError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_post(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DragnetError::Storage(e.to_string())),
        }
    }

    /// List posts, newest fetch first, optionally restricted to one status.
    pub async fn list_posts(&self, status: Option<PostStatus>, limit: u32) -> Result<Vec<Post>> {
        let mut rows = match status {
            Some(status) => self
                .conn
                .query(
                    &format!(
                        "SELECT {POST_COLUMNS} FROM posts WHERE status = ?1
                         ORDER BY fetched_at DESC LIMIT ?2"
                    ),
                    params![status.as_str(), limit as i64],
                )
                .await,
            None => self
                .conn
                .query(
                    &format!(
                        "SELECT {POST_COLUMNS} FROM posts
                         ORDER BY fetched_at DESC LIMIT ?1"
                    ),
                    params![limit as i64],
                )
                .await,
        }
        .map_err(|e| DragnetError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_post(&row)?);
        }
        Ok(results)
    }

    /// Snapshot both dedup key sets. NULL and empty keys are skipped.
    pub async fn existing_keys(&self) -> Result<KnownKeys> {
        let mut rows = self
            .conn
            .query("SELECT source_id, permalink FROM posts", params![])
            .await
            .map_err(|e| DragnetError::Storage(e.to_string()))?;

        let mut keys = KnownKeys::default();
        while let Ok(Some(row)) = rows.next().await {
            if let Ok(source_id) = row.get::<String>(0) {
                if !source_id.is_empty() {
                    keys.source_ids.insert(source_id);
                }
            }
            if let Ok(permalink) = row.get::<String>(1) {
                if !permalink.is_empty() {
                    keys.permalinks.insert(permalink);
                }
            }
        }
        Ok(keys)
    }

    /// Total number of stored posts.
    pub async fn count_posts(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM posts", params![])
            .await
            .map_err(|e| DragnetError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DragnetError::Storage(e.to_string()))?;
                Ok(count as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DragnetError::Storage(e.to_string())),
        }
    }

    /// The `n` oldest posts by fetch time, ascending.
    pub async fn oldest_posts(&self, n: u64) -> Result<Vec<Post>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {POST_COLUMNS} FROM posts
                     ORDER BY fetched_at ASC LIMIT ?1"
                ),
                params![n as i64],
            )
            .await
            .map_err(|e| DragnetError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_post(&row)?);
        }
        Ok(results)
    }

    /// Delete a post by ID. Returns whether a row was removed.
    pub async fn delete_post(&self, id: PostId) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM posts WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(|e| DragnetError::Storage(e.to_string()))?;
        Ok(affected > 0)
    }

    /// Evict the oldest posts down to `max_posts`. No-op below the ceiling.
    ///
    /// Eviction is status-agnostic: ordering is by `fetched_at` alone.
    /// Deletions proceed per post; a failed deletion is logged and skipped,
    /// so the returned count may be less than the excess.
    pub async fn cleanup_old_posts(&self, max_posts: u64) -> Result<u64> {
        let total = self.count_posts().await?;
        if total <= max_posts {
            return Ok(0);
        }

        let excess = total - max_posts;
        let victims = self.oldest_posts(excess).await?;

        let mut deleted = 0u64;
        for post in victims {
            match self.delete_post(post.id).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(post_id = %post.id, error = %e, "failed to evict post, skipping");
                }
            }
        }

        tracing::info!(deleted, excess, max_posts, "evicted oldest posts over capacity");
        Ok(deleted)
    }

    /// Posts per status, for observability.
    pub async fn status_counts(&self) -> Result<Vec<(PostStatus, u64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT status, COUNT(*) FROM posts GROUP BY status ORDER BY status",
                params![],
            )
            .await
            .map_err(|e| DragnetError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let status: String = row
                .get(0)
                .map_err(|e| DragnetError::Storage(e.to_string()))?;
            let count: i64 = row
                .get(1)
                .map_err(|e| DragnetError::Storage(e.to_string()))?;
            results.push((PostStatus::from_str(&status)?, count as u64));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Lifecycle operations
    // -----------------------------------------------------------------------

    /// Apply a validated status transition and append its audit record in
    /// one transaction.
    ///
    /// The UPDATE is guarded on `old_status`; if a concurrent actor already
    /// moved the post, nothing is written and `false` is returned. The
    /// `assigned_to` value is written as given (the caller decides whether
    /// the transition sets, clears, or keeps the assignee).
    pub async fn record_transition(
        &self,
        post_id: PostId,
        old_status: PostStatus,
        new_status: PostStatus,
        assigned_to: Option<&str>,
        actor: &str,
        reason: &str,
    ) -> Result<bool> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| DragnetError::Storage(e.to_string()))?;

        let affected = tx
            .execute(
                "UPDATE posts SET status = ?1, assigned_to = ?2
                 WHERE id = ?3 AND status = ?4",
                params![
                    new_status.as_str(),
                    assigned_to,
                    post_id.to_string(),
                    old_status.as_str(),
                ],
            )
            .await
            .map_err(|e| DragnetError::Storage(e.to_string()))?;

        if affected == 0 {
            // Lost a race, or no such post. Nothing was changed.
            tx.rollback()
                .await
                .map_err(|e| DragnetError::Storage(e.to_string()))?;
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO post_status_log (post_id, old_status, new_status, actor, reason, changed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                post_id.to_string(),
                old_status.as_str(),
                new_status.as_str(),
                actor,
                reason,
                Utc::now().to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| DragnetError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| DragnetError::Storage(e.to_string()))?;
        Ok(true)
    }

    /// Full audit trail for one post, oldest first.
    pub async fn status_log_for(&self, post_id: PostId) -> Result<Vec<StatusChange>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, post_id, old_status, new_status, actor, reason, changed_at
                 FROM post_status_log WHERE post_id = ?1 ORDER BY id",
                params![post_id.to_string()],
            )
            .await
            .map_err(|e| DragnetError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_status_change(&row)?);
        }
        Ok(results)
    }

    /// Pending posts fetched before `cutoff` (expire-sweep candidates).
    pub async fn pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Post>> {
        self.posts_older_than(PostStatus::Pending, cutoff).await
    }

    /// Assigned posts fetched before `cutoff` (unassign-sweep candidates).
    /// Fetch time stands in for assignment time.
    pub async fn assigned_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Post>> {
        self.posts_older_than(PostStatus::Assigned, cutoff).await
    }

    async fn posts_older_than(
        &self,
        status: PostStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Post>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {POST_COLUMNS} FROM posts
                     WHERE status = ?1 AND fetched_at < ?2
                     ORDER BY fetched_at ASC"
                ),
                params![status.as_str(), cutoff.to_rfc3339()],
            )
            .await
            .map_err(|e| DragnetError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_post(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Keyword operations
    // -----------------------------------------------------------------------

    /// Insert seed keywords from config, skipping terms already present.
    /// Returns the number of newly added keywords.
    pub async fn seed_keywords(&self, config: &KeywordsConfig) -> Result<u64> {
        let mut added = 0u64;
        for (class, words) in [
            (KeywordClass::Primary, &config.primary),
            (KeywordClass::Secondary, &config.secondary),
        ] {
            for word in words {
                if self.add_keyword(word, class, &config.tenant).await? {
                    added += 1;
                }
            }
        }
        tracing::info!(added, tenant = %config.tenant, "seeded keywords from config");
        Ok(added)
    }

    /// Add one keyword, case-normalized. Returns false when it already exists
    /// or the term is empty after trimming.
    pub async fn add_keyword(
        &self,
        word: &str,
        class: KeywordClass,
        tenant: &str,
    ) -> Result<bool> {
        let normalized = word.trim().to_lowercase();
        if normalized.is_empty() {
            return Ok(false);
        }

        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO keywords (word, class, tenant, enabled, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5)",
                params![
                    normalized.as_str(),
                    class.as_str(),
                    tenant,
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| DragnetError::Storage(e.to_string()))?;
        Ok(affected > 0)
    }

    /// All keywords for a tenant, enabled or not.
    pub async fn list_keywords(&self, tenant: &str) -> Result<Vec<Keyword>> {
        let mut rows = self
            .conn
            .query(
                "SELECT word, class, tenant, enabled, created_at, updated_at
                 FROM keywords WHERE tenant = ?1 ORDER BY class, word",
                params![tenant],
            )
            .await
            .map_err(|e| DragnetError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_keyword(&row)?);
        }
        Ok(results)
    }

    /// Enabled terms for a tenant, split by class. What the matcher loads.
    pub async fn enabled_keywords(&self, tenant: &str) -> Result<(Vec<String>, Vec<String>)> {
        let mut rows = self
            .conn
            .query(
                "SELECT word, class FROM keywords
                 WHERE tenant = ?1 AND enabled = 1 ORDER BY word",
                params![tenant],
            )
            .await
            .map_err(|e| DragnetError::Storage(e.to_string()))?;

        let mut primary = Vec::new();
        let mut secondary = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let word: String = row
                .get(0)
                .map_err(|e| DragnetError::Storage(e.to_string()))?;
            let class: String = row
                .get(1)
                .map_err(|e| DragnetError::Storage(e.to_string()))?;
            match KeywordClass::from_str(&class)? {
                KeywordClass::Primary => primary.push(word),
                KeywordClass::Secondary => secondary.push(word),
            }
        }
        Ok((primary, secondary))
    }

    /// Enabled keyword counts `(primary, secondary)` for a tenant.
    pub async fn keyword_counts(&self, tenant: &str) -> Result<(u64, u64)> {
        let (primary, secondary) = self.enabled_keywords(tenant).await?;
        Ok((primary.len() as u64, secondary.len() as u64))
    }
}

/// Column list shared by every post SELECT, in [`row_to_post`] order.
const POST_COLUMNS: &str = "id, source_id, permalink, channel, title, body, author, \
                            upvotes, comment_count, status, assigned_to, \
                            posted_at, fetched_at, created_at";

/// Convert a database row to a [`Post`].
fn row_to_post(row: &libsql::Row) -> Result<Post> {
    Ok(Post {
        id: {
            let s: String = row
                .get(0)
                .map_err(|e| DragnetError::Storage(e.to_string()))?;
            PostId::from_str(&s).map_err(|e| DragnetError::Storage(format!("invalid id: {e}")))?
        },
        source_id: row.get::<String>(1).ok(),
        permalink: row.get::<String>(2).ok(),
        channel: row
            .get::<String>(3)
            .map_err(|e| DragnetError::Storage(e.to_string()))?,
        title: row
            .get::<String>(4)
            .map_err(|e| DragnetError::Storage(e.to_string()))?,
        body: row
            .get::<String>(5)
            .map_err(|e| DragnetError::Storage(e.to_string()))?,
        author: row
            .get::<String>(6)
            .map_err(|e| DragnetError::Storage(e.to_string()))?,
        upvotes: row
            .get::<i64>(7)
            .map_err(|e| DragnetError::Storage(e.to_string()))?,
        comment_count: row
            .get::<i64>(8)
            .map_err(|e| DragnetError::Storage(e.to_string()))?,
        status: {
            let s: String = row
                .get(9)
                .map_err(|e| DragnetError::Storage(e.to_string()))?;
            PostStatus::from_str(&s)?
        },
        assigned_to: row.get::<String>(10).ok(),
        posted_at: parse_timestamp(row, 11)?,
        fetched_at: parse_timestamp(row, 12)?,
        created_at: parse_timestamp(row, 13)?,
    })
}

/// Convert a database row to a [`StatusChange`].
fn row_to_status_change(row: &libsql::Row) -> Result<StatusChange> {
    Ok(StatusChange {
        id: row
            .get::<i64>(0)
            .map_err(|e| DragnetError::Storage(e.to_string()))?,
        post_id: {
            let s: String = row
                .get(1)
                .map_err(|e| DragnetError::Storage(e.to_string()))?;
            PostId::from_str(&s)
                .map_err(|e| DragnetError::Storage(format!("invalid post id: {e}")))?
        },
        old_status: {
            let s: String = row
                .get(2)
                .map_err(|e| DragnetError::Storage(e.to_string()))?;
            PostStatus::from_str(&s)?
        },
        new_status: {
            let s: String = row
                .get(3)
                .map_err(|e| DragnetError::Storage(e.to_string()))?;
            PostStatus::from_str(&s)?
        },
        actor: row
            .get::<String>(4)
            .map_err(|e| DragnetError::Storage(e.to_string()))?,
        reason: row
            .get::<String>(5)
            .map_err(|e| DragnetError::Storage(e.to_string()))?,
        changed_at: parse_timestamp(row, 6)?,
    })
}

/// Convert a database row to a [`Keyword`].
fn row_to_keyword(row: &libsql::Row) -> Result<Keyword> {
    Ok(Keyword {
        word: row
            .get::<String>(0)
            .map_err(|e| DragnetError::Storage(e.to_string()))?,
        class: {
            let s: String = row
                .get(1)
                .map_err(|e| DragnetError::Storage(e.to_string()))?;
            KeywordClass::from_str(&s)?
        },
        tenant: row
            .get::<String>(2)
            .map_err(|e| DragnetError::Storage(e.to_string()))?,
        enabled: row
            .get::<i64>(3)
            .map_err(|e| DragnetError::Storage(e.to_string()))?
            != 0,
        created_at: parse_timestamp(row, 4)?,
        updated_at: parse_timestamp(row, 5)?,
    })
}

fn parse_timestamp(row: &libsql::Row, idx: i32) -> Result<DateTime<Utc>> {
    let s: String = row
        .get(idx)
        .map_err(|e| DragnetError::Storage(e.to_string()))?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DragnetError::Storage(format!("invalid date: {e}")))
}
