use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::DatabaseError;

// ============================================================================
// Database
// ============================================================================

#[cfg(unix)]
fn restrict_permissions(db_path: &std::path::Path) {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    if db_path.exists() {
        let perms = std::fs::Permissions::from_mode(0o600);
        if let Err(e) = std::fs::set_permissions(db_path, perms) {
            tracing::warn!(path = %db_path.display(), error = %e, "Failed to restrict database file permissions");
        }
    } else if db_path
        .parent()
        .map_or(true, |p| p.as_os_str().is_empty() || p.exists())
    {
        // mode() applies at creation, so there is no window with umask defaults.
        // A failure here surfaces from connect_with instead.
        let _ = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(db_path);
    }
}

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations.
    ///
    /// `path` may be `:memory:` for a throwaway database.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // Callback URLs carry webhook tokens: create the file owner-only
        // before the pool touches it.
        #[cfg(unix)]
        if path != ":memory:" {
            restrict_permissions(std::path::Path::new(path));
        }

        // busy_timeout=5000: wait up to 5 seconds for a lock before SQLITE_BUSY.
        // Set through the connect options so every pooled connection inherits it.
        let options = SqliteConnectOptions::from_str(&url)?
            .foreign_keys(true)
            .pragma("busy_timeout", "5000");
        // Subscriptions are synced one at a time, so a small pool is plenty.
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate()
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        tracing::debug!(path = %path, "Database opened");
        Ok(db)
    }

    /// Run schema migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id INTEGER PRIMARY KEY,
                url TEXT NOT NULL,
                callback_url TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                feed_updated_at TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY,
                subscription_id INTEGER NOT NULL REFERENCES subscriptions(id) ON DELETE CASCADE,
                title TEXT,
                url TEXT,
                published TEXT,
                content TEXT
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // name is the dedup key for tag upserts
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS item_tags (
                item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (item_id, tag_id)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_subscriptions_active ON subscriptions(is_active)",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_subscription ON items(subscription_id)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_item_tags_tag ON item_tags(tag_id)")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}
