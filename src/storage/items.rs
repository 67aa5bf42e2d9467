use chrono::SecondsFormat;
use std::collections::HashMap;

use super::schema::Database;
use super::types::{DatabaseError, Item, ItemRow, Tag};
use crate::feed::Entry;

impl Database {
    // ========================================================================
    // Item Persistence
    // ========================================================================

    /// Persist new entries for a subscription, one transaction per entry.
    ///
    /// An entry that fails to store (item insert, tag upsert, or link) is
    /// rolled back and logged; the remaining entries are still attempted.
    /// Returns the items that were committed, in entry order.
    pub async fn persist_entries(&self, subscription_id: i64, entries: &[Entry]) -> Vec<Item> {
        let mut persisted = Vec::with_capacity(entries.len());

        for entry in entries {
            match self.insert_item(subscription_id, entry).await {
                Ok(item) => persisted.push(item),
                Err(e) => {
                    tracing::warn!(
                        subscription_id = subscription_id,
                        title = entry.title.as_deref().unwrap_or_default(),
                        error = %e,
                        "Failed to persist item, skipping"
                    );
                }
            }
        }

        persisted
    }

    /// Insert one entry as an item and link its tags, atomically.
    ///
    /// Tags are created with a single `INSERT ... ON CONFLICT(name)` upsert
    /// that returns the row id either way, so two writers creating the same
    /// new tag cannot produce duplicates or a lookup miss.
    pub async fn insert_item(
        &self,
        subscription_id: i64,
        entry: &Entry,
    ) -> Result<Item, DatabaseError> {
        let published = entry
            .published_at
            .map(|p| p.to_rfc3339_opts(SecondsFormat::Millis, true));

        let mut tx = self.pool.begin().await?;

        let (item_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO items (subscription_id, title, url, published, content)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(subscription_id)
        .bind(&entry.title)
        .bind(&entry.link)
        .bind(&published)
        .bind(&entry.summary)
        .fetch_one(&mut *tx)
        .await?;

        let mut tags: Vec<String> = Vec::with_capacity(entry.tags.len());
        for name in &entry.tags {
            if tags.contains(name) {
                continue;
            }

            // DO UPDATE (not DO NOTHING) so RETURNING yields the existing row
            let (tag_id,): (i64,) = sqlx::query_as(
                r#"
                INSERT INTO tags (name) VALUES (?)
                ON CONFLICT(name) DO UPDATE SET name = excluded.name
                RETURNING id
            "#,
            )
            .bind(name)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query("INSERT OR IGNORE INTO item_tags (item_id, tag_id) VALUES (?, ?)")
                .bind(item_id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;

            tags.push(name.clone());
        }

        tx.commit().await?;

        Ok(Item {
            id: item_id,
            subscription_id,
            title: entry.title.clone(),
            url: entry.link.clone(),
            published: entry.published_at,
            content: entry.summary.clone(),
            tags,
        })
    }

    // ========================================================================
    // Item and Tag Queries
    // ========================================================================

    /// All items stored for a subscription, oldest first, with their tags.
    pub async fn get_items_for_subscription(
        &self,
        subscription_id: i64,
    ) -> Result<Vec<Item>, DatabaseError> {
        let rows = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, subscription_id, title, url, published, content
            FROM items
            WHERE subscription_id = ?
            ORDER BY id
        "#,
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await?;

        let links: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT it.item_id, t.name
            FROM item_tags it
            JOIN tags t ON t.id = it.tag_id
            JOIN items i ON i.id = it.item_id
            WHERE i.subscription_id = ?
            ORDER BY it.rowid
        "#,
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await?;

        let mut tags_by_item: HashMap<i64, Vec<String>> = HashMap::new();
        for (item_id, name) in links {
            tags_by_item.entry(item_id).or_default().push(name);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let tags = tags_by_item.remove(&row.id).unwrap_or_default();
                row.into_item(tags)
            })
            .collect())
    }

    pub async fn get_tags(&self) -> Result<Vec<Tag>, DatabaseError> {
        let tags = sqlx::query_as::<_, Tag>("SELECT id, name FROM tags ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(tags)
    }

    /// Exact-match tag lookup.
    pub async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>, DatabaseError> {
        let tag = sqlx::query_as::<_, Tag>("SELECT id, name FROM tags WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tag)
    }

    pub async fn get_item_ids_for_tag(&self, tag_id: i64) -> Result<Vec<i64>, DatabaseError> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT item_id FROM item_tags WHERE tag_id = ? ORDER BY item_id")
                .bind(tag_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::feed::Entry;
    use crate::storage::Database;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    async fn test_db() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let sub_id = db
            .insert_subscription("https://example.com/feed", "https://hooks.example.com/x")
            .await
            .unwrap();
        (db, sub_id)
    }

    fn test_entry(title: &str, tags: &[&str]) -> Entry {
        Entry {
            title: Some(title.to_string()),
            link: Some(format!("https://example.com/{}", title.to_lowercase().replace(' ', "-"))),
            published_at: Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            summary: Some(format!("Summary of {title}")),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_persist_entries_returns_items_in_order() {
        let (db, sub_id) = test_db().await;
        let entries = vec![test_entry("First", &[]), test_entry("Second", &["rust"])];

        let items = db.persist_entries(sub_id, &entries).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title.as_deref(), Some("First"));
        assert_eq!(items[1].title.as_deref(), Some("Second"));
        assert_eq!(items[1].tags, vec!["rust"]);
        assert!(items[0].id < items[1].id);

        let stored = db.get_items_for_subscription(sub_id).await.unwrap();
        assert_eq!(stored, items);
    }

    #[tokio::test]
    async fn test_shared_tag_created_once() {
        let (db, sub_id) = test_db().await;
        let entries = vec![
            test_entry("Generics", &["golang"]),
            test_entry("Channels", &["golang", "concurrency"]),
        ];

        let items = db.persist_entries(sub_id, &entries).await;
        assert_eq!(items.len(), 2);

        let golang: Vec<_> = db
            .get_tags()
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.name == "golang")
            .collect();
        assert_eq!(golang.len(), 1);

        let linked = db.get_item_ids_for_tag(golang[0].id).await.unwrap();
        assert_eq!(linked, vec![items[0].id, items[1].id]);
    }

    #[tokio::test]
    async fn test_tag_reused_across_calls_and_subscriptions() {
        let (db, sub_id) = test_db().await;
        let other = db
            .insert_subscription("https://other.example/feed", "https://hooks.example.com/y")
            .await
            .unwrap();

        db.persist_entries(sub_id, &[test_entry("One", &["golang"])]).await;
        let before = db.find_tag_by_name("golang").await.unwrap().unwrap();
        db.persist_entries(other, &[test_entry("Two", &["golang"])]).await;
        let after = db.find_tag_by_name("golang").await.unwrap().unwrap();

        assert_eq!(before, after);
        assert_eq!(db.get_tags().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_tags_in_one_entry_link_once() {
        let (db, sub_id) = test_db().await;
        let items = db
            .persist_entries(sub_id, &[test_entry("Dupes", &["rust", "async", "rust"])])
            .await;

        assert_eq!(items[0].tags, vec!["rust", "async"]);
        let stored = db.get_items_for_subscription(sub_id).await.unwrap();
        assert_eq!(stored[0].tags, vec!["rust", "async"]);
    }

    #[tokio::test]
    async fn test_tag_lookup_is_exact_match() {
        let (db, sub_id) = test_db().await;
        db.persist_entries(sub_id, &[test_entry("Case", &["Go", "go"])]).await;

        assert_eq!(db.get_tags().await.unwrap().len(), 2);
        assert!(db.find_tag_by_name("GO").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entry_with_absent_fields_persists() {
        let (db, sub_id) = test_db().await;
        let items = db.persist_entries(sub_id, &[Entry::default()]).await;
        assert_eq!(items.len(), 1);

        let stored = db.get_items_for_subscription(sub_id).await.unwrap();
        assert_eq!(stored[0].title, None);
        assert_eq!(stored[0].url, None);
        assert_eq!(stored[0].published, None);
        assert!(stored[0].tags.is_empty());
    }

    #[tokio::test]
    async fn test_failed_item_does_not_affect_siblings() {
        let (db, sub_id) = test_db().await;
        sqlx::query(
            r#"
            CREATE TRIGGER reject_poison BEFORE INSERT ON items
            WHEN NEW.title = 'Poison'
            BEGIN
                SELECT RAISE(ABORT, 'rejected');
            END
        "#,
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let entries = vec![
            test_entry("Before", &["shared"]),
            test_entry("Poison", &["poison-only"]),
            test_entry("After", &["shared"]),
        ];
        let items = db.persist_entries(sub_id, &entries).await;

        let titles: Vec<_> = items.iter().filter_map(|i| i.title.as_deref()).collect();
        assert_eq!(titles, vec!["Before", "After"]);

        let stored = db.get_items_for_subscription(sub_id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(db.find_tag_by_name("poison-only").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failure_after_tag_upsert_rolls_back_tag() {
        let (db, sub_id) = test_db().await;
        sqlx::query(
            r#"
            CREATE TRIGGER reject_link BEFORE INSERT ON item_tags
            WHEN (SELECT name FROM tags WHERE id = NEW.tag_id) = 'forbidden'
            BEGIN
                SELECT RAISE(ABORT, 'rejected');
            END
        "#,
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let items = db
            .persist_entries(sub_id, &[test_entry("Tagged", &["fine", "forbidden"])])
            .await;
        assert!(items.is_empty());

        assert!(db.get_items_for_subscription(sub_id).await.unwrap().is_empty());
        assert!(db.get_tags().await.unwrap().is_empty());
    }
}
