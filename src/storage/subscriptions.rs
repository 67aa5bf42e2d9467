use super::schema::Database;
use super::types::{DatabaseError, Subscription, SubscriptionRow};

impl Database {
    // ========================================================================
    // Subscription Operations
    // ========================================================================

    /// Register a new subscription, active and without a cutoff.
    pub async fn insert_subscription(
        &self,
        url: &str,
        callback_url: &str,
    ) -> Result<i64, DatabaseError> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO subscriptions (url, callback_url) VALUES (?, ?) RETURNING id",
        )
        .bind(url)
        .bind(callback_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// All subscriptions with `is_active = 1`, in id order.
    pub async fn list_active_subscriptions(&self) -> Result<Vec<Subscription>, DatabaseError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, url, callback_url, is_active, feed_updated_at
            FROM subscriptions
            WHERE is_active = 1
            ORDER BY id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SubscriptionRow::into_subscription).collect())
    }

    pub async fn get_subscription(&self, id: i64) -> Result<Option<Subscription>, DatabaseError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, url, callback_url, is_active, feed_updated_at
            FROM subscriptions
            WHERE id = ?
        "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SubscriptionRow::into_subscription))
    }

    /// Activate or deactivate a subscription. Returns whether a row changed.
    pub async fn set_subscription_active(
        &self,
        id: i64,
        active: bool,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE subscriptions SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store a new cutoff for a subscription.
    ///
    /// Callers decide whether the value is an advance (see
    /// [`crate::feed::next_cutoff`]); this only writes it.
    pub async fn advance_feed_updated_at(
        &self,
        id: i64,
        feed_updated_at: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE subscriptions SET feed_updated_at = ? WHERE id = ?")
            .bind(feed_updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
