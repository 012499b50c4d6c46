//! Notification records written by failure accounting.

use anyhow::Result;
use sqlx::Row;

use super::db::JobStore;
use super::types::{Notification, StoredNotification};

impl JobStore {
    pub async fn insert_notification(&self, n: &Notification) -> Result<i64> {
        let id = sqlx::query(
            r#"
            INSERT INTO notifications (title, content, key, type, date, read)
            VALUES (?1, ?2, ?3, ?4, ?5, 0)
            "#,
        )
        .bind(&n.title)
        .bind(&n.content)
        .bind(&n.key)
        .bind(&n.kind)
        .bind(n.date)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    /// Most recent notifications first, up to `limit`.
    pub async fn list_notifications(&self, limit: u32) -> Result<Vec<StoredNotification>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, content, key, type, date, read
            FROM notifications
            ORDER BY date DESC, id DESC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| StoredNotification {
                id: row.get("id"),
                notification: Notification {
                    title: row.get("title"),
                    content: row.get("content"),
                    key: row.get("key"),
                    kind: row.get("type"),
                    date: row.get("date"),
                },
                read: row.get("read"),
            })
            .collect())
    }
}
