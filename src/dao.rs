use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::AnyPool;

use crate::types::{Bookmark, BookmarkOrder};

// Nullable columns come back through COALESCE; the Any driver can't decode NULL into Option<String>.
type BookmarkRow = (String, String, String, String);

const BOOKMARK_COLUMNS: &str = "id, title, COALESCE(cover_url, ''), added_at";

fn bookmark_from_row((id, title, cover_url, added_at): BookmarkRow) -> Bookmark {
    Bookmark { id, title, cover_url: non_empty(cover_url), added_at }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRow {
    pub chapter_id: String,
    pub manga_id: Option<String>,
    pub page_index: i64,
    pub total_pages: Option<i64>,
    pub updated_at: i64,
}

pub async fn insert_bookmark(pool: &AnyPool, b: &Bookmark) -> Result<bool> {
    let res = sqlx::query(
        "INSERT INTO bookmarks(id, title, cover_url, added_at) VALUES(?, ?, ?, ?)\n         ON CONFLICT(id) DO NOTHING",
    )
    .bind(&b.id)
    .bind(&b.title)
    .bind(&b.cover_url)
    .bind(&b.added_at)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn delete_bookmark(pool: &AnyPool, id: &str) -> Result<bool> {
    let res = sqlx::query("DELETE FROM bookmarks WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Remove `b` if its id is saved, insert it otherwise. Returns whether it is saved afterwards.
pub async fn toggle_bookmark(pool: &AnyPool, b: &Bookmark) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let removed = sqlx::query("DELETE FROM bookmarks WHERE id = ?")
        .bind(&b.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if removed == 0 {
        sqlx::query("INSERT INTO bookmarks(id, title, cover_url, added_at) VALUES(?, ?, ?, ?)")
            .bind(&b.id)
            .bind(&b.title)
            .bind(&b.cover_url)
            .bind(&b.added_at)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(removed == 0)
}

pub async fn bookmark_exists(pool: &AnyPool, id: &str) -> Result<bool> {
    let found = sqlx::query_scalar::<_, String>("SELECT id FROM bookmarks WHERE id = ? LIMIT 1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

pub async fn get_bookmark(pool: &AnyPool, id: &str) -> Result<Option<Bookmark>> {
    let sql = format!("SELECT {BOOKMARK_COLUMNS} FROM bookmarks WHERE id = ? LIMIT 1");
    let row = sqlx::query_as::<_, BookmarkRow>(&sql).bind(id).fetch_optional(pool).await?;
    Ok(row.map(bookmark_from_row))
}

pub async fn list_bookmarks(pool: &AnyPool, order: BookmarkOrder) -> Result<Vec<Bookmark>> {
    let sql = format!("SELECT {BOOKMARK_COLUMNS} FROM bookmarks {}", order.sql());
    let rows = sqlx::query_as::<_, BookmarkRow>(&sql).fetch_all(pool).await?;
    Ok(rows.into_iter().map(bookmark_from_row).collect())
}

pub async fn count_bookmarks(pool: &AnyPool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM bookmarks").fetch_one(pool).await?)
}

pub async fn clear_bookmarks(pool: &AnyPool) -> Result<u64> {
    let res = sqlx::query("DELETE FROM bookmarks").execute(pool).await?;
    Ok(res.rows_affected())
}

/// Insert every bookmark whose id is not saved yet. Returns how many were added.
pub async fn import_bookmarks(pool: &AnyPool, items: &[Bookmark]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut added = 0;
    for b in items {
        added += sqlx::query(
            "INSERT INTO bookmarks(id, title, cover_url, added_at) VALUES(?, ?, ?, ?)\n             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&b.id)
        .bind(&b.title)
        .bind(&b.cover_url)
        .bind(&b.added_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }
    tx.commit().await?;
    Ok(added)
}

pub async fn get_setting(pool: &AnyPool, key: &str) -> Result<Option<String>> {
    let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ? LIMIT 1")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

pub async fn put_setting(pool: &AnyPool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings(key, value) VALUES(?, ?)\n         ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_progress(
    pool: &AnyPool,
    chapter_id: &str,
    manga_id: Option<&str>,
    page_index: i64,
    total_pages: Option<i64>,
    now: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO reading_progress(chapter_id, manga_id, page_index, total_pages, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(chapter_id) DO UPDATE SET
           manga_id=COALESCE(excluded.manga_id, reading_progress.manga_id),
           page_index=excluded.page_index,
           total_pages=excluded.total_pages,
           updated_at=excluded.updated_at",
    )
    .bind(chapter_id)
    .bind(manga_id)
    .bind(page_index)
    .bind(total_pages)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_progress(pool: &AnyPool, chapter_id: &str) -> Result<Option<ProgressRow>> {
    let row = sqlx::query_as::<_, (String, String, i64, i64, i64)>(
        "SELECT chapter_id, COALESCE(manga_id, ''), page_index, COALESCE(total_pages, -1), updated_at
         FROM reading_progress WHERE chapter_id = ? LIMIT 1",
    )
    .bind(chapter_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(chapter_id, manga_id, page_index, total_pages, updated_at)| ProgressRow {
        chapter_id,
        manga_id: non_empty(manga_id),
        page_index,
        total_pages: (total_pages >= 0).then_some(total_pages),
        updated_at,
    }))
}
