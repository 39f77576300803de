use anyhow::{Context, Result};
use sqlx::{any::AnyConnectOptions, AnyPool, ConnectOptions, migrate::Migrator};
use sqlx::any::AnyPoolOptions;
use std::{path::{Path, PathBuf}, str::FromStr};
use std::sync::Once;

use crate::storage::Storage;

// Ensure drivers are installed exactly once for sqlx::any
static INSTALL_DRIVERS: Once = Once::new();

// Embed SQL migrations from the migrations/ directory
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
}

impl Database {
    // Create a connection pool. If database_url is None, use a SQLite file in
    // the user's data directory.
    pub async fn connect(database_url: Option<&str>) -> Result<Self> {
        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

        let url = match database_url {
            Some(u) if !u.trim().is_empty() => u.to_string(),
            _ => default_sqlite_url()?,
        };

        let opts = AnyConnectOptions::from_str(&url)
            .with_context(|| format!("invalid database URL: {url}"))?;
        // Quiet by default; callers can enable SQLX_LOG if they want
        let opts = opts.disable_statement_logging();

        let pool = AnyPoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .with_context(|| format!("failed to connect to database: {url}"))?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.context("running migrations")
    }

    pub fn pool(&self) -> &AnyPool { &self.pool }

    pub async fn clear_cache_prefix(&self, prefix: Option<&str>) -> Result<u64> {
        let result = if let Some(p) = prefix {
            let like = format!("{}%", p);
            sqlx::query("DELETE FROM search_cache WHERE key LIKE ?")
                .bind(like)
                .execute(&self.pool)
                .await?
        } else {
            sqlx::query("DELETE FROM search_cache")
                .execute(&self.pool)
                .await?
        };
        Ok(result.rows_affected())
    }

    pub async fn purge_expired(&self, now: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM search_cache WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// (all entries, entries expired at `now`)
    pub async fn cache_counts(&self, now: i64) -> Result<(i64, i64)> {
        let row: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN expires_at <= ? THEN 1 ELSE 0 END), 0) FROM search_cache",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn vacuum(&self) -> Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await.context("vacuum")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Storage for Database {
    async fn get_cache(&self, key: &str, now: i64) -> Result<Option<String>> {
        let row = sqlx::query_scalar::<_, String>(
            "SELECT payload FROM search_cache WHERE key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn put_cache(&self, key: &str, payload: &str, expires_at: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO search_cache(key, payload, expires_at) VALUES (?, ?, ?)\n             ON CONFLICT(key) DO UPDATE SET payload=excluded.payload, expires_at=excluded.expires_at",
        )
        .bind(key)
        .bind(payload)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        crate::dao::get_setting(&self.pool, key).await
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        crate::dao::put_setting(&self.pool, key, value).await
    }
}

/// sqlx URL for a SQLite file, created on first connect.
pub fn sqlite_url(path: &Path) -> String {
    // Encode spaces in the path for a valid sqlite URL
    let path_str = path.to_string_lossy().replace(' ', "%20");
    format!("sqlite://{path_str}?mode=rwc")
}

fn default_sqlite_url() -> Result<String> {
    let proj = crate::config::project_dirs()
        .context("unable to determine data directory for default sqlite path")?;
    let mut path: PathBuf = proj.data_dir().to_path_buf();
    std::fs::create_dir_all(&path).with_context(|| format!("creating data dir: {}", path.display()))?;
    path.push("mangalimited.db");
    Ok(sqlite_url(&path))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_db() -> (tempfile::TempDir, Database) {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::connect(Some(&sqlite_url(&tmp.path().join("t.db")))).await.unwrap();
        db.run_migrations().await.unwrap();
        (tmp, db)
    }

    #[tokio::test]
    async fn cache_respects_expiry() {
        let (_tmp, db) = temp_db().await;
        db.put_cache("k", "v1", 100).await.unwrap();
        assert_eq!(db.get_cache("k", 99).await.unwrap().as_deref(), Some("v1"));
        assert_eq!(db.get_cache("k", 100).await.unwrap(), None);

        db.put_cache("k", "v2", 200).await.unwrap();
        assert_eq!(db.get_cache("k", 150).await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn clear_by_prefix_and_purge() {
        let (_tmp, db) = temp_db().await;
        db.put_cache("mangadex|search|a", "[]", 10).await.unwrap();
        db.put_cache("mangadex|search|b", "[]", 500).await.unwrap();
        db.put_cache("mangadex|details|c", "{}", 500).await.unwrap();

        assert_eq!(db.cache_counts(100).await.unwrap(), (3, 1));
        assert_eq!(db.purge_expired(100).await.unwrap(), 1);
        assert_eq!(db.clear_cache_prefix(Some("mangadex|search|")).await.unwrap(), 1);
        assert_eq!(db.cache_counts(100).await.unwrap(), (1, 0));
        assert!(db.get_cache("mangadex|details|c", 100).await.unwrap().is_some());
        assert_eq!(db.clear_cache_prefix(None).await.unwrap(), 1);
        assert_eq!(db.cache_counts(100).await.unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn settings_round_trip_through_storage() {
        let (_tmp, db) = temp_db().await;
        assert_eq!(db.get_setting("theme").await.unwrap(), None);
        db.put_setting("theme", "dark").await.unwrap();
        db.put_setting("theme", "light").await.unwrap();
        assert_eq!(db.get_setting("theme").await.unwrap().as_deref(), Some("light"));
    }

    #[tokio::test]
    async fn vacuum_reports_failures() {
        let (_tmp, db) = temp_db().await;
        db.vacuum().await.unwrap();
        db.pool().close().await;
        assert!(db.vacuum().await.is_err());
    }

    #[test]
    fn sqlite_url_escapes_spaces() {
        let url = sqlite_url(Path::new("/tmp/My Library/m.db"));
        assert_eq!(url, "sqlite:///tmp/My%20Library/m.db?mode=rwc");
    }
}
