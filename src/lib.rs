pub mod api;
pub mod client;
pub mod config;
pub mod dao;
pub mod db;
pub mod mapping;
pub mod reader;
pub mod retry;
pub mod storage;
pub mod theme;
pub mod types;
pub mod views;

#[cfg(test)]
mod test_support;

// --- Library API for embedding ---

/// Convenience re-exports for embedders.
pub mod prelude {
    pub use crate::client::{ApiError, ListingTab, MangaDexClient, PageQuality};
    pub use crate::config::Config;
    pub use crate::reader::ReaderSession;
    pub use crate::retry::{format_error_message, Fetch, RetryPolicy};
    pub use crate::theme::Theme;
    pub use crate::types::{Bookmark, BookmarkOrder, Stats};
    pub use crate::views::{group_by_volume, ChapterSummary, MangaSummary, VolumeGroup};
    pub use crate::MangaLimited;
}

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::api::{Chapter, Collection, Manga};
use crate::client::{ApiError, ListingTab, MangaDexClient, PageQuality, DEFAULT_FEED_LIMIT};
use crate::config::Config;
use crate::db::Database;
use crate::mapping::{bookmark_from_manga, chapter_summary, cover_url_from_relationships, summary_from_manga};
use crate::reader::ReaderSession;
use crate::retry::{fetch_with_retry, RetryPolicy};
use crate::storage::Storage;
use crate::theme::{resolve_theme, system_preference, Theme, THEME_KEY};
use crate::types::{Bookmark, BookmarkOrder, Stats};
use crate::views::{ChapterSummary, MangaSummary};

/// Async library entry point. Owns the database and the MangaDex client; every
/// remote read goes cache -> retry -> API -> write-through.
pub struct MangaLimited {
    db: Database,
    client: MangaDexClient,
    retry: RetryPolicy,
    config: Config,
}

impl MangaLimited {
    /// Open the database (optionally migrating it) and build the HTTP client.
    pub async fn connect(config: Config, run_migrations: bool) -> Result<Self> {
        let db = Database::connect(config.database_url.as_deref()).await?;
        if run_migrations { db.run_migrations().await?; }
        let client = MangaDexClient::new(&config).context("building http client")?;
        let retry = RetryPolicy::from_config(&config);
        Ok(Self { db, client, retry, config })
    }

    pub fn config(&self) -> &Config { &self.config }
    pub fn database(&self) -> &Database { &self.db }
    pub fn client(&self) -> &MangaDexClient { &self.client }

    // --- Catalogue ---

    /// One page of a home tab, covers resolved where the listing did not embed them.
    pub async fn listing(&self, tab: ListingTab, limit: u32, offset: u32, refresh: bool) -> Result<Vec<MangaSummary>> {
        let key = format!("mangadex|listing|{tab}|{limit}|{offset}");
        let list: Collection<Manga> = self
            .cached(&key, self.config.cache_ttl_secs, refresh, || self.client.listing(tab, limit, offset))
            .await?;
        Ok(self.summaries_with_covers(&list.data, refresh).await)
    }

    pub async fn search(&self, query: &str, limit: u32, offset: u32, refresh: bool) -> Result<Vec<MangaSummary>> {
        let key = format!("mangadex|search|{}|{limit}|{offset}", norm_query(query));
        let list: Collection<Manga> = self
            .cached(&key, self.config.cache_ttl_secs, refresh, || self.client.search(query, limit, offset))
            .await?;
        Ok(self.summaries_with_covers(&list.data, refresh).await)
    }

    pub async fn manga(&self, manga_id: &str, refresh: bool) -> Result<Manga> {
        let key = format!("mangadex|details|{}", manga_id.trim());
        self.cached(&key, self.config.cache_ttl_secs, refresh, || self.client.details(manga_id)).await
    }

    /// Detail view of one entry. A missing cover is not an error.
    pub async fn details(&self, manga_id: &str, refresh: bool) -> Result<MangaSummary> {
        let manga = self.manga(manga_id, refresh).await?;
        let mut summary = summary_from_manga(self.client.uploads_base_url(), &manga);
        if summary.cover_url.is_none() {
            match self.cover_url(manga_id, refresh).await {
                Ok(url) => summary.cover_url = Some(url),
                Err(e) => debug!(manga_id, error = %e, "no cover"),
            }
        }
        Ok(summary)
    }

    pub async fn cover_url(&self, manga_id: &str, refresh: bool) -> Result<String> {
        let key = format!("mangadex|cover|{}", manga_id.trim());
        self.cached(&key, self.config.cache_ttl_secs, refresh, || self.client.cover_url(manga_id)).await
    }

    /// Resolve covers concurrently; ids whose lookup fails are left out.
    pub async fn cover_urls(&self, ids: &[String], refresh: bool) -> HashMap<String, String> {
        let lookups = ids.iter().map(|id| async move { (id, self.cover_url(id, refresh).await) });
        let mut out = HashMap::with_capacity(ids.len());
        for (id, res) in futures::future::join_all(lookups).await {
            match res {
                Ok(url) => { out.insert(id.clone(), url); }
                Err(e) => warn!(manga_id = %id, error = %e, "cover lookup failed"),
            }
        }
        out
    }

    /// The whole English (or configured language) feed of a manga, ascending.
    pub async fn chapters(&self, manga_id: &str, refresh: bool) -> Result<Vec<ChapterSummary>> {
        let key = format!("mangadex|feed|{}|{}", self.client.language(), manga_id.trim());
        let chapters: Vec<Chapter> = self
            .cached(&key, self.config.cache_ttl_secs, refresh, || self.client.all_chapters(manga_id, DEFAULT_FEED_LIMIT))
            .await?;
        Ok(chapters.iter().map(chapter_summary).collect())
    }

    pub async fn chapter_pages(&self, chapter_id: &str, quality: PageQuality, refresh: bool) -> Result<Vec<String>> {
        let key = format!("mangadex|pages|{}|{}", quality.path_segment(), chapter_id.trim());
        self.cached(&key, self.config.pages_ttl_secs, refresh, || self.client.chapter_pages(chapter_id, quality))
            .await
    }

    // --- Reader ---

    /// Open a chapter at the last saved page. With a manga id the session also
    /// knows its neighbouring chapters.
    pub async fn open_reader(&self, chapter_id: &str, manga_id: Option<&str>, quality: PageQuality, refresh: bool) -> Result<ReaderSession> {
        let pages = self.chapter_pages(chapter_id, quality, refresh).await?;
        let mut session = ReaderSession::new(chapter_id.trim(), pages);
        if let Some(mid) = manga_id {
            let feed = self.chapters(mid, refresh).await?;
            session = session.with_neighbours(&feed);
        }
        if let Some(p) = dao::get_progress(self.db.pool(), &session.chapter_id).await? {
            session = session.resume_at(p.page_index.max(0) as usize);
        }
        Ok(session)
    }

    pub async fn save_progress(&self, session: &ReaderSession, manga_id: Option<&str>) -> Result<()> {
        dao::upsert_progress(
            self.db.pool(),
            &session.chapter_id,
            manga_id,
            session.index() as i64,
            Some(session.len() as i64),
            current_epoch(),
        )
        .await
    }

    // --- Bookmarks ---

    /// Bookmark a manga, or remove it if already saved. Returns whether it is saved now.
    pub async fn toggle_bookmark(&self, manga_id: &str) -> Result<bool> {
        let pool = self.db.pool();
        let id = manga_id.trim();
        if dao::bookmark_exists(pool, id).await? {
            dao::delete_bookmark(pool, id).await?;
            info!(manga_id = id, "bookmark removed");
            return Ok(false);
        }
        let manga = self.manga(id, false).await?;
        let cover = match cover_url_from_relationships(self.client.uploads_base_url(), &manga.id, &manga.relationships) {
            Some(url) => Some(url),
            None => self.cover_url(id, false).await.ok(),
        };
        let saved = self.toggle_bookmark_entry(&bookmark_from_manga(&manga, cover, Utc::now())).await?;
        Ok(saved)
    }

    /// Toggle a prepared entry without touching the network.
    pub async fn toggle_bookmark_entry(&self, bookmark: &Bookmark) -> Result<bool> {
        let saved = dao::toggle_bookmark(self.db.pool(), bookmark).await?;
        info!(manga_id = %bookmark.id, saved, "bookmark toggled");
        Ok(saved)
    }

    pub async fn is_bookmarked(&self, manga_id: &str) -> Result<bool> {
        dao::bookmark_exists(self.db.pool(), manga_id.trim()).await
    }

    pub async fn bookmark(&self, manga_id: &str) -> Result<Option<Bookmark>> {
        dao::get_bookmark(self.db.pool(), manga_id.trim()).await
    }

    pub async fn list_bookmarks(&self, order: BookmarkOrder) -> Result<Vec<Bookmark>> {
        dao::list_bookmarks(self.db.pool(), order).await
    }

    pub async fn clear_bookmarks(&self) -> Result<u64> {
        let removed = dao::clear_bookmarks(self.db.pool()).await?;
        info!(removed, "bookmarks cleared");
        Ok(removed)
    }

    /// JSON array in the web reader's storage format, oldest first.
    pub async fn export_bookmarks(&self) -> Result<String> {
        let list = self.list_bookmarks(BookmarkOrder::Oldest).await?;
        Ok(serde_json::to_string_pretty(&list)?)
    }

    /// Merge an exported list; ids already saved are kept as they are.
    pub async fn import_bookmarks(&self, json: &str) -> Result<u64> {
        let items: Vec<Bookmark> = serde_json::from_str(json).context("parsing bookmark list")?;
        let added = dao::import_bookmarks(self.db.pool(), &items).await?;
        info!(added, total = items.len(), "bookmarks imported");
        Ok(added)
    }

    // --- Theme ---

    pub async fn initial_theme(&self) -> Result<Theme> {
        let stored = self.db.get_setting(THEME_KEY).await?;
        let colorfgbg = std::env::var("COLORFGBG").ok();
        let system = system_preference(self.config.prefers_dark, colorfgbg.as_deref());
        Ok(resolve_theme(stored.as_deref(), system))
    }

    pub async fn set_theme(&self, theme: Theme) -> Result<()> {
        self.db.put_setting(THEME_KEY, theme.as_str()).await
    }

    pub async fn toggle_theme(&self) -> Result<Theme> {
        let next = self.initial_theme().await?.toggled();
        self.set_theme(next).await?;
        info!(theme = %next, "theme changed");
        Ok(next)
    }

    // --- Downloads ---

    /// Download chapter pages into `output_dir` as 0001.png, 0002.png, ... Returns how many were written.
    /// Every page is attempted; any page that could not be fetched makes the call fail afterwards.
    pub async fn download_chapter_images(&self, chapter_id: &str, output_dir: &Path, force_overwrite: bool) -> Result<usize> {
        let urls = self.chapter_pages(chapter_id, PageQuality::Data, false).await?;
        if urls.is_empty() { return Ok(0); }

        tokio::fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("creating {}", output_dir.display()))?;
        let mut downloaded = 0;
        let mut failed = 0;

        for (i, url) in urls.iter().enumerate() {
            let path = output_dir.join(format!("{:04}.{}", i + 1, page_extension(url)));
            if !force_overwrite && tokio::fs::try_exists(&path).await.unwrap_or(false) { continue; }

            match self.fetch_page(url).await {
                Ok(bytes) => {
                    tokio::fs::write(&path, &bytes).await.with_context(|| format!("writing {}", path.display()))?;
                    downloaded += 1;
                }
                Err(e) => {
                    warn!(%url, error = %e, "page download failed");
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            bail!("{failed} of {} pages could not be downloaded", urls.len());
        }
        info!(chapter_id, downloaded, "chapter downloaded");
        Ok(downloaded)
    }

    /// Download a chapter as a CBZ archive. Returns false when the file exists or the chapter has no pages.
    /// No archive is written unless every page arrived.
    pub async fn download_chapter_cbz(&self, chapter_id: &str, output_file: &Path, force_overwrite: bool) -> Result<bool> {
        if !force_overwrite && tokio::fs::try_exists(output_file).await.unwrap_or(false) { return Ok(false); }

        let tmp_dir = output_file.with_extension("tmpdir");
        // leftovers of an interrupted run
        let _ = std::fs::remove_dir_all(&tmp_dir);

        let result = self.write_cbz(chapter_id, output_file, &tmp_dir).await;
        let _ = std::fs::remove_dir_all(&tmp_dir);
        if result.is_err() {
            let _ = std::fs::remove_file(output_file);
        }
        result
    }

    async fn write_cbz(&self, chapter_id: &str, output_file: &Path, tmp_dir: &Path) -> Result<bool> {
        if self.download_chapter_images(chapter_id, tmp_dir, true).await? == 0 {
            return Ok(false);
        }

        let file = std::fs::File::create(output_file)
            .with_context(|| format!("creating {}", output_file.display()))?;
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let mut entries: Vec<_> = std::fs::read_dir(tmp_dir)?.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            if path.is_file() {
                let name = entry.file_name().to_string_lossy().to_string();
                zip.start_file(name, options)?;
                let data = std::fs::read(&path)?;
                use std::io::Write;
                zip.write_all(&data)?;
            }
        }
        zip.finish()?;
        Ok(true)
    }

    async fn fetch_page(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.client.http().get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            bail!("HTTP {}", status.as_u16());
        }
        Ok(resp.bytes().await?.to_vec())
    }

    // --- Maintenance ---

    pub async fn clear_cache(&self, prefix: Option<&str>) -> Result<u64> { self.db.clear_cache_prefix(prefix).await }
    pub async fn purge_expired_cache(&self) -> Result<u64> { self.db.purge_expired(current_epoch()).await }
    pub async fn vacuum_db(&self) -> Result<()> { self.db.vacuum().await }

    pub async fn stats(&self) -> Result<Stats> {
        let bookmarks = dao::count_bookmarks(self.db.pool()).await?;
        let (cache_entries, expired) = self.db.cache_counts(current_epoch()).await?;
        Ok(Stats {
            bookmarks: bookmarks as usize,
            cache_entries: cache_entries as usize,
            expired_cache_entries: expired as usize,
        })
    }

    // --- helpers ---

    async fn summaries_with_covers(&self, list: &[Manga], refresh: bool) -> Vec<MangaSummary> {
        let mut summaries: Vec<MangaSummary> = list
            .iter()
            .map(|m| summary_from_manga(self.client.uploads_base_url(), m))
            .collect();
        let missing: Vec<String> = summaries.iter().filter(|s| s.cover_url.is_none()).map(|s| s.id.clone()).collect();
        if !missing.is_empty() {
            let covers = self.cover_urls(&missing, refresh).await;
            for s in summaries.iter_mut().filter(|s| s.cover_url.is_none()) {
                s.cover_url = covers.get(&s.id).cloned();
            }
        }
        summaries
    }

    /// Serve `key` from the cache unless refreshing; otherwise fetch with retry
    /// and write the result through. Cache failures never fail the read.
    async fn cached<T, F, Fut>(&self, key: &str, ttl_secs: i64, refresh: bool, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let now = current_epoch();
        if !refresh {
            match self.db.get_cache(key, now).await {
                Ok(Some(payload)) => match serde_json::from_str(&payload) {
                    Ok(value) => {
                        debug!(key, "cache hit");
                        return Ok(value);
                    }
                    Err(e) => warn!(key, error = %e, "discarding unreadable cache entry"),
                },
                Ok(None) => {}
                Err(e) => warn!(key, error = %e, "cache read failed"),
            }
        }

        let value = fetch_with_retry(&self.retry, fetch).await?;
        match serde_json::to_string(&value) {
            Ok(payload) => {
                if let Err(e) = self.db.put_cache(key, &payload, now + ttl_secs).await {
                    warn!(key, error = %e, "cache write failed");
                }
            }
            Err(e) => warn!(key, error = %e, "cache encode failed"),
        }
        Ok(value)
    }
}

fn page_extension(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            Path::new(u.path())
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
        })
        .filter(|e| !e.is_empty() && e.len() <= 5)
        .unwrap_or_else(|| "jpg".to_string())
}

fn norm_query(q: &str) -> String {
    let trimmed = q.trim().to_lowercase();
    let mut out = String::with_capacity(trimmed.len());
    let mut last_space = false;
    for ch in trimmed.chars() {
        if ch.is_whitespace() { if !last_space { out.push(' '); last_space = true; } } else { out.push(ch); last_space = false; }
    }
    out
}

fn current_epoch() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}
