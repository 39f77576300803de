use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::api::{AtHomeServer, Chapter, Collection, CoverArt, Entity, Manga};
use crate::config::Config;
use crate::mapping::{cover_url_from_art, page_urls};

/// Errors from the MangaDex HTTP layer. Only [`ApiError::Network`] is worth retrying.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("API error: {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid id '{0}'")]
    InvalidId(String),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("Cover image not found")]
    CoverNotFound,
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status(code) => Some(*code),
            _ => None,
        }
    }
}

/// Home page tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingTab {
    #[default]
    Latest,
    Popular,
    New,
    Completed,
    Ongoing,
}

impl ListingTab {
    pub const ALL: [ListingTab; 5] = [
        ListingTab::Latest,
        ListingTab::Popular,
        ListingTab::New,
        ListingTab::Completed,
        ListingTab::Ongoing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListingTab::Latest => "latest",
            ListingTab::Popular => "popular",
            ListingTab::New => "new",
            ListingTab::Completed => "completed",
            ListingTab::Ongoing => "ongoing",
        }
    }

    fn query(&self) -> (&'static str, &'static str) {
        match self {
            ListingTab::Latest => ("order[latestUploadedChapter]", "desc"),
            ListingTab::Popular => ("order[followedCount]", "desc"),
            ListingTab::New => ("order[createdAt]", "desc"),
            ListingTab::Completed => ("status[]", "completed"),
            ListingTab::Ongoing => ("status[]", "ongoing"),
        }
    }
}

impl fmt::Display for ListingTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingTab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ListingTab::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown tab '{s}' (expected latest, popular, new, completed or ongoing)"))
    }
}

/// Image set served by the at-home network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageQuality {
    #[default]
    Data,
    DataSaver,
}

impl PageQuality {
    pub fn path_segment(&self) -> &'static str {
        match self {
            PageQuality::Data => "data",
            PageQuality::DataSaver => "data-saver",
        }
    }
}

pub const DEFAULT_LISTING_LIMIT: u32 = 20;
pub const DEFAULT_SEARCH_LIMIT: u32 = 10;
pub const DEFAULT_FEED_LIMIT: u32 = 100;

/// Thin async wrapper over the MangaDex REST endpoints the reader needs.
#[derive(Debug, Clone)]
pub struct MangaDexClient {
    http: reqwest::Client,
    base_url: String,
    uploads_base_url: String,
    language: String,
}

impl MangaDexClient {
    pub fn new(cfg: &Config) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout())
            .build()
            .map_err(ApiError::Network)?;
        Ok(Self {
            http,
            base_url: cfg.api_base_url.trim_end_matches('/').to_string(),
            uploads_base_url: cfg.uploads_base_url.trim_end_matches('/').to_string(),
            language: cfg.translated_language.clone(),
        })
    }

    pub fn http(&self) -> &reqwest::Client { &self.http }
    pub fn uploads_base_url(&self) -> &str { &self.uploads_base_url }
    pub fn language(&self) -> &str { &self.language }

    pub async fn listing(&self, tab: ListingTab, limit: u32, offset: u32) -> Result<Collection<Manga>, ApiError> {
        let (key, value) = tab.query();
        self.manga_list(&[(key, value.to_string())], limit, offset).await
    }

    pub async fn latest(&self, limit: u32, offset: u32) -> Result<Collection<Manga>, ApiError> {
        self.listing(ListingTab::Latest, limit, offset).await
    }

    pub async fn popular(&self, limit: u32, offset: u32) -> Result<Collection<Manga>, ApiError> {
        self.listing(ListingTab::Popular, limit, offset).await
    }

    pub async fn newest(&self, limit: u32, offset: u32) -> Result<Collection<Manga>, ApiError> {
        self.listing(ListingTab::New, limit, offset).await
    }

    pub async fn by_status(&self, status: &str, limit: u32, offset: u32) -> Result<Collection<Manga>, ApiError> {
        self.manga_list(&[("status[]", status.to_string())], limit, offset).await
    }

    pub async fn search(&self, query: &str, limit: u32, offset: u32) -> Result<Collection<Manga>, ApiError> {
        self.manga_list(&[("title", query.to_string())], limit, offset).await
    }

    pub async fn details(&self, manga_id: &str) -> Result<Manga, ApiError> {
        let id = checked_id(manga_id)?;
        let url = self.endpoint(&format!("manga/{id}"), &[("includes[]", "cover_art".to_string())])?;
        let entity: Entity<Manga> = self.get_json(url).await?;
        Ok(entity.data)
    }

    /// Full-size cover url for a manga, via the `/cover` endpoint.
    pub async fn cover_url(&self, manga_id: &str) -> Result<String, ApiError> {
        let id = checked_id(manga_id)?;
        let url = self.endpoint("cover", &[("manga[]", id.to_string())])?;
        let covers: Collection<CoverArt> = self.get_json(url).await?;
        covers
            .data
            .first()
            .and_then(|art| cover_url_from_art(&self.uploads_base_url, id, art))
            .ok_or(ApiError::CoverNotFound)
    }

    /// One page of a manga's chapter feed in the configured language, ascending by chapter.
    pub async fn chapters(&self, manga_id: &str, limit: u32, offset: u32) -> Result<Collection<Chapter>, ApiError> {
        let id = checked_id(manga_id)?;
        let url = self.endpoint(
            &format!("manga/{id}/feed"),
            &[
                ("translatedLanguage[]", self.language.clone()),
                ("order[chapter]", "asc".to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ],
        )?;
        self.get_json(url).await
    }

    /// Every chapter of the feed, walking pages of `page_size`.
    pub async fn all_chapters(&self, manga_id: &str, page_size: u32) -> Result<Vec<Chapter>, ApiError> {
        let page_size = page_size.max(1);
        let mut out = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.chapters(manga_id, page_size, offset).await?;
            let fetched = page.data.len() as u32;
            out.extend(page.data);
            offset += fetched;
            if fetched == 0 || offset >= page.total {
                break;
            }
        }
        Ok(out)
    }

    pub async fn at_home(&self, chapter_id: &str) -> Result<AtHomeServer, ApiError> {
        let id = checked_id(chapter_id)?;
        let url = self.endpoint(&format!("at-home/server/{id}"), &[])?;
        self.get_json(url).await
    }

    /// Page image urls of a chapter, in reading order.
    pub async fn chapter_pages(&self, chapter_id: &str, quality: PageQuality) -> Result<Vec<String>, ApiError> {
        let server = self.at_home(chapter_id).await?;
        Ok(page_urls(&server, quality))
    }

    async fn manga_list(&self, filter: &[(&str, String)], limit: u32, offset: u32) -> Result<Collection<Manga>, ApiError> {
        let mut query: Vec<(&str, String)> = filter.to_vec();
        query.push(("limit", limit.to_string()));
        query.push(("offset", offset.to_string()));
        query.push(("includes[]", "cover_art".to_string()));
        let url = self.endpoint("manga", &query)?;
        self.get_json(url).await
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, path))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        debug!(%url, "GET");
        let resp = self.http.get(url).send().await.map_err(ApiError::Network)?;
        let status = resp.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "request failed");
            return Err(ApiError::Status(status.as_u16()));
        }
        let body = resp.bytes().await.map_err(ApiError::Network)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// MangaDex ids are UUIDs; anything else never reaches a url path.
pub fn checked_id(id: &str) -> Result<&str, ApiError> {
    let trimmed = id.trim();
    uuid::Uuid::parse_str(trimmed).map_err(|_| ApiError::InvalidId(id.to_string()))?;
    Ok(trimmed)
}
