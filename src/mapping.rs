use chrono::{DateTime, Utc};

use crate::api::{AtHomeServer, Chapter, CoverArt, Manga, Relationship};
use crate::client::PageQuality;
use crate::types::Bookmark;
use crate::views::{ChapterSummary, MangaSummary, NO_DESCRIPTION, UNKNOWN_TITLE};

const PREFERRED_LANG: &str = "en";

pub fn cover_url(uploads_base: &str, manga_id: &str, file_name: &str) -> String {
    format!("{}/covers/{}/{}", uploads_base.trim_end_matches('/'), manga_id, file_name)
}

/// Cover url from a `/cover` result. The requested id wins; the art's own
/// `manga` relationship is only consulted when none was given.
pub fn cover_url_from_art(uploads_base: &str, manga_id: &str, art: &CoverArt) -> Option<String> {
    let file = art.attributes.file_name.as_deref().filter(|f| !f.is_empty())?;
    let id = Some(manga_id)
        .filter(|id| !id.is_empty())
        .or_else(|| art.relationships.iter().find(|r| r.entity_type == "manga").map(|r| r.id.as_str()))?;
    Some(cover_url(uploads_base, id, file))
}

/// Cover url from an expanded `cover_art` relationship, if the listing included one.
pub fn cover_url_from_relationships(uploads_base: &str, manga_id: &str, rels: &[Relationship]) -> Option<String> {
    rels.iter()
        .filter(|r| r.entity_type == "cover_art")
        .find_map(|r| r.attributes.as_ref()?.file_name.as_deref())
        .map(|file| cover_url(uploads_base, manga_id, file))
}

pub fn page_urls(server: &AtHomeServer, quality: PageQuality) -> Vec<String> {
    let files = match quality {
        PageQuality::Data => &server.chapter.data,
        PageQuality::DataSaver => &server.chapter.data_saver,
    };
    let base = server.base_url.trim_end_matches('/');
    files
        .iter()
        .map(|f| format!("{}/{}/{}/{}", base, quality.path_segment(), server.chapter.hash, f))
        .collect()
}

pub fn summary_from_manga(uploads_base: &str, m: &Manga) -> MangaSummary {
    let a = &m.attributes;
    MangaSummary {
        id: m.id.clone(),
        title: a.title.preferred(PREFERRED_LANG).unwrap_or(UNKNOWN_TITLE).to_string(),
        description: a.description.preferred(PREFERRED_LANG).unwrap_or(NO_DESCRIPTION).to_string(),
        alt_titles: a.alt_titles.iter().filter_map(|t| t.first()).filter(|t| !t.is_empty()).map(str::to_string).collect(),
        tags: a.tags.iter().filter_map(|t| t.attributes.name.preferred(PREFERRED_LANG)).map(str::to_string).collect(),
        status: a.status.clone().filter(|s| !s.is_empty()).unwrap_or_else(|| "Unknown".to_string()),
        demographic: a.publication_demographic.clone().filter(|s| !s.is_empty()).unwrap_or_else(|| "Unknown".to_string()),
        year: a.year,
        cover_url: cover_url_from_relationships(uploads_base, &m.id, &m.relationships),
    }
}

pub fn chapter_summary(c: &Chapter) -> ChapterSummary {
    let a = &c.attributes;
    let number = a.chapter.clone().filter(|n| !n.is_empty()).unwrap_or_else(|| "N/A".to_string());
    let title = a
        .title
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| format!("Chapter {number}"));
    ChapterSummary {
        id: c.id.clone(),
        number,
        title,
        volume: a.volume.clone().filter(|v| !v.is_empty()),
        pages: a.pages,
        published_at: a
            .publish_at
            .as_deref()
            .and_then(|p| DateTime::parse_from_rfc3339(p).ok())
            .map(|p| p.with_timezone(&Utc)),
    }
}

/// New bookmark for a catalogue entry; the title falls back to "Unknown".
pub fn bookmark_from_manga(m: &Manga, cover_url: Option<String>, added_at: DateTime<Utc>) -> Bookmark {
    Bookmark {
        id: m.id.clone(),
        title: m.attributes.title.preferred(PREFERRED_LANG).unwrap_or("Unknown").to_string(),
        cover_url,
        added_at: crate::types::timestamp(added_at),
    }
}
