//! Serde bindings for the subset of the MangaDex REST schema the reader uses.
//!
//! Only the fields that feed a view are bound; everything else in the payload is
//! ignored on deserialization.

use std::fmt;

use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Paged list response (`/manga`, `/cover`, `/manga/{id}/feed`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection<T> {
    #[serde(default)]
    pub result: String,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub total: u32,
}

/// Single object response (`/manga/{id}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity<T> {
    #[serde(default)]
    pub result: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manga {
    pub id: String,
    #[serde(rename = "type", default)]
    pub entity_type: String,
    pub attributes: MangaAttributes,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MangaAttributes {
    #[serde(default)]
    pub title: LocalizedString,
    #[serde(default)]
    pub alt_titles: Vec<LocalizedString>,
    #[serde(default)]
    pub description: LocalizedString,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub publication_demographic: Option<String>,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub last_chapter: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    #[serde(default)]
    pub attributes: TagAttributes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagAttributes {
    #[serde(default)]
    pub name: LocalizedString,
    #[serde(default)]
    pub group: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Present only for expanded relationships (`includes[]=cover_art`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<RelationshipAttributes>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverArt {
    pub id: String,
    pub attributes: CoverArtAttributes,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverArtAttributes {
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub volume: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub attributes: ChapterAttributes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterAttributes {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub chapter: Option<String>,
    #[serde(default)]
    pub pages: u32,
    #[serde(default)]
    pub translated_language: Option<String>,
    #[serde(default)]
    pub publish_at: Option<String>,
}

/// `/at-home/server/{chapterId}` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtHomeServer {
    pub base_url: String,
    pub chapter: AtHomeChapter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtHomeChapter {
    pub hash: String,
    #[serde(default)]
    pub data: Vec<String>,
    #[serde(default)]
    pub data_saver: Vec<String>,
}

/// Language code -> text map that keeps the order the server sent.
///
/// MangaDex encodes an empty map as `[]`, so an empty sequence is accepted too.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizedString(Vec<(String, String)>);

impl LocalizedString {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with(mut self, lang: &str, text: &str) -> Self {
        self.0.push((lang.to_string(), text.to_string()));
        self
    }

    pub fn get(&self, lang: &str) -> Option<&str> {
        self.0.iter().find(|(l, _)| l == lang).map(|(_, t)| t.as_str())
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(|(_, t)| t.as_str())
    }

    /// `lang` if present and non-empty, otherwise the first non-empty value.
    pub fn preferred(&self, lang: &str) -> Option<&str> {
        self.get(lang)
            .filter(|t| !t.is_empty())
            .or_else(|| self.0.iter().map(|(_, t)| t.as_str()).find(|t| !t.is_empty()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for LocalizedString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (lang, text) in &self.0 {
            map.serialize_entry(lang, text)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for LocalizedString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LocalizedVisitor;

        impl<'de> Visitor<'de> for LocalizedVisitor {
            type Value = LocalizedString;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of language code to text")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(1));
                while let Some((lang, text)) = access.next_entry::<String, Option<String>>()? {
                    if let Some(text) = text {
                        entries.push((lang, text));
                    }
                }
                Ok(LocalizedString(entries))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                while access.next_element::<serde::de::IgnoredAny>()?.is_some() {}
                Ok(LocalizedString::new())
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
                Ok(LocalizedString::new())
            }
        }

        deserializer.deserialize_any(LocalizedVisitor)
    }
}
