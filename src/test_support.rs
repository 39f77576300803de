//! Local stand-in for the MangaDex API, served by axum on an ephemeral port.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::config::Config;

pub(crate) const MANGA_ID: &str = "32d76d19-8a05-4db0-9fc2-e0b0648fe9d0";
pub(crate) const SECOND_ID: &str = "6a1d1cb1-ecd5-40d9-89ff-9d88e40b136b";
pub(crate) const NO_COVER_ID: &str = "a1c7c817-4e59-43b7-9365-09675a149a6f";
pub(crate) const MISSING_ID: &str = "00000000-0000-4000-8000-000000000404";
pub(crate) const CHAPTER_1_ID: &str = "11111111-1111-4111-8111-111111111111";
pub(crate) const CHAPTER_2_ID: &str = "22222222-2222-4222-8222-222222222222";
pub(crate) const CHAPTER_3_ID: &str = "33333333-3333-4333-8333-333333333333";

#[derive(Clone, Default)]
pub(crate) struct Fixture {
    hits: Arc<AtomicUsize>,
    queries: Arc<Mutex<Vec<Vec<(String, String)>>>>,
}

impl Fixture {
    fn record(&self, query: Vec<(String, String)>) {
        self.hits.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query);
    }

    pub(crate) fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub(crate) fn last_query(&self) -> Vec<(String, String)> {
        self.queries.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

/// Start the fixture server; returns its base url.
pub(crate) async fn spawn() -> (String, Fixture) {
    let fx = Fixture::default();
    let app = Router::new()
        .route("/manga", get(manga_list))
        .route("/manga/:id", get(manga_detail))
        .route("/manga/:id/feed", get(feed))
        .route("/cover", get(covers))
        .route("/at-home/server/:id", get(at_home))
        .route("/data/:hash/:file", get(page_image))
        .route("/data-saver/:hash/:file", get(page_image))
        .with_state(fx.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), fx)
}

pub(crate) fn fixture_config(base: &str, database_url: Option<String>) -> Config {
    Config {
        api_base_url: base.to_string(),
        uploads_base_url: "https://uploads.test".to_string(),
        database_url,
        retry_initial_delay_ms: 1,
        prefers_dark: Some(false),
        ..Config::default()
    }
}

fn manga_json(id: &str, embedded_cover: Option<&str>) -> Value {
    let title = if id == MANGA_ID { "The Greatest Estate Developer".to_string() } else { format!("Fixture {}", &id[..8]) };
    let mut relationships = vec![json!({"id": "auth-1", "type": "author"})];
    if let Some(file) = embedded_cover {
        relationships.push(json!({"id": "cover-1", "type": "cover_art", "attributes": {"fileName": file}}));
    }
    json!({
        "id": id,
        "type": "manga",
        "attributes": {
            "title": {"en": title},
            "altTitles": [{"ko": "역대급 영지 설계사"}],
            "description": {"en": "An engineering student wakes up inside a novel."},
            "status": "ongoing",
            "publicationDemographic": null,
            "year": 2021,
            "tags": [{"id": "tag-1", "type": "tag", "attributes": {"name": {"en": "Fantasy"}, "group": "genre"}}]
        },
        "relationships": relationships
    })
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"result": "error", "errors": [{"status": 404}]}))).into_response()
}

async fn manga_list(State(fx): State<Fixture>, Query(q): Query<Vec<(String, String)>>) -> Response {
    let boom = q.iter().any(|(k, v)| k == "title" && v == "boom");
    fx.record(q);
    if boom {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response();
    }
    Json(json!({
        "result": "ok",
        "response": "collection",
        "data": [manga_json(MANGA_ID, Some("cover-main.jpg")), manga_json(SECOND_ID, None)],
        "limit": 20,
        "offset": 0,
        "total": 2
    }))
    .into_response()
}

async fn manga_detail(State(fx): State<Fixture>, Path(id): Path<String>, Query(q): Query<Vec<(String, String)>>) -> Response {
    fx.record(q);
    if id == MISSING_ID {
        return not_found();
    }
    Json(json!({"result": "ok", "response": "entity", "data": manga_json(&id, None)})).into_response()
}

async fn covers(State(fx): State<Fixture>, Query(q): Query<Vec<(String, String)>>) -> Response {
    let manga = q.iter().find(|(k, _)| k == "manga[]").map(|(_, v)| v.clone()).unwrap_or_default();
    fx.record(q);
    let data = match manga.as_str() {
        NO_COVER_ID => vec![],
        SECOND_ID => vec![cover_json(&manga, "cover-second.jpg")],
        _ => vec![cover_json(&manga, "cover-main.jpg")],
    };
    Json(json!({"result": "ok", "data": data, "limit": 10, "offset": 0, "total": data.len()})).into_response()
}

fn cover_json(manga: &str, file: &str) -> Value {
    json!({
        "id": "cover-1",
        "type": "cover_art",
        "attributes": {"fileName": file, "volume": "1"},
        "relationships": [{"id": manga, "type": "manga"}]
    })
}

async fn feed(State(fx): State<Fixture>, Path(_id): Path<String>, Query(q): Query<Vec<(String, String)>>) -> Response {
    let param = |name: &str| q.iter().find(|(k, _)| k == name).and_then(|(_, v)| v.parse::<usize>().ok());
    let limit = param("limit").unwrap_or(100);
    let offset = param("offset").unwrap_or(0);
    fx.record(q.clone());
    let all = [
        (CHAPTER_1_ID, Some("1"), "1", "2024-01-01T00:00:00+00:00"),
        (CHAPTER_2_ID, Some("1"), "2", "2024-01-08T00:00:00+00:00"),
        (CHAPTER_3_ID, None, "3", "2024-01-15T00:00:00+00:00"),
    ];
    let data: Vec<Value> = all
        .iter()
        .skip(offset)
        .take(limit)
        .map(|(id, volume, chapter, publish)| {
            json!({
                "id": id,
                "type": "chapter",
                "attributes": {
                    "title": null,
                    "volume": volume,
                    "chapter": chapter,
                    "pages": 3,
                    "translatedLanguage": "en",
                    "publishAt": publish
                }
            })
        })
        .collect();
    Json(json!({"result": "ok", "data": data, "limit": limit, "offset": offset, "total": all.len()})).into_response()
}

async fn at_home(State(fx): State<Fixture>, Path(id): Path<String>, headers: HeaderMap) -> Response {
    fx.record(vec![]);
    if id == MISSING_ID {
        return not_found();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("127.0.0.1")
        .to_string();
    Json(json!({
        "result": "ok",
        "baseUrl": format!("http://{host}"),
        "chapter": {
            "hash": "hash1",
            "data": ["1-a.png", "2-b.png", "3-c.png"],
            "dataSaver": ["1-a.jpg", "2-b.jpg", "3-c.jpg"]
        }
    }))
    .into_response()
}

async fn page_image(State(fx): State<Fixture>, Path((_hash, file)): Path<(String, String)>) -> Response {
    fx.record(vec![]);
    if file.starts_with("missing") {
        return StatusCode::NOT_FOUND.into_response();
    }
    format!("PAGE {file}").into_response()
}

/// A server that accepts connections and hangs up at once; returns its base url
/// and the number of connections seen.
pub(crate) async fn spawn_hangup() -> (String, Arc<AtomicUsize>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });
    (format!("http://{addr}"), accepted)
}

/// Base url of a port nothing listens on.
pub(crate) fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
