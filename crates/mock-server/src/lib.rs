//! In-memory stand-in for the MAL API.
//!
//! Serves the catalog search, the list mutation endpoints and
//! `/malappinfo.php` from a small seeded catalog. Like the real service, the
//! mutation endpoints answer success for unknown or duplicate ids.

use std::{collections::HashMap, sync::Arc};

use anyhow::{anyhow, Result};
use axum::{
    extract::{Form, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::Deserialize;
use shared::{Config, LogConfig};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info, warn};

/// Component name used for log files and filter directives
pub const COMPONENT: &str = "mock-server";

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "MAL_CONFIG";

/// Configuration file used when `MAL_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Logging setup for the service from the `[logging]` section of a
/// configuration file. A missing or unreadable file yields the defaults.
pub fn log_config(path: impl AsRef<std::path::Path>) -> LogConfig {
    let config = Config::load_or_default(path);
    LogConfig::from_config(&config, COMPONENT)
}

/// Basic credentials accepted by the `/api` endpoints
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// One anime in the seeded catalog
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: &'static str,
    pub title: &'static str,
    pub english: &'static str,
    pub episodes: &'static str,
    pub kind: &'static str,
    /// Numeric type code used by `/malappinfo.php`
    pub kind_code: &'static str,
    pub status: &'static str,
    pub start_date: &'static str,
    pub end_date: &'static str,
    pub image: &'static str,
}

/// The catalog served by [`app`]
pub fn catalog() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry {
            id: "1",
            title: "Cowboy Bebop",
            english: "Cowboy Bebop",
            episodes: "26",
            kind: "TV",
            kind_code: "1",
            status: "Finished Airing",
            start_date: "1998-04-03",
            end_date: "1999-04-24",
            image: "http://cdn.myanimelist.net/images/anime/4/19644.jpg",
        },
        CatalogEntry {
            id: "21",
            title: "One Piece",
            english: "One Piece",
            episodes: "0",
            kind: "TV",
            kind_code: "1",
            status: "Currently Airing",
            start_date: "1999-10-20",
            end_date: "0000-00-00",
            image: "http://cdn.myanimelist.net/images/anime/6/73245.jpg",
        },
        CatalogEntry {
            id: "269",
            title: "Bleach",
            english: "Bleach",
            episodes: "366",
            kind: "TV",
            kind_code: "1",
            status: "Finished Airing",
            start_date: "2004-10-05",
            end_date: "2012-03-27",
            image: "http://cdn.myanimelist.net/images/anime/3/40451.jpg",
        },
        CatalogEntry {
            id: "2889",
            title: "Bleach - The DiamondDust Rebellion",
            english: "Bleach: Diamond Dust Rebellion",
            episodes: "1",
            kind: "Movie",
            kind_code: "3",
            status: "Finished Airing",
            start_date: "2007-12-22",
            end_date: "2007-12-22",
            image: "http://cdn.myanimelist.net/images/anime/6/4052.jpg",
        },
    ]
}

/// One anime on a user's list
#[derive(Debug, Clone)]
struct StoredEntry {
    id: String,
    /// Values by wire element name, as last posted
    values: HashMap<String, String>,
    last_updated: i64,
}

#[derive(Clone)]
pub struct AppState {
    credentials: Arc<Credentials>,
    catalog: Arc<Vec<CatalogEntry>>,
    lists: Arc<RwLock<HashMap<String, Vec<StoredEntry>>>>,
}

#[derive(Deserialize)]
struct SearchParams {
    q: String,
}

#[derive(Deserialize)]
struct AppInfoParams {
    u: String,
}

#[derive(Deserialize)]
struct ValuesForm {
    data: String,
}

pub fn app(credentials: Credentials) -> Router {
    let mut lists = HashMap::new();
    lists.insert(credentials.username.clone(), Vec::new());

    let state = AppState {
        credentials: Arc::new(credentials),
        catalog: Arc::new(catalog()),
        lists: Arc::new(RwLock::new(lists)),
    };

    Router::new()
        .route("/api/anime/search.xml", get(search))
        .route("/api/animelist/add/{file}", post(add_entry))
        .route("/api/animelist/update/{file}", post(update_entry))
        .route("/api/animelist/delete/{file}", delete(delete_entry))
        .route("/malappinfo.php", get(malappinfo))
        .with_state(state)
}

pub async fn run(listener: TcpListener, credentials: Credentials) -> Result<(), std::io::Error> {
    axum::serve(listener, app(credentials)).await
}

/// Check Basic credentials, returning the authenticated user name
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<String, Response> {
    let decoded = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .and_then(|encoded| STANDARD.decode(encoded).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok());

    match decoded.as_deref().and_then(|pair| pair.split_once(':')) {
        Some((user, pass))
            if user == state.credentials.username && pass == state.credentials.password =>
        {
            Ok(user.to_string())
        }
        _ => {
            warn!("Rejected request with invalid credentials");
            Err((StatusCode::UNAUTHORIZED, "Invalid credentials").into_response())
        }
    }
}

/// Anime id from a `{id}.xml` path segment
fn anime_id(file: &str) -> Result<&str, Response> {
    match file.strip_suffix(".xml") {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(StatusCode::NOT_FOUND.into_response()),
    }
}

fn xml_response(body: Result<String>) -> Response {
    match body {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/xml; charset=UTF-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to build XML response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Unindented response document
struct XmlBody {
    writer: Writer<Vec<u8>>,
}

impl XmlBody {
    fn new() -> Result<Self> {
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(Self { writer })
    }

    fn start(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::Start(BytesStart::new(name)))?;
        Ok(())
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    /// `<name>value</name>`, with the value escaped
    fn element(&mut self, name: &str, value: &str) -> Result<()> {
        self.start(name)?;
        if !value.is_empty() {
            self.writer.write_event(Event::Text(BytesText::new(value)))?;
        }
        self.end(name)
    }

    fn finish(self) -> Result<String> {
        Ok(String::from_utf8(self.writer.into_inner())?)
    }
}

fn search_document(hits: &[&CatalogEntry]) -> Result<String> {
    let mut doc = XmlBody::new()?;
    doc.start("anime")?;
    for entry in hits {
        doc.start("entry")?;
        doc.element("id", entry.id)?;
        doc.element("title", entry.title)?;
        doc.element("english", entry.english)?;
        doc.element("synonyms", "")?;
        doc.element("episodes", entry.episodes)?;
        doc.element("type", entry.kind)?;
        doc.element("status", entry.status)?;
        doc.element("start_date", entry.start_date)?;
        doc.element("end_date", entry.end_date)?;
        doc.element("synopsis", "")?;
        doc.element("image", entry.image)?;
        doc.end("entry")?;
    }
    doc.end("anime")?;
    doc.finish()
}

/// `/malappinfo.php` document; `None` for a user the service does not know
fn user_list_document(
    user: &str,
    list: Option<&[StoredEntry]>,
    catalog: &[CatalogEntry],
) -> Result<String> {
    let mut doc = XmlBody::new()?;
    doc.start("myanimelist")?;

    let Some(list) = list else {
        doc.element("error", "Invalid username")?;
        doc.end("myanimelist")?;
        return doc.finish();
    };

    let count = |code: &str| {
        list.iter()
            .filter(|stored| stored.values.get("status").map(String::as_str) == Some(code))
            .count()
            .to_string()
    };

    doc.start("myinfo")?;
    doc.element("user_id", "1")?;
    doc.element("user_name", user)?;
    doc.element("user_watching", &count("1"))?;
    doc.element("user_completed", &count("2"))?;
    doc.element("user_onhold", &count("3"))?;
    doc.element("user_dropped", &count("4"))?;
    doc.element("user_plantowatch", &count("6"))?;
    doc.end("myinfo")?;

    for stored in list {
        let Some(entry) = catalog.iter().find(|entry| entry.id == stored.id) else {
            continue;
        };
        let value = |name: &str, default: &'static str| {
            stored
                .values
                .get(name)
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        doc.start("anime")?;
        doc.element("series_animedb_id", entry.id)?;
        doc.element("series_title", entry.title)?;
        doc.element("series_synonyms", entry.english)?;
        doc.element("series_type", entry.kind_code)?;
        doc.element("series_episodes", entry.episodes)?;
        doc.element("series_status", "2")?;
        doc.element("series_start", entry.start_date)?;
        doc.element("series_end", entry.end_date)?;
        doc.element("series_image", entry.image)?;
        doc.element("my_id", "0")?;
        doc.element("my_watched_episodes", &value("episode", "0"))?;
        doc.element("my_start_date", &value("date_start", "0000-00-00"))?;
        doc.element("my_finish_date", &value("date_finish", "0000-00-00"))?;
        doc.element("my_score", &value("score", "0"))?;
        doc.element("my_status", &value("status", "1"))?;
        doc.element("my_rewatching", &value("enable_rewatching", "0"))?;
        doc.element("my_rewatching_ep", "0")?;
        doc.element("my_last_updated", &stored.last_updated.to_string())?;
        doc.element("my_tags", &value("tags", ""))?;
        doc.end("anime")?;
    }

    doc.end("myanimelist")?;
    doc.finish()
}

async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    let needle = params.q.to_lowercase();
    let hits: Vec<&CatalogEntry> = state
        .catalog
        .iter()
        .filter(|entry| {
            entry.title.to_lowercase().contains(&needle)
                || entry.english.to_lowercase().contains(&needle)
        })
        .collect();

    debug!(query = %params.q, hits = hits.len(), "Search");

    if hits.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }

    xml_response(search_document(&hits))
}

async fn add_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file): Path<String>,
    Form(form): Form<ValuesForm>,
) -> Response {
    let user = match authorize(&state, &headers) {
        Ok(user) => user,
        Err(rejection) => return rejection,
    };
    let id = match anime_id(&file) {
        Ok(id) => id,
        Err(rejection) => return rejection,
    };
    let values = match parse_values(&form.data) {
        Ok(values) => values,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    // Unknown and duplicate ids are accepted without effect.
    if state.catalog.iter().any(|entry| entry.id == id) {
        let mut lists = state.lists.write().await;
        let list = lists.entry(user).or_default();
        if !list.iter().any(|stored| stored.id == id) {
            info!(id, "Added list entry");
            list.push(StoredEntry {
                id: id.to_string(),
                values,
                last_updated: chrono::Utc::now().timestamp(),
            });
        }
    }

    (StatusCode::CREATED, "Created").into_response()
}

async fn update_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file): Path<String>,
    Form(form): Form<ValuesForm>,
) -> Response {
    let user = match authorize(&state, &headers) {
        Ok(user) => user,
        Err(rejection) => return rejection,
    };
    let id = match anime_id(&file) {
        Ok(id) => id,
        Err(rejection) => return rejection,
    };
    let values = match parse_values(&form.data) {
        Ok(values) => values,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let mut lists = state.lists.write().await;
    if let Some(stored) = lists
        .get_mut(&user)
        .and_then(|list| list.iter_mut().find(|stored| stored.id == id))
    {
        info!(id, "Updated list entry");
        stored.values.extend(values);
        stored.last_updated = chrono::Utc::now().timestamp();
    }

    (StatusCode::OK, "Updated").into_response()
}

async fn delete_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file): Path<String>,
) -> Response {
    let user = match authorize(&state, &headers) {
        Ok(user) => user,
        Err(rejection) => return rejection,
    };
    let id = match anime_id(&file) {
        Ok(id) => id,
        Err(rejection) => return rejection,
    };

    let mut lists = state.lists.write().await;
    if let Some(list) = lists.get_mut(&user) {
        list.retain(|stored| stored.id != id);
    }

    (StatusCode::OK, "Deleted").into_response()
}

async fn malappinfo(State(state): State<AppState>, Query(params): Query<AppInfoParams>) -> Response {
    let lists = state.lists.read().await;
    let list = lists.get(&params.u).map(Vec::as_slice);
    if list.is_none() {
        debug!(user = %params.u, "Unknown user");
    }

    xml_response(user_list_document(&params.u, list, &state.catalog))
}

/// Parse a posted `<entry>` document into values by element name
pub fn parse_values(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut values = HashMap::new();
    let mut depth = 0usize;
    let mut current: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                depth += 1;
                if depth == 1 && start.name().as_ref() != b"entry" {
                    return Err(anyhow!("expected <entry> document"));
                }
                if depth == 2 {
                    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                    values.insert(name.clone(), String::new());
                    current = Some(name);
                }
            }
            Event::Empty(start) if depth == 1 => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                values.insert(name, String::new());
            }
            Event::Text(text) => {
                if let Some(value) = current.as_ref().and_then(|name| values.get_mut(name)) {
                    value.push_str(&text.unescape()?);
                }
            }
            Event::End(_) => {
                if depth == 2 {
                    current = None;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof if depth == 0 => break,
            Event::Eof => return Err(anyhow!("unexpected end of <entry> document")),
            _ => {}
        }
    }

    if values.is_empty() && !xml.contains("<entry") {
        return Err(anyhow!("expected <entry> document"));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_values_reads_fields() {
        let values = parse_values(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <entry><episode>11</episode><status>1</status><comments></comments>\
             <tags>a &amp; b</tags></entry>",
        )
        .unwrap();

        assert_eq!(values["episode"], "11");
        assert_eq!(values["status"], "1");
        assert_eq!(values["comments"], "");
        assert_eq!(values["tags"], "a & b");
    }

    #[test]
    fn parse_values_rejects_other_documents() {
        assert!(parse_values("<anime><episode>1</episode></anime>").is_err());
        assert!(parse_values("not xml at all").is_err());
        assert!(parse_values("<entry><episode>1</episode>").is_err());
    }

    #[test]
    fn anime_id_requires_xml_suffix() {
        assert_eq!(anime_id("2889.xml").unwrap(), "2889");
        assert!(anime_id("2889").is_err());
        assert!(anime_id(".xml").is_err());
    }

    #[test]
    fn unknown_user_document_is_a_lone_error_element() {
        let xml = user_list_document("nobody", None, &catalog()).unwrap();
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <myanimelist><error>Invalid username</error></myanimelist>"
        );
    }

    #[test]
    fn user_list_document_escapes_values() {
        let stored = StoredEntry {
            id: "269".to_string(),
            values: HashMap::from([
                ("status".to_string(), "2".to_string()),
                ("tags".to_string(), "fights & <capes>".to_string()),
            ]),
            last_updated: 1420070400,
        };

        let xml = user_list_document("a&b", Some(std::slice::from_ref(&stored)), &catalog()).unwrap();
        assert!(xml.contains("<user_name>a&amp;b</user_name>"));
        assert!(xml.contains("<user_completed>1</user_completed>"));
        assert!(xml.contains("<my_tags>fights &amp; &lt;capes&gt;</my_tags>"));
        assert!(xml.contains("<my_last_updated>1420070400</my_last_updated>"));
        assert!(xml.ends_with("</anime></myanimelist>"));
    }

    #[test]
    fn search_document_writes_empty_fields_as_open_close_pairs() {
        let catalog = catalog();
        let hits: Vec<&CatalogEntry> = catalog.iter().filter(|e| e.id == "1").collect();

        let xml = search_document(&hits).unwrap();
        assert!(xml.contains("<anime><entry><id>1</id><title>Cowboy Bebop</title>"));
        assert!(xml.contains("<synonyms></synonyms>"));
        assert!(xml.ends_with("</entry></anime>"));
    }

    #[test]
    fn log_config_reads_logging_section() -> Result<()> {
        let temp_dir = tempfile::TempDir::new()?;
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[logging]\nlog_dir = \"mock-logs\"\ndefault_level = \"debug\"\n\
             console = true\nfile = true\njson_format = false\n",
        )?;

        let log_config = log_config(&path);
        assert_eq!(log_config.component, COMPONENT);
        assert_eq!(log_config.default_level, tracing::Level::DEBUG);
        assert_eq!(log_config.log_dir, "mock-logs");
        assert!(log_config.file);
        Ok(())
    }

    #[test]
    fn log_config_without_file_uses_defaults() {
        let log_config = log_config("does-not-exist.toml");
        assert_eq!(log_config.component, COMPONENT);
        assert_eq!(log_config.default_level, tracing::Level::INFO);
        assert!(log_config.console);
        assert!(!log_config.file);
    }

    #[test]
    fn catalog_ids_are_unique() {
        let catalog = catalog();
        for (i, entry) in catalog.iter().enumerate() {
            assert!(catalog[i + 1..].iter().all(|other| other.id != entry.id));
        }
    }
}
