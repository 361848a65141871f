//! Blocking MAL API client.
//!
//! Every operation performs exactly one HTTP round trip with Basic
//! credentials attached, then decodes the XML body or reports the failure.
//! There is no retry, caching or rate limiting.

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode, Url};
use shared::config::{MalConfig, DEFAULT_BASE_URL, DEFAULT_USER_AGENT};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{MalError, Result};
use crate::types::{ListEntryValues, SearchEntry, UserList};
use crate::xml;

pub const PATH_ANIME_SEARCH: &str = "/api/anime/search.xml";
pub const PATH_ANIME_ADD: &str = "/api/animelist/add/%id.xml";
pub const PATH_ANIME_UPDATE: &str = "/api/animelist/update/%id.xml";
pub const PATH_ANIME_DELETE: &str = "/api/animelist/delete/%id.xml";
/// Undocumented endpoint serving a user's full list
pub const PATH_MALAPPINFO: &str = "/malappinfo.php";

/// Token in list paths replaced by the anime id
pub const ID_PLACEHOLDER: &str = "%id";

const XML: &str = "application/xml";

/// MAL API client
///
/// Owns one connection pool for its lifetime. The pool is released by
/// [`MalClient::close`] or when the client is dropped.
pub struct MalClient {
    /// HTTP client (connection pool)
    client: Client,
    /// Base URL without a trailing slash
    base_url: String,
    username: String,
    password: String,
}

/// Builder for [`MalClient`]; validation happens in [`build`](Self::build)
#[derive(Clone, Default)]
pub struct MalClientBuilder {
    username: Option<String>,
    password: Option<String>,
    base_url: Option<String>,
    user_agent: Option<String>,
    timeout: Option<Duration>,
}

impl MalClientBuilder {
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Override the service origin (default [`DEFAULT_BASE_URL`])
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Request timeout; the transport default applies when unset
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Apply the `[mal]` configuration section
    pub fn config(mut self, config: &MalConfig) -> Self {
        self.base_url = Some(config.base_url.clone());
        self.user_agent = Some(config.user_agent.clone());
        self.timeout = config.timeout_seconds.map(Duration::from_secs);
        self
    }

    /// Validate the parameters and create the client
    pub fn build(self) -> Result<MalClient> {
        let username = required(self.username, "username")?;
        let password = required(self.password, "password")?;
        let base_url = match self.base_url {
            Some(base_url) => normalize_base_url(&base_url)?,
            None => DEFAULT_BASE_URL.to_string(),
        };

        let mut builder = Client::builder().user_agent(
            self.user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        );
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        debug!(base_url = %base_url, username = %username, "MAL client created");

        Ok(MalClient {
            client,
            base_url,
            username,
            password,
        })
    }
}

impl MalClient {
    /// Create a client for the public MAL service
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        Self::builder().username(username).password(password).build()
    }

    /// Create a client for a non-standard scheme, authority or root path
    pub fn with_base_url(
        username: impl Into<String>,
        password: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        Self::builder()
            .username(username)
            .password(password)
            .base_url(base_url)
            .build()
    }

    /// Create a client from the `[mal]` configuration section
    pub fn from_config(
        config: &MalConfig,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        Self::builder()
            .config(config)
            .username(username)
            .password(password)
            .build()
    }

    pub fn builder() -> MalClientBuilder {
        MalClientBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Search the anime catalog.
    ///
    /// The service answers `204 No Content` when nothing matches; that is
    /// returned as an empty list.
    pub fn search(&self, query: &str) -> Result<Vec<SearchEntry>> {
        debug!(query, "Searching anime catalog");

        let request = self
            .request(Method::GET, PATH_ANIME_SEARCH)
            .query(&[("q", query)])
            .header(ACCEPT, XML);
        let response = self.send(request, PATH_ANIME_SEARCH)?;

        if response.status() == StatusCode::NO_CONTENT {
            debug!(query, "No search results");
            return Ok(Vec::new());
        }

        let body = response.text()?;
        let entries = xml::decode_search(&body)?;

        debug!(query, results = entries.len(), "Search complete");
        Ok(entries)
    }

    /// Add an anime to the authenticated user's list.
    ///
    /// The service accepts unknown ids and ids already on the list without
    /// reporting an error, so success only means the request was accepted.
    /// Use [`update_list_entry`](Self::update_list_entry) for anime already
    /// on the list.
    pub fn add_list_entry(&self, id: &str, values: &ListEntryValues) -> Result<()> {
        self.post_values(PATH_ANIME_ADD, id, values)
    }

    /// Update an anime on the authenticated user's list.
    ///
    /// Same weak confirmation as [`add_list_entry`](Self::add_list_entry).
    pub fn update_list_entry(&self, id: &str, values: &ListEntryValues) -> Result<()> {
        self.post_values(PATH_ANIME_UPDATE, id, values)
    }

    /// Delete an anime from the authenticated user's list.
    ///
    /// Confirm the effect with [`fetch_user_list`](Self::fetch_user_list).
    pub fn delete_list_entry(&self, id: &str) -> Result<()> {
        let path = list_path(PATH_ANIME_DELETE, id)?;
        info!(id, "Deleting list entry");

        let request = self.request(Method::DELETE, &path).header(ACCEPT, "*/*");
        let response = self.send(request, &path)?;
        response.text()?;
        Ok(())
    }

    /// Fetch the full anime list of a user (undocumented endpoint).
    pub fn fetch_user_list(&self, username: &str) -> Result<UserList> {
        if username.trim().is_empty() {
            return Err(MalError::missing("username"));
        }
        debug!(username, "Fetching user list");

        let request = self
            .request(Method::GET, PATH_MALAPPINFO)
            .query(&[("u", username), ("type", "anime"), ("status", "all")])
            .header(ACCEPT, XML);
        let response = self.send(request, PATH_MALAPPINFO)?;

        let body = response.text()?;
        let list = xml::decode_user_list(&body)?;

        debug!(
            username,
            entries = list.entries.len(),
            unrecognized = list.unrecognized.len(),
            "User list fetched"
        );
        Ok(list)
    }

    /// Release the connection pool. Consumes the client.
    pub fn close(self) {
        debug!(base_url = %self.base_url, "Closing MAL client");
        drop(self.client);
    }

    fn post_values(&self, template: &str, id: &str, values: &ListEntryValues) -> Result<()> {
        let path = list_path(template, id)?;
        let data = xml::encode_values(values)?;
        info!(id, path = %path, "Posting list entry values");

        let request = self
            .request(Method::POST, &path)
            .header(ACCEPT, "*/*")
            .form(&[("data", data.as_str())]);
        let response = self.send(request, &path)?;
        response.text()?;
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .basic_auth(&self.username, Some(&self.password))
    }

    /// Execute a request and map non-2xx statuses to errors
    fn send(&self, request: RequestBuilder, path: &str) -> Result<Response> {
        debug!(base_url = %self.base_url, path, "Making API request");

        let response = request.send().map_err(|e| {
            warn!(path, error = %e, "Request error");
            MalError::from(e)
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(path, status = %status, "Request successful");
            return Ok(response);
        }

        let body = match response.text() {
            Ok(body) => body,
            Err(e) => {
                warn!(path, status = %status, error = %e, "Failed to read error response body");
                String::new()
            }
        };
        warn!(path, status = %status, body = %body, "Request failed");
        Err(MalError::from_status(status, body))
    }
}

impl fmt::Debug for MalClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MalClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(MalError::missing(name)),
    }
}

fn normalize_base_url(base_url: &str) -> Result<String> {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(MalError::missing("base_url"));
    }

    match Url::parse(trimmed) {
        Ok(url) if !url.cannot_be_a_base() => Ok(trimmed.to_string()),
        _ => Err(MalError::InvalidArgument(format!(
            "base_url {trimmed:?} is not an absolute URL"
        ))),
    }
}

/// Substitute the anime id into a list path template
fn list_path(template: &str, id: &str) -> Result<String> {
    if id.trim().is_empty() {
        return Err(MalError::missing("id"));
    }
    Ok(template.replace(ID_PLACEHOLDER, id))
}
