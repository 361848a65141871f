//! MAL API record types.
//!
//! These types represent the XML payloads exchanged with the MAL API. Every
//! wire field is optional text: a missing element decodes to `None`, an empty
//! element to `Some("")`. The mapping from field to wire element name lives in
//! [`crate::xml`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One hit from a catalog search (`<entry>` under `<anime>`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchEntry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub english: Option<String>,
    pub synonyms: Option<String>,
    pub episodes: Option<String>,
    /// TV, Movie, OVA, ... (`<type>` on the wire)
    pub kind: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub synopsis: Option<String>,
    pub image: Option<String>,
}

/// One entry on a user's anime list (`<anime>` under `<myanimelist>`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    // Series metadata
    pub series_id: Option<String>,
    pub series_title: Option<String>,
    pub series_synonyms: Option<String>,
    pub series_type: Option<String>,
    pub series_episodes: Option<String>,
    pub series_status: Option<String>,
    pub series_start: Option<String>,
    pub series_end: Option<String>,
    pub series_image: Option<String>,

    // Personal tracking state
    pub list_id: Option<String>,
    pub watched_episodes: Option<String>,
    pub start_date: Option<String>,
    pub finish_date: Option<String>,
    pub score: Option<String>,
    pub status: Option<String>,
    pub rewatching: Option<String>,
    pub rewatching_episode: Option<String>,
    /// Unix timestamp in seconds
    pub last_updated: Option<String>,
    pub tags: Option<String>,
}

impl ListEntry {
    /// Interpret `last_updated` as a Unix timestamp.
    ///
    /// Returns `None` when the field is absent or not a number.
    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        let secs = self.last_updated.as_deref()?.trim().parse::<i64>().ok()?;
        DateTime::from_timestamp(secs, 0)
    }
}

/// A child of `<myanimelist>` that is not an `<anime>` entry, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawElement {
    /// Element name, e.g. `myinfo`
    pub name: String,
    /// Source text of the element, from its opening `<` to its closing `>`
    pub xml: String,
}

/// A user's full anime list as returned by `/malappinfo.php`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserList {
    /// List entries in wire order
    pub entries: Vec<ListEntry>,
    /// Unrecognized sibling elements in wire order
    pub unrecognized: Vec<RawElement>,
}

impl UserList {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the entry for a catalog id
    pub fn find(&self, series_id: &str) -> Option<&ListEntry> {
        self.entries
            .iter()
            .find(|entry| entry.series_id.as_deref() == Some(series_id))
    }
}

/// Values sent when adding or updating a list entry.
///
/// Every field is sent verbatim; the client performs no validation. `None`
/// fields are left out of the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntryValues {
    pub episode: Option<String>,
    /// 1/watching, 2/completed, 3/onhold, 4/dropped, 6/plantowatch
    pub status: Option<String>,
    pub score: Option<String>,
    pub storage_type: Option<String>,
    pub storage_value: Option<String>,
    pub times_rewatched: Option<String>,
    pub rewatch_value: Option<String>,
    /// mmddyyyy
    pub date_start: Option<String>,
    /// mmddyyyy
    pub date_finish: Option<String>,
    pub priority: Option<String>,
    /// 1 = enable, 0 = disable
    pub enable_discussion: Option<String>,
    /// 1 = enable, 0 = disable
    pub enable_rewatching: Option<String>,
    pub comments: Option<String>,
    pub fansub_group: Option<String>,
    /// Tags separated by commas
    pub tags: Option<String>,
}

/// Watch status codes accepted by the list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListStatus {
    Watching,
    Completed,
    OnHold,
    Dropped,
    PlanToWatch,
}

impl ListStatus {
    /// Numeric code used on the wire
    pub fn code(self) -> u8 {
        match self {
            ListStatus::Watching => 1,
            ListStatus::Completed => 2,
            ListStatus::OnHold => 3,
            ListStatus::Dropped => 4,
            ListStatus::PlanToWatch => 6,
        }
    }
}

impl From<ListStatus> for String {
    fn from(status: ListStatus) -> Self {
        status.code().to_string()
    }
}

/// Render a date in the `mmddyyyy` form used by `date_start`/`date_finish`
pub fn format_list_date(date: NaiveDate) -> String {
    date.format("%m%d%Y").to_string()
}
