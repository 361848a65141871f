//! XML codec for MAL API payloads.
//!
//! Each record type carries a static table mapping its fields to wire element
//! names. Decoding walks `quick-xml` events and fills records through the
//! table; encoding writes one child element per present field, in table order.

use quick_xml::escape::resolve_html5_entity;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

use crate::types::{ListEntry, ListEntryValues, RawElement, SearchEntry, UserList};

/// Root element of a search response
pub const SEARCH_ROOT: &str = "anime";

/// Root element of a user list response
pub const USER_LIST_ROOT: &str = "myanimelist";

/// Errors raised while decoding or encoding XML payloads
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("document is empty or has no root element")]
    MissingRoot,

    #[error("expected root element <{expected}>, found <{found}>")]
    UnexpectedRoot { expected: &'static str, found: String },

    #[error("document ended inside an element")]
    UnexpectedEof,

    #[error("unexpected content outside the root element")]
    StrayContent,

    #[error("malformed XML: {0}")]
    Syntax(#[from] quick_xml::Error),

    #[error("failed to write XML: {0}")]
    Write(String),
}

/// One row of a record's field table
pub struct Field<R> {
    /// Element name on the wire
    pub wire: &'static str,
    pub get: fn(&R) -> Option<&str>,
    pub set: fn(&mut R, String),
}

/// A flat record whose fields are all optional text elements
pub trait XmlRecord: Default + 'static {
    /// Element wrapping one record
    const ELEMENT: &'static str;

    /// Field table, in wire order
    const FIELDS: &'static [Field<Self>];

    fn field(name: &[u8]) -> Option<&'static Field<Self>> {
        Self::FIELDS.iter().find(|field| field.wire.as_bytes() == name)
    }
}

macro_rules! field_table {
    ($record:ty { $($field:ident => $wire:literal),* $(,)? }) => {
        &[$(
            Field::<$record> {
                wire: $wire,
                get: |record| record.$field.as_deref(),
                set: |record, value| record.$field = Some(value),
            }
        ),*]
    };
}

impl XmlRecord for SearchEntry {
    const ELEMENT: &'static str = "entry";
    const FIELDS: &'static [Field<Self>] = field_table!(SearchEntry {
        id => "id",
        title => "title",
        english => "english",
        synonyms => "synonyms",
        episodes => "episodes",
        kind => "type",
        status => "status",
        start_date => "start_date",
        end_date => "end_date",
        synopsis => "synopsis",
        image => "image",
    });
}

impl XmlRecord for ListEntry {
    const ELEMENT: &'static str = "anime";
    const FIELDS: &'static [Field<Self>] = field_table!(ListEntry {
        series_id => "series_animedb_id",
        series_title => "series_title",
        series_synonyms => "series_synonyms",
        series_type => "series_type",
        series_episodes => "series_episodes",
        series_status => "series_status",
        series_start => "series_start",
        series_end => "series_end",
        series_image => "series_image",
        list_id => "my_id",
        watched_episodes => "my_watched_episodes",
        start_date => "my_start_date",
        finish_date => "my_finish_date",
        score => "my_score",
        status => "my_status",
        rewatching => "my_rewatching",
        rewatching_episode => "my_rewatching_ep",
        last_updated => "my_last_updated",
        tags => "my_tags",
    });
}

impl XmlRecord for ListEntryValues {
    const ELEMENT: &'static str = "entry";
    const FIELDS: &'static [Field<Self>] = field_table!(ListEntryValues {
        episode => "episode",
        status => "status",
        score => "score",
        storage_type => "storage_type",
        storage_value => "storage_value",
        times_rewatched => "times_rewatched",
        rewatch_value => "rewatch_value",
        date_start => "date_start",
        date_finish => "date_finish",
        priority => "priority",
        enable_discussion => "enable_discussion",
        enable_rewatching => "enable_rewatching",
        comments => "comments",
        fansub_group => "fansub_group",
        tags => "tags",
    });
}

/// Decode a search response: `<anime>` wrapping zero or more `<entry>`.
pub fn decode_search(body: &str) -> Result<Vec<SearchEntry>, XmlError> {
    let mut doc = Document::new(body);
    let mut entries = Vec::new();

    if doc.open_root(SEARCH_ROOT)? {
        loop {
            match doc.next_child()? {
                Node::Open { start, .. } if is(&start, SearchEntry::ELEMENT) => {
                    entries.push(doc.record()?)
                }
                Node::Open { start, .. } => doc.skip(&start)?,
                Node::Empty { start, .. } if is(&start, SearchEntry::ELEMENT) => {
                    entries.push(SearchEntry::default())
                }
                Node::Empty { .. } => {}
                Node::Close => break,
            }
        }
    }

    doc.finish()?;
    Ok(entries)
}

/// Decode a user list: `<myanimelist>` wrapping `<anime>` entries and any
/// other elements, which are kept verbatim.
pub fn decode_user_list(body: &str) -> Result<UserList, XmlError> {
    let mut doc = Document::new(body);
    let mut list = UserList::default();

    if doc.open_root(USER_LIST_ROOT)? {
        loop {
            match doc.next_child()? {
                Node::Open { start, .. } if is(&start, ListEntry::ELEMENT) => {
                    list.entries.push(doc.record()?)
                }
                Node::Open { start, at } => list.unrecognized.push(doc.capture(&start, at)?),
                Node::Empty { start, .. } if is(&start, ListEntry::ELEMENT) => {
                    list.entries.push(ListEntry::default())
                }
                Node::Empty { start, at } => list.unrecognized.push(RawElement {
                    name: name_of(&start),
                    xml: doc.source(at).to_string(),
                }),
                Node::Close => break,
            }
        }
    }

    doc.finish()?;
    Ok(list)
}

/// Encode list entry values as an `<entry>` document.
pub fn encode_values(values: &ListEntryValues) -> Result<String, XmlError> {
    encode(values)
}

fn encode<R: XmlRecord>(record: &R) -> Result<String, XmlError> {
    let mut writer = Writer::new(Vec::new());

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .map_err(write_error)?;
    writer
        .write_event(Event::Start(BytesStart::new(R::ELEMENT)))
        .map_err(write_error)?;

    for field in R::FIELDS {
        let Some(value) = (field.get)(record) else {
            continue;
        };
        writer
            .write_event(Event::Start(BytesStart::new(field.wire)))
            .map_err(write_error)?;
        if !value.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(value)))
                .map_err(write_error)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(field.wire)))
            .map_err(write_error)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(R::ELEMENT)))
        .map_err(write_error)?;

    String::from_utf8(writer.into_inner()).map_err(write_error)
}

fn write_error(e: impl std::fmt::Display) -> XmlError {
    XmlError::Write(e.to_string())
}

fn is(start: &BytesStart<'_>, element: &str) -> bool {
    start.name().as_ref() == element.as_bytes()
}

fn is_blank(text: &BytesText<'_>) -> bool {
    text.iter().all(u8::is_ascii_whitespace)
}

fn name_of(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

/// A child position inside the element being walked
enum Node<'a> {
    /// Opening tag; `at` is the source offset just before it
    Open { start: BytesStart<'a>, at: usize },
    /// Self-closing tag
    Empty { start: BytesStart<'a>, at: usize },
    /// End tag of the enclosing element
    Close,
}

struct Document<'a> {
    input: &'a str,
    reader: Reader<&'a [u8]>,
}

impl<'a> Document<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            reader: Reader::from_str(input),
        }
    }

    fn position(&self) -> usize {
        self.reader.buffer_position() as usize
    }

    /// Source text from `at` to the current position, trimmed
    fn source(&self, at: usize) -> &'a str {
        self.input[at..self.position()].trim()
    }

    /// Advance to the root element. Returns false for a self-closing root.
    fn open_root(&mut self, expected: &'static str) -> Result<bool, XmlError> {
        loop {
            match self.reader.read_event()? {
                Event::Start(start) | Event::Empty(start) if !is(&start, expected) => {
                    return Err(XmlError::UnexpectedRoot {
                        expected,
                        found: name_of(&start),
                    })
                }
                Event::Start(_) => return Ok(true),
                Event::Empty(_) => return Ok(false),
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Text(t) if is_blank(&t) => {}
                Event::Eof => return Err(XmlError::MissingRoot),
                Event::Text(_) | Event::CData(_) | Event::End(_) => {
                    return Err(XmlError::StrayContent)
                }
            }
        }
    }

    /// Only comments and processing instructions may follow the root.
    fn finish(&mut self) -> Result<(), XmlError> {
        loop {
            match self.reader.read_event()? {
                Event::Eof => return Ok(()),
                Event::Comment(_) | Event::PI(_) => {}
                Event::Text(t) if is_blank(&t) => {}
                _ => return Err(XmlError::StrayContent),
            }
        }
    }

    fn next_child(&mut self) -> Result<Node<'a>, XmlError> {
        loop {
            let at = self.position();
            match self.reader.read_event()? {
                Event::Start(start) => return Ok(Node::Open { start, at }),
                Event::Empty(start) => return Ok(Node::Empty { start, at }),
                Event::End(_) => return Ok(Node::Close),
                Event::Eof => return Err(XmlError::UnexpectedEof),
                // stray text between children, comments, PIs
                _ => {}
            }
        }
    }

    fn skip(&mut self, start: &BytesStart<'a>) -> Result<(), XmlError> {
        self.reader.read_to_end(start.name())?;
        Ok(())
    }

    fn capture(&mut self, start: &BytesStart<'a>, at: usize) -> Result<RawElement, XmlError> {
        self.skip(start)?;
        Ok(RawElement {
            name: name_of(start),
            xml: self.source(at).to_string(),
        })
    }

    /// Read a record's children up to its end tag.
    fn record<R: XmlRecord>(&mut self) -> Result<R, XmlError> {
        let mut record = R::default();
        loop {
            match self.next_child()? {
                Node::Open { start, .. } => match R::field(start.name().as_ref()) {
                    Some(field) => {
                        let value = self.text()?;
                        (field.set)(&mut record, value);
                    }
                    None => self.skip(&start)?,
                },
                Node::Empty { start, .. } => {
                    if let Some(field) = R::field(start.name().as_ref()) {
                        (field.set)(&mut record, String::new());
                    }
                }
                Node::Close => return Ok(record),
            }
        }
    }

    /// Read the text content of a field up to its end tag. Text and CDATA
    /// are joined as they appear; nested markup is dropped.
    fn text(&mut self) -> Result<String, XmlError> {
        let mut text = String::new();
        loop {
            match self.reader.read_event()? {
                Event::Text(t) => text.push_str(&t.unescape_with(resolve_html5_entity)?),
                Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
                Event::Start(nested) => self.skip(&nested)?,
                Event::End(_) => return Ok(text),
                Event::Eof => return Err(XmlError::UnexpectedEof),
                _ => {}
            }
        }
    }
}
