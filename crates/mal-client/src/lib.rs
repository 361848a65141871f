//! Client library for the MyAnimeList (MAL) API.
//!
//! This library searches the public anime catalog and adds, updates, deletes
//! and lists entries on a user's anime list. Requests are blocking and carry
//! HTTP Basic credentials; responses are XML.
//!
//! The service is not reached over TLS, so credentials travel in cleartext,
//! just as they do when logging in to the website.
//!
//! ```no_run
//! use mal_client::MalClient;
//!
//! let client = MalClient::new("username", "password")?;
//! for entry in client.search("Bleach")? {
//!     println!("{:?} {:?}", entry.id, entry.title);
//! }
//! client.close();
//! # Ok::<(), mal_client::MalError>(())
//! ```

pub mod client;
pub mod error;
pub mod types;
pub mod xml;

pub use client::{MalClient, MalClientBuilder};
pub use error::{MalError, Result};
pub use shared::config::{DEFAULT_BASE_URL, DEFAULT_USER_AGENT};
pub use types::*;
pub use xml::XmlError;
