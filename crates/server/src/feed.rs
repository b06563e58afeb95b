//! Torznab feed encoding.
//!
//! Search results are rendered as an RSS 2.0 channel extended with
//! `torznab:attr` elements, the format indexer managers consume.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use sha2::{Digest, Sha256};
use thiserror::Error;

use forumdex_core::EpisodeRecord;

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const TORZNAB_NS: &str = "http://torznab.com/schemas/2015/feed";
const CHANNEL_TITLE: &str = "forumdex";
const CHANNEL_DESCRIPTION: &str = "Forum indexer for TV series";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("XML write failed: {0}")]
    Write(String),
}

/// Renders search results and protocol documents for an indexer client.
pub trait FeedEncoder: Send + Sync {
    fn content_type(&self) -> &'static str;

    /// Feed of episode records.
    fn encode(&self, records: &[EpisodeRecord]) -> Result<String, FeedError>;

    /// Capabilities document.
    fn capabilities(&self) -> Result<String, FeedError>;

    /// Error document.
    fn error(&self, code: u16, description: &str) -> Result<String, FeedError>;
}

/// Stable item identifier: thread, season and episode plus a short digest of
/// the release URI, so two releases of the same episode stay distinct.
pub fn item_guid(record: &EpisodeRecord) -> String {
    let digest = Sha256::digest(record.release_link.uri.as_bytes());
    let short: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    format!(
        "forumdex-{}-{}-{}-{}",
        record.thread_id,
        record.season.unwrap_or(0),
        record.episode.unwrap_or(0),
        short
    )
}

/// Torznab dialect of RSS 2.0.
#[derive(Debug, Clone)]
pub struct TorznabEncoder {
    server_version: String,
}

impl TorznabEncoder {
    pub fn new(server_version: impl Into<String>) -> Self {
        Self {
            server_version: server_version.into(),
        }
    }
}

impl Default for TorznabEncoder {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"))
    }
}

struct Xml {
    writer: Writer<Vec<u8>>,
}

impl Xml {
    fn new() -> Result<Self, FeedError> {
        let mut xml = Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        };
        xml.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(xml)
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), FeedError> {
        self.writer
            .write_event(event)
            .map_err(|e| FeedError::Write(e.to_string()))
    }

    fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), FeedError> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.event(Event::Start(start))
    }

    fn close(&mut self, name: &str) -> Result<(), FeedError> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), FeedError> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.event(Event::Empty(start))
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<(), FeedError> {
        self.open(name, &[])?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.close(name)
    }

    fn finish(self) -> Result<String, FeedError> {
        String::from_utf8(self.writer.into_inner()).map_err(|e| FeedError::Write(e.to_string()))
    }
}

impl TorznabEncoder {
    fn write_item(&self, xml: &mut Xml, record: &EpisodeRecord) -> Result<(), FeedError> {
        let size = record.size_bytes.to_string();
        xml.open("item", &[])?;
        xml.text_element("title", &record.title)?;
        xml.text_element("guid", &item_guid(record))?;
        xml.text_element("link", &record.thread_url)?;
        xml.text_element("comments", &record.thread_url)?;
        xml.text_element("pubDate", &record.publish_time.to_rfc2822())?;
        xml.text_element("size", &size)?;
        xml.empty(
            "enclosure",
            &[
                ("url", record.release_link.uri.as_str()),
                ("length", size.as_str()),
                ("type", "application/x-bittorrent"),
            ],
        )?;

        let mut attrs = vec![
            ("category", record.category.to_string()),
            ("size", size.clone()),
            ("seeders", record.release_link.seeders.to_string()),
            ("peers", record.release_link.peers.to_string()),
            ("magneturl", record.release_link.uri.clone()),
        ];
        if let Some(season) = record.season {
            attrs.push(("season", season.to_string()));
        }
        if let Some(episode) = record.episode {
            attrs.push(("episode", episode.to_string()));
        }
        for (name, value) in &attrs {
            xml.empty("torznab:attr", &[("name", *name), ("value", value.as_str())])?;
        }

        xml.close("item")
    }
}

impl FeedEncoder for TorznabEncoder {
    fn content_type(&self) -> &'static str {
        "application/xml; charset=utf-8"
    }

    fn encode(&self, records: &[EpisodeRecord]) -> Result<String, FeedError> {
        let mut xml = Xml::new()?;
        xml.open(
            "rss",
            &[
                ("version", "2.0"),
                ("xmlns:atom", ATOM_NS),
                ("xmlns:torznab", TORZNAB_NS),
            ],
        )?;
        xml.open("channel", &[])?;
        xml.text_element("title", CHANNEL_TITLE)?;
        xml.text_element("description", CHANNEL_DESCRIPTION)?;
        for record in records {
            self.write_item(&mut xml, record)?;
        }
        xml.close("channel")?;
        xml.close("rss")?;
        xml.finish()
    }

    fn capabilities(&self) -> Result<String, FeedError> {
        let mut xml = Xml::new()?;
        xml.open("caps", &[])?;
        xml.empty(
            "server",
            &[("version", self.server_version.as_str()), ("title", CHANNEL_TITLE)],
        )?;
        xml.empty("limits", &[("max", "100"), ("default", "25")])?;

        xml.open("searching", &[])?;
        xml.empty("search", &[("available", "yes"), ("supportedParams", "q,cat")])?;
        xml.empty(
            "tv-search",
            &[("available", "yes"), ("supportedParams", "q,season,ep,cat")],
        )?;
        xml.close("searching")?;

        xml.open("categories", &[])?;
        xml.empty("category", &[("id", "2000"), ("name", "Movies")])?;
        xml.open("category", &[("id", "5000"), ("name", "TV")])?;
        xml.empty("subcat", &[("id", "5070"), ("name", "Anime")])?;
        xml.close("category")?;
        xml.empty("category", &[("id", "7000"), ("name", "Books")])?;
        xml.empty("category", &[("id", "3000"), ("name", "Music")])?;
        xml.close("categories")?;

        xml.close("caps")?;
        xml.finish()
    }

    fn error(&self, code: u16, description: &str) -> Result<String, FeedError> {
        let code = code.to_string();
        let mut xml = Xml::new()?;
        xml.empty("error", &[("code", code.as_str()), ("description", description)])?;
        xml.finish()
    }
}
