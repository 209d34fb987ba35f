//! List Blobs enumeration parsing
//!
//! The gateway only depends on [`BlobListParser`]; the default implementation
//! reads the service's XML enumeration with quick-xml's event reader.

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;

use super::{ObjectRecord, StorageError, DEFAULT_CONTENT_TYPE};

/// Parsed enumeration page
#[derive(Debug, Clone, Default)]
pub struct BlobListing {
    /// Records in service order. `url` is left empty for the gateway to fill.
    pub records: Vec<ObjectRecord>,
    /// Continuation marker, if the service truncated the page
    pub next_marker: Option<String>,
}

/// Turns a list response body into object records
pub trait BlobListParser: Send + Sync {
    fn parse(&self, body: &str) -> Result<BlobListing, StorageError>;
}

/// quick-xml based parser for `EnumerationResults` documents
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlBlobListParser;

/// Parse an RFC 1123 timestamp as used in `Last-Modified`
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn empty_record() -> ObjectRecord {
    ObjectRecord {
        name: String::new(),
        size_bytes: 0,
        content_type: DEFAULT_CONTENT_TYPE.to_string(),
        last_modified: None,
        etag: None,
        url: String::new(),
    }
}

impl BlobListParser for XmlBlobListParser {
    fn parse(&self, body: &str) -> Result<BlobListing, StorageError> {
        let mut listing = BlobListing::default();
        let mut reader = Reader::from_str(body);

        // Element names from the document root down to the current element
        let mut path: Vec<Vec<u8>> = Vec::new();
        let mut text = String::new();
        let mut current: Option<ObjectRecord> = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    let name = e.name().as_ref().to_vec();
                    if name == b"Blob" {
                        current = Some(empty_record());
                    }
                    path.push(name);
                    text.clear();
                }
                Ok(Event::Text(ref e)) => {
                    text.push_str(&String::from_utf8_lossy(e));
                }
                Ok(Event::CData(ref e)) => {
                    text.push_str(&String::from_utf8_lossy(e));
                }
                Ok(Event::GeneralRef(ref e)) => {
                    let entity = String::from_utf8_lossy(e);
                    let resolved = match entity.as_ref() {
                        "amp" => Some('&'),
                        "lt" => Some('<'),
                        "gt" => Some('>'),
                        "quot" => Some('"'),
                        "apos" => Some('\''),
                        _ => e.resolve_char_ref().ok().flatten(),
                    };
                    if let Some(c) = resolved {
                        text.push(c);
                    }
                }
                Ok(Event::End(ref e)) => {
                    let name = e.name().as_ref().to_vec();
                    let parent = path.len().checked_sub(2).and_then(|i| path.get(i)).map(Vec::as_slice);
                    let value = std::mem::take(&mut text);

                    match (parent, name.as_slice()) {
                        (Some(b"Blob"), b"Name") => {
                            if let Some(ref mut rec) = current {
                                rec.name = value;
                            }
                        }
                        (Some(b"Properties"), field) => {
                            if let Some(ref mut rec) = current {
                                let value = value.trim();
                                match field {
                                    b"Content-Length" => rec.size_bytes = value.parse().unwrap_or(0),
                                    b"Content-Type" if !value.is_empty() => rec.content_type = value.to_string(),
                                    b"Last-Modified" => rec.last_modified = parse_http_date(value),
                                    b"Etag" if !value.is_empty() => rec.etag = Some(value.to_string()),
                                    _ => {}
                                }
                            }
                        }
                        (_, b"Blob") => {
                            if let Some(rec) = current.take() {
                                if !rec.name.is_empty() {
                                    listing.records.push(rec);
                                }
                            }
                        }
                        (Some(b"EnumerationResults"), b"NextMarker") => {
                            let marker = value.trim();
                            if !marker.is_empty() {
                                listing.next_marker = Some(marker.to_string());
                            }
                        }
                        _ => {}
                    }
                    path.pop();
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(StorageError::Parse(format!(
                        "Invalid blob list XML at position {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(listing)
    }
}
