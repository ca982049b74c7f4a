//! Catalog scanner: lists the remote archive objects by parsing the bucket
//! listing document.

use quick_xml::events::Event;
use quick_xml::Reader;
use url::Url;

use crate::config::ARCHIVE_EXTENSION;
use crate::error::IngestError;
use crate::fetch::RemoteArchiveRef;

pub struct CatalogScanner {
    http: reqwest::Client,
    base_url: String,
}

impl CatalogScanner {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Issue a single GET of the listing endpoint and return every archive
    /// entry as an absolute URL, in listing order. No retry; the caller
    /// decides what to do on failure.
    pub async fn scan(&self) -> Result<Vec<RemoteArchiveRef>, IngestError> {
        let response = self
            .http
            .get(&self.base_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| IngestError::Fetch {
                url: self.base_url.clone(),
                source: e,
            })?;

        let body = response.text().await.map_err(|e| IngestError::Fetch {
            url: self.base_url.clone(),
            source: e,
        })?;

        let urls = parse_listing(&body, &self.base_url)?;
        tracing::info!(count = urls.len(), "catalog scan found archives");

        Ok(urls.into_iter().map(RemoteArchiveRef::new).collect())
    }
}

/// Extract the text of every `<Key>` element ending in the archive extension
/// and resolve it against the base URL. Order follows the document.
pub fn parse_listing(body: &str, base_url: &str) -> Result<Vec<String>, IngestError> {
    let base = Url::parse(base_url).map_err(|e| IngestError::BadUrl {
        base: base_url.to_string(),
        source: e,
    })?;

    let mut reader = Reader::from_str(body);
    let mut urls = Vec::new();
    let mut in_key = false;
    let mut key = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"Key" => {
                in_key = true;
                key.clear();
            }
            Event::Text(t) if in_key => {
                key.push_str(&t.unescape().map_err(quick_xml::Error::from)?);
            }
            Event::End(e) if e.name().as_ref() == b"Key" => {
                in_key = false;
                let trimmed = key.trim();
                if trimmed.ends_with(ARCHIVE_EXTENSION) {
                    let resolved = base.join(trimmed).map_err(|e| IngestError::BadUrl {
                        base: base_url.to_string(),
                        source: e,
                    })?;
                    urls.push(resolved.to_string());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(urls)
}
