//! Turns user supplied links into registered sources.

use std::time::Duration;

use chrono::Utc;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use tracing::{info, warn};
use url::Url;

use crate::db::{Database, Source};
use crate::error::{Error, Result};

fn parse_http_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim()).map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(Error::InvalidUrl(url.to_string()));
    }
    Ok(parsed)
}

/// `scheme://host[:port]` of any http(s) URL, without path or query.
pub fn derive_site_root(url: &str) -> Result<String> {
    let parsed = parse_http_url(url)?;
    let host = parsed.host_str().unwrap_or_default();
    Ok(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

/// Conventional feed location of a site: `scheme://host/rss`.
pub fn derive_feed_url(url: &str) -> Result<String> {
    Ok(format!("{}/rss", derive_site_root(url)?))
}

/// A feed's description of itself.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub name: String,
    pub site_link: String,
    pub feed_self_link: String,
}

#[derive(Clone, Copy)]
enum ChannelField {
    Title,
    Link,
}

fn self_link_href(element: &BytesStart) -> Option<String> {
    if element.name().as_ref() != b"atom:link" {
        return None;
    }

    let mut href = None;
    let mut rel = None;
    for attr in element.attributes().flatten() {
        match attr.key.as_ref() {
            b"href" => href = Some(String::from_utf8_lossy(&attr.value).trim().to_string()),
            b"rel" => rel = Some(String::from_utf8_lossy(&attr.value).to_string()),
            _ => {}
        }
    }

    match rel.as_deref() {
        None | Some("self") => href.filter(|h| !h.is_empty()),
        Some(_) => None,
    }
}

fn is_absolute_http(link: &str) -> bool {
    link.starts_with("http") && Url::parse(link).is_ok()
}

/// Parse the channel title, the channel `<link>` and the self-referencing
/// `atom:link` out of an RSS document.
pub fn parse_source_info(xml: &[u8], feed_url: &str) -> Result<SourceInfo> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    let mut channel_depth: Option<usize> = None;
    let mut capture: Option<ChannelField> = None;
    let mut title: Option<String> = None;
    let mut link: Option<String> = None;
    let mut self_link: Option<String> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::SourceInfoUnavailable(format!("{}: {}", feed_url, e)))?;

        match event {
            Event::Start(e) => {
                match channel_depth {
                    None if e.local_name().as_ref() == b"channel" => {
                        channel_depth = Some(depth + 1);
                    }
                    Some(d) if depth == d => match e.name().as_ref() {
                        b"title" if title.is_none() => {
                            title = Some(String::new());
                            capture = Some(ChannelField::Title);
                        }
                        b"link" if link.is_none() => {
                            link = Some(String::new());
                            capture = Some(ChannelField::Link);
                        }
                        _ => {}
                    },
                    _ => {}
                }
                if self_link.is_none() {
                    self_link = self_link_href(&e);
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if self_link.is_none() {
                    self_link = self_link_href(&e);
                }
            }
            Event::Text(e) => {
                if let Some(field) = capture {
                    let text = e
                        .unescape()
                        .map_err(|e| Error::SourceInfoUnavailable(format!("{}: {}", feed_url, e)))?;
                    let target = match field {
                        ChannelField::Title => &mut title,
                        ChannelField::Link => &mut link,
                    };
                    target.get_or_insert_with(String::new).push_str(&text);
                }
            }
            Event::CData(e) => {
                if let Some(field) = capture {
                    let target = match field {
                        ChannelField::Title => &mut title,
                        ChannelField::Link => &mut link,
                    };
                    target
                        .get_or_insert_with(String::new)
                        .push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(_) => {
                capture = None;
                depth = depth.saturating_sub(1);
                if matches!(channel_depth, Some(d) if depth < d) {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if channel_depth.is_none() {
        return Err(Error::UnreachableSource(format!(
            "{}: no channel element in feed",
            feed_url
        )));
    }

    let site_link = match link.map(|l| l.trim().to_string()) {
        Some(l) if is_absolute_http(&l) => l,
        _ => derive_site_root(feed_url)?,
    };

    Ok(SourceInfo {
        name: title.unwrap_or_default().trim().to_string(),
        site_link,
        feed_self_link: self_link.unwrap_or_else(|| feed_url.to_string()),
    })
}

pub struct SourceResolver {
    client: Client,
}

impl SourceResolver {
    pub fn new(timeout: Duration, user_agent: &str) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    pub async fn fetch_source_info(&self, feed_url: &str) -> Result<SourceInfo> {
        let unreachable = |e: reqwest::Error| Error::UnreachableSource(format!("{}: {}", feed_url, e));

        let response = self
            .client
            .get(feed_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(unreachable)?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::SourceInfoUnavailable(format!("{}: {}", feed_url, e)))?;

        parse_source_info(&bytes, feed_url)
    }

    /// Register the site behind `url` as a new source.
    pub async fn register(&self, db: &Database, url: &str) -> Result<Source> {
        let feed_url = derive_feed_url(url)?;
        let root_url = derive_site_root(url)?;

        if db.get_source_by_root_url(&root_url).await?.is_some() {
            return Err(Error::DuplicateSource(root_url));
        }

        let info = match self.fetch_source_info(&feed_url).await {
            Ok(info) => info,
            Err(e) => {
                warn!("Source discovery failed for {}: {}", feed_url, e);
                return Err(e);
            }
        };

        let source = db
            .insert_source(&info.name, &root_url, &info.feed_self_link, Utc::now())
            .await?;
        info!(
            "Registered source '{}' ({}) reading {}",
            source.name, source.root_url, source.scrape_url
        );
        Ok(source)
    }
}
