use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use feed_rs::parser::{self, ParseFeedError};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::HttpConfig;
use crate::db::{Database, NewArticle, Source};
use crate::dedup::compute_key;
use crate::error::{Error, Result};
use crate::extractor::ContentExtractor;
use crate::resolver::derive_site_root;

/// A feed item that survived the recency and dedup filters.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub description: String,
    pub link: String,
    pub pub_date: DateTime<Utc>,
    pub dedup_key: String,
    pub content: String,
}

pub struct FeedReader {
    client: Client,
    extractor: ContentExtractor,
    concurrency: usize,
}

impl FeedReader {
    pub fn new(http: &HttpConfig) -> Self {
        let client = Client::builder()
            .timeout(http.feed_timeout())
            .user_agent(http.user_agent.as_str())
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            extractor: ContentExtractor::new(http.article_timeout(), &http.user_agent),
            concurrency: http.fetch_concurrency.max(1),
        }
    }

    /// Entries of `feed_url` published within the last `lookback_hours` whose
    /// key is not in `known_keys`, each with its extracted article text.
    ///
    /// A feed that cannot be fetched or parsed yields no entries.
    pub async fn fetch_entries(
        &self,
        feed_url: &str,
        lookback_hours: i64,
        known_keys: &HashSet<String>,
    ) -> Vec<FeedEntry> {
        let bytes = match self.fetch_feed(feed_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Error fetching feed {}: {}", feed_url, e);
                return Vec::new();
            }
        };

        let entries = match Self::select_entries(&bytes, Utc::now(), lookback_hours, known_keys) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Error parsing feed {}: {}", feed_url, e);
                return Vec::new();
            }
        };

        info!("{} new entries in {}", entries.len(), feed_url);

        stream::iter(entries)
            .map(|mut entry| async move {
                entry.content = self.extractor.extract_main_text(&entry.link).await;
                entry
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn fetch_feed(&self, feed_url: &str) -> reqwest::Result<Vec<u8>> {
        let response = self.client.get(feed_url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Parse a feed document and keep the entries that are recent and unseen.
    /// Content is left empty. The cutoff is inclusive: an entry published
    /// exactly `lookback_hours` before `now` is kept.
    pub fn select_entries(
        xml: &[u8],
        now: DateTime<Utc>,
        lookback_hours: i64,
        known_keys: &HashSet<String>,
    ) -> std::result::Result<Vec<FeedEntry>, ParseFeedError> {
        let parsed = parser::parse(xml)?;
        let cutoff = now - chrono::Duration::hours(lookback_hours);

        let mut entries = Vec::new();
        for entry in parsed.entries {
            let title = entry
                .title
                .as_ref()
                .map(|t| t.content.clone())
                .unwrap_or_default();

            // Entries without a usable date never get a key
            let Some(pub_date) = entry.published.or(entry.updated) else {
                continue;
            };

            if pub_date < cutoff {
                continue;
            }

            let dedup_key = compute_key(&title, pub_date);
            if known_keys.contains(&dedup_key) {
                continue;
            }

            let description = entry
                .summary
                .as_ref()
                .map(|s| s.content.clone())
                .unwrap_or_default();

            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();

            entries.push(FeedEntry {
                title,
                description,
                link,
                pub_date,
                dedup_key,
                content: String::new(),
            });
        }

        Ok(entries)
    }
}

/// Stores new feed entries for registered sources.
pub struct Fetcher {
    reader: FeedReader,
    db: Arc<Database>,
    lookback_hours: i64,
    refreshing: Arc<RwLock<bool>>,
}

impl Fetcher {
    pub fn new(db: Arc<Database>, http: &HttpConfig, lookback_hours: i64) -> Self {
        Self {
            reader: FeedReader::new(http),
            db,
            lookback_hours,
            refreshing: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn is_refreshing(&self) -> bool {
        *self.refreshing.read().await
    }

    /// Pull new entries for `source`. Returns how many articles were stored.
    pub async fn update_source(&self, source: &Source) -> Result<usize> {
        let known_keys: HashSet<String> = self
            .db
            .get_dedup_keys_for_source(source.id)
            .await?
            .into_iter()
            .collect();

        let entries = self
            .reader
            .fetch_entries(&source.scrape_url, self.lookback_hours, &known_keys)
            .await;

        let mut count = 0;
        for entry in entries {
            let article = NewArticle {
                source_id: source.id,
                title: entry.title,
                dedup_key: entry.dedup_key,
                description: Some(entry.description).filter(|d| !d.is_empty()),
                link: entry.link,
                pub_date: entry.pub_date,
                content: entry.content,
            };

            if self.db.insert_article(&article).await? {
                count += 1;
            } else {
                info!(
                    "Skipping '{}' from '{}': already stored under another source",
                    article.title, source.name
                );
            }
        }

        info!("Stored {} new articles for source '{}'", count, source.name);
        Ok(count)
    }

    /// Pull new entries for the registered source that `url` belongs to.
    pub async fn update_source_by_url(&self, url: &str) -> Result<usize> {
        let root_url = derive_site_root(url)?;
        let source = self
            .db
            .get_source_by_root_url(&root_url)
            .await?
            .ok_or_else(|| Error::not_found("Source", &root_url))?;

        self.update_source(&source).await
    }

    pub async fn refresh_all_sources(&self) -> Result<()> {
        // Check if already refreshing
        {
            let mut refreshing = self.refreshing.write().await;
            if *refreshing {
                info!("Refresh already in progress, skipping");
                return Ok(());
            }
            *refreshing = true;
        }

        let result = self.do_refresh_all().await;

        // Clear refreshing flag
        {
            let mut refreshing = self.refreshing.write().await;
            *refreshing = false;
        }

        result
    }

    async fn do_refresh_all(&self) -> Result<()> {
        let sources = self.db.get_all_sources().await?;
        info!("Refreshing {} sources", sources.len());

        for source in sources {
            if let Err(e) = self.update_source(&source).await {
                error!("Failed to refresh source '{}': {}", source.name, e);
            }
        }

        info!("Source refresh complete");
        Ok(())
    }
}

pub async fn start_background_refresh(fetcher: Arc<Fetcher>, interval_minutes: u64) {
    let interval = Duration::from_secs(interval_minutes * 60);

    loop {
        info!("Starting scheduled source refresh");
        if let Err(e) = fetcher.refresh_all_sources().await {
            error!("Scheduled source refresh failed: {}", e);
        }
        tokio::time::sleep(interval).await;
    }
}
