use std::sync::LazyLock;
use std::time::Duration;

use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

/// Likely content containers, in priority order
const CONTAINER_SELECTORS: [&str; 5] = [
    "div.article-content",
    "div.article-body",
    "div.entry-content",
    "article",
    "div#main-content",
];

static CONTAINERS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    CONTAINER_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).expect("static container selector"))
        .collect()
});

static PARAGRAPH: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("static paragraph selector"));

/// Fetches article pages and pulls out their main text.
#[derive(Clone)]
pub struct ContentExtractor {
    client: Client,
}

impl ContentExtractor {
    pub fn new(timeout: Duration, user_agent: &str) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Best effort: any failure yields an empty string.
    pub async fn extract_main_text(&self, article_url: &str) -> String {
        match self.fetch_page(article_url).await {
            Ok(html) => {
                let text = Self::extract_from_html(&html);
                debug!("Extracted {} chars from {}", text.len(), article_url);
                text
            }
            Err(e) => {
                warn!("Error scraping content from {}: {}", article_url, e);
                String::new()
            }
        }
    }

    async fn fetch_page(&self, url: &str) -> reqwest::Result<String> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }

    /// Paragraph text of the first container that has paragraphs, falling
    /// back to every paragraph in the document.
    pub fn extract_from_html(html: &str) -> String {
        let document = Html::parse_document(html);

        for selector in CONTAINERS.iter() {
            if let Some(container) = document.select(selector).next() {
                let paragraphs: Vec<ElementRef> = container.select(&PARAGRAPH).collect();
                if !paragraphs.is_empty() {
                    return join_paragraphs(paragraphs);
                }
            }
        }

        join_paragraphs(document.select(&PARAGRAPH).collect())
    }
}

fn join_paragraphs(paragraphs: Vec<ElementRef>) -> String {
    paragraphs
        .iter()
        .map(|p| p.text().collect::<String>().trim().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
