use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Background refresh interval in minutes, 0 disables it
    #[serde(default)]
    pub refresh_interval: u64,
    /// How far back feed entries are still ingested
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_database_url() -> String {
    "sqlite:fact_news.db?mode=rwc".to_string()
}

fn default_lookback_hours() -> i64 {
    48
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_source_info_timeout")]
    pub source_info_timeout_secs: u64,
    #[serde(default = "default_feed_timeout")]
    pub feed_timeout_secs: u64,
    #[serde(default = "default_article_timeout")]
    pub article_timeout_secs: u64,
    /// Maximum number of article pages fetched at once per feed
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_source_info_timeout() -> u64 {
    10
}

fn default_feed_timeout() -> u64 {
    30
}

fn default_article_timeout() -> u64 {
    5
}

fn default_fetch_concurrency() -> usize {
    4
}

fn default_user_agent() -> String {
    "FactNews/1.0 (News Fact Checker)".to_string()
}

impl HttpConfig {
    pub fn source_info_timeout(&self) -> Duration {
        Duration::from_secs(self.source_info_timeout_secs)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    pub fn article_timeout(&self) -> Duration {
        Duration::from_secs(self.article_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            source_info_timeout_secs: default_source_info_timeout(),
            feed_timeout_secs: default_feed_timeout(),
            article_timeout_secs: default_article_timeout(),
            fetch_concurrency: default_fetch_concurrency(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AiConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    #[serde(default = "default_ai_timeout")]
    pub timeout_secs: u64,
    /// Dynamic retrieval threshold for the search tool used while fact checking
    #[serde(default = "default_search_threshold")]
    pub search_threshold: f32,
    /// JSON file with `fact_checker` and `summarizer` prompts, overrides the inline ones
    #[serde(default)]
    pub context_path: Option<String>,
    #[serde(default = "default_fact_checker_prompt")]
    pub fact_checker_prompt: String,
    #[serde(default = "default_summarizer_prompt")]
    pub summarizer_prompt: String,
}

fn default_model() -> String {
    "gemini-2.0-flash-lite".to_string()
}

fn default_ai_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_ai_timeout() -> u64 {
    60
}

fn default_search_threshold() -> f32 {
    0.3
}

fn default_fact_checker_prompt() -> String {
    "You are a fact checker. Verify the factual claims in the given news text \
against reliable sources and report which claims hold, which are disputed and \
which could not be verified."
        .to_string()
}

fn default_summarizer_prompt() -> String {
    "You are a news editor. Summarize the given list of articles from one outlet \
into a short digest covering the key stories."
        .to_string()
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: String::new(),
            base_url: default_ai_base_url(),
            timeout_secs: default_ai_timeout(),
            search_threshold: default_search_threshold(),
            context_path: None,
            fact_checker_prompt: default_fact_checker_prompt(),
            summarizer_prompt: default_summarizer_prompt(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PromptContexts {
    fact_checker: String,
    summarizer: String,
}

impl AiConfig {
    /// Replace the inline prompts with the ones from `context_path`, if set.
    pub fn load_prompts(&mut self) -> anyhow::Result<()> {
        let Some(path) = &self.context_path else {
            return Ok(());
        };
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Context file not found ({}): {}", path, e))?;
        let contexts: PromptContexts = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Context file contains invalid JSON: {}", e))?;
        self.fact_checker_prompt = contexts.fact_checker;
        self.summarizer_prompt = contexts.summarizer;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            database_url: default_database_url(),
            refresh_interval: 0,
            lookback_hours: default_lookback_hours(),
            allowed_origins: default_allowed_origins(),
            http: HttpConfig::default(),
            ai: AiConfig::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the config file when present, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply `DATABASE_URL`, `GEMINI_API_KEY` and `CONTEXT_FILE_PATH` overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.ai.api_key = key;
        }
        if let Some(path) = lookup("CONTEXT_FILE_PATH") {
            self.ai.context_path = Some(path);
        }
    }
}
