use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, FromRow, QueryBuilder, Sqlite, SqlitePool};

use crate::error::{Error, Result};

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub creation_timestamp: String,
    pub root_url: String,
    pub scrape_url: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Article {
    pub id: i64,
    pub source_id: i64,
    pub title: String,
    pub dedup_key: String,
    pub description: Option<String>,
    pub link: String,
    pub pub_date: String,
    pub content: String,
    pub fact_checked: bool,
    pub fact_summary: Option<String>,
}

/// An ingested entry ready to be stored under a source
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub source_id: i64,
    pub title: String,
    pub dedup_key: String,
    pub description: Option<String>,
    pub link: String,
    pub pub_date: DateTime<Utc>,
    pub content: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Paper {
    pub id: i64,
    pub pub_date: String,
    pub day: String,
    pub content: String,
    pub fact_checked: bool,
    pub fact_summary: Option<String>,
}

/// Article content together with the display name of its source
#[derive(Debug, Clone, FromRow)]
pub struct SourcedArticle {
    pub source_name: String,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub source_id: Option<i64>,
    /// Inclusive lower bound on the publication timestamp
    pub published_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the publication timestamp
    pub published_to: Option<DateTime<Utc>>,
    /// Case-insensitive substring of the title
    pub title_contains: Option<String>,
}

/// Storage format for timestamps. Fixed width so string order is time order.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        // Every connection to an in-memory database is a separate database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                creation_timestamp TEXT NOT NULL,
                root_url TEXT NOT NULL UNIQUE,
                scrape_url TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY,
                source_id INTEGER NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                title_folded TEXT NOT NULL,
                dedup_key TEXT NOT NULL UNIQUE,
                description TEXT,
                link TEXT NOT NULL,
                pub_date TEXT NOT NULL,
                content TEXT NOT NULL,
                fact_checked INTEGER NOT NULL DEFAULT 0,
                fact_summary TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_articles_pub_date
            ON articles(pub_date DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS papers (
                id INTEGER PRIMARY KEY,
                pub_date TEXT NOT NULL,
                day TEXT NOT NULL UNIQUE,
                content TEXT NOT NULL,
                fact_checked INTEGER NOT NULL DEFAULT 0,
                fact_summary TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_source(
        &self,
        name: &str,
        root_url: &str,
        scrape_url: &str,
        created: DateTime<Utc>,
    ) -> Result<Source> {
        let result = sqlx::query(
            r#"
            INSERT INTO sources (name, creation_timestamp, root_url, scrape_url)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(format_timestamp(created))
        .bind(root_url)
        .bind(scrape_url)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::DuplicateSource(root_url.to_string())
            } else {
                Error::Database(e)
            }
        })?;

        let id = result.last_insert_rowid();
        self.get_source(id)
            .await?
            .ok_or_else(|| Error::not_found("Source", id))
    }

    pub async fn get_all_sources(&self) -> Result<Vec<Source>> {
        let sources = sqlx::query_as::<_, Source>("SELECT * FROM sources ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(sources)
    }

    pub async fn get_source(&self, source_id: i64) -> Result<Option<Source>> {
        let source = sqlx::query_as::<_, Source>("SELECT * FROM sources WHERE id = ?")
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(source)
    }

    pub async fn get_source_by_root_url(&self, root_url: &str) -> Result<Option<Source>> {
        let source = sqlx::query_as::<_, Source>("SELECT * FROM sources WHERE root_url = ?")
            .bind(root_url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(source)
    }

    /// Delete a source and all of its articles.
    pub async fn delete_source(&self, source_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM articles WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(Error::not_found("Source", source_id));
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_dedup_keys_for_source(&self, source_id: i64) -> Result<Vec<String>> {
        let keys: Vec<(String,)> =
            sqlx::query_as("SELECT dedup_key FROM articles WHERE source_id = ?")
                .bind(source_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(keys.into_iter().map(|(key,)| key).collect())
    }

    /// Store a new article. Returns false when the dedup key is already taken
    /// by any article; existing rows are never updated.
    pub async fn insert_article(&self, article: &NewArticle) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles
                (source_id, title, title_folded, dedup_key, description, link, pub_date, content)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(dedup_key) DO NOTHING
            "#,
        )
        .bind(article.source_id)
        .bind(&article.title)
        .bind(article.title.to_lowercase())
        .bind(&article.dedup_key)
        .bind(&article.description)
        .bind(&article.link)
        .bind(format_timestamp(article.pub_date))
        .bind(&article.content)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_article(&self, article_id: i64) -> Result<Option<Article>> {
        let article = sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE id = ?")
            .bind(article_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(article)
    }

    pub async fn query_articles(&self, filter: &ArticleFilter) -> Result<Vec<Article>> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM articles WHERE 1 = 1");

        if let Some(source_id) = filter.source_id {
            query.push(" AND source_id = ").push_bind(source_id);
        }
        if let Some(from) = filter.published_from {
            query.push(" AND pub_date >= ").push_bind(format_timestamp(from));
        }
        if let Some(to) = filter.published_to {
            query.push(" AND pub_date < ").push_bind(format_timestamp(to));
        }
        if let Some(search) = filter.title_contains.as_deref().filter(|s| !s.is_empty()) {
            // SQLite's lower() only folds ASCII
            query
                .push(" AND instr(title_folded, ")
                .push_bind(search.to_lowercase())
                .push(") > 0");
        }
        query.push(" ORDER BY pub_date DESC, id DESC");

        let articles = query
            .build_query_as::<Article>()
            .fetch_all(&self.pool)
            .await?;
        Ok(articles)
    }

    /// Articles published in `[from, to)` with their source names, oldest first.
    pub async fn get_articles_for_digest(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SourcedArticle>> {
        let articles = sqlx::query_as::<_, SourcedArticle>(
            r#"
            SELECT sources.name AS source_name, articles.content AS content
            FROM articles
            JOIN sources ON sources.id = articles.source_id
            WHERE articles.pub_date >= ? AND articles.pub_date < ?
            ORDER BY articles.pub_date ASC, articles.id ASC
            "#,
        )
        .bind(format_timestamp(from))
        .bind(format_timestamp(to))
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    pub async fn set_article_fact_check(&self, article_id: i64, summary: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE articles SET fact_checked = 1, fact_summary = ? WHERE id = ?",
        )
        .bind(summary)
        .bind(article_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Article", article_id));
        }
        Ok(())
    }

    pub async fn insert_paper(&self, pub_date: DateTime<Utc>, content: &str) -> Result<Paper> {
        let day = pub_date.date_naive().format("%Y-%m-%d").to_string();

        let result = sqlx::query("INSERT INTO papers (pub_date, day, content) VALUES (?, ?, ?)")
            .bind(format_timestamp(pub_date))
            .bind(&day)
            .bind(content)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::PaperAlreadyExists(day.clone())
                } else {
                    Error::Database(e)
                }
            })?;

        let id = result.last_insert_rowid();
        self.get_paper(id)
            .await?
            .ok_or_else(|| Error::not_found("Paper", id))
    }

    pub async fn get_paper(&self, paper_id: i64) -> Result<Option<Paper>> {
        let paper = sqlx::query_as::<_, Paper>("SELECT * FROM papers WHERE id = ?")
            .bind(paper_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(paper)
    }

    /// Look up the paper for a `YYYY-MM-DD` day.
    pub async fn get_paper_by_day(&self, day: &str) -> Result<Option<Paper>> {
        let paper = sqlx::query_as::<_, Paper>("SELECT * FROM papers WHERE day = ?")
            .bind(day)
            .fetch_optional(&self.pool)
            .await?;
        Ok(paper)
    }

    pub async fn get_all_papers(&self) -> Result<Vec<Paper>> {
        let papers = sqlx::query_as::<_, Paper>("SELECT * FROM papers ORDER BY pub_date DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(papers)
    }

    pub async fn set_paper_fact_check(&self, paper_id: i64, summary: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE papers SET fact_checked = 1, fact_summary = ? WHERE id = ?")
                .bind(summary)
                .bind(paper_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Paper", paper_id));
        }
        Ok(())
    }
}
