use tracing::{info, warn};

use crate::ai::FactChecker;
use crate::db::{Article, Database, Paper};
use crate::error::{Error, Result};

/// Fact-check a stored article. The record is only touched on success.
pub async fn fact_check_article(
    db: &Database,
    checker: &dyn FactChecker,
    article_id: i64,
) -> Result<Article> {
    let article = db
        .get_article(article_id)
        .await?
        .ok_or_else(|| Error::not_found("Article", article_id))?;

    let report = checker.fact_check(&article.content).await.map_err(|e| {
        warn!("Fact check of article {} failed: {}", article_id, e);
        e
    })?;

    db.set_article_fact_check(article_id, &report).await?;
    info!("Fact checked article {} ('{}')", article_id, article.title);

    db.get_article(article_id)
        .await?
        .ok_or_else(|| Error::not_found("Article", article_id))
}

/// Fact-check a stored daily paper. The record is only touched on success.
pub async fn fact_check_paper(
    db: &Database,
    checker: &dyn FactChecker,
    paper_id: i64,
) -> Result<Paper> {
    let paper = db
        .get_paper(paper_id)
        .await?
        .ok_or_else(|| Error::not_found("Paper", paper_id))?;

    let report = checker.fact_check(&paper.content).await.map_err(|e| {
        warn!("Fact check of paper {} failed: {}", paper_id, e);
        e
    })?;

    db.set_paper_fact_check(paper_id, &report).await?;
    info!("Fact checked paper {} for {}", paper_id, paper.day);

    db.get_paper(paper_id)
        .await?
        .ok_or_else(|| Error::not_found("Paper", paper_id))
}
