use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use tracing::{error, info};

use crate::ai::Summarizer;
use crate::db::{Database, Paper, SourcedArticle};
use crate::error::{Error, Result};

/// `[start, end)` of the UTC day containing `date`.
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::default()).and_utc();
    (start, start + Duration::days(1))
}

/// Group contents by source name, keeping the order in which sources first appear.
fn group_by_source(articles: &[SourcedArticle]) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for article in articles {
        let slot = *index.entry(article.source_name.as_str()).or_insert_with(|| {
            groups.push((article.source_name.clone(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(article.content.clone());
    }

    groups
}

pub struct DailyAggregator {
    db: Arc<Database>,
    summarizer: Arc<dyn Summarizer>,
}

impl DailyAggregator {
    pub fn new(db: Arc<Database>, summarizer: Arc<dyn Summarizer>) -> Self {
        Self { db, summarizer }
    }

    /// Summarize each source's articles and join the results into one digest.
    /// The first failing group aborts the whole digest.
    pub async fn build_daily_digest(&self, articles: &[SourcedArticle]) -> Result<String> {
        if articles.is_empty() {
            return Err(Error::NoArticlesToday);
        }

        let mut digest = String::new();
        for (source_name, contents) in group_by_source(articles) {
            let summary = self.summarizer.summarize(&contents).await.map_err(|e| {
                error!("Failed to summarize articles from '{}': {}", source_name, e);
                Error::GroupSummaryFailed {
                    source_name: source_name.clone(),
                    cause: Box::new(e),
                }
            })?;
            digest.push_str(&format!("{}:\n\n{}\n\n", source_name, summary));
        }

        Ok(digest)
    }

    /// Build and store the paper for the UTC day of `now`.
    pub async fn generate_daily_paper(&self, now: DateTime<Utc>) -> Result<Paper> {
        let today = now.date_naive();
        let day = today.format("%Y-%m-%d").to_string();

        if self.db.get_paper_by_day(&day).await?.is_some() {
            return Err(Error::PaperAlreadyExists(day));
        }

        let (start, end) = day_bounds(today);
        let articles = self.db.get_articles_for_digest(start, end).await?;
        info!("Building daily paper for {} from {} articles", day, articles.len());

        let digest = self.build_daily_digest(&articles).await?;
        let paper = self.db.insert_paper(now, &digest).await?;

        info!("Stored daily paper {} for {}", paper.id, day);
        Ok(paper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewArticle;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Records every call and answers with a canned summary.
    #[derive(Default)]
    struct RecordingSummarizer {
        calls: Mutex<Vec<Vec<String>>>,
        fail_on: Option<String>,
    }

    #[async_trait::async_trait]
    impl Summarizer for RecordingSummarizer {
        async fn summarize(&self, contents: &[String]) -> Result<String> {
            if contents.is_empty() {
                return Err(Error::EmptyInput);
            }
            self.calls.lock().unwrap().push(contents.to_vec());
            if let Some(marker) = &self.fail_on {
                if contents.iter().any(|c| c.contains(marker.as_str())) {
                    return Err(Error::SummarizationUnavailable("model overloaded".to_string()));
                }
            }
            Ok(format!("{} stories", contents.len()))
        }
    }

    fn sourced(source_name: &str, content: &str) -> SourcedArticle {
        SourcedArticle {
            source_name: source_name.to_string(),
            content: content.to_string(),
        }
    }

    async fn aggregator(summarizer: Arc<RecordingSummarizer>) -> (DailyAggregator, Arc<Database>) {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.initialize().await.unwrap();
        let db = Arc::new(db);
        (DailyAggregator::new(db.clone(), summarizer), db)
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_day_bounds() {
        let (start, end) = day_bounds(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_group_by_source_keeps_first_seen_order() {
        let articles = vec![
            sourced("Beta", "b1"),
            sourced("Alpha", "a1"),
            sourced("Beta", "b2"),
        ];

        let groups = group_by_source(&articles);
        assert_eq!(
            groups,
            vec![
                ("Beta".to_string(), vec!["b1".to_string(), "b2".to_string()]),
                ("Alpha".to_string(), vec!["a1".to_string()]),
            ]
        );
    }

    mod build_daily_digest_tests {
        use super::*;

        #[tokio::test]
        async fn test_no_articles() {
            let summarizer = Arc::new(RecordingSummarizer::default());
            let (aggregator, _db) = aggregator(summarizer.clone()).await;

            let result = aggregator.build_daily_digest(&[]).await;
            assert!(matches!(result, Err(Error::NoArticlesToday)));
            assert!(summarizer.calls.lock().unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_same_source_makes_one_group() {
            let summarizer = Arc::new(RecordingSummarizer::default());
            let (aggregator, _db) = aggregator(summarizer.clone()).await;

            let digest = aggregator
                .build_daily_digest(&[sourced("Example News", "one"), sourced("Example News", "two")])
                .await
                .unwrap();

            assert_eq!(digest, "Example News:\n\n2 stories\n\n");
            assert_eq!(
                *summarizer.calls.lock().unwrap(),
                vec![vec!["one".to_string(), "two".to_string()]]
            );
        }

        #[tokio::test]
        async fn test_groups_in_first_seen_order() {
            let summarizer = Arc::new(RecordingSummarizer::default());
            let (aggregator, _db) = aggregator(summarizer).await;

            let digest = aggregator
                .build_daily_digest(&[
                    sourced("Daily Planet", "p1"),
                    sourced("Gazette", "g1"),
                    sourced("Daily Planet", "p2"),
                ])
                .await
                .unwrap();

            assert_eq!(digest, "Daily Planet:\n\n2 stories\n\nGazette:\n\n1 stories\n\n");
        }

        #[tokio::test]
        async fn test_failure_names_the_source() {
            let summarizer = Arc::new(RecordingSummarizer {
                fail_on: Some("poison".to_string()),
                ..Default::default()
            });
            let (aggregator, _db) = aggregator(summarizer).await;

            let result = aggregator
                .build_daily_digest(&[sourced("Good", "fine"), sourced("Bad", "poison pill")])
                .await;

            match result {
                Err(Error::GroupSummaryFailed { source_name, cause }) => {
                    assert_eq!(source_name, "Bad");
                    assert!(matches!(*cause, Error::SummarizationUnavailable(_)));
                }
                other => panic!("unexpected result: {:?}", other),
            }
        }
    }

    mod generate_daily_paper_tests {
        use super::*;

        async fn add_article(db: &Database, source_id: i64, key: &str, pub_date: DateTime<Utc>) {
            db.insert_article(&NewArticle {
                source_id,
                title: key.to_string(),
                dedup_key: key.to_string(),
                description: None,
                link: format!("https://example.com/{}", key),
                pub_date,
                content: format!("content {}", key),
            })
            .await
            .unwrap();
        }

        #[tokio::test]
        async fn test_stores_one_paper_from_todays_articles() {
            let summarizer = Arc::new(RecordingSummarizer::default());
            let (aggregator, db) = aggregator(summarizer.clone()).await;
            let source = db
                .insert_source("Example News", "https://example.com", "https://example.com/rss", noon())
                .await
                .unwrap();

            add_article(&db, source.id, "today-1", noon() - Duration::hours(3)).await;
            add_article(&db, source.id, "today-2", noon() - Duration::hours(1)).await;
            add_article(&db, source.id, "yesterday", noon() - Duration::days(1)).await;

            let paper = aggregator.generate_daily_paper(noon()).await.unwrap();

            assert_eq!(paper.day, "2025-03-10");
            assert_eq!(paper.content, "Example News:\n\n2 stories\n\n");
            assert!(!paper.fact_checked);
            assert_eq!(db.get_all_papers().await.unwrap().len(), 1);
            assert_eq!(
                *summarizer.calls.lock().unwrap(),
                vec![vec!["content today-1".to_string(), "content today-2".to_string()]]
            );
        }

        #[tokio::test]
        async fn test_no_articles_today_stores_nothing() {
            let summarizer = Arc::new(RecordingSummarizer::default());
            let (aggregator, db) = aggregator(summarizer).await;

            let result = aggregator.generate_daily_paper(noon()).await;

            assert!(matches!(result, Err(Error::NoArticlesToday)));
            assert!(db.get_all_papers().await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_summary_failure_stores_nothing() {
            let summarizer = Arc::new(RecordingSummarizer {
                fail_on: Some("poison".to_string()),
                ..Default::default()
            });
            let (aggregator, db) = aggregator(summarizer).await;
            let source = db
                .insert_source("Example News", "https://example.com", "https://example.com/rss", noon())
                .await
                .unwrap();
            add_article(&db, source.id, "poison", noon()).await;

            let result = aggregator.generate_daily_paper(noon()).await;

            assert!(matches!(result, Err(Error::GroupSummaryFailed { .. })));
            assert!(db.get_all_papers().await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_second_run_same_day_is_rejected() {
            let summarizer = Arc::new(RecordingSummarizer::default());
            let (aggregator, db) = aggregator(summarizer.clone()).await;
            let source = db
                .insert_source("Example News", "https://example.com", "https://example.com/rss", noon())
                .await
                .unwrap();
            add_article(&db, source.id, "story", noon()).await;

            aggregator.generate_daily_paper(noon()).await.unwrap();
            let result = aggregator
                .generate_daily_paper(noon() + Duration::hours(2))
                .await;

            assert!(matches!(result, Err(Error::PaperAlreadyExists(day)) if day == "2025-03-10"));
            assert_eq!(summarizer.calls.lock().unwrap().len(), 1);
        }
    }
}
