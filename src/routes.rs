use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::ai::{FactChecker, Summarizer};
use crate::db::{ArticleFilter, Database};
use crate::digest::{day_bounds, DailyAggregator};
use crate::error::Error;
use crate::factcheck;
use crate::fetcher::Fetcher;
use crate::resolver::SourceResolver;

pub struct AppState {
    pub db: Arc<Database>,
    pub fetcher: Arc<Fetcher>,
    pub resolver: Arc<SourceResolver>,
    pub summarizer: Arc<dyn Summarizer>,
    pub fact_checker: Arc<dyn FactChecker>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/add_source", post(add_source))
        .route("/sources", get(list_sources))
        .route("/remove_source", post(remove_source))
        .route("/update_articles_from_source", post(update_articles_from_source))
        .route("/articles", get(list_articles))
        .route("/fact_check_article", post(check_article))
        .route("/fact_check_paper", post(check_paper))
        .route(
            "/generate_daily_papers",
            get(generate_daily_papers).post(generate_daily_papers),
        )
        .route("/papers", get(get_papers))
        .route("/health", get(health))
        .with_state(state)
}

/// CORS restricted to the configured frontend origins
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

// Custom error type
pub struct AppError(Error);

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::InvalidUrl(_)
            | Error::UnreachableSource(_)
            | Error::SourceInfoUnavailable(_)
            | Error::InvalidDate(_)
            | Error::EmptyInput => StatusCode::UNPROCESSABLE_ENTITY,
            Error::DuplicateSource(_) => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } | Error::NoArticlesToday => StatusCode::NOT_FOUND,
            Error::PaperAlreadyExists(_) => StatusCode::CONFLICT,
            Error::FactCheckUnavailable(_)
            | Error::SummarizationUnavailable(_)
            | Error::GroupSummaryFailed { .. }
            | Error::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

#[derive(Debug, Deserialize)]
pub struct SourceLink {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct IdRequest {
    pub id: i64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimePeriod {
    #[default]
    All,
    Today,
    Week,
    Month,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArticlesQuery {
    #[serde(default)]
    pub time_period: TimePeriod,
    /// `YYYY-MM-DD`, overrides `time_period`
    pub selected_date: Option<String>,
    pub source_id: Option<i64>,
    pub search: Option<String>,
}

fn parse_day(value: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| Error::InvalidDate(value.to_string()))
}

impl ArticlesQuery {
    pub fn to_filter(&self, today: NaiveDate) -> Result<ArticleFilter, Error> {
        let days_back = match (&self.selected_date, self.time_period) {
            (Some(date), _) => {
                let (from, to) = day_bounds(parse_day(date)?);
                return Ok(self.filter_with_range(Some(from), Some(to)));
            }
            (None, TimePeriod::All) => return Ok(self.filter_with_range(None, None)),
            (None, TimePeriod::Today) => 0,
            (None, TimePeriod::Week) => 6,
            (None, TimePeriod::Month) => 29,
        };

        let (from, _) = day_bounds(today - Duration::days(days_back));
        let (_, to) = day_bounds(today);
        Ok(self.filter_with_range(Some(from), Some(to)))
    }

    fn filter_with_range(
        &self,
        published_from: Option<chrono::DateTime<Utc>>,
        published_to: Option<chrono::DateTime<Utc>>,
    ) -> ArticleFilter {
        ArticleFilter {
            source_id: self.source_id,
            published_from,
            published_to,
            title_contains: self.search.clone().filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PapersQuery {
    pub paper_id: Option<i64>,
    /// `YYYY-MM-DD`
    pub date: Option<String>,
}

// Route handlers
pub async fn add_source(
    State(state): State<Arc<AppState>>,
    Json(link): Json<SourceLink>,
) -> Result<impl IntoResponse, AppError> {
    let source = state.resolver.register(&state.db, &link.url).await?;
    Ok((StatusCode::CREATED, Json(source)))
}

pub async fn list_sources(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let sources = state.db.get_all_sources().await?;
    Ok(Json(sources))
}

pub async fn remove_source(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IdRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.db.delete_source(request.id).await?;
    Ok(Json(json!({ "detail": "Source deleted successfully" })))
}

pub async fn update_articles_from_source(
    State(state): State<Arc<AppState>>,
    Json(link): Json<SourceLink>,
) -> Result<impl IntoResponse, AppError> {
    let count = state.fetcher.update_source_by_url(&link.url).await?;
    Ok(Json(json!({ "detail": format!("Updated {} articles", count) })))
}

pub async fn list_articles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ArticlesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = query.to_filter(Utc::now().date_naive())?;
    let articles = state.db.query_articles(&filter).await?;
    Ok(Json(json!({ "detail": articles })))
}

pub async fn check_article(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IdRequest>,
) -> Result<impl IntoResponse, AppError> {
    let article =
        factcheck::fact_check_article(&state.db, state.fact_checker.as_ref(), request.id).await?;
    Ok(Json(json!({
        "detail": "Fact checking has been successfully completed",
        "fact_summary": article.fact_summary,
    })))
}

pub async fn check_paper(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IdRequest>,
) -> Result<impl IntoResponse, AppError> {
    let paper =
        factcheck::fact_check_paper(&state.db, state.fact_checker.as_ref(), request.id).await?;
    Ok(Json(json!({
        "detail": "Fact checking has been successfully completed",
        "fact_summary": paper.fact_summary,
    })))
}

pub async fn generate_daily_papers(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let aggregator = DailyAggregator::new(state.db.clone(), state.summarizer.clone());
    let paper = aggregator.generate_daily_paper(Utc::now()).await?;
    Ok(Json(json!({
        "detail": "Daily paper generated successfully.",
        "paper_id": paper.id,
    })))
}

pub async fn get_papers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PapersQuery>,
) -> Result<Response, AppError> {
    if let Some(paper_id) = query.paper_id {
        let paper = state
            .db
            .get_paper(paper_id)
            .await?
            .ok_or_else(|| Error::not_found("Paper", paper_id))?;
        return Ok(Json(paper).into_response());
    }

    if let Some(date) = &query.date {
        let day = parse_day(date)?.format("%Y-%m-%d").to_string();
        let paper = state
            .db
            .get_paper_by_day(&day)
            .await?
            .ok_or_else(|| Error::not_found("Paper", &day))?;
        return Ok(Json(paper).into_response());
    }

    let papers = state.db.get_all_papers().await?;
    Ok(Json(papers).into_response())
}

pub async fn health() -> impl IntoResponse {
    "OK"
}
