use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fact_news::ai::GeminiClient;
use fact_news::config::Config;
use fact_news::db::Database;
use fact_news::fetcher::{start_background_refresh, Fetcher};
use fact_news::resolver::SourceResolver;
use fact_news::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fact_news=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let mut config = Config::load_or_default("fact_news.toml")?;
    config.apply_env();
    config.ai.load_prompts()?;
    if config.ai.api_key.is_empty() {
        tracing::warn!("GEMINI_API_KEY is not set, fact checks and digests will fail");
    }

    // Initialize database
    let db = Database::new(&config.database_url).await?;
    db.initialize().await?;
    info!("Database initialized");

    let db = Arc::new(db);

    let fetcher = Arc::new(Fetcher::new(db.clone(), &config.http, config.lookback_hours));
    let resolver = Arc::new(SourceResolver::new(
        config.http.source_info_timeout(),
        &config.http.user_agent,
    ));
    let gemini = Arc::new(GeminiClient::new(config.ai.clone()));

    // Start background refresh task
    if config.refresh_interval > 0 {
        let bg_fetcher = fetcher.clone();
        let refresh_interval = config.refresh_interval;
        tokio::spawn(async move {
            start_background_refresh(bg_fetcher, refresh_interval).await;
        });
        info!("Refreshing sources every {} minutes", refresh_interval);
    }

    let state = Arc::new(AppState {
        db,
        fetcher,
        resolver,
        summarizer: gemini.clone(),
        fact_checker: gemini,
    });

    let app = routes::router(state)
        .layer(routes::cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server starting on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
