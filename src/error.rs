use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Link format is not supported: {0}")]
    InvalidUrl(String),

    #[error("We cannot get access to this source: {0}")]
    UnreachableSource(String),

    #[error("Could not parse the source info: {0}")]
    SourceInfoUnavailable(String),

    #[error("Source has already been added: {0}")]
    DuplicateSource(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Contents cannot be empty")]
    EmptyInput,

    #[error("No articles found for today")]
    NoArticlesToday,

    #[error("A paper already exists for {0}")]
    PaperAlreadyExists(String),

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Fact check failed: {0}")]
    FactCheckUnavailable(String),

    #[error("Summarization failed: {0}")]
    SummarizationUnavailable(String),

    #[error("Failed to summarize articles from source '{source_name}': {cause}")]
    GroupSummaryFailed {
        source_name: String,
        cause: Box<Error>,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
