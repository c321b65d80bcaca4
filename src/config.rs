use std::env;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
    #[error(transparent)]
    DotEnvError(#[from] dotenvy::Error),
}

/// How many memes one pagination fetch returns.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// How many unread notifications the initial load pulls down.
pub const NOTIFICATION_FETCH_LIMIT: usize = 20;

#[derive(Clone, Debug)]
pub struct Config {
    pub media_bucket_name: String,
    /// Prefix for the DynamoDB table names ("memestream" -> "memestream_memes" etc).
    pub table_prefix: String,
    // Store region as string for simplicity here, aws_clients can convert
    pub aws_region: String,
    // Optional endpoint for LocalStack
    pub localstack_endpoint: Option<String>,
    /// Base URL media objects are served from. Defaults to the S3 virtual-host URL.
    pub media_public_base_url: Option<String>,
    pub page_size: usize,
    /// Gemini API key; the AI studio is unavailable without it.
    pub google_ai_api_key: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignores errors, relies on env vars otherwise)
        dotenvy::dotenv().ok();

        let media_bucket_name = env::var("MEME_MEDIA_BUCKET")
            .map_err(|_| ConfigError::MissingVar("MEME_MEDIA_BUCKET".into()))?;

        let table_prefix =
            env::var("MEMESTREAM_TABLE_PREFIX").unwrap_or_else(|_| "memestream".to_string());

        let aws_region =
            env::var("AWS_DEFAULT_REGION").unwrap_or_else(|_| "ca-central-1".to_string());

        // Allow overriding endpoint for localstack/testing
        let localstack_endpoint = env::var("AWS_ENDPOINT_URL").ok();

        let media_public_base_url = env::var("MEDIA_PUBLIC_BASE_URL").ok();

        let page_size = match env::var("FEED_PAGE_SIZE") {
            Ok(raw) => raw
                .parse::<usize>()
                .map_err(|e| ConfigError::InvalidVar("FEED_PAGE_SIZE".into(), e.to_string()))?,
            Err(_) => DEFAULT_PAGE_SIZE,
        };

        let google_ai_api_key = env::var("GOOGLE_AI_API_KEY").ok();

        Ok(Config {
            media_bucket_name,
            table_prefix,
            aws_region,
            localstack_endpoint,
            media_public_base_url,
            page_size,
            google_ai_api_key,
        })
    }

    pub fn memes_table(&self) -> String {
        format!("{}_memes", self.table_prefix)
    }

    pub fn likes_table(&self) -> String {
        format!("{}_likes", self.table_prefix)
    }

    pub fn subscriptions_table(&self) -> String {
        format!("{}_subscriptions", self.table_prefix)
    }

    pub fn notifications_table(&self) -> String {
        format!("{}_notifications", self.table_prefix)
    }
}
