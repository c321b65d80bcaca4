use crate::ai::{GeminiClient, MemeStudio};
use crate::aws_clients::{create_dynamodb_client, create_s3_client, create_sdk_config};
use crate::config::Config;
use crate::domain::AuthProvider;
use crate::errors::StoreError;
use crate::feed::{FeedBackends, FeedStore, UiEffect};
use crate::realtime::{ChangeEvent, run_realtime};
use crate::repositories::{
    DynamoDbLikeRepository, DynamoDbMemeRepository, DynamoDbNotificationRepository,
    DynamoDbSubscriptionRepository,
};
use crate::startup;
use crate::storage::S3MediaStorage;
use crate::uploader::Uploader;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing (logging) from RUST_LOG, with a sensible default.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "memestream_core=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// One signed-in (or anonymous) browsing session: the feed store plus the
/// uploader and AI studio wired to the same backends. Created at session
/// start, dropped at session end.
pub struct Session {
    pub store: Arc<FeedStore>,
    pub uploader: Uploader,
    /// Present only when an AI API key is configured.
    pub studio: Option<MemeStudio>,
    auth: Arc<dyn AuthProvider>,
    realtime_task: JoinHandle<()>,
}

impl Session {
    /// Builds the backend clients, ensures remote resources exist, runs the
    /// initial feed load, and starts pumping realtime events. Returns the
    /// session and the receiver for transient UI effects (toasts).
    pub async fn start(
        config: Config,
        auth: Arc<dyn AuthProvider>,
        events: mpsc::UnboundedReceiver<ChangeEvent>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<UiEffect>), StoreError> {
        info!("Starting MemeStream session");
        let sdk_config = create_sdk_config(&config).await;
        let db_client = create_dynamodb_client(&sdk_config);
        let s3_client = create_s3_client(&sdk_config);

        startup::init_resources(&db_client, &s3_client, &config).await?;

        let memes = Arc::new(DynamoDbMemeRepository::new(
            db_client.clone(),
            config.memes_table(),
        ));
        let backends = FeedBackends {
            memes: memes.clone(),
            likes: Arc::new(DynamoDbLikeRepository::new(
                db_client.clone(),
                config.likes_table(),
            )),
            subscriptions: Arc::new(DynamoDbSubscriptionRepository::new(
                db_client.clone(),
                config.subscriptions_table(),
            )),
            notifications: Arc::new(DynamoDbNotificationRepository::new(
                db_client,
                config.notifications_table(),
            )),
        };
        let media_storage = Arc::new(S3MediaStorage::new(
            s3_client,
            config.media_bucket_name.clone(),
            config.aws_region.clone(),
            config.media_public_base_url.clone(),
        ));

        let (store, effects) = FeedStore::new(backends, config.page_size);
        store.set_viewer(auth.current_viewer().await).await;

        let realtime_task = run_realtime(store.clone(), events);
        let uploader = Uploader::new(media_storage, memes);
        let studio = config
            .google_ai_api_key
            .as_ref()
            .map(|key| MemeStudio::new(Arc::new(GeminiClient::new(key.clone()))));

        Ok((
            Self {
                store,
                uploader,
                studio,
                auth,
                realtime_task,
            },
            effects,
        ))
    }

    /// Re-reads the viewer from the auth provider. Call after sign-in or
    /// sign-out; identity-scoped state is rebuilt when the identity changed.
    pub async fn refresh_viewer(&self) {
        self.store.set_viewer(self.auth.current_viewer().await).await;
    }

    pub fn shutdown(self) {
        info!("Shutting down MemeStream session");
        self.realtime_task.abort();
    }
}
