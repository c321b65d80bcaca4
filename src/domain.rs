use crate::errors::{AiError, RepoError, StorageError};
use crate::models::{MemeItem, Notification, Viewer};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

/// Operations on the remote `memes` collection.
#[async_trait]
pub trait MemeRepository: Send + Sync + 'static {
    // Send+Sync+'static required for Arc<dyn>
    /// Fetches one page of memes ordered by recency, newest first.
    /// Pages are 1-based.
    async fn list_page(&self, page: usize, page_size: usize) -> Result<Vec<MemeItem>, RepoError>;

    /// Stores a newly posted meme.
    async fn create(&self, meme: &MemeItem) -> Result<(), RepoError>;

    async fn delete(&self, id: &str) -> Result<(), RepoError>;
}

/// Operations on the remote `likes` collection. The (viewer, meme) pair is
/// unique; inserting an existing pair yields `RepoError::Conflict`.
#[async_trait]
pub trait LikeRepository: Send + Sync + 'static {
    /// Meme ids the given viewer likes, optionally restricted to a set of
    /// meme ids (used when a pagination page lands).
    async fn liked_meme_ids(
        &self,
        viewer_id: &str,
        scope: Option<&[String]>,
    ) -> Result<HashSet<String>, RepoError>;

    /// Aggregate like counts per meme id, optionally scoped.
    async fn like_counts(
        &self,
        scope: Option<&[String]>,
    ) -> Result<HashMap<String, u64>, RepoError>;

    async fn create(&self, viewer_id: &str, meme_id: &str) -> Result<(), RepoError>;

    async fn delete(&self, viewer_id: &str, meme_id: &str) -> Result<(), RepoError>;
}

/// Operations on the remote `subscriptions` collection. The
/// (follower, target) pair is unique; duplicates yield `RepoError::Conflict`.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync + 'static {
    /// Creator identities the given user follows.
    async fn following(&self, follower_id: &str) -> Result<HashSet<String>, RepoError>;

    async fn create(&self, follower_id: &str, target_id: &str) -> Result<(), RepoError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync + 'static {
    /// Most recent unread notifications for the given user, newest first.
    async fn recent_unread(
        &self,
        recipient_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, RepoError>;

    async fn create(&self, notification: &Notification) -> Result<(), RepoError>;

    async fn mark_read(&self, id: &str) -> Result<(), RepoError>;
}

/// Blob storage for uploaded media.
#[async_trait]
pub trait MediaStorage: Send + Sync + 'static {
    /// Uploads the bytes and returns the public URL they are served from.
    async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<String, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// The generative AI collaborator: free-text prompt in, free-text completion
/// out. Callers are responsible for parsing structured responses defensively.
#[async_trait]
pub trait AiClient: Send + Sync + 'static {
    async fn generate_text(&self, prompt: &str) -> Result<String, AiError>;

    /// Prompt plus an inline base64-encoded image.
    async fn analyze_image(&self, image_base64: &str, prompt: &str) -> Result<String, AiError>;
}

/// The external authentication provider.
#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    /// The signed-in user, or `None` for anonymous browsing.
    async fn current_viewer(&self) -> Option<Viewer>;
}
