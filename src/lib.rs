//! Client core for MemeStream, a meme-browsing and sharing service.
//!
//! The centerpiece is [`FeedStore`]: a session-scoped in-memory cache of
//! memes and notifications kept consistent with the remote store across the
//! initial load, pagination, realtime push events, and optimistic local
//! mutations (with revert on remote failure). Around it sit the media
//! [`Uploader`], the AI [`MemeStudio`], and DynamoDB/S3 implementations of
//! the remote collection traits in [`domain`].
//!
//! UI layers hold an `Arc<FeedStore>`, render from [`FeedStore::snapshot`],
//! and drain the [`UiEffect`] channel for toasts.

pub mod ai;
pub mod aws_clients;
pub mod config;
pub mod domain;
pub mod errors;
pub mod feed;
pub mod models;
pub mod realtime;
pub mod repositories;
pub mod session;
pub mod startup;
pub mod storage;
pub mod uploader;

pub use ai::{GeminiClient, MemeConcept, MemeStudio};
pub use config::Config;
pub use errors::{AiError, RepoError, StorageError, StoreError};
pub use feed::{
    FeedBackends, FeedSnapshot, FeedStore, LikeOutcome, LoadMoreOutcome, SubscribeOutcome,
    UiEffect,
};
pub use models::{Creator, MemeItem, Notification, NotificationKind, ViewCount, Viewer};
pub use realtime::{ChangeEvent, run_realtime};
pub use session::{Session, init_tracing};
pub use uploader::{MediaUpload, UploadOutcome, Uploader};
