use crate::config::NOTIFICATION_FETCH_LIMIT;
use crate::domain::{
    LikeRepository, MemeRepository, NotificationRepository, SubscriptionRepository,
};
use crate::errors::{RepoError, StoreError};
use crate::models::{MemeItem, Notification, NotificationKind, Viewer};
use chrono::Utc;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Remote collections the store synchronizes against.
#[derive(Clone)]
pub struct FeedBackends {
    pub memes: Arc<dyn MemeRepository>,
    pub likes: Arc<dyn LikeRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
}

/// Transient UI side-effects the store emits (toast messages). Consumers
/// drain the receiver handed out by [`FeedStore::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEffect {
    Toast { title: String, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    /// No signed-in viewer; the caller should route to the sign-in surface.
    SignInRequired,
    Liked,
    Unliked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    SignInRequired,
    /// Self-subscription is rejected with a user-visible warning.
    SelfSubscription,
    AlreadySubscribed,
    Subscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMoreOutcome {
    /// A fetch was already in flight, or there are no further pages.
    Skipped,
    /// Number of previously unseen items appended.
    Loaded(usize),
}

/// Read-only view of the cache for rendering.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub memes: Vec<MemeItem>,
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
    pub has_more: bool,
    pub is_loading_more: bool,
}

#[derive(Default)]
pub(crate) struct FeedState {
    pub(crate) memes: Vec<MemeItem>,
    /// Identity index over `memes`; every insertion path dedups against it.
    pub(crate) ids: HashSet<String>,
    pub(crate) notifications: Vec<Notification>,
    pub(crate) unread_count: usize,
    pub(crate) following: HashSet<String>,
    page: usize,
    has_more: bool,
    loading_more: bool,
    /// Meme ids already counted as viewed this session.
    viewed: HashSet<String>,
    /// The viewer identity the last initialization ran for. `None` means
    /// never initialized; the inner Option is the anonymous session.
    initialized_for: Option<Option<String>>,
}

/// Session-scoped cache of memes and notifications, kept consistent with
/// the remote store across initial load, pagination, realtime push events,
/// and optimistic local mutations.
///
/// Created at session start and passed by reference to consumers; all
/// mutation goes through its methods, consumers only read [`snapshot`].
///
/// [`snapshot`]: FeedStore::snapshot
pub struct FeedStore {
    backends: FeedBackends,
    page_size: usize,
    /// Always-current viewer identity, read at use time rather than
    /// captured at subscription time.
    viewer: RwLock<Option<Viewer>>,
    state: Mutex<FeedState>,
    effects: mpsc::UnboundedSender<UiEffect>,
}

impl FeedStore {
    pub fn new(
        backends: FeedBackends,
        page_size: usize,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<UiEffect>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = Arc::new(Self {
            backends,
            page_size,
            viewer: RwLock::new(None),
            state: Mutex::new(FeedState::default()),
            effects: tx,
        });
        (store, rx)
    }

    pub async fn current_viewer(&self) -> Option<Viewer> {
        self.viewer.read().await.clone()
    }

    /// Updates the viewer identity cell. Likes, notifications and the
    /// follow-set are identity-scoped, so a changed identity re-runs
    /// initialization.
    pub async fn set_viewer(&self, viewer: Option<Viewer>) {
        {
            let mut cell = self.viewer.write().await;
            *cell = viewer;
        }
        self.initialize().await;
    }

    /// Fetches the viewer's identity-scoped collections and the first page
    /// of the feed, replacing any prior state. Runs once per session start
    /// and again whenever the viewer identity changes; repeat calls for the
    /// same identity are no-ops. Fetch failures degrade to empty slices and
    /// are logged, never surfaced.
    pub async fn initialize(&self) {
        let viewer = self.current_viewer().await;
        let viewer_key = viewer.as_ref().map(|v| v.id.clone());
        {
            let st = self.state.lock().await;
            if st.initialized_for.as_ref() == Some(&viewer_key) {
                debug!("feed already initialized for this identity");
                return;
            }
        }

        let memes = match self.backends.memes.list_page(1, self.page_size).await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "failed to load first feed page, starting empty");
                Vec::new()
            }
        };
        let has_more = memes.len() == self.page_size;

        let like_counts = match self.backends.likes.like_counts(None).await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(error = %e, "failed to load like counts");
                HashMap::new()
            }
        };

        let (liked_ids, following, notifications) = match &viewer {
            Some(v) => {
                let liked = match self.backends.likes.liked_meme_ids(&v.id, None).await {
                    Ok(ids) => ids,
                    Err(e) => {
                        warn!(error = %e, "failed to load viewer likes");
                        HashSet::new()
                    }
                };
                let following = match self.backends.subscriptions.following(&v.id).await {
                    Ok(ids) => ids,
                    Err(e) => {
                        warn!(error = %e, "failed to load follow-set");
                        HashSet::new()
                    }
                };
                let notifications = match self
                    .backends
                    .notifications
                    .recent_unread(&v.id, NOTIFICATION_FETCH_LIMIT)
                    .await
                {
                    Ok(items) => items,
                    Err(e) => {
                        warn!(error = %e, "failed to load notifications");
                        Vec::new()
                    }
                };
                (liked, following, notifications)
            }
            None => (HashSet::new(), HashSet::new(), Vec::new()),
        };

        let mut st = self.state.lock().await;
        *st = FeedState::default();
        for mut item in memes {
            if !st.ids.insert(item.id.clone()) {
                continue;
            }
            item.is_liked = liked_ids.contains(&item.id);
            item.like_count = like_counts.get(&item.id).copied().unwrap_or(0);
            st.memes.push(item);
        }
        st.unread_count = notifications.iter().filter(|n| !n.is_read).count();
        st.notifications = notifications;
        st.following = following;
        st.page = 1;
        st.has_more = has_more;
        st.initialized_for = Some(viewer_key);
        info!(
            memes = st.memes.len(),
            notifications = st.notifications.len(),
            "feed initialized"
        );
    }

    /// Fetches the next page. No-op while a fetch is already in flight or
    /// once the cursor reports no further pages; at most one pagination
    /// fetch runs at a time.
    pub async fn load_more(&self) -> Result<LoadMoreOutcome, StoreError> {
        let next_page = {
            let mut st = self.state.lock().await;
            if st.loading_more || !st.has_more {
                return Ok(LoadMoreOutcome::Skipped);
            }
            st.loading_more = true;
            st.page + 1
        };

        let fetched = self.backends.memes.list_page(next_page, self.page_size).await;
        let page_items = match fetched {
            Ok(items) => items,
            Err(e) => {
                let mut st = self.state.lock().await;
                st.loading_more = false;
                return Err(e.into());
            }
        };

        // Liked flags and counts are re-derived for the new page only.
        let page_ids: Vec<String> = page_items.iter().map(|m| m.id.clone()).collect();
        let liked_ids = match self.current_viewer().await {
            Some(v) => match self
                .backends
                .likes
                .liked_meme_ids(&v.id, Some(&page_ids))
                .await
            {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(error = %e, "failed to load page-scoped likes");
                    HashSet::new()
                }
            },
            None => HashSet::new(),
        };
        let like_counts = match self.backends.likes.like_counts(Some(&page_ids)).await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(error = %e, "failed to load page-scoped like counts");
                HashMap::new()
            }
        };

        let mut st = self.state.lock().await;
        st.loading_more = false;
        st.has_more = page_items.len() == self.page_size;
        st.page = next_page;
        let mut appended = 0;
        for mut item in page_items {
            if !st.ids.insert(item.id.clone()) {
                continue;
            }
            item.is_liked = liked_ids.contains(&item.id);
            item.like_count = like_counts.get(&item.id).copied().unwrap_or(0);
            st.memes.push(item);
            appended += 1;
        }
        debug!(page = next_page, appended, has_more = st.has_more, "page loaded");
        Ok(LoadMoreOutcome::Loaded(appended))
    }

    /// Inserts at the front of the feed unless the identity is already
    /// present. Used by the uploader's optimistic insert and by realtime
    /// insert handling. Returns whether the item was inserted.
    pub async fn add_meme(&self, item: MemeItem) -> bool {
        let mut st = self.state.lock().await;
        if !st.ids.insert(item.id.clone()) {
            debug!(meme_id = %item.id, "duplicate meme insert ignored");
            return false;
        }
        st.memes.insert(0, item);
        true
    }

    /// Toggles the viewer's like on an item: optimistic flag flip, then the
    /// matching remote insert or delete of the (viewer, meme) pair. A
    /// duplicate-pair conflict on insert means the server already had the
    /// like; it is compensated with a delete and the flag lands on unliked.
    /// Any other remote failure reverts the flip. The aggregate like count
    /// is never touched here; it converges via realtime like events.
    pub async fn like_meme(&self, meme_id: &str) -> Result<LikeOutcome, StoreError> {
        let Some(viewer) = self.current_viewer().await else {
            return Ok(LikeOutcome::SignInRequired);
        };

        let (was_liked, creator) = {
            let st = self.state.lock().await;
            let item = st
                .memes
                .iter()
                .find(|m| m.id == meme_id)
                .ok_or_else(|| StoreError::MemeNotFound(meme_id.to_string()))?;
            (item.is_liked, item.creator.clone())
        };

        self.set_liked(meme_id, !was_liked).await;

        if was_liked {
            // Unlike: plain optimistic delete with revert on failure.
            match self.backends.likes.delete(&viewer.id, meme_id).await {
                Ok(()) => Ok(LikeOutcome::Unliked),
                Err(e) => {
                    self.set_liked(meme_id, was_liked).await;
                    Err(e.into())
                }
            }
        } else {
            match self.backends.likes.create(&viewer.id, meme_id).await {
                Ok(()) => {
                    if !creator.is_placeholder()
                        && creator.user_id.as_deref() != Some(viewer.id.as_str())
                    {
                        self.emit_notification(
                            creator.user_id.as_deref().unwrap_or_default(),
                            NotificationKind::Like,
                            format!("{} liked your meme", viewer.name),
                            Some(json!({ "meme_id": meme_id })),
                        )
                        .await;
                    }
                    Ok(LikeOutcome::Liked)
                }
                Err(RepoError::Conflict(_)) => {
                    // Stale client: the server already had this like.
                    // Reinterpret the tap as an unlike.
                    debug!(meme_id, "like already existed, issuing compensating delete");
                    self.set_liked(meme_id, false).await;
                    if let Err(e) = self.backends.likes.delete(&viewer.id, meme_id).await {
                        warn!(error = %e, meme_id, "compensating unlike failed");
                    }
                    Ok(LikeOutcome::Unliked)
                }
                Err(e) => {
                    self.set_liked(meme_id, was_liked).await;
                    Err(e.into())
                }
            }
        }
    }

    /// Local-only, best-effort view counting, debounced to one counted view
    /// per item per session. Anonymous viewers count too.
    pub async fn view_meme(&self, meme_id: &str) {
        let mut st = self.state.lock().await;
        if !st.viewed.insert(meme_id.to_string()) {
            return;
        }
        if let Some(item) = st.memes.iter_mut().find(|m| m.id == meme_id) {
            item.views.bump();
        }
    }

    /// Removes the item optimistically and issues the remote delete. On
    /// failure the item is restored at its original position.
    pub async fn delete_meme(&self, meme_id: &str) -> Result<(), StoreError> {
        {
            let st = self.state.lock().await;
            if !st.ids.contains(meme_id) {
                return Err(StoreError::MemeNotFound(meme_id.to_string()));
            }
        }
        let id = meme_id.to_string();
        let restore_id = id.clone();
        self.optimistic(
            move |st| {
                let pos = st.memes.iter().position(|m| m.id == id)?;
                st.ids.remove(&id);
                Some((pos, st.memes.remove(pos)))
            },
            move |st, (pos, item)| {
                if st.ids.insert(restore_id.clone()) {
                    let pos = pos.min(st.memes.len());
                    st.memes.insert(pos, item);
                }
            },
            self.backends.memes.delete(meme_id),
        )
        .await
    }

    /// Follows another user. Self-subscription is rejected; a duplicate-pair
    /// conflict means the subscription already existed and is not an error.
    pub async fn subscribe_to_user(&self, target_id: &str) -> Result<SubscribeOutcome, StoreError> {
        let Some(viewer) = self.current_viewer().await else {
            return Ok(SubscribeOutcome::SignInRequired);
        };
        if viewer.id == target_id {
            self.toast("Subscriptions", "You can't subscribe to yourself");
            return Ok(SubscribeOutcome::SelfSubscription);
        }

        match self
            .backends
            .subscriptions
            .create(&viewer.id, target_id)
            .await
        {
            Ok(()) => {
                {
                    let mut st = self.state.lock().await;
                    st.following.insert(target_id.to_string());
                }
                if target_id != crate::models::SEED_CREATOR_ID {
                    self.emit_notification(
                        target_id,
                        NotificationKind::Follow,
                        format!("{} subscribed to you", viewer.name),
                        None,
                    )
                    .await;
                }
                Ok(SubscribeOutcome::Subscribed)
            }
            Err(RepoError::Conflict(_)) => {
                // Server already has the pair; make sure the local set agrees.
                let mut st = self.state.lock().await;
                st.following.insert(target_id.to_string());
                info!(target_id, "already subscribed");
                Ok(SubscribeOutcome::AlreadySubscribed)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Flips the read flag and decrements the unread counter (floored at
    /// zero) optimistically, reverting both if the remote update fails.
    /// Unknown ids and already-read notifications are no-ops.
    pub async fn mark_as_read(&self, notification_id: &str) -> Result<(), StoreError> {
        let id = notification_id.to_string();
        let revert_id = id.clone();
        self.optimistic(
            move |st| {
                let notif = st.notifications.iter_mut().find(|n| n.id == id)?;
                if notif.is_read {
                    return None;
                }
                notif.is_read = true;
                st.unread_count = st.unread_count.saturating_sub(1);
                Some(())
            },
            move |st, ()| {
                if let Some(notif) = st.notifications.iter_mut().find(|n| n.id == revert_id) {
                    notif.is_read = false;
                    st.unread_count += 1;
                }
            },
            self.backends.notifications.mark_read(notification_id),
        )
        .await
    }

    /// Cheap clone of the visible state for read-only consumers.
    pub async fn snapshot(&self) -> FeedSnapshot {
        let st = self.state.lock().await;
        FeedSnapshot {
            memes: st.memes.clone(),
            notifications: st.notifications.clone(),
            unread_count: st.unread_count,
            has_more: st.has_more,
            is_loading_more: st.loading_more,
        }
    }

    // --- internals ---

    /// Apply a local change, attempt the remote change, and apply the
    /// inverse local change if the remote call fails. `apply` returning
    /// `None` means there was nothing to change locally and the remote call
    /// is skipped.
    async fn optimistic<T, Fut>(
        &self,
        apply: impl FnOnce(&mut FeedState) -> Option<T>,
        revert: impl FnOnce(&mut FeedState, T),
        remote: Fut,
    ) -> Result<(), StoreError>
    where
        Fut: Future<Output = Result<(), RepoError>>,
    {
        let token = {
            let mut st = self.state.lock().await;
            apply(&mut st)
        };
        let Some(token) = token else {
            return Ok(());
        };
        match remote.await {
            Ok(()) => Ok(()),
            Err(e) => {
                let mut st = self.state.lock().await;
                revert(&mut st, token);
                Err(e.into())
            }
        }
    }

    pub(crate) async fn set_liked(&self, meme_id: &str, liked: bool) {
        let mut st = self.state.lock().await;
        if let Some(item) = st.memes.iter_mut().find(|m| m.id == meme_id) {
            item.is_liked = liked;
        }
    }

    /// Best-effort remote notification emit; failures are logged only.
    async fn emit_notification(
        &self,
        recipient_id: &str,
        kind: NotificationKind,
        content: String,
        metadata: Option<serde_json::Value>,
    ) {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            recipient_id: recipient_id.to_string(),
            kind,
            content,
            is_read: false,
            created_at: Utc::now(),
            metadata,
        };
        if let Err(e) = self.backends.notifications.create(&notification).await {
            warn!(error = %e, recipient_id, "failed to emit notification");
        }
    }

    pub(crate) fn toast(&self, title: &str, body: &str) {
        // Receiver may be gone during teardown; that's fine.
        let _ = self.effects.send(UiEffect::Toast {
            title: title.to_string(),
            body: body.to_string(),
        });
    }

    pub(crate) async fn with_state<R>(&self, f: impl FnOnce(&mut FeedState) -> R) -> R {
        let mut st = self.state.lock().await;
        f(&mut st)
    }
}
