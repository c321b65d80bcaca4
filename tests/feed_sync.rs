//! Feed store behavior against in-memory fakes of the remote collections.

use async_trait::async_trait;
use chrono::Utc;
use memestream_core::domain::*;
use memestream_core::errors::RepoError;
use memestream_core::feed::{
    FeedBackends, FeedStore, LikeOutcome, LoadMoreOutcome, SubscribeOutcome, UiEffect,
};
use memestream_core::models::*;
use memestream_core::realtime::ChangeEvent;
use memestream_core::uploader::{MediaUpload, UploadOutcome, Uploader};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

const PAGE_SIZE: usize = 20;

/// One fake backing store implementing all four collection traits.
#[derive(Default)]
struct FakeBackend {
    pages: Mutex<Vec<Vec<MemeItem>>>,
    page_calls: AtomicUsize,
    pages_in_flight: AtomicUsize,
    max_pages_in_flight: AtomicUsize,
    page_delay_ms: AtomicUsize,
    fail_page_list: AtomicBool,

    created_memes: Mutex<Vec<String>>,
    deleted_memes: Mutex<Vec<String>>,
    fail_meme_delete: AtomicBool,

    likes: Mutex<HashSet<(String, String)>>,
    fail_like_create: AtomicBool,
    fail_like_delete: AtomicBool,

    subscriptions: Mutex<HashSet<(String, String)>>,

    notifications: Mutex<Vec<Notification>>,
    read_ids: Mutex<Vec<String>>,
    fail_mark_read: AtomicBool,
}

impl FakeBackend {
    fn with_pages(pages: Vec<Vec<MemeItem>>) -> Arc<Self> {
        let backend = Self::default();
        *backend.pages.lock().unwrap() = pages;
        Arc::new(backend)
    }

    fn seed_like(&self, viewer_id: &str, meme_id: &str) {
        self.likes
            .lock()
            .unwrap()
            .insert((viewer_id.to_string(), meme_id.to_string()));
    }

    fn has_like(&self, viewer_id: &str, meme_id: &str) -> bool {
        self.likes
            .lock()
            .unwrap()
            .contains(&(viewer_id.to_string(), meme_id.to_string()))
    }
}

fn backend_err() -> RepoError {
    RepoError::BackendError(anyhow::anyhow!("injected failure"))
}

#[async_trait]
impl MemeRepository for FakeBackend {
    async fn list_page(&self, page: usize, _page_size: usize) -> Result<Vec<MemeItem>, RepoError> {
        if self.fail_page_list.load(Ordering::SeqCst) {
            return Err(backend_err());
        }
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.pages_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_pages_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        let delay = self.page_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        self.pages_in_flight.fetch_sub(1, Ordering::SeqCst);
        let pages = self.pages.lock().unwrap();
        Ok(pages.get(page - 1).cloned().unwrap_or_default())
    }

    async fn create(&self, meme: &MemeItem) -> Result<(), RepoError> {
        self.created_memes.lock().unwrap().push(meme.id.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RepoError> {
        if self.fail_meme_delete.load(Ordering::SeqCst) {
            return Err(backend_err());
        }
        self.deleted_memes.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

#[async_trait]
impl LikeRepository for FakeBackend {
    async fn liked_meme_ids(
        &self,
        viewer_id: &str,
        scope: Option<&[String]>,
    ) -> Result<HashSet<String>, RepoError> {
        let likes = self.likes.lock().unwrap();
        Ok(likes
            .iter()
            .filter(|(v, m)| v == viewer_id && scope.map(|s| s.contains(m)).unwrap_or(true))
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn like_counts(
        &self,
        scope: Option<&[String]>,
    ) -> Result<HashMap<String, u64>, RepoError> {
        let likes = self.likes.lock().unwrap();
        let mut counts = HashMap::new();
        for (_, meme_id) in likes.iter() {
            if scope.map(|s| s.contains(meme_id)).unwrap_or(true) {
                *counts.entry(meme_id.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn create(&self, viewer_id: &str, meme_id: &str) -> Result<(), RepoError> {
        if self.fail_like_create.load(Ordering::SeqCst) {
            return Err(backend_err());
        }
        let mut likes = self.likes.lock().unwrap();
        if !likes.insert((viewer_id.to_string(), meme_id.to_string())) {
            return Err(RepoError::Conflict(format!("like {viewer_id}/{meme_id}")));
        }
        Ok(())
    }

    async fn delete(&self, viewer_id: &str, meme_id: &str) -> Result<(), RepoError> {
        if self.fail_like_delete.load(Ordering::SeqCst) {
            return Err(backend_err());
        }
        self.likes
            .lock()
            .unwrap()
            .remove(&(viewer_id.to_string(), meme_id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for FakeBackend {
    async fn following(&self, follower_id: &str) -> Result<HashSet<String>, RepoError> {
        let subs = self.subscriptions.lock().unwrap();
        Ok(subs
            .iter()
            .filter(|(f, _)| f == follower_id)
            .map(|(_, t)| t.clone())
            .collect())
    }

    async fn create(&self, follower_id: &str, target_id: &str) -> Result<(), RepoError> {
        let mut subs = self.subscriptions.lock().unwrap();
        if !subs.insert((follower_id.to_string(), target_id.to_string())) {
            return Err(RepoError::Conflict(format!(
                "subscription {follower_id}/{target_id}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for FakeBackend {
    async fn recent_unread(
        &self,
        recipient_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, RepoError> {
        let notifications = self.notifications.lock().unwrap();
        let mut mine: Vec<Notification> = notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id && !n.is_read)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        mine.truncate(limit);
        Ok(mine)
    }

    async fn create(&self, notification: &Notification) -> Result<(), RepoError> {
        self.notifications.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn mark_read(&self, id: &str) -> Result<(), RepoError> {
        if self.fail_mark_read.load(Ordering::SeqCst) {
            return Err(backend_err());
        }
        self.read_ids.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

// --- fixtures ---

fn meme(id: &str) -> MemeItem {
    MemeItem::new_posted(
        id.to_string(),
        format!("meme {id}"),
        "Image".to_string(),
        format!("https://cdn.example.com/{id}.png"),
        None,
        None,
        Creator::anonymous(),
    )
}

fn meme_owned_by(id: &str, owner: &str) -> MemeItem {
    let mut item = meme(id);
    item.creator = Creator {
        name: owner.to_string(),
        avatar: "https://cdn.example.com/a.png".to_string(),
        user_id: Some(owner.to_string()),
    };
    item
}

fn viewer() -> Viewer {
    Viewer {
        id: "ada@example.com".to_string(),
        name: "Ada".to_string(),
        avatar: "https://cdn.example.com/ada.png".to_string(),
    }
}

fn notification_for(recipient: &str, id: &str) -> Notification {
    Notification {
        id: id.to_string(),
        recipient_id: recipient.to_string(),
        kind: NotificationKind::Like,
        content: format!("notification {id}"),
        is_read: false,
        created_at: Utc::now(),
        metadata: None,
    }
}

async fn store_with(
    backend: Arc<FakeBackend>,
    signed_in: bool,
) -> (Arc<FeedStore>, mpsc::UnboundedReceiver<UiEffect>) {
    let backends = FeedBackends {
        memes: backend.clone(),
        likes: backend.clone(),
        subscriptions: backend.clone(),
        notifications: backend,
    };
    let (store, effects) = FeedStore::new(backends, PAGE_SIZE);
    store
        .set_viewer(signed_in.then(viewer))
        .await;
    (store, effects)
}

fn drain_toasts(effects: &mut mpsc::UnboundedReceiver<UiEffect>) -> Vec<UiEffect> {
    let mut out = Vec::new();
    while let Ok(effect) = effects.try_recv() {
        out.push(effect);
    }
    out
}

// --- initialization ---

#[tokio::test]
async fn initialize_seeds_liked_flags_and_counts() {
    let backend = FakeBackend::with_pages(vec![vec![meme("m1"), meme("m2")]]);
    backend.seed_like("ada@example.com", "m1");
    backend.seed_like("bob@example.com", "m1");
    backend.seed_like("bob@example.com", "m2");

    let (store, _fx) = store_with(backend, true).await;
    let snap = store.snapshot().await;

    assert_eq!(snap.memes.len(), 2);
    let m1 = snap.memes.iter().find(|m| m.id == "m1").unwrap();
    assert!(m1.is_liked);
    assert_eq!(m1.like_count, 2);
    let m2 = snap.memes.iter().find(|m| m.id == "m2").unwrap();
    assert!(!m2.is_liked);
    assert_eq!(m2.like_count, 1);
}

#[tokio::test]
async fn initialize_degrades_to_empty_on_fetch_failure() {
    let backend = FakeBackend::with_pages(vec![vec![meme("m1")]]);
    backend.fail_page_list.store(true, Ordering::SeqCst);

    let (store, _fx) = store_with(backend, true).await;
    let snap = store.snapshot().await;
    assert!(snap.memes.is_empty());
    assert!(!snap.has_more);
}

#[tokio::test]
async fn initialize_reruns_only_when_identity_changes() {
    let backend = FakeBackend::with_pages(vec![vec![meme("m1")]]);
    let (store, _fx) = store_with(backend.clone(), false).await;
    assert_eq!(backend.page_calls.load(Ordering::SeqCst), 1);

    // Same (anonymous) identity: no-op.
    store.initialize().await;
    assert_eq!(backend.page_calls.load(Ordering::SeqCst), 1);

    // Sign-in rebuilds identity-scoped state.
    backend.seed_like("ada@example.com", "m1");
    store.set_viewer(Some(viewer())).await;
    assert_eq!(backend.page_calls.load(Ordering::SeqCst), 2);
    let snap = store.snapshot().await;
    assert!(snap.memes[0].is_liked);
}

#[tokio::test]
async fn initialize_loads_recent_unread_notifications() {
    let backend = FakeBackend::with_pages(vec![vec![]]);
    for i in 0..25 {
        backend
            .notifications
            .lock()
            .unwrap()
            .push(notification_for("ada@example.com", &format!("n{i}")));
    }
    backend
        .notifications
        .lock()
        .unwrap()
        .push(notification_for("bob@example.com", "other"));

    let (store, _fx) = store_with(backend, true).await;
    let snap = store.snapshot().await;
    assert_eq!(snap.notifications.len(), 20);
    assert_eq!(snap.unread_count, 20);
    assert!(snap.notifications.iter().all(|n| n.recipient_id == "ada@example.com"));
}

// --- pagination ---

#[tokio::test]
async fn load_more_appends_until_a_short_page() {
    let first: Vec<MemeItem> = (0..PAGE_SIZE).map(|i| meme(&format!("a{i}"))).collect();
    let second: Vec<MemeItem> = (0..5).map(|i| meme(&format!("b{i}"))).collect();
    let backend = FakeBackend::with_pages(vec![first, second]);

    let (store, _fx) = store_with(backend, false).await;
    assert!(store.snapshot().await.has_more);

    let outcome = store.load_more().await.unwrap();
    assert_eq!(outcome, LoadMoreOutcome::Loaded(5));

    let snap = store.snapshot().await;
    assert_eq!(snap.memes.len(), 25);
    assert!(!snap.has_more);

    // Cursor is exhausted now.
    assert_eq!(store.load_more().await.unwrap(), LoadMoreOutcome::Skipped);
}

#[tokio::test]
async fn load_more_allows_one_in_flight_fetch() {
    let first: Vec<MemeItem> = (0..PAGE_SIZE).map(|i| meme(&format!("a{i}"))).collect();
    let second: Vec<MemeItem> = (0..PAGE_SIZE).map(|i| meme(&format!("b{i}"))).collect();
    let backend = FakeBackend::with_pages(vec![first, second]);
    let (store, _fx) = store_with(backend.clone(), false).await;
    backend.page_delay_ms.store(50, Ordering::SeqCst);

    let (left, right) = tokio::join!(store.load_more(), store.load_more());
    let outcomes = [left.unwrap(), right.unwrap()];
    assert!(outcomes.contains(&LoadMoreOutcome::Loaded(PAGE_SIZE)));
    assert!(outcomes.contains(&LoadMoreOutcome::Skipped));
    assert_eq!(backend.max_pages_in_flight.load(Ordering::SeqCst), 1);
    // One initial page plus exactly one pagination fetch.
    assert_eq!(backend.page_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn load_more_skips_duplicates_and_rederives_page_flags() {
    let first: Vec<MemeItem> = (0..PAGE_SIZE).map(|i| meme(&format!("a{i}"))).collect();
    // The second page re-serves an item the client already has (a realtime
    // insert raced the fetch, or the backend shifted under us).
    let second = vec![meme("a3"), meme("b0")];
    let backend = FakeBackend::with_pages(vec![first, second]);
    backend.seed_like("ada@example.com", "b0");
    let (store, _fx) = store_with(backend, true).await;

    let outcome = store.load_more().await.unwrap();
    assert_eq!(outcome, LoadMoreOutcome::Loaded(1));

    let snap = store.snapshot().await;
    assert_eq!(snap.memes.len(), PAGE_SIZE + 1);
    let b0 = snap.memes.iter().find(|m| m.id == "b0").unwrap();
    assert!(b0.is_liked, "page-scoped liked flags are re-derived");
    assert_eq!(b0.like_count, 1);
}

#[tokio::test]
async fn load_more_clears_busy_flag_on_failure() {
    let first: Vec<MemeItem> = (0..PAGE_SIZE).map(|i| meme(&format!("a{i}"))).collect();
    let backend = FakeBackend::with_pages(vec![first.clone(), first.clone()]);
    let (store, _fx) = store_with(backend.clone(), false).await;

    backend.fail_page_list.store(true, Ordering::SeqCst);
    assert!(store.load_more().await.is_err());
    assert!(!store.snapshot().await.is_loading_more);

    // A later retry still works.
    backend.fail_page_list.store(false, Ordering::SeqCst);
    assert!(matches!(
        store.load_more().await.unwrap(),
        LoadMoreOutcome::Loaded(_)
    ));
}

// --- insertion / dedup ---

#[tokio::test]
async fn no_duplicate_identities_across_all_insert_paths() {
    let backend = FakeBackend::with_pages(vec![vec![meme("m1")]]);
    let (store, _fx) = store_with(backend, false).await;

    assert!(store.add_meme(meme("m2")).await);
    assert!(!store.add_meme(meme("m2")).await);
    store.apply_event(ChangeEvent::MemeInserted(meme("m1"))).await;
    store.apply_event(ChangeEvent::MemeInserted(meme("m3"))).await;
    store.apply_event(ChangeEvent::MemeInserted(meme("m3"))).await;

    let snap = store.snapshot().await;
    let mut ids: Vec<&str> = snap.memes.iter().map(|m| m.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["m1", "m2", "m3"]);
}

// --- likes ---

#[tokio::test]
async fn like_requires_a_signed_in_viewer() {
    let backend = FakeBackend::with_pages(vec![vec![meme("m1")]]);
    let (store, _fx) = store_with(backend.clone(), false).await;

    let outcome = store.like_meme("m1").await.unwrap();
    assert_eq!(outcome, LikeOutcome::SignInRequired);
    assert!(!store.snapshot().await.memes[0].is_liked);
    assert!(backend.likes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn like_toggle_round_trips_the_flag() {
    let backend = FakeBackend::with_pages(vec![vec![meme("m1")]]);
    let (store, _fx) = store_with(backend.clone(), true).await;

    assert_eq!(store.like_meme("m1").await.unwrap(), LikeOutcome::Liked);
    assert!(store.snapshot().await.memes[0].is_liked);
    assert!(backend.has_like("ada@example.com", "m1"));

    assert_eq!(store.like_meme("m1").await.unwrap(), LikeOutcome::Unliked);
    assert!(!store.snapshot().await.memes[0].is_liked);
    assert!(!backend.has_like("ada@example.com", "m1"));
}

#[tokio::test]
async fn failed_like_reverts_the_optimistic_flip() {
    let backend = FakeBackend::with_pages(vec![vec![meme("m1")]]);
    backend.fail_like_create.store(true, Ordering::SeqCst);
    let (store, _fx) = store_with(backend, true).await;

    assert!(store.like_meme("m1").await.is_err());
    assert!(!store.snapshot().await.memes[0].is_liked);
}

#[tokio::test]
async fn failed_unlike_reverts_the_optimistic_flip() {
    let backend = FakeBackend::with_pages(vec![vec![meme("m1")]]);
    backend.seed_like("ada@example.com", "m1");
    let (store, _fx) = store_with(backend.clone(), true).await;
    assert!(store.snapshot().await.memes[0].is_liked);

    backend.fail_like_delete.store(true, Ordering::SeqCst);
    assert!(store.like_meme("m1").await.is_err());
    assert!(store.snapshot().await.memes[0].is_liked);
}

#[tokio::test]
async fn duplicate_like_conflict_is_compensated_with_a_delete() {
    // Stale client: the server already has the like but the local flag
    // says unliked (it was seeded before this session saw it).
    let backend = FakeBackend::with_pages(vec![vec![meme("m1")]]);
    let (store, _fx) = store_with(backend.clone(), true).await;
    backend.seed_like("ada@example.com", "m1");

    let outcome = store.like_meme("m1").await.unwrap();
    assert_eq!(outcome, LikeOutcome::Unliked);
    assert!(!store.snapshot().await.memes[0].is_liked);
    assert!(!backend.has_like("ada@example.com", "m1"));
}

#[tokio::test]
async fn first_time_like_notifies_the_owner() {
    let backend =
        FakeBackend::with_pages(vec![vec![meme_owned_by("m1", "bob@example.com")]]);
    let (store, _fx) = store_with(backend.clone(), true).await;

    store.like_meme("m1").await.unwrap();
    let notifications = backend.notifications.lock().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].recipient_id, "bob@example.com");
    assert_eq!(notifications[0].kind, NotificationKind::Like);
}

#[tokio::test]
async fn own_and_placeholder_content_gets_no_like_notification() {
    let backend = FakeBackend::with_pages(vec![vec![
        meme_owned_by("own", "ada@example.com"),
        meme("seeded"),
    ]]);
    let (store, _fx) = store_with(backend.clone(), true).await;

    store.like_meme("own").await.unwrap();
    store.like_meme("seeded").await.unwrap();
    assert!(backend.notifications.lock().unwrap().is_empty());
}

// --- views ---

#[tokio::test]
async fn view_counting_bumps_once_per_item_per_session() {
    let mut plain = meme("plain");
    plain.views = ViewCount::parse("41");
    let mut abbreviated = meme("abbrev");
    abbreviated.views = ViewCount::parse("2.4M");
    let mut junk = meme("junk");
    junk.views = ViewCount::parse("n/a");
    let backend = FakeBackend::with_pages(vec![vec![plain, abbreviated, junk]]);
    let (store, _fx) = store_with(backend, false).await;

    store.view_meme("plain").await;
    store.view_meme("plain").await; // debounced
    store.view_meme("abbrev").await;
    store.view_meme("junk").await;

    let snap = store.snapshot().await;
    let views: HashMap<&str, String> = snap
        .memes
        .iter()
        .map(|m| (m.id.as_str(), m.views.display()))
        .collect();
    assert_eq!(views["plain"], "42");
    assert_eq!(views["abbrev"], "2.4M");
    assert_eq!(views["junk"], "1");
}

// --- deletion ---

#[tokio::test]
async fn delete_removes_locally_and_remotely() {
    let backend = FakeBackend::with_pages(vec![vec![meme("m1"), meme("m2")]]);
    let (store, _fx) = store_with(backend.clone(), true).await;

    store.delete_meme("m1").await.unwrap();
    let snap = store.snapshot().await;
    assert_eq!(snap.memes.len(), 1);
    assert_eq!(snap.memes[0].id, "m2");
    assert_eq!(*backend.deleted_memes.lock().unwrap(), vec!["m1".to_string()]);
}

#[tokio::test]
async fn failed_delete_restores_the_item_in_place() {
    let backend =
        FakeBackend::with_pages(vec![vec![meme("m1"), meme("m2"), meme("m3")]]);
    backend.fail_meme_delete.store(true, Ordering::SeqCst);
    let (store, _fx) = store_with(backend, true).await;

    assert!(store.delete_meme("m2").await.is_err());
    let snap = store.snapshot().await;
    let ids: Vec<&str> = snap.memes.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2", "m3"]);
}

// --- subscriptions ---

#[tokio::test]
async fn subscribe_flow_updates_follow_set_and_notifies() {
    let backend = FakeBackend::with_pages(vec![vec![]]);
    let (store, mut fx) = store_with(backend.clone(), true).await;

    assert_eq!(
        store.subscribe_to_user("ada@example.com").await.unwrap(),
        SubscribeOutcome::SelfSubscription
    );
    assert!(!drain_toasts(&mut fx).is_empty());

    assert_eq!(
        store.subscribe_to_user("bob@example.com").await.unwrap(),
        SubscribeOutcome::Subscribed
    );
    {
        let notifications = backend.notifications.lock().unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::Follow);
        assert_eq!(notifications[0].recipient_id, "bob@example.com");
    }

    // Duplicate pair is benign.
    assert_eq!(
        store.subscribe_to_user("bob@example.com").await.unwrap(),
        SubscribeOutcome::AlreadySubscribed
    );
}

#[tokio::test]
async fn followed_creator_posts_raise_a_toast() {
    let backend = FakeBackend::with_pages(vec![vec![]]);
    backend
        .subscriptions
        .lock()
        .unwrap()
        .insert(("ada@example.com".to_string(), "bob@example.com".to_string()));
    let (store, mut fx) = store_with(backend, true).await;
    drain_toasts(&mut fx);

    store
        .apply_event(ChangeEvent::MemeInserted(meme_owned_by(
            "new",
            "bob@example.com",
        )))
        .await;
    store
        .apply_event(ChangeEvent::MemeInserted(meme_owned_by(
            "other",
            "carol@example.com",
        )))
        .await;

    let toasts = drain_toasts(&mut fx);
    assert_eq!(toasts.len(), 1);
}

// --- notifications ---

#[tokio::test]
async fn mark_as_read_floors_at_zero_and_reverts_on_failure() {
    let backend = FakeBackend::with_pages(vec![vec![]]);
    backend
        .notifications
        .lock()
        .unwrap()
        .push(notification_for("ada@example.com", "n1"));
    let (store, _fx) = store_with(backend.clone(), true).await;
    assert_eq!(store.snapshot().await.unread_count, 1);

    store.mark_as_read("n1").await.unwrap();
    let snap = store.snapshot().await;
    assert_eq!(snap.unread_count, 0);
    assert!(snap.notifications[0].is_read);

    // Already read: no-op, counter never goes negative.
    store.mark_as_read("n1").await.unwrap();
    assert_eq!(store.snapshot().await.unread_count, 0);
    assert_eq!(backend.read_ids.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_mark_as_read_reverts_flag_and_counter() {
    let backend = FakeBackend::with_pages(vec![vec![]]);
    backend
        .notifications
        .lock()
        .unwrap()
        .push(notification_for("ada@example.com", "n1"));
    backend.fail_mark_read.store(true, Ordering::SeqCst);
    let (store, _fx) = store_with(backend, true).await;

    assert!(store.mark_as_read("n1").await.is_err());
    let snap = store.snapshot().await;
    assert_eq!(snap.unread_count, 1);
    assert!(!snap.notifications[0].is_read);
}

#[tokio::test]
async fn notification_events_are_scoped_to_the_current_viewer() {
    let backend = FakeBackend::with_pages(vec![vec![]]);
    let (store, mut fx) = store_with(backend, true).await;
    drain_toasts(&mut fx);

    store
        .apply_event(ChangeEvent::NotificationInserted(notification_for(
            "ada@example.com",
            "mine",
        )))
        .await;
    store
        .apply_event(ChangeEvent::NotificationInserted(notification_for(
            "bob@example.com",
            "theirs",
        )))
        .await;

    let snap = store.snapshot().await;
    assert_eq!(snap.notifications.len(), 1);
    assert_eq!(snap.notifications[0].id, "mine");
    assert_eq!(snap.unread_count, 1);
    assert_eq!(drain_toasts(&mut fx).len(), 1);
}

// --- realtime like counters ---

#[tokio::test]
async fn like_events_move_the_aggregate_with_a_floor_at_zero() {
    let backend = FakeBackend::with_pages(vec![vec![meme("m1")]]);
    let (store, _fx) = store_with(backend, false).await;

    let delete = ChangeEvent::LikeDeleted {
        viewer_id: "bob@example.com".to_string(),
        meme_id: "m1".to_string(),
    };
    store.apply_event(delete.clone()).await;
    assert_eq!(store.snapshot().await.memes[0].like_count, 0);

    let insert = ChangeEvent::LikeInserted {
        viewer_id: "bob@example.com".to_string(),
        meme_id: "m1".to_string(),
    };
    store.apply_event(insert.clone()).await;
    store.apply_event(insert).await;
    assert_eq!(store.snapshot().await.memes[0].like_count, 2);

    store.apply_event(delete).await;
    assert_eq!(store.snapshot().await.memes[0].like_count, 1);
}

#[tokio::test]
async fn own_like_echo_is_not_suppressed() {
    // The viewer's own like only flips the flag; the aggregate moves when
    // the realtime echo lands. That echo is deliberately not filtered.
    let backend = FakeBackend::with_pages(vec![vec![meme("m1")]]);
    let (store, _fx) = store_with(backend, true).await;

    store.like_meme("m1").await.unwrap();
    assert_eq!(store.snapshot().await.memes[0].like_count, 0);

    store
        .apply_event(ChangeEvent::LikeInserted {
            viewer_id: "ada@example.com".to_string(),
            meme_id: "m1".to_string(),
        })
        .await;
    let snap = store.snapshot().await;
    assert!(snap.memes[0].is_liked);
    assert_eq!(snap.memes[0].like_count, 1);
}

// --- realtime meme inserts ---

#[tokio::test]
async fn realtime_meme_insert_starts_with_clean_counters() {
    let backend = FakeBackend::with_pages(vec![vec![]]);
    let (store, _fx) = store_with(backend, false).await;

    let mut payload = meme("fresh");
    payload.like_count = 40;
    payload.is_liked = true;
    store.apply_event(ChangeEvent::MemeInserted(payload)).await;

    let snap = store.snapshot().await;
    assert_eq!(snap.memes[0].like_count, 0);
    assert!(!snap.memes[0].is_liked);
    assert_eq!(snap.memes[0].time_posted, "Just now");
}

// --- upload flow ---

#[derive(Default)]
struct FakeStorage {
    uploads: Mutex<Vec<(String, Option<String>)>>,
}

#[async_trait]
impl MediaStorage for FakeStorage {
    async fn upload(
        &self,
        key: &str,
        _data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<String, memestream_core::errors::StorageError> {
        self.uploads
            .lock()
            .unwrap()
            .push((key.to_string(), content_type));
        Ok(format!("https://cdn.example.com/{key}"))
    }

    async fn delete(&self, _key: &str) -> Result<(), memestream_core::errors::StorageError> {
        Ok(())
    }
}

#[tokio::test]
async fn upload_requires_a_signed_in_viewer() {
    let backend = FakeBackend::with_pages(vec![vec![]]);
    let storage = Arc::new(FakeStorage::default());
    let (store, _fx) = store_with(backend, false).await;
    let uploader = Uploader::new(storage.clone(), FakeBackend::with_pages(vec![]));

    let outcome = uploader
        .post(
            &store,
            MediaUpload {
                file_name: "cat.png".to_string(),
                data: vec![1, 2, 3],
                caption: None,
            },
        )
        .await
        .unwrap();
    assert!(matches!(outcome, UploadOutcome::SignInRequired));
    assert!(storage.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn upload_stores_media_then_inserts_the_meme() {
    let backend = FakeBackend::with_pages(vec![vec![]]);
    let storage = Arc::new(FakeStorage::default());
    let (store, _fx) = store_with(backend.clone(), true).await;
    let uploader = Uploader::new(storage.clone(), backend.clone());

    let outcome = uploader
        .post(
            &store,
            MediaUpload {
                file_name: "monday-cat.mp4".to_string(),
                data: vec![0u8; 64],
                caption: None,
            },
        )
        .await
        .unwrap();

    let UploadOutcome::Posted(item) = outcome else {
        panic!("expected a posted meme");
    };
    assert_eq!(item.title, "monday-cat");
    assert_eq!(item.category, "Video");
    assert!(item.video_url.is_some());
    assert_eq!(item.creator.user_id.as_deref(), Some("ada@example.com"));

    let uploads = storage.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].0.ends_with(".mp4"));
    assert_eq!(uploads[0].1.as_deref(), Some("video/mp4"));

    assert_eq!(*backend.created_memes.lock().unwrap(), vec![item.id.clone()]);
    // Optimistic local insert; the realtime echo would be deduplicated.
    let snap = store.snapshot().await;
    assert_eq!(snap.memes[0].id, item.id);
}

#[tokio::test]
async fn upload_rejects_unsupported_media() {
    let backend = FakeBackend::with_pages(vec![vec![]]);
    let storage = Arc::new(FakeStorage::default());
    let (store, _fx) = store_with(backend.clone(), true).await;
    let uploader = Uploader::new(storage.clone(), backend);

    let result = uploader
        .post(
            &store,
            MediaUpload {
                file_name: "notes.txt".to_string(),
                data: vec![1],
                caption: None,
            },
        )
        .await;
    assert!(result.is_err());
    assert!(storage.uploads.lock().unwrap().is_empty());
}
