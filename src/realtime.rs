use crate::feed::FeedStore;
use crate::models::{MemeItem, Notification, ViewCount};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// One logical push channel multiplexing insert/delete events for the
/// `memes`, `notifications` and `likes` collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    MemeInserted(MemeItem),
    NotificationInserted(Notification),
    LikeInserted { viewer_id: String, meme_id: String },
    LikeDeleted { viewer_id: String, meme_id: String },
}

impl FeedStore {
    /// Applies one push event to the cache.
    pub async fn apply_event(&self, event: ChangeEvent) {
        match event {
            ChangeEvent::MemeInserted(mut item) => {
                // Counters always start clean on a push insert; the viewer
                // can't have liked an item that just came into existence.
                item.like_count = 0;
                item.is_liked = false;
                item.views = ViewCount::zero();
                item.time_posted = "Just now".to_string();

                let creator_id = item.creator.user_id.clone();
                let title = item.title.clone();
                // Idempotent against the echo of our own optimistic insert.
                if !self.add_meme(item).await {
                    return;
                }
                let followed = match &creator_id {
                    Some(id) => self.with_state(|st| st.following.contains(id)).await,
                    None => false,
                };
                if followed {
                    self.toast("New post", &format!("Someone you follow posted: {title}"));
                }
            }
            ChangeEvent::NotificationInserted(notification) => {
                let viewer = self.current_viewer().await;
                let is_mine = viewer
                    .map(|v| v.id == notification.recipient_id)
                    .unwrap_or(false);
                if !is_mine {
                    return;
                }
                let body = notification.content.clone();
                self.with_state(|st| {
                    st.notifications.insert(0, notification);
                    st.unread_count += 1;
                })
                .await;
                self.toast("Notifications", &body);
            }
            // Aggregate counts follow every like event, including the echo
            // of this viewer's own action; the brief double movement is the
            // documented cost of not suppressing it.
            ChangeEvent::LikeInserted { meme_id, .. } => {
                self.adjust_like_count(&meme_id, 1).await;
            }
            ChangeEvent::LikeDeleted { meme_id, .. } => {
                self.adjust_like_count(&meme_id, -1).await;
            }
        }
    }

    async fn adjust_like_count(&self, meme_id: &str, delta: i64) {
        self.with_state(|st| {
            if let Some(item) = st.memes.iter_mut().find(|m| m.id == meme_id) {
                item.like_count = if delta >= 0 {
                    item.like_count.saturating_add(delta as u64)
                } else {
                    item.like_count.saturating_sub(delta.unsigned_abs())
                };
            } else {
                debug!(meme_id, "like event for unknown meme ignored");
            }
        })
        .await;
    }
}

/// Pumps push events into the store until the channel closes. Spawned once
/// per session.
pub fn run_realtime(
    store: Arc<FeedStore>,
    mut events: mpsc::UnboundedReceiver<ChangeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            store.apply_event(event).await;
        }
        info!("realtime channel closed");
    })
}
