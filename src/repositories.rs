use crate::{
    domain::{LikeRepository, MemeRepository, NotificationRepository, SubscriptionRepository},
    errors::RepoError,
    models::{Creator, MemeItem, Notification, NotificationKind, ViewCount, format_time_posted},
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{Client as DynamoDbClient, error::SdkError, types::AttributeValue};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info};

fn string_attr(item: &HashMap<String, AttributeValue>, key: &str) -> Option<String> {
    item.get(key)?.as_s().ok().map(|s| s.to_string())
}

fn number_attr<T: std::str::FromStr>(item: &HashMap<String, AttributeValue>, key: &str) -> Option<T> {
    item.get(key)?.as_n().ok().and_then(|n| n.parse().ok())
}

fn timestamp_attr(item: &HashMap<String, AttributeValue>, key: &str) -> Option<DateTime<Utc>> {
    let raw = string_attr(item, key)?;
    DateTime::parse_from_rfc3339(&raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// --- Memes ---

#[derive(Debug, Clone)]
pub struct DynamoDbMemeRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbMemeRepository {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbMemeRepository");
        Self { client, table_name }
    }

    /// Scans the whole table, following LastEvaluatedKey pagination.
    async fn scan_all(&self) -> Result<Vec<HashMap<String, AttributeValue>>, RepoError> {
        let mut items = Vec::new();
        let mut last_evaluated_key: Option<HashMap<String, AttributeValue>> = None;
        loop {
            let mut request = self.client.scan().table_name(&self.table_name);
            if let Some(lek) = last_evaluated_key {
                request = request.set_exclusive_start_key(Some(lek));
            }
            let resp = request
                .send()
                .await
                .context(format!("DynamoDB: Failed to scan table '{}'", self.table_name))
                .map_err(RepoError::BackendError)?;
            if let Some(page) = resp.items {
                items.extend(page);
            }
            last_evaluated_key = resp.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl MemeRepository for DynamoDbMemeRepository {
    /// Scan, sort by creation time (newest first), slice the requested page.
    /// Fine at feed scale; a created_at index would replace this first.
    async fn list_page(&self, page: usize, page_size: usize) -> Result<Vec<MemeItem>, RepoError> {
        debug!(page, page_size, table = %self.table_name, "DynamoDB: listing meme page");
        let raw = self.scan_all().await?;
        let mut memes = Vec::with_capacity(raw.len());
        for item in &raw {
            match item_to_meme(item) {
                Some(meme) => memes.push(meme),
                None => {
                    let item_id = item.get("meme_id").and_then(|v| v.as_s().ok());
                    error!(item.id = ?item_id, table = %self.table_name, "DynamoDB: Failed to parse item into MemeItem");
                    return Err(RepoError::DataCorruption(format!(
                        "Failed to parse meme {:?} in table '{}'",
                        item_id, self.table_name
                    )));
                }
            }
        }
        memes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let start = page.saturating_sub(1) * page_size;
        if start >= memes.len() {
            return Ok(Vec::new());
        }
        let end = (start + page_size).min(memes.len());
        Ok(memes[start..end].to_vec())
    }

    async fn create(&self, meme: &MemeItem) -> Result<(), RepoError> {
        let mut request = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item("meme_id", AttributeValue::S(meme.id.clone()))
            .item("title", AttributeValue::S(meme.title.clone()))
            .item("category", AttributeValue::S(meme.category.clone()))
            .item("thumbnail", AttributeValue::S(meme.thumbnail.clone()))
            .item("creator_name", AttributeValue::S(meme.creator.name.clone()))
            .item("creator_avatar", AttributeValue::S(meme.creator.avatar.clone()))
            .item("views", AttributeValue::S(meme.views.display()))
            .item(
                "trending_score",
                AttributeValue::N(meme.trending_score.to_string()),
            )
            .item(
                "created_at",
                AttributeValue::S(meme.created_at.to_rfc3339()),
            );
        if let Some(user_id) = &meme.creator.user_id {
            request = request.item("creator_id", AttributeValue::S(user_id.clone()));
        }
        if let Some(video_url) = &meme.video_url {
            request = request.item("video_url", AttributeValue::S(video_url.clone()));
        }
        if let Some(duration) = &meme.duration {
            request = request.item("duration", AttributeValue::S(duration.clone()));
        }
        if let Some(score) = meme.virality_score {
            request = request.item("virality_score", AttributeValue::N(score.to_string()));
        }
        if let Some(reasoning) = &meme.ai_reasoning {
            request = request.item("ai_reasoning", AttributeValue::S(reasoning.clone()));
        }
        request
            .send()
            .await
            .context(format!(
                "DynamoDB (table: {}): Failed to put meme (id: {})",
                self.table_name, meme.id
            ))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RepoError> {
        debug!(meme_id = %id, table = %self.table_name, "DynamoDB: Deleting meme");
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("meme_id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .context(format!(
                "DynamoDB (table: {}): Failed to delete meme (id: {})",
                self.table_name, id
            ))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }
}

fn item_to_meme(item: &HashMap<String, AttributeValue>) -> Option<MemeItem> {
    let id = string_attr(item, "meme_id")?;
    let created_at = timestamp_attr(item, "created_at")?;
    Some(MemeItem {
        id,
        title: string_attr(item, "title")?,
        category: string_attr(item, "category")?,
        thumbnail: string_attr(item, "thumbnail")?,
        video_url: string_attr(item, "video_url"),
        duration: string_attr(item, "duration"),
        creator: Creator {
            name: string_attr(item, "creator_name")
                .unwrap_or_else(|| crate::models::FALLBACK_CREATOR_NAME.to_string()),
            avatar: string_attr(item, "creator_avatar")
                .unwrap_or_else(|| crate::models::FALLBACK_AVATAR_URL.to_string()),
            user_id: string_attr(item, "creator_id"),
        },
        views: ViewCount::parse(&string_attr(item, "views").unwrap_or_else(|| "0".to_string())),
        like_count: 0,
        is_liked: false,
        trending_score: number_attr(item, "trending_score").unwrap_or(0),
        virality_score: number_attr(item, "virality_score"),
        ai_reasoning: string_attr(item, "ai_reasoning"),
        created_at,
        time_posted: format_time_posted(created_at),
    })
}

// --- Likes ---

/// The `likes` table keys on (meme_id, viewer_id); the composite key plus a
/// conditional put gives the unique-pair guarantee.
#[derive(Debug, Clone)]
pub struct DynamoDbLikeRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbLikeRepository {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbLikeRepository");
        Self { client, table_name }
    }

    async fn scan_pairs(&self) -> Result<Vec<(String, String)>, RepoError> {
        let mut pairs = Vec::new();
        let mut last_evaluated_key: Option<HashMap<String, AttributeValue>> = None;
        loop {
            let mut request = self.client.scan().table_name(&self.table_name);
            if let Some(lek) = last_evaluated_key {
                request = request.set_exclusive_start_key(Some(lek));
            }
            let resp = request
                .send()
                .await
                .context(format!("DynamoDB: Failed to scan table '{}'", self.table_name))
                .map_err(RepoError::BackendError)?;
            for item in resp.items.unwrap_or_default() {
                let meme_id = string_attr(&item, "meme_id");
                let viewer_id = string_attr(&item, "viewer_id");
                match (meme_id, viewer_id) {
                    (Some(m), Some(v)) => pairs.push((m, v)),
                    _ => {
                        return Err(RepoError::DataCorruption(format!(
                            "Like record missing key attributes in table '{}'",
                            self.table_name
                        )));
                    }
                }
            }
            last_evaluated_key = resp.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
        }
        Ok(pairs)
    }
}

#[async_trait]
impl LikeRepository for DynamoDbLikeRepository {
    async fn liked_meme_ids(
        &self,
        viewer_id: &str,
        scope: Option<&[String]>,
    ) -> Result<HashSet<String>, RepoError> {
        let pairs = self.scan_pairs().await?;
        let ids = pairs
            .into_iter()
            .filter(|(m, v)| {
                v == viewer_id && scope.map(|s| s.contains(m)).unwrap_or(true)
            })
            .map(|(m, _)| m)
            .collect();
        Ok(ids)
    }

    async fn like_counts(
        &self,
        scope: Option<&[String]>,
    ) -> Result<HashMap<String, u64>, RepoError> {
        let pairs = self.scan_pairs().await?;
        let mut counts: HashMap<String, u64> = HashMap::new();
        for (meme_id, _) in pairs {
            if scope.map(|s| s.contains(&meme_id)).unwrap_or(true) {
                *counts.entry(meme_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn create(&self, viewer_id: &str, meme_id: &str) -> Result<(), RepoError> {
        debug!(viewer_id, meme_id, table = %self.table_name, "DynamoDB: inserting like");
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item("meme_id", AttributeValue::S(meme_id.to_string()))
            .item("viewer_id", AttributeValue::S(viewer_id.to_string()))
            .item("created_at", AttributeValue::S(Utc::now().to_rfc3339()))
            .condition_expression("attribute_not_exists(viewer_id)")
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                // A failed attribute_not_exists condition means the viewer
                // already likes this meme.
                if let SdkError::ServiceError(service_err) = &e {
                    if service_err.err().is_conditional_check_failed_exception() {
                        return Err(RepoError::Conflict(format!("like {viewer_id}/{meme_id}")));
                    }
                }
                Err(RepoError::BackendError(anyhow::Error::new(e).context(
                    format!(
                        "DynamoDB (table: {}): Failed to put like {}/{}",
                        self.table_name, viewer_id, meme_id
                    ),
                )))
            }
        }
    }

    async fn delete(&self, viewer_id: &str, meme_id: &str) -> Result<(), RepoError> {
        debug!(viewer_id, meme_id, table = %self.table_name, "DynamoDB: deleting like");
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("meme_id", AttributeValue::S(meme_id.to_string()))
            .key("viewer_id", AttributeValue::S(viewer_id.to_string()))
            .send()
            .await
            .context(format!(
                "DynamoDB (table: {}): Failed to delete like {}/{}",
                self.table_name, viewer_id, meme_id
            ))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }
}

// --- Subscriptions ---

/// Keys on (follower_id, target_id), so the follow-set is one Query on the
/// hash key.
#[derive(Debug, Clone)]
pub struct DynamoDbSubscriptionRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbSubscriptionRepository {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbSubscriptionRepository");
        Self { client, table_name }
    }
}

#[async_trait]
impl SubscriptionRepository for DynamoDbSubscriptionRepository {
    async fn following(&self, follower_id: &str) -> Result<HashSet<String>, RepoError> {
        let resp = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("follower_id = :f")
            .expression_attribute_values(":f", AttributeValue::S(follower_id.to_string()))
            .send()
            .await
            .context(format!(
                "DynamoDB (table: {}): Failed to query follow-set for {}",
                self.table_name, follower_id
            ))
            .map_err(RepoError::BackendError)?;
        let mut following = HashSet::new();
        for item in resp.items.unwrap_or_default() {
            match string_attr(&item, "target_id") {
                Some(target) => {
                    following.insert(target);
                }
                None => {
                    return Err(RepoError::DataCorruption(format!(
                        "Subscription record missing target_id in table '{}'",
                        self.table_name
                    )));
                }
            }
        }
        Ok(following)
    }

    async fn create(&self, follower_id: &str, target_id: &str) -> Result<(), RepoError> {
        debug!(follower_id, target_id, table = %self.table_name, "DynamoDB: inserting subscription");
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item("follower_id", AttributeValue::S(follower_id.to_string()))
            .item("target_id", AttributeValue::S(target_id.to_string()))
            .item("created_at", AttributeValue::S(Utc::now().to_rfc3339()))
            .condition_expression("attribute_not_exists(target_id)")
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                // Duplicate (follower, target) pair.
                if let SdkError::ServiceError(service_err) = &e {
                    if service_err.err().is_conditional_check_failed_exception() {
                        return Err(RepoError::Conflict(format!(
                            "subscription {follower_id}/{target_id}"
                        )));
                    }
                }
                Err(RepoError::BackendError(anyhow::Error::new(e).context(
                    format!(
                        "DynamoDB (table: {}): Failed to put subscription {}/{}",
                        self.table_name, follower_id, target_id
                    ),
                )))
            }
        }
    }
}

// --- Notifications ---

#[derive(Debug, Clone)]
pub struct DynamoDbNotificationRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbNotificationRepository {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbNotificationRepository");
        Self { client, table_name }
    }
}

#[async_trait]
impl NotificationRepository for DynamoDbNotificationRepository {
    async fn recent_unread(
        &self,
        recipient_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, RepoError> {
        let resp = self
            .client
            .scan()
            .table_name(&self.table_name)
            .filter_expression("recipient_id = :r AND is_read = :unread")
            .expression_attribute_values(":r", AttributeValue::S(recipient_id.to_string()))
            .expression_attribute_values(":unread", AttributeValue::Bool(false))
            .send()
            .await
            .context(format!(
                "DynamoDB (table: {}): Failed to scan notifications for {}",
                self.table_name, recipient_id
            ))
            .map_err(RepoError::BackendError)?;

        let mut notifications = Vec::new();
        for item in resp.items.unwrap_or_default() {
            match item_to_notification(&item) {
                Some(n) => notifications.push(n),
                None => {
                    let item_id = item.get("notification_id").and_then(|v| v.as_s().ok());
                    error!(item.id = ?item_id, table = %self.table_name, "DynamoDB: Failed to parse item into Notification");
                    return Err(RepoError::DataCorruption(format!(
                        "Failed to parse notification {:?} in table '{}'",
                        item_id, self.table_name
                    )));
                }
            }
        }
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notifications.truncate(limit);
        Ok(notifications)
    }

    async fn create(&self, notification: &Notification) -> Result<(), RepoError> {
        let mut request = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item(
                "notification_id",
                AttributeValue::S(notification.id.clone()),
            )
            .item(
                "recipient_id",
                AttributeValue::S(notification.recipient_id.clone()),
            )
            .item("kind", AttributeValue::S(kind_to_str(notification.kind).to_string()))
            .item("content", AttributeValue::S(notification.content.clone()))
            .item("is_read", AttributeValue::Bool(notification.is_read))
            .item(
                "created_at",
                AttributeValue::S(notification.created_at.to_rfc3339()),
            );
        if let Some(metadata) = &notification.metadata {
            request = request.item("metadata", AttributeValue::S(metadata.to_string()));
        }
        request
            .send()
            .await
            .context(format!(
                "DynamoDB (table: {}): Failed to put notification (id: {})",
                self.table_name, notification.id
            ))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }

    async fn mark_read(&self, id: &str) -> Result<(), RepoError> {
        debug!(notification_id = %id, table = %self.table_name, "DynamoDB: marking notification read");
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key("notification_id", AttributeValue::S(id.to_string()))
            .update_expression("SET is_read = :read")
            .expression_attribute_values(":read", AttributeValue::Bool(true))
            .send()
            .await
            .context(format!(
                "DynamoDB (table: {}): Failed to mark notification read (id: {})",
                self.table_name, id
            ))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }
}

fn kind_to_str(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Like => "like",
        NotificationKind::Comment => "comment",
        NotificationKind::Follow => "follow",
        NotificationKind::System => "system",
    }
}

fn item_to_notification(item: &HashMap<String, AttributeValue>) -> Option<Notification> {
    let kind = match string_attr(item, "kind")?.as_str() {
        "like" => NotificationKind::Like,
        "comment" => NotificationKind::Comment,
        "follow" => NotificationKind::Follow,
        "system" => NotificationKind::System,
        _ => return None,
    };
    Some(Notification {
        id: string_attr(item, "notification_id")?,
        recipient_id: string_attr(item, "recipient_id")?,
        kind,
        content: string_attr(item, "content")?,
        is_read: item
            .get("is_read")
            .and_then(|v| v.as_bool().ok())
            .copied()
            .unwrap_or(false),
        created_at: timestamp_attr(item, "created_at")?,
        metadata: string_attr(item, "metadata").and_then(|raw| serde_json::from_str(&raw).ok()),
    })
}
