use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Creator identity attached to seeded/template content. Items carrying it
/// (or no owner at all) never receive like/follow notifications.
pub const SEED_CREATOR_ID: &str = "seed";

pub const FALLBACK_CREATOR_NAME: &str = "Anonymous";
pub const FALLBACK_AVATAR_URL: &str = "https://i.pravatar.cc/150?u=anon";

/// The signed-in user as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    /// Email-like identity, used as the owner key in likes/subscriptions.
    pub id: String,
    pub name: String,
    pub avatar: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub name: String,
    pub avatar: String,
    /// Owner identity, if the item was posted by a signed-in user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Creator {
    pub fn anonymous() -> Self {
        Self {
            name: FALLBACK_CREATOR_NAME.to_string(),
            avatar: FALLBACK_AVATAR_URL.to_string(),
            user_id: None,
        }
    }

    pub fn from_viewer(viewer: &Viewer) -> Self {
        Self {
            name: viewer.name.clone(),
            avatar: viewer.avatar.clone(),
            user_id: Some(viewer.id.clone()),
        }
    }

    /// Seeded or ownerless creators don't receive notifications.
    pub fn is_placeholder(&self) -> bool {
        match self.user_id.as_deref() {
            None => true,
            Some(id) => id == SEED_CREATOR_ID,
        }
    }
}

/// View counter. The backend stores view counts as display strings, some of
/// which arrive pre-abbreviated ("1.2M"). Abbreviated values are carried
/// through untouched; everything else is kept numeric and formatted only
/// when rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCount {
    Exact(u64),
    /// Pre-abbreviated wire value, e.g. "2.4M". Never re-derived.
    Abbreviated(String),
}

impl ViewCount {
    pub fn zero() -> Self {
        ViewCount::Exact(0)
    }

    /// Lenient parse of a wire value: abbreviation markers are preserved,
    /// plain integers (with optional thousands separators) become numeric,
    /// anything unparseable collapses to zero.
    pub fn parse(raw: &str) -> Self {
        if raw.contains('M') || raw.contains('K') {
            return ViewCount::Abbreviated(raw.to_string());
        }
        match raw.replace(',', "").parse::<u64>() {
            Ok(n) => ViewCount::Exact(n),
            Err(_) => ViewCount::Exact(0),
        }
    }

    /// Best-effort increment: abbreviated values are left untouched.
    pub fn bump(&mut self) {
        if let ViewCount::Exact(n) = self {
            *n += 1;
        }
    }

    pub fn display(&self) -> String {
        match self {
            ViewCount::Exact(n) => format_views(*n),
            ViewCount::Abbreviated(s) => s.clone(),
        }
    }
}

impl Serialize for ViewCount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.display())
    }
}

impl<'de> Deserialize<'de> for ViewCount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ViewCount::parse(&raw))
    }
}

/// Render-time abbreviation: 1_200_000 -> "1.2M", 45_300 -> "45.3K".
pub fn format_views(n: u64) -> String {
    if n >= 1_000_000 {
        trim_decimal(n as f64 / 1_000_000.0, "M")
    } else if n >= 1_000 {
        trim_decimal(n as f64 / 1_000.0, "K")
    } else {
        n.to_string()
    }
}

fn trim_decimal(value: f64, suffix: &str) -> String {
    let s = format!("{:.1}", value);
    let s = s.strip_suffix(".0").unwrap_or(&s);
    format!("{}{}", s, suffix)
}

/// One piece of shareable content with metadata and engagement counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemeItem {
    /// Server-assigned opaque identity.
    pub id: String,
    pub title: String,
    pub category: String,
    pub thumbnail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    pub creator: Creator,
    pub views: ViewCount,
    #[serde(default)]
    pub like_count: u64,
    /// Whether the current viewer likes this item. Identity-scoped,
    /// re-derived on every (re)initialization.
    #[serde(default)]
    pub is_liked: bool,
    pub trending_score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virality_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_reasoning: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Display-formatted creation timestamp ("Just now" for fresh inserts).
    pub time_posted: String,
}

impl MemeItem {
    /// A freshly posted item: zeroed counters, baseline trending score.
    pub fn new_posted(
        id: String,
        title: String,
        category: String,
        thumbnail: String,
        video_url: Option<String>,
        duration: Option<String>,
        creator: Creator,
    ) -> Self {
        Self {
            id,
            title,
            category,
            thumbnail,
            video_url,
            duration,
            creator,
            views: ViewCount::zero(),
            like_count: 0,
            is_liked: false,
            trending_score: 100,
            virality_score: None,
            ai_reasoning: None,
            created_at: Utc::now(),
            time_posted: "Just now".to_string(),
        }
    }
}

pub fn format_time_posted(created_at: DateTime<Utc>) -> String {
    created_at.format("%-m/%-d/%Y").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    /// Identity of the user this notification belongs to.
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub content: String,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}
