use crate::domain::{MediaStorage, MemeRepository};
use crate::errors::{StorageError, StoreError};
use crate::feed::FeedStore;
use crate::models::{Creator, MemeItem};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaKind {
    Image,
    Video,
}

/// A file handed over by the UI's drop zone or file picker.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: String,
    pub data: Vec<u8>,
    /// Caption for the post; defaults to the file name without extension.
    pub caption: Option<String>,
}

#[derive(Debug, Clone)]
pub enum UploadOutcome {
    /// No signed-in viewer; the caller should route to the sign-in surface.
    SignInRequired,
    Posted(MemeItem),
}

/// Media upload flow: validate the file, push the bytes to storage, insert
/// the meme record, then optimistically insert it into the local feed (the
/// realtime echo of the insert is deduplicated by identity).
pub struct Uploader {
    storage: Arc<dyn MediaStorage>,
    memes: Arc<dyn MemeRepository>,
}

impl Uploader {
    pub fn new(storage: Arc<dyn MediaStorage>, memes: Arc<dyn MemeRepository>) -> Self {
        Self { storage, memes }
    }

    pub async fn post(
        &self,
        store: &FeedStore,
        upload: MediaUpload,
    ) -> Result<UploadOutcome, StoreError> {
        let Some(viewer) = store.current_viewer().await else {
            return Ok(UploadOutcome::SignInRequired);
        };
        if upload.data.is_empty() {
            return Err(StorageError::UploadFailed("file data cannot be empty".to_string()).into());
        }

        let extension = upload
            .file_name
            .rsplit('.')
            .next()
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();
        let kind = if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            MediaKind::Image
        } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            MediaKind::Video
        } else {
            return Err(StorageError::UnsupportedMedia(upload.file_name.clone()).into());
        };

        let meme_id = Uuid::new_v4().to_string();
        let object_key = format!("{}.{}", meme_id, extension);
        let content_type = mime_guess::from_path(&object_key)
            .first_raw()
            .map(|s| s.to_string());

        debug!(s3_key = %object_key, ?kind, "Uploading media");
        let public_url = self
            .storage
            .upload(&object_key, upload.data, content_type)
            .await?;

        let caption = upload
            .caption
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| file_stem(&upload.file_name));

        let item = MemeItem::new_posted(
            meme_id,
            caption,
            match kind {
                MediaKind::Video => "Video".to_string(),
                MediaKind::Image => "Image".to_string(),
            },
            public_url.clone(),
            (kind == MediaKind::Video).then_some(public_url),
            None,
            Creator::from_viewer(&viewer),
        );

        self.memes.create(&item).await?;
        store.add_meme(item.clone()).await;
        info!(meme_id = %item.id, "Meme posted");
        Ok(UploadOutcome::Posted(item))
    }
}

fn file_stem(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stem_drops_only_the_extension() {
        assert_eq!(file_stem("cat.mp4"), "cat");
        assert_eq!(file_stem("my.cat.mp4"), "my.cat");
        assert_eq!(file_stem("noext"), "noext");
        assert_eq!(file_stem(".hidden"), ".hidden");
    }
}
