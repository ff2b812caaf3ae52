//! Attachments
//!
//! Media queued to accompany the next outgoing message, and the store that
//! holds them until a send binds them to a user message.
//!
//! The store hands attachments out through [`AttachmentStore::drain_all`],
//! which empties it in the same call, so an attachment is bound to at most
//! one message.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::Part;

/// Attachment identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentId(pub String);

impl AttachmentId {
    /// Generate a new unique attachment ID
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl Default for AttachmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attachment contents
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentPayload {
    /// Raw bytes sent inline with the request
    Bytes(Vec<u8>),
    /// Remote file referenced by URI
    Url(String),
}

/// Loading state of an attachment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadingState {
    /// Still being read or fetched
    Loading,
    /// Ready to send
    Loaded,
    /// Could not be loaded
    Failed(String),
}

/// Broad media category, derived from the MIME type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentKind {
    /// `image/*`
    Image,
    /// `video/*`
    Video,
    /// `audio/*`
    Audio,
    /// `application/pdf`
    Pdf,
    /// Remote link without a more specific type
    Link,
    /// Anything else
    Other,
}

/// A unit of media queued for an outgoing message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Unique ID
    pub id: AttachmentId,
    /// MIME type, e.g. `image/png`
    pub mime_type: String,
    /// Name shown to the user
    pub display_name: String,
    /// Contents
    pub payload: AttachmentPayload,
    /// Loading state
    pub loading_state: LoadingState,
}

impl Attachment {
    /// Create a loaded attachment from in-memory bytes
    pub fn from_bytes(
        display_name: impl Into<String>,
        mime_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            id: AttachmentId::new(),
            mime_type: mime_type.into(),
            display_name: display_name.into(),
            payload: AttachmentPayload::Bytes(data),
            loading_state: LoadingState::Loaded,
        }
    }

    /// Create a loaded attachment that references a remote file
    pub fn from_url(url: impl Into<String>, mime_type: impl Into<String>) -> Self {
        let url = url.into();
        let display_name = url
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(url.as_str())
            .to_string();
        Self {
            id: AttachmentId::new(),
            mime_type: mime_type.into(),
            display_name,
            payload: AttachmentPayload::Url(url),
            loading_state: LoadingState::Loaded,
        }
    }

    /// Read a file from disk into an attachment
    ///
    /// The MIME type is inferred from the file extension. A read failure is
    /// not an error: the attachment comes back in the `Failed` loading state
    /// so the caller can show it and let the user remove it.
    pub async fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = mime_type_for_path(path).to_string();

        match tokio::fs::read(path).await {
            Ok(data) => Self {
                id: AttachmentId::new(),
                mime_type,
                display_name,
                payload: AttachmentPayload::Bytes(data),
                loading_state: LoadingState::Loaded,
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read attachment");
                Self {
                    id: AttachmentId::new(),
                    mime_type,
                    display_name,
                    payload: AttachmentPayload::Bytes(Vec::new()),
                    loading_state: LoadingState::Failed(e.to_string()),
                }
            }
        }
    }

    /// Media category
    #[must_use]
    pub fn kind(&self) -> AttachmentKind {
        let mime = self.mime_type.as_str();
        if mime == "application/pdf" {
            AttachmentKind::Pdf
        } else if mime.starts_with("image/") {
            AttachmentKind::Image
        } else if mime.starts_with("video/") {
            AttachmentKind::Video
        } else if mime.starts_with("audio/") {
            AttachmentKind::Audio
        } else if matches!(self.payload, AttachmentPayload::Url(_)) {
            AttachmentKind::Link
        } else {
            AttachmentKind::Other
        }
    }

    /// Payload size in bytes (0 for remote files)
    #[must_use]
    pub fn size(&self) -> usize {
        match &self.payload {
            AttachmentPayload::Bytes(data) => data.len(),
            AttachmentPayload::Url(_) => 0,
        }
    }

    /// Whether this attachment will produce a request part
    ///
    /// False while loading, after a failed load, or with an empty payload.
    #[must_use]
    pub fn is_sendable(&self) -> bool {
        self.loading_state == LoadingState::Loaded
            && match &self.payload {
                AttachmentPayload::Bytes(data) => !data.is_empty(),
                AttachmentPayload::Url(uri) => !uri.is_empty(),
            }
    }

    /// Convert to a request part
    ///
    /// Returns `None` unless [`is_sendable`](Self::is_sendable).
    #[must_use]
    pub fn to_part(&self) -> Option<Part> {
        if !self.is_sendable() {
            return None;
        }
        match &self.payload {
            AttachmentPayload::Bytes(data) => Some(Part::InlineData {
                mime_type: self.mime_type.clone(),
                data: data.clone(),
            }),
            AttachmentPayload::Url(uri) => Some(Part::FileData {
                mime_type: self.mime_type.clone(),
                uri: uri.clone(),
            }),
        }
    }
}

/// Infer a MIME type from a file extension
///
/// Unknown extensions map to `application/octet-stream`.
#[must_use]
pub fn mime_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        // Documents / text
        "pdf" => "application/pdf",
        "txt" | "text" => "text/plain",

        // Images
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",

        // Video
        "flv" => "video/x-flv",
        "mov" | "qt" => "video/quicktime",
        "mpeg" => "video/mpeg",
        "mpg" => "video/mpg",
        "ps" => "video/mpegps",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "wmv" => "video/wmv",
        "3gp" | "3gpp" => "video/3gpp",

        // Audio
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/m4a",
        "mpga" => "audio/mpga",
        "mp4a" => "audio/mp4",
        "opus" => "audio/opus",
        "pcm" | "raw" => "audio/pcm",
        "wav" => "audio/wav",
        "weba" => "audio/webm",

        _ => "application/octet-stream",
    }
}

/// Attachments waiting for the next send
#[derive(Clone, Debug, Default)]
pub struct AttachmentStore {
    pending: Vec<Attachment>,
}

impl AttachmentStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an attachment
    pub fn add(&mut self, attachment: Attachment) {
        self.pending.push(attachment);
    }

    /// Remove an attachment by ID
    pub fn remove(&mut self, id: &AttachmentId) -> Option<Attachment> {
        let idx = self.pending.iter().position(|a| &a.id == id)?;
        Some(self.pending.remove(idx))
    }

    /// Take every pending attachment, in insertion order, leaving the store empty
    pub fn drain_all(&mut self) -> Vec<Attachment> {
        std::mem::take(&mut self.pending)
    }

    /// Drop every pending attachment
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Look up an attachment by ID
    #[must_use]
    pub fn get(&self, id: &AttachmentId) -> Option<&Attachment> {
        self.pending.iter().find(|a| &a.id == id)
    }

    /// Iterate pending attachments in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Attachment> {
        self.pending.iter()
    }

    /// Pending attachments in insertion order
    #[must_use]
    pub fn as_slice(&self) -> &[Attachment] {
        &self.pending
    }

    /// Number of pending attachments
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn image() -> Attachment {
        Attachment::from_bytes("cat.png", "image/png", vec![1, 2, 3])
    }

    fn pdf() -> Attachment {
        Attachment::from_bytes("paper.pdf", "application/pdf", vec![4, 5])
    }

    #[test]
    fn test_drain_all_is_at_most_once() {
        let mut store = AttachmentStore::new();
        let a = image();
        let b = pdf();
        store.add(a.clone());
        store.add(b.clone());

        let first = store.drain_all();
        let second = store.drain_all();

        assert_eq!(first, vec![a, b]);
        assert!(second.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_by_identity() {
        let mut store = AttachmentStore::new();
        let a = image();
        let b = image();
        store.add(a.clone());
        store.add(b.clone());

        let removed = store.remove(&a.id).unwrap();
        assert_eq!(removed.id, a.id);
        assert_eq!(store.len(), 1);
        assert!(store.get(&b.id).is_some());
        assert!(store.remove(&a.id).is_none());
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(image().kind(), AttachmentKind::Image);
        assert_eq!(pdf().kind(), AttachmentKind::Pdf);
        assert_eq!(
            Attachment::from_bytes("a.mp3", "audio/mpeg", vec![0]).kind(),
            AttachmentKind::Audio
        );
        assert_eq!(
            Attachment::from_url("https://example.com/page", "text/html").kind(),
            AttachmentKind::Link
        );
        assert_eq!(
            Attachment::from_url("gs://bucket/clip.mp4", "video/mp4").kind(),
            AttachmentKind::Video
        );
    }

    #[test]
    fn test_mime_type_for_path() {
        assert_eq!(mime_type_for_path(Path::new("a.PDF")), "application/pdf");
        assert_eq!(mime_type_for_path(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_type_for_path(Path::new("a.mov")), "video/quicktime");
        assert_eq!(mime_type_for_path(Path::new("a.3gpp")), "video/3gpp");
        assert_eq!(mime_type_for_path(Path::new("a.mp3")), "audio/mpeg");
        assert_eq!(mime_type_for_path(Path::new("a.weba")), "audio/webm");
        assert_eq!(
            mime_type_for_path(Path::new("noext")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_to_part() {
        let part = image().to_part().unwrap();
        assert!(matches!(part, Part::InlineData { ref mime_type, .. } if mime_type == "image/png"));

        let url = Attachment::from_url("gs://bucket/clip.mp4", "video/mp4");
        assert_eq!(url.display_name, "clip.mp4");
        assert_eq!(
            url.to_part(),
            Some(Part::FileData {
                mime_type: "video/mp4".to_string(),
                uri: "gs://bucket/clip.mp4".to_string(),
            })
        );

        let empty = Attachment::from_bytes("empty.png", "image/png", Vec::new());
        assert!(empty.to_part().is_none());

        let mut loading = image();
        loading.loading_state = LoadingState::Loading;
        assert!(loading.to_part().is_none());
    }

    #[tokio::test]
    async fn test_from_path_reads_file() {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(b"not really a png").unwrap();

        let attachment = Attachment::from_path(file.path()).await;
        assert_eq!(attachment.mime_type, "image/png");
        assert_eq!(attachment.loading_state, LoadingState::Loaded);
        assert_eq!(attachment.size(), 16);
    }

    #[tokio::test]
    async fn test_from_path_missing_file() {
        let attachment = Attachment::from_path("/definitely/not/here.wav").await;
        assert_eq!(attachment.mime_type, "audio/wav");
        assert_eq!(attachment.display_name, "here.wav");
        assert!(matches!(attachment.loading_state, LoadingState::Failed(_)));
        assert!(attachment.to_part().is_none());
    }
}
