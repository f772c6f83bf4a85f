#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Container holding uploaded originals.
pub const PHOTOS: &str = "photos";
/// Container holding thumbnails derived from originals.
pub const THUMBNAILS: &str = "thumbnails";

/// Metadata key of the uploader's stable identifier.
pub const OWNER_KEY: &str = "Owner";
/// Metadata key of the generated caption.
pub const CAPTION_KEY: &str = "Caption";
const TAG_KEY_PREFIX: &str = "Tag";

/// String-to-string metadata attached to a stored object.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key of the tag at `index`, i.e. `Tag0`, `Tag1`, ...
#[must_use]
pub fn tag_key(index: usize) -> String {
    format!("{TAG_KEY_PREFIX}{index}")
}

/// Decodes the ordered tag list from the flat `Tag{i}` fields.
///
/// Reading stops at the first missing index so a stray `Tag7` without
/// `Tag0..Tag6` is ignored.
#[must_use]
pub fn tags_from_metadata(metadata: &Metadata) -> Vec<String> {
    (0..)
        .map_while(|index| metadata.get(&tag_key(index)).cloned())
        .collect()
}

/// Describes an object stored in one of the containers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BlobInfo {
    /// Container the object lives in (`photos` or `thumbnails`)
    pub container: String,
    /// Object name, unique within the container
    pub name: String,
    /// Declared MIME type of the content
    pub content_type: String,
    /// Size of the content in bytes
    pub size: usize,
    /// BLAKE3 hash of the content
    pub blake3_hash: String,
}

/// A photo as presented by the listing.
///
/// Built per request from the stored original and its metadata, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DisplayRecord {
    /// Location of the original image
    pub image_uri: String,
    /// Location of the thumbnail derived from the original
    pub thumbnail_uri: String,
    /// Generated caption, or the file name when no caption was recorded
    pub caption: String,
    /// Tags recorded for the photo, in the order the vision service returned them
    #[serde(default)]
    pub tags: Vec<String>,
}

/// The listing page: a pending notice (shown once) and all photos.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Gallery {
    /// Message left by the previous upload, if any
    pub notice: Option<String>,
    pub photos: Vec<DisplayRecord>,
}

/// Stored original together with its raw metadata mapping.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PhotoDetails {
    pub name: String,
    pub content_type: String,
    pub size: usize,
    pub metadata: Metadata,
}

/// Step of the upload sequence that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UploadStep {
    /// Original stored in `photos`
    Original,
    /// Thumbnail stored in `thumbnails`
    Thumbnail,
    /// Vision service returned a description
    Annotation,
    /// Owner, caption and tags written onto the original
    Metadata,
}

/// Outcome of one upload.
///
/// `completed` lists every step that persisted, so a failed upload tells the
/// caller exactly what is left in storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UploadReport {
    /// Sanitized name the photo was stored under
    pub file_name: Option<String>,
    pub completed: Vec<UploadStep>,
    pub caption: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Rejection or failure message; absent on success
    pub message: Option<String>,
}

impl UploadReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.message.is_none()
    }
}
