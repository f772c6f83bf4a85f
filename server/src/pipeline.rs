//! Upload-and-enrich pipeline: validate, store the original, store a
//! thumbnail, annotate, record owner, caption and tags.
//!
//! Steps run strictly in order and nothing is rolled back. A failure reports
//! the steps that already persisted.

use std::fmt::Display;

use axum::body::Bytes;
use kernel::{
    tag_key, Metadata, UploadReport, UploadStep, CAPTION_KEY, OWNER_KEY, PHOTOS, THUMBNAILS,
};
use thiserror::Error;

use crate::domain::BlobStore;
use crate::identity::Owner;
use crate::locator::BlobLocator;
use crate::thumbnail::{self, ThumbnailError};
use crate::vision::{AnnotateError, Annotator};

pub const NOT_AN_IMAGE_MESSAGE: &str = "Only image files may be uploaded";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Only image files may be uploaded")]
    NotAnImage,
    #[error("Uploaded file has no usable name")]
    InvalidName,
    #[error("{0}")]
    Storage(String),
    #[error(transparent)]
    Thumbnail(#[from] ThumbnailError),
    #[error(transparent)]
    Annotation(#[from] AnnotateError),
}

impl UploadError {
    fn storage<E: Display>(e: E) -> Self {
        Self::Storage(e.to_string())
    }
}

/// A file as submitted by the client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug)]
pub struct Uploaded {
    pub file_name: String,
    pub caption: String,
    pub tags: Vec<String>,
}

#[derive(Debug)]
pub struct UploadFailure {
    pub file_name: Option<String>,
    pub completed: Vec<UploadStep>,
    pub error: UploadError,
}

impl UploadFailure {
    fn rejected(error: UploadError) -> Self {
        Self {
            file_name: None,
            completed: Vec::new(),
            error,
        }
    }
}

impl From<Uploaded> for UploadReport {
    fn from(uploaded: Uploaded) -> Self {
        Self {
            file_name: Some(uploaded.file_name),
            completed: vec![
                UploadStep::Original,
                UploadStep::Thumbnail,
                UploadStep::Annotation,
                UploadStep::Metadata,
            ],
            caption: Some(uploaded.caption),
            tags: uploaded.tags,
            message: None,
        }
    }
}

impl From<UploadFailure> for UploadReport {
    fn from(failure: UploadFailure) -> Self {
        Self {
            file_name: failure.file_name,
            completed: failure.completed,
            caption: None,
            tags: Vec::new(),
            message: Some(failure.error.to_string()),
        }
    }
}

/// Strips directory components, both `/` and `\` separated.
pub fn sanitize_file_name(path: &str) -> &str {
    match path.rfind(['\\', '/']) {
        Some(ix) => &path[ix + 1..],
        None => path,
    }
}

fn validate(file: Option<UploadedFile>) -> Result<(String, String, Bytes), UploadError> {
    let Some(file) = file else {
        return Err(UploadError::NotAnImage);
    };
    let Some(content_type) = file.content_type.filter(|t| t.starts_with("image")) else {
        return Err(UploadError::NotAnImage);
    };
    if file.data.is_empty() {
        return Err(UploadError::NotAnImage);
    }
    let name = sanitize_file_name(&file.file_name);
    // `.` and `..` would collapse out of blob URIs
    if matches!(name, "" | "." | "..") {
        return Err(UploadError::InvalidName);
    }
    Ok((name.to_owned(), content_type, file.data))
}

/// Metadata recorded on an original: owner, caption and `Tag{i}` per tag.
pub fn provenance(owner: &Owner, caption: &str, tags: &[String]) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(OWNER_KEY.to_owned(), owner.as_str().to_owned());
    metadata.insert(CAPTION_KEY.to_owned(), caption.to_owned());
    for (index, tag) in tags.iter().enumerate() {
        metadata.insert(tag_key(index), tag.clone());
    }
    metadata
}

struct Progress {
    file_name: String,
    completed: Vec<UploadStep>,
}

impl Progress {
    fn record<T>(&mut self, step: UploadStep, result: Result<T, UploadError>) -> Result<T, UploadFailure> {
        match result {
            Ok(value) => {
                tracing::info!("file: {} step {:?} done", self.file_name, step);
                self.completed.push(step);
                Ok(value)
            }
            Err(error) => {
                tracing::error!("file: {} step {:?} failed. Error: {}", self.file_name, step, error);
                Err(UploadFailure {
                    file_name: Some(self.file_name.clone()),
                    completed: self.completed.clone(),
                    error,
                })
            }
        }
    }
}

pub struct Pipeline<'a, S> {
    store: &'a mut S,
    annotator: &'a dyn Annotator,
    locator: &'a BlobLocator,
}

impl<'a, S: BlobStore> Pipeline<'a, S> {
    pub fn new(store: &'a mut S, annotator: &'a dyn Annotator, locator: &'a BlobLocator) -> Self {
        Self {
            store,
            annotator,
            locator,
        }
    }

    /// Runs the whole upload for `owner`.
    ///
    /// Rejected input performs no writes. Later failures leave whatever steps
    /// already completed in storage; the failure lists them.
    pub async fn upload(
        &mut self,
        file: Option<UploadedFile>,
        owner: &Owner,
    ) -> Result<Uploaded, UploadFailure> {
        let (file_name, content_type, data) = validate(file).map_err(|e| {
            tracing::warn!("upload rejected: {e}");
            UploadFailure::rejected(e)
        })?;

        let mut progress = Progress {
            file_name: file_name.clone(),
            completed: Vec::with_capacity(4),
        };

        let stored = self
            .store
            .upload_blob(PHOTOS, &file_name, &content_type, &data)
            .map_err(UploadError::storage);
        progress.record(UploadStep::Original, stored)?;

        let thumbnail = thumbnail::generate(data).await.map_err(UploadError::from);
        let thumbnail = progress.record(UploadStep::Thumbnail, thumbnail.and_then(|thumbnail| {
            self.store
                .upload_blob(THUMBNAILS, &file_name, thumbnail.content_type, &thumbnail.data)
                .map_err(UploadError::storage)
        }))?;
        tracing::debug!("file: {} thumbnail {} bytes", file_name, thumbnail.size);

        let image_uri = self.locator.blob_uri(PHOTOS, &file_name);
        let described = self
            .annotator
            .describe(&image_uri)
            .await
            .and_then(|description| {
                let caption = description.first_caption()?.to_owned();
                Ok((caption, description.tags))
            })
            .map_err(UploadError::from);
        let (caption, tags) = progress.record(UploadStep::Annotation, described)?;

        let metadata = provenance(owner, &caption, &tags);
        let written = self
            .store
            .set_metadata(PHOTOS, &file_name, &metadata)
            .map_err(UploadError::storage);
        progress.record(UploadStep::Metadata, written)?;

        Ok(Uploaded {
            file_name,
            caption,
            tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::Sqlite;
    use crate::vision::{Caption, Description};
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat};
    use rstest::rstest;
    use std::io::Cursor;
    use std::sync::Mutex;

    struct Scripted {
        responses: Mutex<Vec<Result<Description, AnnotateError>>>,
        seen: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<Description, AnnotateError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Annotator for Scripted {
        async fn describe(&self, image_uri: &str) -> Result<Description, AnnotateError> {
            self.seen.lock().unwrap().push(image_uri.to_owned());
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn description(caption: &str, tags: &[&str]) -> Description {
        Description {
            tags: tags.iter().map(|t| (*t).to_owned()).collect(),
            captions: vec![Caption {
                text: caption.to_owned(),
                confidence: 0.9,
            }],
        }
    }

    fn png(width: u32, height: u32) -> Bytes {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::new_rgb8(width, height)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        Bytes::from(buffer.into_inner())
    }

    fn file(name: &str, content_type: Option<&str>, data: Bytes) -> Option<UploadedFile> {
        Some(UploadedFile {
            file_name: name.to_owned(),
            content_type: content_type.map(str::to_owned),
            data,
        })
    }

    fn locator() -> BlobLocator {
        BlobLocator::new("http://localhost:5000").unwrap()
    }

    #[rstest]
    #[case("", "")]
    #[case("file.ext", "file.ext")]
    #[case("dir/file.ext", "file.ext")]
    #[case("dir\\file.ext", "file.ext")]
    #[case("dir1\\dir2\\file.ext", "file.ext")]
    #[case("dir1/dir2/file.ext", "file.ext")]
    #[case("C:\\Users\\me\\Pictures\\cat.jpg", "cat.jpg")]
    #[case("dir/", "")]
    #[case("dir/..", "..")]
    #[case("dir\\.", ".")]
    #[trace]
    fn sanitize_file_name_cases(#[case] path: &str, #[case] expected: &str) {
        // Act
        let name = sanitize_file_name(path);

        // Assert
        assert_eq!(name, expected);
    }

    #[rstest]
    #[case(file("a.txt", Some("text/plain"), Bytes::from_static(b"hello")))]
    #[case(file("a.png", None, Bytes::from_static(b"hello")))]
    #[case(file("a.png", Some("application/octet-stream"), Bytes::from_static(b"png")))]
    #[case(file("a.png", Some("Image/png"), Bytes::from_static(b"png")))]
    #[case(file("a.png", Some("image/png"), Bytes::new()))]
    #[case(None)]
    #[tokio::test]
    async fn rejected_input_writes_nothing(#[case] input: Option<UploadedFile>) {
        // Arrange
        let mut store = Sqlite::in_memory().unwrap();
        let annotator = Scripted::new(vec![]);
        let locator = locator();

        // Act
        let result = Pipeline::new(&mut store, &annotator, &locator)
            .upload(input, &Owner::new("u1"))
            .await;

        // Assert
        let failure = result.unwrap_err();
        assert_eq!(failure.error.to_string(), NOT_AN_IMAGE_MESSAGE);
        assert!(failure.completed.is_empty());
        assert!(store.list_blobs(PHOTOS).unwrap().is_empty());
        assert!(store.list_blobs(THUMBNAILS).unwrap().is_empty());
        assert!(annotator.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn content_type_is_prefix_checked_only() {
        // Arrange
        let mut store = Sqlite::in_memory().unwrap();
        let annotator = Scripted::new(vec![]);
        let locator = locator();

        // Act
        let result = Pipeline::new(&mut store, &annotator, &locator)
            .upload(
                file("fake.png", Some("image/png"), Bytes::from_static(b"not really a png")),
                &Owner::new("u1"),
            )
            .await;

        // Assert
        let failure = result.unwrap_err();
        assert!(matches!(failure.error, UploadError::Thumbnail(_)));
        assert_eq!(failure.completed, vec![UploadStep::Original]);
        assert_eq!(store.list_blobs(PHOTOS).unwrap().len(), 1);
        assert!(store.list_blobs(THUMBNAILS).unwrap().is_empty());
    }

    #[rstest]
    #[case("photos/")]
    #[case(".")]
    #[case("..")]
    #[case("dir/..")]
    #[case("dir\\.")]
    #[tokio::test]
    async fn name_without_file_part_rejected(#[case] file_name: &str) {
        // Arrange
        let mut store = Sqlite::in_memory().unwrap();
        let annotator = Scripted::new(vec![]);
        let locator = locator();

        // Act
        let result = Pipeline::new(&mut store, &annotator, &locator)
            .upload(file(file_name, Some("image/png"), png(10, 10)), &Owner::new("u1"))
            .await;

        // Assert
        let failure = result.unwrap_err();
        assert!(matches!(failure.error, UploadError::InvalidName));
        assert!(store.list_blobs(PHOTOS).unwrap().is_empty());
    }

    #[tokio::test]
    async fn successful_upload_records_everything() {
        // Arrange
        let mut store = Sqlite::in_memory().unwrap();
        let annotator = Scripted::new(vec![Ok(description(
            "a black square",
            &["black", "square", "dark"],
        ))]);
        let locator = locator();

        // Act
        let uploaded = Pipeline::new(&mut store, &annotator, &locator)
            .upload(
                file("holiday/square.png", Some("image/png"), png(640, 480)),
                &Owner::new("object-id-1"),
            )
            .await
            .unwrap();

        // Assert
        assert_eq!(uploaded.file_name, "square.png");
        assert_eq!(
            annotator.seen.lock().unwrap().as_slice(),
            ["http://localhost:5000/blobs/photos/square.png"]
        );

        let thumbnail = store.get_blob_data(THUMBNAILS, "square.png").unwrap();
        let thumbnail = image::load_from_memory(&thumbnail).unwrap();
        assert_eq!((thumbnail.width(), thumbnail.height()), (192, 144));

        let metadata = store.get_metadata(PHOTOS, "square.png").unwrap();
        assert_eq!(metadata.len(), 5);
        assert_eq!(metadata[OWNER_KEY], "object-id-1");
        assert_eq!(metadata[CAPTION_KEY], "a black square");
        assert_eq!(metadata["Tag0"], "black");
        assert_eq!(metadata["Tag1"], "square");
        assert_eq!(metadata["Tag2"], "dark");
    }

    #[tokio::test]
    async fn second_upload_replaces_tags() {
        // Arrange
        let mut store = Sqlite::in_memory().unwrap();
        let annotator = Scripted::new(vec![
            Ok(description("first", &["a", "b", "c"])),
            Ok(description("second", &["z"])),
        ]);
        let locator = locator();
        let owner = Owner::new("u1");

        // Act
        let mut pipeline = Pipeline::new(&mut store, &annotator, &locator);
        pipeline
            .upload(file("p.png", Some("image/png"), png(300, 300)), &owner)
            .await
            .unwrap();
        pipeline
            .upload(file("p.png", Some("image/png"), png(50, 500)), &owner)
            .await
            .unwrap();

        // Assert
        let metadata = store.get_metadata(PHOTOS, "p.png").unwrap();
        assert_eq!(metadata[CAPTION_KEY], "second");
        assert_eq!(metadata["Tag0"], "z");
        assert!(!metadata.contains_key("Tag1"));
        assert!(!metadata.contains_key("Tag2"));
        let thumbnail = store.get_blob_data(THUMBNAILS, "p.png").unwrap();
        let thumbnail = image::load_from_memory(&thumbnail).unwrap();
        assert_eq!((thumbnail.width(), thumbnail.height()), (19, 192));
    }

    #[tokio::test]
    async fn annotation_failure_keeps_blobs_without_metadata() {
        // Arrange
        let mut store = Sqlite::in_memory().unwrap();
        let annotator = Scripted::new(vec![Err(AnnotateError::Service {
            status: reqwest::StatusCode::TOO_MANY_REQUESTS,
            message: "Rate limit is exceeded.".to_owned(),
        })]);
        let locator = locator();

        // Act
        let failure = Pipeline::new(&mut store, &annotator, &locator)
            .upload(file("a.png", Some("image/png"), png(20, 20)), &Owner::new("u1"))
            .await
            .unwrap_err();

        // Assert
        assert_eq!(failure.error.to_string(), "Rate limit is exceeded.");
        assert_eq!(
            failure.completed,
            vec![UploadStep::Original, UploadStep::Thumbnail]
        );
        assert!(store.get_metadata(PHOTOS, "a.png").unwrap().is_empty());
        assert!(store.get_blob_info(THUMBNAILS, "a.png").is_ok());
    }

    #[tokio::test]
    async fn missing_caption_fails_annotation() {
        // Arrange
        let mut store = Sqlite::in_memory().unwrap();
        let annotator = Scripted::new(vec![Ok(Description {
            tags: vec!["sky".to_owned()],
            captions: vec![],
        })]);
        let locator = locator();

        // Act
        let failure = Pipeline::new(&mut store, &annotator, &locator)
            .upload(file("a.png", Some("image/png"), png(20, 20)), &Owner::new("u1"))
            .await
            .unwrap_err();

        // Assert
        assert!(matches!(
            failure.error,
            UploadError::Annotation(AnnotateError::NoCaption)
        ));
        assert!(store.get_metadata(PHOTOS, "a.png").unwrap().is_empty());
    }

    #[test]
    fn provenance_without_tags() {
        // Act
        let metadata = provenance(&Owner::new("u1"), "a caption", &[]);

        // Assert
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata[OWNER_KEY], "u1");
        assert_eq!(metadata[CAPTION_KEY], "a caption");
    }

    #[test]
    fn failure_report_lists_completed_steps() {
        // Arrange
        let failure = UploadFailure {
            file_name: Some("a.png".to_owned()),
            completed: vec![UploadStep::Original],
            error: UploadError::Storage("disk I/O error".to_owned()),
        };

        // Act
        let report = UploadReport::from(failure);

        // Assert
        assert!(!report.succeeded());
        assert_eq!(report.message.as_deref(), Some("disk I/O error"));
        assert_eq!(report.completed, vec![UploadStep::Original]);
    }
}
