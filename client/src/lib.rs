use std::path::{Path, PathBuf};

use comfy_table::{presets::UTF8_HORIZONTAL_ONLY, Attribute, Cell, ContentArrangement, Table};
use kernel::{Gallery, PhotoDetails, UploadReport, PHOTOS, THUMBNAILS};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use resource::Resource;
use thiserror::Error;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

pub mod resource;

/// Header the server reads the caller's identity from.
pub const PRINCIPAL_HEADER: &str = "x-ms-client-principal-id";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("'{0}' is not a valid Intellipix URI")]
    InvalidUri(String),
    #[error("no such file {0}")]
    NoSuchFile(String, #[source] std::io::Error),
    #[error("'{0}' has no file name")]
    NoFileName(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("server refused the request: {0}")]
    Refused(StatusCode),
}

/// A stored photo with the locations of its original and thumbnail.
pub struct Photo {
    pub details: PhotoDetails,
    pub image_uri: String,
    pub thumbnail_uri: String,
}

pub struct UploadParams {
    pub uri: String,
    pub file: String,
    pub owner: String,
}

/// Uploads a local photo and returns the server's report of what happened.
pub async fn upload_photo(params: &UploadParams) -> Result<UploadReport, ClientError> {
    let resource =
        Resource::new(&params.uri).ok_or_else(|| ClientError::InvalidUri(params.uri.clone()))?;

    let path = PathBuf::from(&params.file);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ClientError::NoFileName(params.file.clone()))?
        .to_owned();

    let f = File::open(&path)
        .await
        .map_err(|e| ClientError::NoSuchFile(params.file.clone(), e))?;
    let length = f
        .metadata()
        .await
        .map_err(|e| ClientError::NoSuchFile(params.file.clone(), e))?
        .len();
    let stream = reqwest::Body::wrap_stream(ReaderStream::new(f));

    let part = Part::stream_with_length(stream, length)
        .file_name(file_name)
        .mime_str(&content_type_for(&path))?;
    let form = Form::new().percent_encode_noop().part("file", part);

    // The server answers with a redirect to the listing and the report as
    // the body, so the redirect must not be followed.
    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let response = client
        .post(resource.photos().to_string())
        .header(PRINCIPAL_HEADER, &params.owner)
        .multipart(form)
        .send()
        .await?;

    match response.status() {
        StatusCode::SEE_OTHER | StatusCode::OK => Ok(response.json().await?),
        status => Err(ClientError::Refused(status)),
    }
}

pub async fn list_photos(uri: &str) -> Result<Gallery, ClientError> {
    let resource = Resource::new(uri).ok_or_else(|| ClientError::InvalidUri(uri.to_owned()))?;
    let client = Client::new();
    let response = client.get(resource.photos().to_string()).send().await?;
    if !response.status().is_success() {
        return Err(ClientError::Refused(response.status()));
    }
    Ok(response.json().await?)
}

pub async fn photo_details(uri: &str, name: &str) -> Result<Photo, ClientError> {
    let resource = Resource::new(uri).ok_or_else(|| ClientError::InvalidUri(uri.to_owned()))?;
    let client = Client::new();
    let response = client.get(resource.photo(name).to_string()).send().await?;
    if !response.status().is_success() {
        return Err(ClientError::Refused(response.status()));
    }
    Ok(Photo {
        details: response.json().await?,
        image_uri: resource.blob(PHOTOS, name).to_string(),
        thumbnail_uri: resource.blob(THUMBNAILS, name).to_string(),
    })
}

/// Content type declared for a local file, judged by its extension.
#[must_use]
pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_owned()
}

#[must_use]
pub fn gallery_table(gallery: &Gallery) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120)
        .set_header(vec![
            Cell::new("Caption").add_attribute(Attribute::Bold),
            Cell::new("Tags").add_attribute(Attribute::Bold),
            Cell::new("Image").add_attribute(Attribute::Bold),
        ]);

    for p in &gallery.photos {
        table.add_row(vec![
            Cell::new(&p.caption),
            Cell::new(p.tags.join(", ")),
            Cell::new(&p.image_uri),
        ]);
    }
    table
}

#[must_use]
pub fn photo_table(photo: &Photo) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);

    let details = &photo.details;
    let rows = [
        ("Name", details.name.clone()),
        ("Content type", details.content_type.clone()),
        ("Size", details.size.to_string()),
        ("Image", photo.image_uri.clone()),
        ("Thumbnail", photo.thumbnail_uri.clone()),
    ];
    for (k, v) in rows
        .into_iter()
        .chain(details.metadata.iter().map(|(k, v)| (k.as_str(), v.clone())))
    {
        table.add_row(vec![Cell::new(k).add_attribute(Attribute::Bold), Cell::new(v)]);
    }
    table
}

#[must_use]
pub fn describe_report(report: &UploadReport) -> String {
    let name = report.file_name.as_deref().unwrap_or("file");
    match &report.message {
        None => format!(
            "{name} uploaded. Caption: {}. Tags: {}",
            report.caption.as_deref().unwrap_or_default(),
            report.tags.join(", ")
        ),
        Some(message) if report.completed.is_empty() => {
            format!("{name} rejected: {message}")
        }
        Some(message) => format!(
            "{name} partially uploaded ({:?} completed): {message}",
            report.completed
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::{DisplayRecord, UploadStep};
    use test_case::test_case;

    #[test_case("cat.jpg", "image/jpeg" ; "jpg")]
    #[test_case("cat.JPEG", "image/jpeg" ; "upper_jpeg")]
    #[test_case("dir/cat.png", "image/png" ; "png_in_dir")]
    #[test_case("cat.gif", "image/gif" ; "gif")]
    #[test_case("cat.tif", "image/tiff" ; "tif")]
    #[test_case("cat.webp", "image/webp" ; "webp")]
    #[test_case("logo.svg", "image/svg+xml" ; "svg")]
    #[test_case("notes.txt", "text/plain" ; "text")]
    #[test_case("archive.unknownext", "application/octet-stream" ; "unknown")]
    #[test_case("README", "application/octet-stream" ; "no_extension")]
    fn content_type_for_tests(path: &str, expected: &str) {
        // Arrange
        let path = PathBuf::from(path);

        // Act
        let actual = content_type_for(&path);

        // Assert
        assert_eq!(actual, expected);
    }

    #[test]
    fn describe_success() {
        // Arrange
        let report = UploadReport {
            file_name: Some("cat.png".to_owned()),
            completed: vec![
                UploadStep::Original,
                UploadStep::Thumbnail,
                UploadStep::Annotation,
                UploadStep::Metadata,
            ],
            caption: Some("a cat on a mat".to_owned()),
            tags: vec!["cat".to_owned(), "mat".to_owned()],
            message: None,
        };

        // Act
        let text = describe_report(&report);

        // Assert
        assert_eq!(text, "cat.png uploaded. Caption: a cat on a mat. Tags: cat, mat");
    }

    #[test]
    fn describe_rejection() {
        // Arrange
        let report = UploadReport {
            file_name: None,
            message: Some("Only image files may be uploaded".to_owned()),
            ..UploadReport::default()
        };

        // Act
        let text = describe_report(&report);

        // Assert
        assert_eq!(text, "file rejected: Only image files may be uploaded");
    }

    #[test]
    fn describe_partial() {
        // Arrange
        let report = UploadReport {
            file_name: Some("cat.png".to_owned()),
            completed: vec![UploadStep::Original],
            message: Some("invalid image".to_owned()),
            ..UploadReport::default()
        };

        // Act
        let text = describe_report(&report);

        // Assert
        assert!(text.starts_with("cat.png partially uploaded"));
        assert!(text.ends_with(": invalid image"));
    }

    #[test]
    fn photo_table_lists_details_and_metadata() {
        // Arrange
        let resource = Resource::new("http://localhost:5000").unwrap();
        let photo = Photo {
            details: PhotoDetails {
                name: "my cat.png".to_owned(),
                content_type: "image/png".to_owned(),
                size: 1024,
                metadata: [("Caption", "a cat"), ("Owner", "user-1"), ("Tag0", "cat")]
                    .into_iter()
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect(),
            },
            image_uri: resource.blob(PHOTOS, "my cat.png").to_string(),
            thumbnail_uri: resource.blob(THUMBNAILS, "my cat.png").to_string(),
        };

        // Act
        let table = photo_table(&photo);

        // Assert
        assert_eq!(table.row_iter().count(), 8);
        let rendered = table.to_string();
        assert!(rendered.contains("http://localhost:5000/blobs/thumbnails/my%20cat.png"));
        assert!(rendered.contains("user-1"));
    }

    #[test]
    fn table_has_row_per_photo() {
        // Arrange
        let gallery = Gallery {
            notice: None,
            photos: vec![
                DisplayRecord {
                    image_uri: "http://localhost/blobs/photos/a.jpg".to_owned(),
                    thumbnail_uri: "http://localhost/blobs/thumbnails/a.jpg".to_owned(),
                    caption: "Cat".to_owned(),
                    tags: vec!["cat".to_owned(), "indoor".to_owned()],
                },
                DisplayRecord {
                    image_uri: "http://localhost/blobs/photos/b.jpg".to_owned(),
                    thumbnail_uri: "http://localhost/blobs/thumbnails/b.jpg".to_owned(),
                    caption: "b.jpg".to_owned(),
                    tags: vec![],
                },
            ],
        };

        // Act
        let table = gallery_table(&gallery);

        // Assert
        assert_eq!(table.row_iter().count(), 2);
        let rendered = table.to_string();
        assert!(rendered.contains("cat, indoor"));
        assert!(rendered.contains("b.jpg"));
    }
}
