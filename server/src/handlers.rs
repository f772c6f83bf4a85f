#![allow(clippy::unused_async)]
use crate::domain::BlobStore;
use crate::file_reply::FileReply;
use crate::identity::Owner;
use crate::listing::build_gallery;
use crate::notice;
use crate::pipeline::{Pipeline, UploadedFile};
use crate::sqlite::{Mode, Sqlite, StoreError};
use crate::AppState;
use axum::body::Bytes;
use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{Stream, TryStreamExt};
use futures_util::StreamExt;
use kernel::{Gallery, PhotoDetails, UploadReport, PHOTOS, THUMBNAILS};
use std::io;
use std::time::Instant;
use tokio_util::io::StreamReader;

/// Multipart field carrying the uploaded photo.
const FILE_FIELD: &str = "file";
/// Where an upload redirects to.
const LISTING_PATH: &str = "/api/photos";

/// Lists all photos together with the pending notice
#[utoipa::path(
    get,
    path = "/api/photos",
    tag = "photos",
    responses(
        (status = 200, description = "Photos listed successfully", body = Gallery),
        (status = 500, description = "Storage error", body = String)
    ),
)]
pub async fn list_photos(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let notice = notice::take(&headers);
    let result = execute(&state, Mode::ReadOnly, |mut repository| {
        build_gallery(&mut repository, &state.locator)
    });

    match result {
        Ok(photos) => {
            tracing::info!("listed {} photo(s)", photos.len());
            let shown = notice.is_some();
            let mut response = Json(Gallery { notice, photos }).into_response();
            if shown {
                response
                    .headers_mut()
                    .append(header::SET_COOKIE, notice::clear());
            }
            response
        }
        Err(e) => internal_server_error(&e),
    }
}

/// Uploads a photo from the multipart field `file`, makes a thumbnail and captions it
#[utoipa::path(
    post,
    path = "/api/photos",
    tag = "photos",
    responses(
        (status = 303, description = "Upload handled, see the report for the completed steps", body = UploadReport),
        (status = 401, description = "Caller is not authenticated", body = String),
        (status = 500, description = "Storage unavailable", body = String)
    ),
)]
pub async fn upload_photo(
    State(state): State<AppState>,
    owner: Owner,
    multipart: Multipart,
) -> Response {
    let start = Instant::now();
    let report = match read_upload(multipart).await {
        Ok(file) => {
            let mut repository = match Sqlite::open(state.db.as_path(), Mode::ReadWrite) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!("{e}");
                    return internal_server_error(&e);
                }
            };
            let mut pipeline = Pipeline::new(&mut repository, state.annotator.as_ref(), &state.locator);
            match pipeline.upload(file, &owner).await {
                Ok(uploaded) => UploadReport::from(uploaded),
                Err(failure) => UploadReport::from(failure),
            }
        }
        Err(e) => {
            tracing::error!("upload not read. Error: {e}");
            UploadReport {
                message: Some(e.to_string()),
                ..UploadReport::default()
            }
        }
    };
    tracing::info!(
        "upload of {:?} by {} finished in {:?}, completed: {:?}",
        report.file_name,
        owner.as_str(),
        start.elapsed(),
        report.completed
    );

    see_listing(report)
}

/// Gets a photo's stored metadata
#[utoipa::path(
    get,
    path = "/api/photos/{name}",
    tag = "photos",
    responses(
        (status = 200, description = "Photo found", body = PhotoDetails),
        (status = 404, description = "Photo not found", body = String)
    ),
    params(
        ("name" = String, Path, description = "Photo file name")
    ),
)]
pub async fn get_photo(Path(name): Path<String>, State(state): State<AppState>) -> Response {
    let result = execute(&state, Mode::ReadOnly, move |mut repository| {
        let info = repository.get_blob_info(PHOTOS, &name)?;
        let metadata = repository.get_metadata(PHOTOS, &name)?;
        Ok(PhotoDetails {
            name: info.name,
            content_type: info.content_type,
            size: info.size,
            metadata,
        })
    });
    make_response(result.map(Json))
}

/// Gets the binary content of an original or a thumbnail
#[utoipa::path(
    get,
    path = "/blobs/{container}/{name}",
    tag = "blobs",
    responses(
        (status = 200, description = "Blob content with its stored content type", content_type = "application/octet-stream", body = [u8]),
        (status = 404, description = "Blob not found", body = String)
    ),
    params(
        ("container" = String, Path, description = "Container: photos or thumbnails"),
        ("name" = String, Path, description = "Blob name inside the container")
    ),
)]
pub async fn get_blob(
    Path((container, name)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Response {
    if container != PHOTOS && container != THUMBNAILS {
        return (StatusCode::NOT_FOUND, format!("no container '{container}'")).into_response();
    }
    let result = execute(&state, Mode::ReadOnly, move |mut repository| {
        let info = repository.get_blob_info(&container, &name)?;
        let content = repository.get_blob_data(&container, &name)?;
        tracing::info!("File size {}", content.len());
        Ok(FileReply::new(content, info))
    });
    make_response(result)
}

fn make_response(result: Result<impl IntoResponse, StoreError>) -> Response {
    match result {
        Ok(response) => (StatusCode::OK, response).into_response(),
        Err(e) if e.is_not_found() => {
            tracing::info!("{e}");
            (StatusCode::NOT_FOUND, e.to_string()).into_response()
        }
        Err(e) => internal_server_error(&e),
    }
}

fn execute<F, R>(state: &AppState, mode: Mode, action: F) -> Result<R, StoreError>
where
    F: FnOnce(Sqlite) -> Result<R, StoreError>,
{
    let start = Instant::now();
    let repository = Sqlite::open(state.db.as_path(), mode)?;
    let res = action(repository);
    tracing::info!("DB query time: {:?}", start.elapsed());
    res
}

/// 303 to the listing. The report rides along as the body for clients that
/// do not follow redirects, the message as a notice for those that do.
fn see_listing(report: UploadReport) -> Response {
    let mut response = (StatusCode::SEE_OTHER, Json(&report)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::LOCATION, header::HeaderValue::from_static(LISTING_PATH));
    if let Some(cookie) = report.message.as_deref().and_then(notice::store) {
        headers.append(header::SET_COOKIE, cookie);
    }
    response
}

fn internal_server_error<E: ToString>(e: &E) -> Response {
    tracing::error!("Error: {}", e.to_string());
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        e.to_string(),
    )
        .into_response()
}

/// First `file` field of the form, `None` when the form has none.
async fn read_upload(mut multipart: Multipart) -> Result<Option<UploadedFile>, io::Error> {
    while let Some(field) = multipart.next_field().await.map_err(io::Error::other)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        return read_field(field).await.map(Some);
    }
    Ok(None)
}

async fn read_field(field: Field<'_>) -> io::Result<UploadedFile> {
    let file_name = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().map(str::to_owned);
    let (data, read_bytes) = read_from_stream(field).await?;
    tracing::info!("file: {} read: {} content type: {:?}", file_name, read_bytes, content_type);
    Ok(UploadedFile {
        file_name,
        content_type,
        data: Bytes::from(data),
    })
}

async fn read_from_stream<S, E>(stream: S) -> io::Result<(Vec<u8>, usize)>
where
    S: Stream<Item = Result<Bytes, E>> + StreamExt,
    E: Sync + std::error::Error + Send + 'static,
{
    // Convert the stream into an `AsyncRead`.
    let body_with_io_error = stream.map_err(io::Error::other);
    let body_reader = StreamReader::new(body_with_io_error);
    futures::pin_mut!(body_reader);
    let mut buffer = Vec::new();

    let copied_bytes = tokio::io::copy(&mut body_reader, &mut buffer).await?;
    let copied_bytes = usize::try_from(copied_bytes).unwrap_or(usize::MAX);
    Ok((buffer, copied_bytes))
}
