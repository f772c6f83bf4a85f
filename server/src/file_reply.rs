use axum::{
    body::Body,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use kernel::BlobInfo;

/// Stored object content served with its declared content type.
pub struct FileReply {
    data: Vec<u8>,
    info: BlobInfo,
}

impl FileReply {
    #[must_use]
    pub fn new(data: Vec<u8>, info: BlobInfo) -> Self {
        Self { data, info }
    }
}

impl IntoResponse for FileReply {
    fn into_response(self) -> Response {
        let content_type = HeaderValue::from_str(&self.info.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        let mut res = Body::from(self.data).into_response();
        res.headers_mut().insert(header::CONTENT_TYPE, content_type);
        let inline = format!(r#"inline; filename="{}""#, self.info.name.replace('"', ""));
        if let Ok(val) = HeaderValue::from_str(inline.as_str()) {
            res.headers_mut().insert(header::CONTENT_DISPOSITION, val);
        }
        let len = self.info.size.to_string();
        if let Ok(val) = HeaderValue::from_str(len.as_str()) {
            res.headers_mut().insert(header::CONTENT_LENGTH, val);
        }

        res
    }
}
