//! One-shot notice carried between the upload redirect and the next listing
//! in a cookie.

use axum::http::{header, HeaderMap, HeaderValue};

const COOKIE_NAME: &str = "intellipix_notice";

/// `Set-Cookie` value storing `message` until the next listing.
pub fn store(message: &str) -> Option<HeaderValue> {
    let encoded = urlencoding::encode(message);
    HeaderValue::from_str(&format!(
        "{COOKIE_NAME}={encoded}; Path=/; HttpOnly; SameSite=Lax"
    ))
    .ok()
}

/// `Set-Cookie` value removing a shown notice.
pub fn clear() -> HeaderValue {
    HeaderValue::from_static("intellipix_notice=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Pending notice sent back by the browser, if any.
pub fn take(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == COOKIE_NAME && !value.is_empty())
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(std::borrow::Cow::into_owned)
}
