use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, HeaderName, StatusCode},
};

use crate::AppState;

/// Header carrying the authenticated caller's object id, set by the
/// authentication front end of the hosting platform.
pub const DEFAULT_PRINCIPAL_HEADER: &str = "x-ms-client-principal-id";

/// Stable identifier of the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(String);

impl Owner {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_headers(headers: &HeaderMap, header: &HeaderName) -> Option<Self> {
        let id = headers.get(header)?.to_str().ok()?.trim();
        if id.is_empty() {
            None
        } else {
            Some(Self::new(id))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Owner {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers, &state.principal_header).ok_or_else(|| {
            tracing::warn!("rejected unauthenticated request to {}", parts.uri);
            (StatusCode::UNAUTHORIZED, "Authentication required")
        })
    }
}
