use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const DESCRIPTION_FEATURE: &str = "Description";

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("Vision service is not configured")]
    NotConfigured,
    #[error("Vision endpoint '{0}' is not a valid base URL")]
    InvalidEndpoint(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    Service { status: StatusCode, message: String },
    #[error("Vision service returned no caption")]
    NoCaption,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Caption {
    pub text: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Description feature of an image analysis.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Description {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub captions: Vec<Caption>,
}

impl Description {
    pub fn first_caption(&self) -> Result<&str, AnnotateError> {
        self.captions
            .first()
            .map(|c| c.text.as_str())
            .ok_or(AnnotateError::NoCaption)
    }
}

/// Produces a caption and tags for an image reachable at a URI.
#[async_trait]
pub trait Annotator: Send + Sync {
    async fn describe(&self, image_uri: &str) -> Result<Description, AnnotateError>;
}

/// Annotator used when no vision endpoint is configured. Every call fails,
/// so uploads are stored and thumbnailed but stay uncaptioned.
pub struct Unconfigured;

#[async_trait]
impl Annotator for Unconfigured {
    async fn describe(&self, _image_uri: &str) -> Result<Description, AnnotateError> {
        Err(AnnotateError::NotConfigured)
    }
}

/// Client of the Computer Vision `analyze` operation.
pub struct VisionClient {
    client: Client,
    analyze: Url,
    subscription_key: String,
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    description: Description,
}

#[derive(Deserialize)]
struct ServiceErrorDetail {
    message: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ServiceErrorBody {
    Nested { error: ServiceErrorDetail },
    Flat(ServiceErrorDetail),
}

impl ServiceErrorBody {
    fn into_message(self) -> String {
        match self {
            Self::Nested { error } | Self::Flat(error) => error.message,
        }
    }
}

impl VisionClient {
    /// `endpoint` is the service base, e.g. `https://westus.api.cognitive.microsoft.com/vision/v1.0`.
    pub fn new(endpoint: &str, subscription_key: &str) -> Result<Self, AnnotateError> {
        let invalid = || AnnotateError::InvalidEndpoint(endpoint.to_owned());
        let mut analyze = Url::parse(endpoint).map_err(|_| invalid())?;
        analyze
            .path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .push("analyze");
        analyze
            .query_pairs_mut()
            .append_pair("visualFeatures", DESCRIPTION_FEATURE);

        Ok(Self {
            client: Client::new(),
            analyze,
            subscription_key: subscription_key.to_owned(),
        })
    }

    #[must_use]
    pub fn analyze_url(&self) -> &str {
        self.analyze.as_str()
    }
}

#[async_trait]
impl Annotator for VisionClient {
    async fn describe(&self, image_uri: &str) -> Result<Description, AnnotateError> {
        let response = self
            .client
            .post(self.analyze.clone())
            .header(SUBSCRIPTION_KEY_HEADER, &self.subscription_key)
            .json(&AnalyzeRequest { url: image_uri })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await?;
            let message = serde_json::from_slice::<ServiceErrorBody>(&body).map_or_else(
                |_| format!("Vision service responded with {status}"),
                ServiceErrorBody::into_message,
            );
            tracing::error!("analyze {image_uri} failed with {status}: {message}");
            return Err(AnnotateError::Service { status, message });
        }

        let analysis: AnalyzeResponse = response.json().await?;
        tracing::debug!(
            "analyze {image_uri}: {} caption(s), {} tag(s)",
            analysis.description.captions.len(),
            analysis.description.tags.len()
        );
        Ok(analysis.description)
    }
}
