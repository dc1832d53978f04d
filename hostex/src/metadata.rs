//! Instance-metadata provider.
//!
//! The label pipeline treats metadata as an opaque key/value source. The
//! bundled [`ImdsProvider`] speaks the cloud instance-metadata HTTP
//! protocol: the instance identity document (a flat JSON object) merged
//! with the instance tags listing when the service exposes one. Failures
//! leave the label pipeline in its prior state; they are retried on the
//! next refresh tick.

use std::collections::HashMap;
use std::future::Future;

use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tracing::debug;

/// Flat map of metadata tag names to string values.
pub type TagMap = HashMap<String, String>;

/// Errors from fetching instance metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The configured endpoint is not a valid URI.
    #[error("invalid metadata endpoint: {0}")]
    Endpoint(#[from] hyper::http::uri::InvalidUri),

    /// The HTTP request failed outright.
    #[error("metadata request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    /// Reading the response body failed.
    #[error("metadata response read failed: {0}")]
    Body(#[from] hyper::Error),

    /// The metadata service answered with a non-success status.
    #[error("metadata service returned {0}")]
    Status(StatusCode),

    /// The identity document was not valid JSON.
    #[error("malformed identity document: {0}")]
    Document(#[from] serde_json::Error),
}

/// An opaque key/value metadata source feeding the label pipeline.
pub trait MetadataProvider {
    /// Fetches the current tag map.
    fn fetch(&self) -> impl Future<Output = Result<TagMap, MetadataError>> + Send;
}

/// Instance-metadata-service client.
pub struct ImdsProvider {
    endpoint: String,
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl ImdsProvider {
    /// Creates a provider against the given base endpoint, e.g.
    /// `http://169.254.169.254`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { endpoint: endpoint.into(), client }
    }

    async fn get(&self, path: &str) -> Result<(StatusCode, String), MetadataError> {
        let uri: Uri = format!("{}{}", self.endpoint, path).parse()?;
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Empty::new())
            .expect("request construction only fails on invalid parts");

        let response = self.client.request(request).await?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();
        Ok((status, String::from_utf8_lossy(&body).into_owned()))
    }

    async fn identity_document(&self) -> Result<TagMap, MetadataError> {
        let (status, body) = self.get("/latest/dynamic/instance-identity/document").await?;
        if !status.is_success() {
            return Err(MetadataError::Status(status));
        }
        let document: serde_json::Value = serde_json::from_str(&body)?;
        Ok(flatten_document(&document))
    }

    async fn instance_tags(&self, tags: &mut TagMap) -> Result<(), MetadataError> {
        let (status, listing) = self.get("/latest/meta-data/tags/instance").await?;
        if status == StatusCode::NOT_FOUND {
            // Tag exposure is optional on the metadata service.
            debug!("instance tags not exposed by the metadata service");
            return Ok(());
        }
        if !status.is_success() {
            return Err(MetadataError::Status(status));
        }

        for key in listing.lines().map(str::trim).filter(|k| !k.is_empty()) {
            let (status, value) = self.get(&format!("/latest/meta-data/tags/instance/{key}")).await?;
            if status.is_success() {
                tags.insert(key.to_string(), value);
            }
        }
        Ok(())
    }
}

impl MetadataProvider for ImdsProvider {
    async fn fetch(&self) -> Result<TagMap, MetadataError> {
        let mut tags = self.identity_document().await?;
        self.instance_tags(&mut tags).await?;
        Ok(tags)
    }
}

/// Flattens the identity document into string tags: scalars become their
/// string form, string arrays join with `;`, anything else is skipped.
pub(crate) fn flatten_document(document: &serde_json::Value) -> TagMap {
    let mut tags = TagMap::new();
    let Some(object) = document.as_object() else {
        return tags;
    };

    for (key, value) in object {
        match value {
            serde_json::Value::String(s) => {
                tags.insert(key.clone(), s.clone());
            }
            serde_json::Value::Number(n) => {
                tags.insert(key.clone(), n.to_string());
            }
            serde_json::Value::Bool(b) => {
                tags.insert(key.clone(), b.to_string());
            }
            serde_json::Value::Array(items) => {
                let strings: Vec<&str> = items.iter().filter_map(|i| i.as_str()).collect();
                tags.insert(key.clone(), strings.join(";"));
            }
            other => debug!(key = %key, ?other, "skipping non-scalar identity document entry"),
        }
    }
    tags
}
