//! Service-registry (Consul-compatible catalog) registration.
//!
//! Registration and deregistration are fire-and-forget relative to the
//! exporter: a failure is logged and metrics are served regardless.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tracing::info;

use crate::config::{DiscoveryConfig, ServiceConfig};

/// Errors from talking to the service registry.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The configured registry endpoint is not a valid URI.
    #[error("invalid registry endpoint: {0}")]
    Endpoint(#[from] hyper::http::uri::InvalidUri),

    /// The HTTP request failed outright.
    #[error("registry request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    /// The registry answered with a non-success status.
    #[error("registry returned {0}")]
    Status(StatusCode),
}

/// Catalog client bound to one service registration.
pub struct CatalogClient {
    endpoint: String,
    datacenter: String,
    node: String,
    address: String,
    service_id: String,
    service_name: String,
    port: u16,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl CatalogClient {
    /// Builds a client from configuration. The node name falls back to the
    /// `HOSTNAME` environment variable and the advertise address to the
    /// listen IP.
    pub fn from_config(discovery: &DiscoveryConfig, service: &ServiceConfig) -> Self {
        let node = discovery
            .node
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "localhost".to_string());
        let address = discovery
            .advertise_address
            .clone()
            .unwrap_or_else(|| service.listen_ip.clone());

        Self {
            endpoint: discovery.endpoint.clone(),
            datacenter: discovery.datacenter.clone(),
            node,
            address,
            service_id: discovery.service_id.clone(),
            service_name: discovery.register_service_name.clone(),
            port: service.listen_port,
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    /// Registers the exporter, tagging it with the latest label snapshot
    /// encoded as `name=value;` strings.
    pub async fn register(&self, tags: Vec<String>) -> Result<(), DiscoveryError> {
        let payload = serde_json::json!({
            "Node": self.node,
            "Address": self.address,
            "Datacenter": self.datacenter,
            "Service": {
                "ID": self.service_id,
                "Service": self.service_name,
                "Tags": tags,
                "Port": self.port,
                "Address": self.address,
            },
            "Check": {
                "Node": self.node,
                "CheckID": format!("service:{}", self.service_id),
                "Name": format!("{} health check", self.service_id),
                "Status": "passing",
                "ServiceID": self.service_id,
            },
        });

        self.put("/v1/catalog/register", &payload).await?;
        info!(service = %self.service_id, "registered with service registry");
        Ok(())
    }

    /// Removes the exporter's registration.
    pub async fn deregister(&self) -> Result<(), DiscoveryError> {
        let payload = serde_json::json!({
            "Node": self.node,
            "Datacenter": self.datacenter,
            "ServiceID": self.service_id,
        });

        self.put("/v1/catalog/deregister", &payload).await?;
        info!(service = %self.service_id, "deregistered from service registry");
        Ok(())
    }

    async fn put(&self, path: &str, payload: &serde_json::Value) -> Result<(), DiscoveryError> {
        let uri: Uri = format!("{}{}", self.endpoint, path).parse()?;
        let body = serde_json::to_vec(payload).expect("json! literals always serialize");
        let request = Request::builder()
            .method(Method::PUT)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Full::from(Bytes::from(body)))
            .expect("request construction only fails on invalid parts");

        let response = self.client.request(request).await?;
        if !response.status().is_success() {
            return Err(DiscoveryError::Status(response.status()));
        }
        Ok(())
    }
}
