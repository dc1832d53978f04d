//! The HTTP scrape endpoint.
//!
//! Serves the metrics path (a fresh scrape per request), a JSON `/health`
//! endpoint, and a redirect from everything else to the metrics path.

use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, LOCATION};
use hyper::server::conn::http1::Builder as HyperHttpBuilder;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::error::BuildError;
use crate::scrape::Orchestrator;

mod render;
pub use self::render::render;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

struct Inner {
    orchestrator: Orchestrator,
    metrics_path: String,
}

/// The exporter's HTTP front end.
pub struct Server {
    listener: TcpListener,
    inner: Arc<Inner>,
}

impl Server {
    /// Binds the listen address. `metrics_path` must start with `/`.
    ///
    /// # Errors
    ///
    /// Fails when the address cannot be bound.
    pub async fn bind(
        addr: SocketAddr,
        metrics_path: String,
        orchestrator: Orchestrator,
    ) -> Result<Self, BuildError> {
        let listener = TcpListener::bind(addr).await.map_err(BuildError::Bind)?;
        Ok(Self { listener, inner: Arc::new(Inner { orchestrator, metrics_path }) })
    }

    /// The bound local address, useful when binding port 0.
    ///
    /// # Errors
    ///
    /// Propagates the socket lookup failure.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Accepts connections forever, one task per connection.
    pub async fn serve(self) {
        loop {
            let stream = match self.listener.accept().await {
                Ok((stream, _)) => stream,
                Err(err) => {
                    warn!(error = %err, "failed to accept connection");
                    continue;
                }
            };

            let inner = self.inner.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let inner = inner.clone();
                    async move { handle(&inner, &req).await }
                });
                if let Err(err) =
                    HyperHttpBuilder::new().serve_connection(TokioIo::new(stream), service).await
                {
                    debug!(error = %err, "connection ended with error");
                }
            });
        }
    }
}

async fn handle(
    inner: &Inner,
    req: &Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let path = req.uri().path();
    if path == inner.metrics_path {
        let scrape = inner.orchestrator.scrape().await;
        let body = render(&scrape.samples);
        return Ok(with_content_type(TEXT_FORMAT, body.into()));
    }
    if path == "/health" {
        return Ok(with_content_type("application/json", r#"{"status":"ok"}"#.into()));
    }
    // Same convenience redirect browsers get from other exporters' roots.
    Ok(Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(LOCATION, inner.metrics_path.as_str())
        .body(Full::<Bytes>::default())
        .unwrap_or_else(|_| Response::new(Full::<Bytes>::default())))
}

fn with_content_type(content_type: &str, body: Full<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .body(body)
        .unwrap_or_else(|_| Response::new(Full::<Bytes>::default()))
}
