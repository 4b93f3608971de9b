use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to load native TLS roots: {0}")]
    Tls(#[source] std::io::Error),
    #[error("error sending request: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),
    #[error("error reading response: {0}")]
    Body(#[from] hyper::Error),
    #[error("invalid request: {0}")]
    Http(#[from] http::Error),
}

/// Sends one HTTP request and buffers the whole response body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request<Full<Bytes>>) -> Result<Response<Bytes>, TransportError>;
}

/// HTTPS transport backed by a pooled hyper client.
pub struct HyperTransport {
    client: Client<HttpsConnector, Full<Bytes>>,
}

impl HyperTransport {
    pub fn new() -> Result<Self, TransportError> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(TransportError::Tls)?
            .https_only()
            .enable_http1()
            .enable_http2()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: Request<Full<Bytes>>) -> Result<Response<Bytes>, TransportError> {
        let method = request.method().clone();
        let uri = request.uri().path().to_string();
        let response = self.client.request(request).await?;
        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();
        tracing::debug!(%method, %uri, status = %parts.status, bytes = body.len(), "http exchange");
        Ok(Response::from_parts(parts, body))
    }
}
