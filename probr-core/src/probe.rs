use std::future::Future;
use std::sync::Arc;

use probr_http::{HttpClient, HttpRequest};

/// Base URL plus the headers sent with every probe (typically `Authorization`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub headers: Vec<(String, String)>,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub url: String,
    pub headers: Arc<[(String, String)]>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),
}

/// The `send(request) -> status` capability the scheduler drives.
pub trait Prober: Send + Sync + 'static {
    fn send(
        &self,
        req: ProbeRequest,
    ) -> impl Future<Output = Result<u16, ProbeError>> + Send;
}

#[derive(Debug, Clone, Default)]
pub struct HttpProber {
    client: HttpClient,
}

impl HttpProber {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

impl Prober for HttpProber {
    async fn send(&self, req: ProbeRequest) -> Result<u16, ProbeError> {
        let req = HttpRequest::get(req.url).with_headers(req.headers.to_vec());
        match self.client.request(req).await {
            Ok(res) => Ok(res.status),
            Err(err) if err.is_timeout() => Err(ProbeError::Timeout),
            Err(err) => Err(ProbeError::Transport(format!(
                "{}: {err}",
                err.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probr_testserver::{TestServer, basic_auth_value};

    #[test]
    fn endpoint_joins_paths() {
        let e = Endpoint::new("http://api:80/");
        assert_eq!(e.url_for("/api/healthz"), "http://api:80/api/healthz");
    }

    #[tokio::test]
    async fn http_prober_reports_status() {
        let server = TestServer::start_with_basic_auth("apiuser", "secret")
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        let prober = HttpProber::default();

        let endpoint = Endpoint::new(server.base_url())
            .with_header("Authorization", basic_auth_value("apiuser", "secret"));
        let status = prober
            .send(ProbeRequest {
                url: endpoint.url_for("/api/healthz"),
                headers: Arc::from(endpoint.headers.clone()),
            })
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(status, 200);

        let status = prober
            .send(ProbeRequest {
                url: server.urls().healthz.clone(),
                headers: Arc::from(Vec::new()),
            })
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(status, 401);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn http_prober_maps_transport_errors() {
        let prober = HttpProber::new(HttpClient::new(Some(std::time::Duration::from_millis(200))));
        let err = prober
            .send(ProbeRequest {
                url: "http://127.0.0.1:9/".to_string(),
                headers: Arc::from(Vec::new()),
            })
            .await;
        assert!(matches!(err, Err(ProbeError::Transport(_))), "{err:?}");
    }
}
