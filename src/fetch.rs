use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::FetchError;

/// Retrieves raw document text for a filter URL.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, FetchError>>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(HttpFetcher { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        info!("Attempting to connect to: {}", url);
        let request_error = |source: reqwest::Error| FetchError::Request {
            url: url.to_string(),
            source,
        };

        let start = Instant::now();
        let response = self.client.get(url).send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(request_error)?;
        debug!(
            bytes = body.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "fetched {}",
            url
        );
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Answers a single request with `response`.
    async fn serve_once(response: &'static [u8]) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response).await.unwrap();
            let _ = socket.shutdown().await;
        });
        addr
    }

    // Local servers must not be routed through a proxy from the environment.
    fn local_fetcher() -> HttpFetcher {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .no_proxy()
            .build()
            .unwrap();
        HttpFetcher { client }
    }

    #[tokio::test]
    async fn error_status_is_a_failure() {
        let addr = serve_once(
            b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;
        let url = format!("http://{addr}/products/trousers?filter=holster&page=30");

        let err = local_fetcher().fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, ref url } if url.ends_with("&page=30")));
    }

    #[tokio::test]
    async fn ok_status_returns_body() {
        let addr = serve_once(
            b"HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: 21\r\nconnection: close\r\n\r\n<span>6201</span>\r\n\r\n",
        )
        .await;

        let body = local_fetcher().fetch(&format!("http://{addr}/")).await.unwrap();
        assert!(body.starts_with("<span>6201</span>"));
    }

    #[tokio::test]
    async fn malformed_url_is_request_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1), "sku_scraper/test").unwrap();
        let err = fetcher.fetch("not a url&page=30").await.unwrap_err();
        assert!(matches!(err, FetchError::Request { ref url, .. } if url == "not a url&page=30"));
    }
}
