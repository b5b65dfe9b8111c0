//! Resource Loader
//!
//! Fetches resources through a pluggable transport, optionally bounded by a timeout.

use crate::{NetError, Response};
use futures::future::{FutureExt, LocalBoxFuture};
use std::rc::Rc;
use std::time::Duration;
use url::Url;

/// Something that can perform a GET for a URL
pub trait Transport {
    fn get(&self, url: &Url) -> LocalBoxFuture<'static, Result<Response, NetError>>;
}

/// Blocking reqwest client run on the blocking thread pool
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str) -> Result<Self, NetError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| NetError::Network(e.to_string()))?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &Url) -> LocalBoxFuture<'static, Result<Response, NetError>> {
        let client = self.client.clone();
        let url = url.clone();

        smol::unblock(move || {
            let response = client.get(url)
                .send()
                .map_err(|e| NetError::Network(e.to_string()))?;

            let status = response.status().as_u16();
            let headers = response.headers().iter()
                .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
                .collect();
            let body = response.bytes()
                .map_err(|e| NetError::Network(e.to_string()))?
                .to_vec();

            Ok(Response { status, headers, body })
        })
        .boxed_local()
    }
}

/// Load resources from network
#[derive(Clone)]
pub struct ResourceLoader {
    transport: Rc<dyn Transport>,
    timeout: Option<Duration>,
}

impl ResourceLoader {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Rc::new(transport),
            timeout: None,
        }
    }

    /// Fail requests that take longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Fetch a URL with GET; non-2xx statuses are errors
    pub async fn fetch(&self, url: &Url) -> Result<Response, NetError> {
        tracing::info!("HTTP GET {}", url);

        let request = self.transport.get(url);
        let response = match self.timeout {
            Some(limit) => {
                let deadline = async move {
                    smol::Timer::after(limit).await;
                    Err(NetError::Timeout(limit))
                };
                smol::future::or(request, deadline).await?
            }
            None => request.await?,
        };

        if !response.is_success() {
            tracing::warn!("HTTP {} for {}", response.status, url);
            return Err(NetError::HttpError { status: response.status });
        }

        Ok(response)
    }

    /// Resolve `path` against `base` and fetch it
    pub async fn fetch_relative(&self, base: &Url, path: &str) -> Result<Response, NetError> {
        let url = base.join(path).map_err(|e| NetError::InvalidUrl(format!("{}: {}", path, e)))?;
        self.fetch(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FixedTransport {
        status: u16,
        calls: Rc<Cell<usize>>,
    }

    impl Transport for FixedTransport {
        fn get(&self, _url: &Url) -> LocalBoxFuture<'static, Result<Response, NetError>> {
            self.calls.set(self.calls.get() + 1);
            let response = Response { status: self.status, headers: Vec::new(), body: b"ok".to_vec() };
            futures::future::ready(Ok(response)).boxed_local()
        }
    }

    struct StalledTransport;

    impl Transport for StalledTransport {
        fn get(&self, _url: &Url) -> LocalBoxFuture<'static, Result<Response, NetError>> {
            futures::future::pending::<Result<Response, NetError>>().boxed_local()
        }
    }

    #[test]
    fn test_fetch_success() {
        let calls = Rc::new(Cell::new(0));
        let loader = ResourceLoader::new(FixedTransport { status: 200, calls: calls.clone() });
        let url = Url::parse("https://example.com/a.js").unwrap();

        let response = smol::block_on(loader.fetch(&url)).unwrap();
        assert_eq!(response.body, b"ok");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_fetch_http_error() {
        let loader = ResourceLoader::new(FixedTransport { status: 404, calls: Rc::new(Cell::new(0)) });
        let url = Url::parse("https://example.com/missing.js").unwrap();

        let err = smol::block_on(loader.fetch(&url)).unwrap_err();
        assert_eq!(err, NetError::HttpError { status: 404 });
        assert!(err.is_not_found());
    }

    #[test]
    fn test_fetch_timeout() {
        let loader = ResourceLoader::new(StalledTransport).with_timeout(Duration::from_millis(20));
        let url = Url::parse("https://example.com/slow.js").unwrap();

        let err = smol::block_on(loader.fetch(&url)).unwrap_err();
        assert_eq!(err, NetError::Timeout(Duration::from_millis(20)));
    }

    #[test]
    fn test_fetch_relative() {
        let loader = ResourceLoader::new(FixedTransport { status: 200, calls: Rc::new(Cell::new(0)) });
        let base = Url::parse("https://example.com/app/").unwrap();

        assert!(smol::block_on(loader.fetch_relative(&base, "/assets/js/1.js")).is_ok());
    }
}
