//! Resource loading behind remote streams

use std::collections::HashMap;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{BridgeError, Result};

pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'static>>;

/// Loads the full body of a resource locator
pub trait Fetcher: Send + Sync {
    fn fetch(&self, locator: &str) -> FetchFuture;
}

/* ===================== Local files ===================== */

/// Serves `file://` locators from a root directory.
///
/// Paths are resolved relative to the root and may not climb out of it.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, locator: &str) -> Result<PathBuf> {
        let relative = locator
            .strip_prefix("file://")
            .ok_or_else(|| fetch_error(locator, "unsupported scheme"))?;

        let relative = Path::new(relative.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(fetch_error(locator, "path escapes the resource root"));
        }

        Ok(self.root.join(relative))
    }
}

impl Fetcher for FileFetcher {
    fn fetch(&self, locator: &str) -> FetchFuture {
        let resolved = self.resolve(locator);
        let locator = locator.to_string();

        Box::pin(async move {
            let path = resolved?;
            tokio::fs::read(&path)
                .await
                .map_err(|e| fetch_error(&locator, &e.to_string()))
        })
    }
}

/* ===================== HTTP ===================== */

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Serves `http://` and `https://` locators with a GET.
///
/// Any non-success status is a fetch error.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| fetch_error("http client", &e.to_string()))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, locator: &str) -> FetchFuture {
        let client = self.client.clone();
        let locator = locator.to_string();

        Box::pin(async move {
            let response = client
                .get(&locator)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| fetch_error(&locator, &e.to_string()))?;
            let body = response
                .bytes()
                .await
                .map_err(|e| fetch_error(&locator, &e.to_string()))?;
            Ok(body.to_vec())
        })
    }
}

/* ===================== By scheme ===================== */

/// Routes `file://` to a [`FileFetcher`] and `http(s)://` to an
/// [`HttpFetcher`]; other schemes fail.
#[derive(Debug, Clone)]
pub struct SchemeFetcher {
    file: FileFetcher,
    http: HttpFetcher,
}

impl SchemeFetcher {
    pub fn new(file: FileFetcher, http: HttpFetcher) -> Self {
        Self { file, http }
    }
}

impl Fetcher for SchemeFetcher {
    fn fetch(&self, locator: &str) -> FetchFuture {
        match locator.split_once("://").map(|(scheme, _)| scheme) {
            Some("file") => self.file.fetch(locator),
            Some("http") | Some("https") => self.http.fetch(locator),
            _ => {
                let err = fetch_error(locator, "unsupported scheme");
                Box::pin(async move { Err(err) })
            }
        }
    }
}

/* ===================== Static map ===================== */

/// Fixed set of in-memory resources
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    resources: Arc<HashMap<String, Vec<u8>>>,
}

impl StaticFetcher {
    pub fn new(resources: HashMap<String, Vec<u8>>) -> Self {
        Self {
            resources: Arc::new(resources),
        }
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(&self, locator: &str) -> FetchFuture {
        let found = self.resources.get(locator).cloned();
        let locator = locator.to_string();

        Box::pin(async move { found.ok_or_else(|| fetch_error(&locator, "not found")) })
    }
}

fn fetch_error(locator: &str, reason: &str) -> BridgeError {
    BridgeError::Fetch {
        locator: locator.to_string(),
        reason: reason.to_string(),
    }
}
