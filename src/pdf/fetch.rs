//! Document sources and remote fetching

use std::path::PathBuf;
use std::sync::Arc;

use super::engine::EngineError;

/// Where a document comes from
#[derive(Clone, PartialEq, Eq)]
pub enum DocumentSource {
    Path(PathBuf),
    Url(String),
    Bytes(Arc<[u8]>),
}

impl DocumentSource {
    /// Treat `http://` and `https://` strings as URLs, everything else as a path
    #[must_use]
    pub fn parse(input: &str) -> Self {
        if input.starts_with("http://") || input.starts_with("https://") {
            Self::Url(input.to_string())
        } else {
            Self::Path(PathBuf::from(input))
        }
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Url(url) => url.clone(),
            Self::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }
}

impl std::fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
        }
    }
}

impl From<PathBuf> for DocumentSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<Vec<u8>> for DocumentSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes.into())
    }
}

/// Retrieves complete document bytes for URL sources
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, EngineError>;
}

/// Upper bound on downloaded document size
#[cfg(feature = "http")]
const MAX_DOCUMENT_BYTES: u64 = 512 * 1024 * 1024;

/// Blocking HTTP fetcher
#[cfg(feature = "http")]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            agent: ureq::agent(),
        }
    }
}

#[cfg(feature = "http")]
impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "http")]
impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, EngineError> {
        use std::io::Read;

        let resp = self
            .agent
            .get(url)
            .set("Accept", "application/pdf")
            .call()
            .map_err(|e| EngineError::generic(format!("GET {url}: {e}")))?;

        let mut bytes = Vec::new();
        resp.into_reader()
            .take(MAX_DOCUMENT_BYTES)
            .read_to_end(&mut bytes)?;
        log::debug!("Fetched {} bytes from {url}", bytes.len());
        Ok(bytes)
    }
}
