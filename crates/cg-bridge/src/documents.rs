//! Resolves the document attached to a `/send-document` request.
//!
//! A request names exactly one source: a URL to fetch, inline base64 (bare or
//! as a data URI), or a local path. Whatever the source, the bytes must look
//! like a PDF before they reach the send path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use cg_core::config::DocumentsConfig;
use cg_session::client::OutboundDocument;
use tracing::{debug, info};
use url::Url;

pub const PDF_MAGIC: &[u8] = b"%PDF-";
/// How far into the stream the magic marker may appear.
pub const MAGIC_WINDOW: usize = 1024;
pub const DEFAULT_FILENAME: &str = "document.pdf";
pub const PDF_MIMETYPE: &str = "application/pdf";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("exactly one of url, base64 or path is required")]
    NoSourceProvided,

    #[error("document fetch failed: {0}")]
    FetchFailed(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("invalid base64 document: {0}")]
    InvalidEncoding(String),

    #[error("document is not a PDF")]
    InvalidFormat,

    #[error("path outside the allowed document root: {0}")]
    PathNotAllowed(String),

    #[error("document exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

// ---------------------------------------------------------------------------
// Input / output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    Url(String),
    Base64(String),
    LocalPath(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInput {
    pub source: DocumentSource,
    pub filename: Option<String>,
    pub caption: Option<String>,
}

impl DocumentInput {
    /// Build from optional request fields. Blank fields count as absent.
    pub fn from_fields(
        url: Option<String>,
        base64: Option<String>,
        path: Option<String>,
        filename: Option<String>,
        caption: Option<String>,
    ) -> Result<Self, DocumentError> {
        let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let mut sources = [
            present(url).map(DocumentSource::Url),
            present(base64).map(DocumentSource::Base64),
            present(path).map(|p| DocumentSource::LocalPath(PathBuf::from(p))),
        ]
        .into_iter()
        .flatten();

        let source = sources.next().ok_or(DocumentError::NoSourceProvided)?;
        if sources.next().is_some() {
            return Err(DocumentError::NoSourceProvided);
        }
        Ok(Self {
            source,
            filename: present(filename),
            caption,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub caption: Option<String>,
}

impl ResolvedDocument {
    pub fn into_outbound(self) -> OutboundDocument {
        OutboundDocument {
            bytes: self.bytes,
            filename: self.filename,
            mimetype: PDF_MIMETYPE.to_string(),
            caption: self.caption,
        }
    }
}

// ---------------------------------------------------------------------------
// Fetch capability
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DocumentFetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &Url, max_bytes: usize) -> Result<Vec<u8>, DocumentError>;
}

/// HTTP fetcher backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Result<Self, DocumentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DocumentError::FetchFailed(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &Url, max_bytes: usize) -> Result<Vec<u8>, DocumentError> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DocumentError::FetchFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DocumentError::FetchFailed(format!("HTTP {status}")));
        }
        if resp.content_length().is_some_and(|len| len > max_bytes as u64) {
            return Err(DocumentError::TooLarge { limit: max_bytes });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| DocumentError::FetchFailed(e.to_string()))?;
        if bytes.len() > max_bytes {
            return Err(DocumentError::TooLarge { limit: max_bytes });
        }
        Ok(bytes.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct DocumentResolver {
    fetcher: Arc<dyn DocumentFetcher>,
    local_root: Option<PathBuf>,
    max_bytes: usize,
}

impl DocumentResolver {
    pub fn new(fetcher: impl DocumentFetcher, max_bytes: usize) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            local_root: None,
            max_bytes,
        }
    }

    pub fn from_config(config: &DocumentsConfig) -> Result<Self, DocumentError> {
        let fetcher = ReqwestFetcher::new(Duration::from_secs(config.fetch_timeout_secs))?;
        let mut resolver = Self::new(fetcher, config.max_bytes);
        if let Some(root) = &config.local_root {
            resolver = resolver.with_local_root(root);
        }
        Ok(resolver)
    }

    /// Confine local-path documents to `root`.
    pub fn with_local_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.local_root = Some(root.into());
        self
    }

    pub async fn resolve(&self, input: DocumentInput) -> Result<ResolvedDocument, DocumentError> {
        let (bytes, derived_name) = match &input.source {
            DocumentSource::Url(raw) => self.from_url(raw).await?,
            DocumentSource::Base64(data) => (decode_base64(data)?, None),
            DocumentSource::LocalPath(path) => self.from_path(path).await?,
        };

        if bytes.len() > self.max_bytes {
            return Err(DocumentError::TooLarge {
                limit: self.max_bytes,
            });
        }
        if !has_pdf_magic(&bytes) {
            return Err(DocumentError::InvalidFormat);
        }

        let filename = input
            .filename
            .or(derived_name)
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
        let caption = input
            .caption
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        debug!(filename = %filename, bytes = bytes.len(), "document resolved");
        Ok(ResolvedDocument {
            bytes,
            filename,
            caption,
        })
    }

    async fn from_url(&self, raw: &str) -> Result<(Vec<u8>, Option<String>), DocumentError> {
        let url = Url::parse(raw).map_err(|e| DocumentError::FetchFailed(format!("{raw}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DocumentError::FetchFailed(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }
        info!(url = %url, "fetching document");
        let bytes = self.fetcher.fetch(&url, self.max_bytes).await?;
        Ok((bytes, filename_from_url(&url)))
    }

    async fn from_path(&self, path: &Path) -> Result<(Vec<u8>, Option<String>), DocumentError> {
        let not_found = || DocumentError::NotFound(path.display().to_string());

        let canonical = tokio::fs::canonicalize(path).await.map_err(|_| not_found())?;
        if let Some(root) = &self.local_root {
            let root = tokio::fs::canonicalize(root)
                .await
                .map_err(|_| DocumentError::PathNotAllowed(path.display().to_string()))?;
            if !canonical.starts_with(&root) {
                return Err(DocumentError::PathNotAllowed(path.display().to_string()));
            }
        }

        let meta = tokio::fs::metadata(&canonical).await.map_err(|_| not_found())?;
        if !meta.is_file() {
            return Err(not_found());
        }
        if meta.len() > self.max_bytes as u64 {
            return Err(DocumentError::TooLarge {
                limit: self.max_bytes,
            });
        }

        let bytes = tokio::fs::read(&canonical).await.map_err(|_| not_found())?;
        // Name after the requested path, not the link target.
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        Ok((bytes, name))
    }
}

/// Last path segment, percent-decoded, when it looks like a file name.
pub fn filename_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(segment).ok()?;
    decoded
        .contains('.')
        .then(|| decoded.into_owned())
        .filter(|name| !name.contains('/'))
}

/// Decode bare base64 or a `data:<mime>;base64,` URI.
pub fn decode_base64(data: &str) -> Result<Vec<u8>, DocumentError> {
    let data = data.trim();
    let payload = match data.strip_prefix("data:") {
        Some(rest) => match rest.split_once(";base64,") {
            Some((_, payload)) => payload,
            None => {
                return Err(DocumentError::InvalidEncoding(
                    "data URI is not base64".into(),
                ))
            }
        },
        None => data,
    };
    BASE64
        .decode(payload)
        .map_err(|e| DocumentError::InvalidEncoding(e.to_string()))
}

pub fn has_pdf_magic(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(MAGIC_WINDOW)];
    window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_must_fall_inside_window() {
        assert!(has_pdf_magic(b"%PDF-1.7\n..."));
        let mut late = vec![b' '; 10];
        late.extend_from_slice(b"%PDF-1.4");
        assert!(has_pdf_magic(&late));

        let mut too_late = vec![0u8; MAGIC_WINDOW];
        too_late.extend_from_slice(b"%PDF-1.4");
        assert!(!has_pdf_magic(&too_late));
        assert!(!has_pdf_magic(b"%PD"));
    }

    #[test]
    fn data_uri_prefix_is_stripped() {
        assert_eq!(decode_base64("JVBERi0=").unwrap(), b"%PDF-");
        assert_eq!(
            decode_base64("data:application/pdf;base64,JVBERi0=").unwrap(),
            b"%PDF-"
        );
        assert!(matches!(
            decode_base64("data:text/plain,hello"),
            Err(DocumentError::InvalidEncoding(_))
        ));
        assert!(matches!(
            decode_base64("not base64!!"),
            Err(DocumentError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn url_filename_needs_extension() {
        let url = Url::parse("https://example.com/files/report.pdf?x=1").unwrap();
        assert_eq!(filename_from_url(&url).as_deref(), Some("report.pdf"));
        let url = Url::parse("https://example.com/download/1234").unwrap();
        assert_eq!(filename_from_url(&url), None);
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(filename_from_url(&url), None);
    }

    #[test]
    fn url_filename_is_percent_decoded() {
        let url = Url::parse("https://example.com/files/my%20report.pdf").unwrap();
        assert_eq!(filename_from_url(&url).as_deref(), Some("my report.pdf"));
        let url = Url::parse("https://example.com/files/informe%C3%B1.pdf").unwrap();
        assert_eq!(filename_from_url(&url).as_deref(), Some("informe\u{f1}.pdf"));
        let url = Url::parse("https://example.com/files/a%2Fb.pdf").unwrap();
        assert_eq!(filename_from_url(&url), None);
    }

    #[test]
    fn exactly_one_source() {
        assert!(matches!(
            DocumentInput::from_fields(None, None, None, None, None),
            Err(DocumentError::NoSourceProvided)
        ));
        assert!(matches!(
            DocumentInput::from_fields(
                Some("https://a/b.pdf".into()),
                Some("JVBERi0=".into()),
                None,
                None,
                None
            ),
            Err(DocumentError::NoSourceProvided)
        ));
        let input =
            DocumentInput::from_fields(Some(" ".into()), None, Some("/tmp/x.pdf".into()), None, None)
                .unwrap();
        assert_eq!(input.source, DocumentSource::LocalPath("/tmp/x.pdf".into()));
    }
}
