//! Candidate retrieval and content classification.
//!
//! Search results routinely link images through URLs with no extension, the
//! wrong extension, or a generic content-type. Only the bytes are trusted:
//! the format comes from magic-number sniffing.

use async_trait::async_trait;
use image::ImageFormat;
use std::time::Duration;
use thiserror::Error;

use crate::config::AllowedFormats;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Why a successfully fetched candidate was not kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The body is an HTML page (error page, interstitial, placeholder).
    NotAnImage,
    /// Sniffed format is not on the allow-list, or not recognised at all.
    UnsupportedFormat { format: String },
}

/// Bytes accepted for saving, with the format they were sniffed as.
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub source: String,
}

impl FetchedAsset {
    /// File extension (without dot) for the sniffed format.
    pub fn extension(&self) -> &'static str {
        format_extension(self.format)
    }
}

#[derive(Debug, Clone)]
pub enum Classification {
    Accepted(FetchedAsset),
    Rejected(Rejection),
}

/// Retrieves raw bytes for a locator.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, locator: &str, timeout: Duration) -> Result<Vec<u8>, FetchError>;
}

/// reqwest-backed fetcher following redirects.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) \
                              AppleWebKit/537.36 (KHTML, like Gecko) \
                              Chrome/131.0.0.0 Safari/537.36";

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, locator: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let map_err = |source: reqwest::Error| {
            if source.is_timeout() {
                FetchError::Timeout {
                    url: locator.to_string(),
                }
            } else {
                FetchError::Request {
                    url: locator.to_string(),
                    source,
                }
            }
        };

        let response = self
            .client
            .get(locator)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: locator.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(map_err)?;
        Ok(body.to_vec())
    }
}

/// Extension used when saving `format`: the first one the image crate lists,
/// so JPEG data is saved as `.jpg`.
pub fn format_extension(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("bin")
}

/// Cheap check for HTML documents served in place of an image.
pub fn looks_like_html(bytes: &[u8]) -> bool {
    const MARKERS: [&[u8]; 2] = [b"<html", b"<!doctype html"];
    MARKERS.iter().any(|marker| {
        bytes
            .windows(marker.len())
            .any(|window| window.eq_ignore_ascii_case(marker))
    })
}

/// Decide from the bytes alone whether a candidate is kept.
pub fn classify_bytes(bytes: Vec<u8>, source: &str, allowed: &AllowedFormats) -> Classification {
    if looks_like_html(&bytes) {
        return Classification::Rejected(Rejection::NotAnImage);
    }

    let format = match image::guess_format(&bytes) {
        Ok(format) => format,
        Err(_) => {
            return Classification::Rejected(Rejection::UnsupportedFormat {
                format: "unknown".to_string(),
            });
        }
    };

    if !allowed.allows(format) {
        return Classification::Rejected(Rejection::UnsupportedFormat {
            format: format_extension(format).to_string(),
        });
    }

    Classification::Accepted(FetchedAsset {
        bytes,
        format,
        source: source.to_string(),
    })
}

/// Fetches a candidate and classifies what came back.
pub struct FetchClassifier<F> {
    fetcher: F,
}

impl<F: Fetcher> FetchClassifier<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Network failures come back as `Err`; anything that arrived but is not
    /// an allowed image comes back as `Ok(Rejected(..))`.
    pub async fn fetch_and_classify(
        &self,
        locator: &str,
        allowed: &AllowedFormats,
        timeout: Duration,
    ) -> Result<Classification, FetchError> {
        let bytes = self.fetcher.fetch(locator, timeout).await?;
        Ok(classify_bytes(bytes, locator, allowed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{banded_image, encode};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn allow(formats: &[&str]) -> AllowedFormats {
        AllowedFormats::new(formats.iter().copied())
    }

    #[test]
    fn test_png_bytes_behind_jpg_locator_are_png() {
        let png = encode(&banded_image(0x0F), ImageFormat::Png);
        let result = classify_bytes(png, "https://cdn.example/photo.jpg", &allow(&["png"]));

        match result {
            Classification::Accepted(asset) => {
                assert_eq!(asset.format, ImageFormat::Png);
                assert_eq!(asset.extension(), "png");
                assert_eq!(asset.source, "https://cdn.example/photo.jpg");
            }
            other => panic!("expected png to be accepted, got {other:?}"),
        }
    }

    #[test]
    fn test_locator_extension_does_not_rescue_wrong_format() {
        let png = encode(&banded_image(0x0F), ImageFormat::Png);
        let result = classify_bytes(png, "https://cdn.example/photo.jpg", &allow(&["jpg"]));
        assert!(matches!(
            result,
            Classification::Rejected(Rejection::UnsupportedFormat { ref format }) if format == "png"
        ));
    }

    #[test]
    fn test_jpeg_data_gets_jpg_extension() {
        let jpeg = encode(&banded_image(0x0F), ImageFormat::Jpeg);
        match classify_bytes(jpeg, "https://x/no-extension", &AllowedFormats::default()) {
            Classification::Accepted(asset) => assert_eq!(asset.extension(), "jpg"),
            other => panic!("expected jpeg to be accepted, got {other:?}"),
        }
    }

    #[test]
    fn test_html_body_is_not_an_image() {
        let body = b"<!DOCTYPE html><html><body>Not found</body></html>".to_vec();
        assert!(matches!(
            classify_bytes(body, "https://x/a.png", &AllowedFormats::default()),
            Classification::Rejected(Rejection::NotAnImage)
        ));
    }

    #[test]
    fn test_unknown_bytes_are_unsupported() {
        assert!(matches!(
            classify_bytes(b"plain text".to_vec(), "https://x/a.png", &AllowedFormats::default()),
            Classification::Rejected(Rejection::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_gif_rejected_by_default_list() {
        let gif = encode(&banded_image(0x0F), ImageFormat::Gif);
        assert!(matches!(
            classify_bytes(gif, "https://x/a.gif", &AllowedFormats::default()),
            Classification::Rejected(Rejection::UnsupportedFormat { ref format }) if format == "gif"
        ));
    }

    #[tokio::test]
    async fn test_http_fetcher_follows_redirects() {
        let server = MockServer::start().await;
        let png = encode(&banded_image(0x3C), ImageFormat::Png);

        Mock::given(method("GET"))
            .and(path("/redirect.jpg"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", format!("{}/real", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/real"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/octet-stream")
                    .set_body_bytes(png.clone()),
            )
            .mount(&server)
            .await;

        let classifier = FetchClassifier::new(HttpFetcher::new().unwrap());
        let result = classifier
            .fetch_and_classify(
                &format!("{}/redirect.jpg", server.uri()),
                &AllowedFormats::default(),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        match result {
            Classification::Accepted(asset) => {
                assert_eq!(asset.format, ImageFormat::Png);
                assert_eq!(asset.bytes, png);
            }
            other => panic!("expected accepted asset, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_fetcher_sends_browser_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server)
            .await;

        HttpFetcher::new()
            .unwrap()
            .fetch(&format!("{}/ua.png", server.uri()), Duration::from_secs(5))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].headers.get("user-agent").unwrap(), USER_AGENT);
    }

    #[tokio::test]
    async fn test_http_fetcher_reports_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = HttpFetcher::new()
            .unwrap()
            .fetch(&format!("{}/gone.png", server.uri()), Duration::from_secs(5))
            .await;

        assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_http_fetcher_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0u8; 16])
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let result = HttpFetcher::new()
            .unwrap()
            .fetch(&format!("{}/slow.png", server.uri()), Duration::from_millis(100))
            .await;

        assert!(matches!(result, Err(FetchError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_request_error() {
        let result = HttpFetcher::new()
            .unwrap()
            .fetch("http://127.0.0.1:9/none.png", Duration::from_secs(2))
            .await;
        assert!(matches!(
            result,
            Err(FetchError::Request { .. }) | Err(FetchError::Timeout { .. })
        ));
    }
}
