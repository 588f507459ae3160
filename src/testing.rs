//! Fakes and fixtures shared by the unit tests.

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Luma, Rgb};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::acquisition::fetch::{FetchError, Fetcher};
use crate::acquisition::session::{ElementLocator, SessionError, UiSession};
use crate::config::PageLayout;

/// 90x80 image of eight horizontal bands. Band `r` holds a left-to-right
/// ramp when bit `r` of `seed` is set and a right-to-left ramp otherwise, so
/// distinct seeds give distinct fingerprints.
pub fn banded_image(seed: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(image::RgbImage::from_fn(90, 80, |x, y| {
        let band = y / 10;
        let ramp = (x * 255 / 89) as u8;
        let value = if seed & (1 << band) != 0 { ramp } else { 255 - ramp };
        Rgb([value, value / 2, 255 - value])
    }))
}

pub fn horizontal_gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageLuma8(image::GrayImage::from_fn(width, height, |x, _| {
        Luma([(x * 255 / (width - 1)) as u8])
    }))
}

pub fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let img = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
        ImageFormat::Gif => DynamicImage::ImageRgba8(img.to_rgba8()),
        _ => img.clone(),
    };
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

pub fn save_png(img: &DynamicImage, path: &Path) {
    std::fs::write(path, encode(img, ImageFormat::Png)).unwrap();
}

pub fn save_jpeg(img: &DynamicImage, path: &Path) {
    std::fs::write(path, encode(img, ImageFormat::Jpeg)).unwrap();
}

#[derive(Debug, Clone)]
struct FakeThumbnail {
    sources: Vec<String>,
    clickable: bool,
}

/// Search results for one keyword.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    thumbnails: Vec<FakeThumbnail>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A thumbnail whose detail panel shows `sources`.
    pub fn thumbnail(mut self, sources: &[&str]) -> Self {
        self.thumbnails.push(FakeThumbnail {
            sources: sources.iter().map(|s| s.to_string()).collect(),
            clickable: true,
        });
        self
    }

    /// One thumbnail per locator.
    pub fn thumbnails<S: AsRef<str>>(mut self, locators: &[S]) -> Self {
        for locator in locators {
            self = self.thumbnail(&[locator.as_ref()]);
        }
        self
    }

    /// A thumbnail that refuses to be clicked.
    pub fn broken_thumbnail(mut self) -> Self {
        self.thumbnails.push(FakeThumbnail {
            sources: Vec::new(),
            clickable: false,
        });
        self
    }
}

/// Everything a [`FakeSession`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    pub navigations: Vec<String>,
    pub key_presses: usize,
    pub thumbnail_clicks: usize,
    pub load_more_clicks: usize,
    pub closes: usize,
}

/// In-memory results page speaking the default [`PageLayout`].
pub struct FakeSession {
    layout: PageLayout,
    pages: HashMap<String, FakePage>,
    current: Option<String>,
    selected: Option<usize>,
    scroll_target: bool,
    load_more: bool,
    failing_navigation: bool,
    unlisted_thumbnails: bool,
    log: Arc<Mutex<SessionLog>>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self {
            layout: PageLayout::default(),
            pages: HashMap::new(),
            current: None,
            selected: None,
            scroll_target: true,
            load_more: false,
            failing_navigation: false,
            unlisted_thumbnails: false,
            log: Arc::new(Mutex::new(SessionLog::default())),
        }
    }

    pub fn with_page(mut self, keyword: &str, page: FakePage) -> Self {
        self.pages.insert(keyword.to_string(), page);
        self
    }

    pub fn with_scroll_target(mut self, present: bool) -> Self {
        self.scroll_target = present;
        self
    }

    pub fn with_load_more(mut self, present: bool) -> Self {
        self.load_more = present;
        self
    }

    /// Navigations report an error even though the results page loads,
    /// like a browser giving up waiting on a slow page.
    pub fn with_failing_navigation(mut self) -> Self {
        self.failing_navigation = true;
        self
    }

    /// Counting thumbnails fails, like a detached page.
    pub fn with_unlisted_thumbnails(mut self) -> Self {
        self.unlisted_thumbnails = true;
        self
    }

    /// Jump straight to a keyword's results without a navigation.
    pub fn navigate_to_keyword(&mut self, keyword: &str) {
        self.current = Some(keyword.to_string());
        self.selected = None;
    }

    pub fn log(&self) -> SessionLog {
        self.log.lock().unwrap().clone()
    }

    /// Shared view of the log that outlives the session.
    pub fn log_handle(&self) -> Arc<Mutex<SessionLog>> {
        Arc::clone(&self.log)
    }

    fn page(&self) -> Option<&FakePage> {
        self.current.as_ref().and_then(|k| self.pages.get(k))
    }

    fn not_found(locator: &ElementLocator) -> SessionError {
        SessionError::ElementNotFound {
            selector: locator.css(),
        }
    }
}

#[async_trait]
impl UiSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.log.lock().unwrap().navigations.push(url.to_string());
        let parsed = url::Url::parse(url).map_err(|e| SessionError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let keyword = parsed
            .query_pairs()
            .find(|(k, _)| k == "q")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        self.navigate_to_keyword(&keyword);
        if self.failing_navigation {
            return Err(SessionError::Navigation {
                url: url.to_string(),
                message: "timed out waiting for load".to_string(),
            });
        }
        Ok(())
    }

    async fn rendered_markup(&mut self) -> Result<String, SessionError> {
        let mut html = String::from("<html><head><title>results</title></head><body>");
        html.push_str("<div id=\"yDmH0d\">");
        if let Some(page) = self.page() {
            for _ in &page.thumbnails {
                html.push_str("<img class=\"rg_i Q4LuWd\" src=\"data:image/gif;base64,R0lGODlh\">");
            }
            if let Some(thumb) = self.selected.and_then(|i| page.thumbnails.get(i)) {
                html.push_str("<div class=\"detail\">");
                html.push_str("<img class=\"n3VNCb\" src=\"data:image/jpeg;base64,/9j/4AAQ\">");
                for src in &thumb.sources {
                    html.push_str(&format!("<img class=\"n3VNCb\" src=\"{src}\">"));
                }
                html.push_str("</div>");
            }
        }
        html.push_str("</div></body></html>");
        Ok(html)
    }

    async fn count(&mut self, locator: &ElementLocator) -> Result<usize, SessionError> {
        if *locator == self.layout.thumbnail && self.unlisted_thumbnails {
            Err(SessionError::Interaction("page is detached".to_string()))
        } else if *locator == self.layout.thumbnail {
            Ok(self.page().map(|p| p.thumbnails.len()).unwrap_or(0))
        } else if *locator == self.layout.scroll_target {
            Ok(usize::from(self.scroll_target))
        } else if *locator == self.layout.load_more {
            Ok(usize::from(self.load_more))
        } else {
            Ok(0)
        }
    }

    async fn press_key(&mut self, locator: &ElementLocator, _key: &str) -> Result<(), SessionError> {
        if *locator == self.layout.scroll_target && self.scroll_target {
            self.log.lock().unwrap().key_presses += 1;
            Ok(())
        } else {
            Err(Self::not_found(locator))
        }
    }

    async fn click(&mut self, locator: &ElementLocator, index: usize) -> Result<(), SessionError> {
        if *locator == self.layout.thumbnail {
            self.log.lock().unwrap().thumbnail_clicks += 1;
            let clickable = self
                .page()
                .and_then(|p| p.thumbnails.get(index))
                .map(|t| t.clickable)
                .unwrap_or(false);
            if !clickable {
                return Err(SessionError::Interaction(format!(
                    "thumbnail {index} is not interactable"
                )));
            }
            self.selected = Some(index);
            Ok(())
        } else if *locator == self.layout.load_more && self.load_more {
            self.log.lock().unwrap().load_more_clicks += 1;
            Ok(())
        } else {
            Err(Self::not_found(locator))
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.log.lock().unwrap().closes += 1;
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum FakeResponse {
    Body(Vec<u8>),
    Timeout,
}

/// Fetcher serving canned bodies and recording every request.
#[derive(Debug, Clone, Default)]
pub struct FakeFetcher {
    responses: HashMap<String, FakeResponse>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, locator: &str, body: Vec<u8>) -> Self {
        self.responses
            .insert(locator.to_string(), FakeResponse::Body(body));
        self
    }

    pub fn with_timeout(mut self, locator: &str) -> Self {
        self.responses
            .insert(locator.to_string(), FakeResponse::Timeout);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, locator: &str, _timeout: Duration) -> Result<Vec<u8>, FetchError> {
        self.calls.lock().unwrap().push(locator.to_string());
        match self.responses.get(locator) {
            Some(FakeResponse::Body(body)) => Ok(body.clone()),
            Some(FakeResponse::Timeout) => Err(FetchError::Timeout {
                url: locator.to_string(),
            }),
            None => Err(FetchError::Status {
                url: locator.to_string(),
                status: 404,
            }),
        }
    }
}
