//! `UiSession` backed by a real Chromium-family browser via chromiumoxide.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use tokio::task::JoinHandle;

use super::session::{ElementLocator, SessionError, UiSession};

/// Browser families the downloader knows how to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BrowserKind {
    Chrome,
    Brave,
}

impl BrowserKind {
    fn binaries(&self) -> &'static [&'static str] {
        match self {
            BrowserKind::Chrome => &["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"],
            BrowserKind::Brave => &["brave-browser", "brave"],
        }
    }

    fn fixed_locations(&self) -> Vec<PathBuf> {
        let mut locations = match self {
            BrowserKind::Chrome => vec![
                PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
                PathBuf::from("C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe"),
            ],
            BrowserKind::Brave => vec![
                PathBuf::from("/usr/bin/brave-browser"),
                PathBuf::from("/Applications/Brave Browser.app/Contents/MacOS/Brave Browser"),
            ],
        };
        if let Some(home) = dirs::home_dir() {
            let app = match self {
                BrowserKind::Chrome => "Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                BrowserKind::Brave => "Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            };
            locations.push(home.join(app));
        }
        locations
    }
}

/// Locate a browser binary for `kind`.
///
/// Order: `IMGRAB_CHROME_PATH`, then `PATH`, then well-known install
/// locations.
pub fn find_browser(kind: BrowserKind) -> Option<PathBuf> {
    if let Ok(p) = std::env::var("IMGRAB_CHROME_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in kind.binaries() {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    kind.fixed_locations().into_iter().find(|p| p.exists())
}

/// Launch options for [`ChromiumSession`].
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub kind: BrowserKind,
    pub executable: Option<PathBuf>,
    pub headed: bool,
    pub window_size: (u32, u32),
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            kind: BrowserKind::Chrome,
            executable: None,
            headed: false,
            window_size: (1536, 674),
        }
    }
}

/// One browser with one tab, reused for every keyword of a run.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromiumSession {
    pub async fn launch(options: &LaunchOptions) -> Result<Self, SessionError> {
        let executable = match &options.executable {
            Some(path) => path.clone(),
            None => find_browser(options.kind).ok_or_else(|| {
                SessionError::Browser(format!(
                    "no {:?} binary found; pass --browser-path or set IMGRAB_CHROME_PATH",
                    options.kind
                ))
            })?,
        };
        tracing::info!("Launching browser {}", executable.display());

        let (width, height) = options.window_size;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .window_size(width, height)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if options.headed {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| SessionError::Browser(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::Browser(format!("failed to launch browser: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::Browser(format!("failed to open tab: {e}")))?;

        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    async fn nth(
        &self,
        locator: &ElementLocator,
        index: usize,
    ) -> Result<chromiumoxide::element::Element, SessionError> {
        let selector = locator.css();
        let mut elements = self
            .page
            .find_elements(selector.as_str())
            .await
            .map_err(|_| SessionError::ElementNotFound {
                selector: selector.clone(),
            })?;
        if index >= elements.len() {
            return Err(SessionError::ElementNotFound { selector });
        }
        Ok(elements.swap_remove(index))
    }
}

#[async_trait]
impl UiSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| SessionError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn rendered_markup(&mut self) -> Result<String, SessionError> {
        self.page
            .content()
            .await
            .map_err(|e| SessionError::Interaction(format!("failed to read page content: {e}")))
    }

    async fn count(&mut self, locator: &ElementLocator) -> Result<usize, SessionError> {
        let selector = locator.css();
        // querySelectorAll yields an empty list on no match, so any error is real.
        self.page
            .find_elements(selector.as_str())
            .await
            .map(|elements| elements.len())
            .map_err(|e| SessionError::Interaction(format!("failed to query {selector}: {e}")))
    }

    async fn press_key(&mut self, locator: &ElementLocator, key: &str) -> Result<(), SessionError> {
        let element = self.nth(locator, 0).await?;
        element
            .press_key(key)
            .await
            .map_err(|e| SessionError::Interaction(format!("key {key} on {}: {e}", locator.css())))?;
        Ok(())
    }

    async fn click(&mut self, locator: &ElementLocator, index: usize) -> Result<(), SessionError> {
        let element = self.nth(locator, index).await?;
        element.click().await.map_err(|e| {
            SessionError::Interaction(format!("click on {}[{index}]: {e}", locator.css()))
        })?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        let closed = self
            .browser
            .close()
            .await
            .map_err(|e| SessionError::Browser(format!("failed to close browser: {e}")));
        let _ = self.browser.wait().await;
        self.handler.abort();
        closed.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_found_browser_exists() {
        for kind in [BrowserKind::Chrome, BrowserKind::Brave] {
            if let Some(path) = find_browser(kind) {
                assert!(path.exists());
            }
        }
    }

    #[test]
    fn test_every_kind_has_candidates() {
        for kind in [BrowserKind::Chrome, BrowserKind::Brave] {
            assert!(!kind.binaries().is_empty());
            assert!(!kind.fixed_locations().is_empty());
        }
    }

    #[tokio::test]
    #[ignore] // Requires a Chromium-family browser
    async fn test_session_round_trip() {
        let mut session = ChromiumSession::launch(&LaunchOptions::default())
            .await
            .expect("failed to launch browser");

        session
            .navigate("data:text/html,<div id='main'><img class='a b' src='https://x/y.png'></div>")
            .await
            .expect("navigation failed");

        let html = session.rendered_markup().await.expect("markup failed");
        assert!(html.contains("https://x/y.png"));
        assert_eq!(
            session
                .count(&ElementLocator::Class("a.b".into()))
                .await
                .unwrap(),
            1
        );
        assert!(
            session
                .click(&ElementLocator::Class("missing".into()), 0)
                .await
                .is_err()
        );

        session.close().await.expect("close failed");
    }
}
