use indicatif::ProgressBar;
use scraper::{Html, Selector};
use std::collections::HashSet;
use thiserror::Error;

use crate::config::{PageLayout, ScrollConfig};

use super::session::UiSession;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// scraper's parse error borrows the selector text, so only its message
    /// is kept.
    #[error("Invalid full image selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

/// Locators in first-seen order, each kept once.
#[derive(Debug, Default, Clone)]
pub struct CandidateSet {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when `locator` was already present.
    pub fn insert(&mut self, locator: &str) -> bool {
        if self.seen.contains(locator) {
            return false;
        }
        self.seen.insert(locator.to_string());
        self.order.push(locator.to_string());
        true
    }

    pub fn contains(&self, locator: &str) -> bool {
        self.seen.contains(locator)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.order
    }
}

/// Add every usable full-image `src` in `markup` to `into`.
///
/// Inline `data:` payloads are thumbnails still being swapped for the real
/// image and are ignored. Returns how many new locators were added.
pub fn collect_sources(markup: &str, full_image: &Selector, into: &mut CandidateSet) -> usize {
    let document = Html::parse_document(markup);
    let mut added = 0;
    for element in document.select(full_image) {
        let Some(src) = element.value().attr("src") else {
            continue;
        };
        let src = src.trim();
        if src.is_empty() || src.starts_with("data:") {
            continue;
        }
        if into.insert(src) {
            added += 1;
        }
    }
    added
}

/// Collects full-resolution image locators by opening each thumbnail's
/// detail panel.
pub struct CandidateExtractor<'a> {
    layout: &'a PageLayout,
    config: &'a ScrollConfig,
    full_image: Selector,
}

impl<'a> CandidateExtractor<'a> {
    pub fn new(layout: &'a PageLayout, config: &'a ScrollConfig) -> Result<Self, ExtractError> {
        let full_image =
            Selector::parse(&layout.full_image).map_err(|e| ExtractError::InvalidSelector {
                selector: layout.full_image.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            layout,
            config,
            full_image,
        })
    }

    /// Click through every thumbnail currently on the page.
    ///
    /// A thumbnail that cannot be clicked, or whose panel cannot be read, is
    /// logged and skipped.
    pub async fn extract<S>(&self, session: &mut S, progress: &ProgressBar) -> CandidateSet
    where
        S: UiSession + ?Sized,
    {
        tokio::time::sleep(self.config.page_load_timeout).await;

        let mut candidates = CandidateSet::new();
        let total = match session.count(&self.layout.thumbnail).await {
            Ok(total) => total,
            Err(e) => {
                tracing::warn!("Could not list thumbnails: {}", e);
                0
            }
        };
        progress.set_length(total as u64);

        let pause = self.config.step_pause();
        for index in 0..total {
            match session.click(&self.layout.thumbnail, index).await {
                Ok(()) => {
                    tokio::time::sleep(pause).await;
                    match session.rendered_markup().await {
                        Ok(markup) => {
                            collect_sources(&markup, &self.full_image, &mut candidates);
                        }
                        Err(e) => tracing::warn!("Thumbnail {}: {}", index, e),
                    }
                }
                Err(e) => tracing::warn!("Skipping thumbnail {}: {}", index, e),
            }
            progress.inc(1);
        }

        tracing::debug!("{} thumbnails gave {} candidates", total, candidates.len());
        candidates
    }
}
