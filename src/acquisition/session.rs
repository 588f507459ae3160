//! Remote UI session abstraction.
//!
//! The pipeline only needs a handful of capabilities from a browser tab:
//! navigate, read the rendered markup, count elements, press a key on an
//! element, click an element, close. Everything else about the browser stays
//! behind this trait so the pipeline runs against a fake in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures talking to the remote UI. All of them are transient from the
/// pipeline's point of view: they get logged and the step is skipped.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Interaction failed: {0}")]
    Interaction(String),

    #[error("Browser unavailable: {0}")]
    Browser(String),
}

/// How to find an element on the results page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementLocator {
    Id(String),
    /// One or more class names joined with `.`, e.g. `rg_i.Q4LuWd`.
    Class(String),
    Css(String),
}

impl ElementLocator {
    pub fn css(&self) -> String {
        match self {
            ElementLocator::Id(id) => format!("#{id}"),
            ElementLocator::Class(class) => format!(".{}", class.trim_start_matches('.')),
            ElementLocator::Css(selector) => selector.clone(),
        }
    }
}

#[async_trait]
pub trait UiSession: Send {
    /// Load `url` in the session.
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;
    /// Current rendered document markup.
    async fn rendered_markup(&mut self) -> Result<String, SessionError>;
    /// Number of elements currently matching `locator`.
    async fn count(&mut self, locator: &ElementLocator) -> Result<usize, SessionError>;
    /// Send `key` to the first element matching `locator`.
    async fn press_key(&mut self, locator: &ElementLocator, key: &str) -> Result<(), SessionError>;
    /// Click the `index`-th element matching `locator`.
    async fn click(&mut self, locator: &ElementLocator, index: usize) -> Result<(), SessionError>;
    /// End the session. Further calls may fail.
    async fn close(&mut self) -> Result<(), SessionError>;
}
