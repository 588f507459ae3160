//! Run parameters for the acquisition pipeline.
//!
//! Defaults mirror the behaviour users expect from the command line: ten
//! images per keyword, jpg/jpeg/png only, duplicates kept, and the Google
//! Images result page as the lookup layout.

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::acquisition::session::ElementLocator;

pub const DEFAULT_OUTPUT_DIR: &str = "easy_images_dir";
pub const DEFAULT_MAX_LIMIT: usize = 10;
pub const DEFAULT_FORMATS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Keyword map must be a JSON object of keyword -> quota")]
    NotAMapping,

    #[error("Invalid quota for keyword '{keyword}': {value}")]
    InvalidQuota { keyword: String, value: String },

    #[error("No keywords given")]
    NoKeywords,

    #[error("Keyword '{0}' does not name a usable directory")]
    InvalidKeyword(String),

    #[error("Invalid search endpoint: {0}")]
    Url(#[from] url::ParseError),
}

/// One keyword and how many images to keep for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordTarget {
    pub name: String,
    pub quota: usize,
}

impl KeywordTarget {
    pub fn new(name: impl Into<String>, quota: usize) -> Self {
        Self {
            name: name.into(),
            quota,
        }
    }

    /// Name used for the keyword's directory and file prefix.
    pub fn normalized(&self) -> String {
        normalize_keyword(&self.name)
    }

    /// [`Self::normalized`], refused when empty or a dot segment, since
    /// either would resolve outside its own directory under the output root.
    pub fn directory_name(&self) -> Result<String, ConfigError> {
        let normalized = self.normalized();
        if normalized.is_empty() || normalized.chars().all(|c| c == '.') {
            return Err(ConfigError::InvalidKeyword(self.name.clone()));
        }
        Ok(normalized)
    }
}

/// Characters that cannot appear in a single path component on some platform.
const PATH_HOSTILE: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Spaces and path separators become underscores, so `AC/DC` stays one
/// directory named `AC_DC`.
pub fn normalize_keyword(keyword: &str) -> String {
    keyword
        .chars()
        .map(|c| if c == ' ' || PATH_HOSTILE.contains(&c) { '_' } else { c })
        .collect()
}

fn checked_target(name: &str, quota: usize) -> Result<KeywordTarget, ConfigError> {
    let target = KeywordTarget::new(name, quota);
    target.directory_name()?;
    Ok(target)
}

/// Split `"dog, red fox"` into targets sharing `quota`.
///
/// Terms are trimmed, empty terms dropped, and a repeated term keeps its
/// first position.
pub fn parse_keywords(input: &str, quota: usize) -> Result<Vec<KeywordTarget>, ConfigError> {
    let mut targets: Vec<KeywordTarget> = Vec::new();
    for term in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !targets.iter().any(|t| t.name == term) {
            targets.push(checked_target(term, quota)?);
        }
    }
    if targets.is_empty() {
        return Err(ConfigError::NoKeywords);
    }
    Ok(targets)
}

/// Load a `{"keyword": quota, ...}` JSON file, keeping the file's order.
pub fn load_keyword_map(path: &Path) -> Result<Vec<KeywordTarget>, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_keyword_map(&raw).map_err(|e| match e {
        ConfigError::Json { source, .. } => ConfigError::Json {
            path: path.display().to_string(),
            source,
        },
        other => other,
    })
}

pub fn parse_keyword_map(raw: &str) -> Result<Vec<KeywordTarget>, ConfigError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|source| ConfigError::Json {
            path: "<inline>".to_string(),
            source,
        })?;
    let map = value.as_object().ok_or(ConfigError::NotAMapping)?;

    let mut targets = Vec::with_capacity(map.len());
    for (keyword, quota) in map {
        let quota = quota
            .as_u64()
            .ok_or_else(|| ConfigError::InvalidQuota {
                keyword: keyword.clone(),
                value: quota.to_string(),
            })?;
        targets.push(checked_target(keyword.trim(), quota as usize)?);
    }
    if targets.is_empty() {
        return Err(ConfigError::NoKeywords);
    }
    Ok(targets)
}

/// Allow-list of image formats, matched against the sniffed format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedFormats(BTreeSet<String>);

impl AllowedFormats {
    pub fn new<I, S>(formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            formats
                .into_iter()
                .map(|f| f.as_ref().trim().trim_start_matches('.').to_lowercase())
                .filter(|f| !f.is_empty())
                .collect(),
        )
    }

    /// True when any file extension of `format` is on the list, so "jpeg"
    /// alone still admits JPEG data.
    pub fn allows(&self, format: ImageFormat) -> bool {
        format
            .extensions_str()
            .iter()
            .any(|ext| self.0.contains(*ext))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for AllowedFormats {
    fn default() -> Self {
        Self::new(DEFAULT_FORMATS)
    }
}

/// Element lookups and search endpoint for one results page design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageLayout {
    pub search_endpoint: String,
    pub search_params: Vec<(String, String)>,
    /// Element that receives the advance key presses.
    pub scroll_target: ElementLocator,
    /// Optional "show more results" control.
    pub load_more: ElementLocator,
    pub thumbnail: ElementLocator,
    /// CSS selector for the full-resolution image in the detail panel.
    pub full_image: String,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            search_endpoint: "https://www.google.com/search".to_string(),
            search_params: vec![
                ("tbm".to_string(), "isch".to_string()),
                ("biw".to_string(), "1536".to_string()),
                ("bih".to_string(), "674".to_string()),
            ],
            scroll_target: ElementLocator::Id("yDmH0d".to_string()),
            load_more: ElementLocator::Class("mye4qd".to_string()),
            thumbnail: ElementLocator::Class("rg_i.Q4LuWd".to_string()),
            full_image: "img.n3VNCb".to_string(),
        }
    }
}

impl PageLayout {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    /// Results page URL for `keyword`, query-encoded.
    pub fn search_url(&self, keyword: &str) -> Result<Url, ConfigError> {
        let params = std::iter::once(("q", keyword)).chain(
            self.search_params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        Ok(Url::parse_with_params(&self.search_endpoint, params)?)
    }
}

/// Heuristics for revealing lazily loaded results.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollConfig {
    pub max_iterations: usize,
    pub min_iterations: usize,
    /// Estimated new results per advance step.
    pub per_scroll_yield: usize,
    /// Damping applied to the estimate.
    pub similarity_factor: usize,
    /// Above this target the "load more" control is tried.
    pub large_result_threshold: usize,
    pub page_load_timeout: Duration,
    /// Per-step pause is `page_load_timeout / scrolling_timeout_factor`.
    pub scrolling_timeout_factor: u32,
    pub advance_key: String,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            max_iterations: 160,
            min_iterations: 0,
            per_scroll_yield: 25,
            similarity_factor: 2,
            large_result_threshold: 350,
            page_load_timeout: Duration::from_secs(2),
            scrolling_timeout_factor: 40,
            advance_key: "ArrowDown".to_string(),
        }
    }
}

impl ScrollConfig {
    /// `max(min, min(max, (target - yield) / similarity))`, truncating
    /// toward zero like the estimate always has.
    pub fn iterations_for(&self, target_count: usize) -> usize {
        let similarity = self.similarity_factor.max(1) as i64;
        let estimate = (target_count as i64 - self.per_scroll_yield as i64) / similarity;
        let capped = estimate.min(self.max_iterations as i64);
        capped.max(self.min_iterations as i64).max(0) as usize
    }

    pub fn step_pause(&self) -> Duration {
        self.page_load_timeout / self.scrolling_timeout_factor.max(1)
    }

    /// No waiting at all; for tests and fake sessions.
    pub fn instant() -> Self {
        Self {
            page_load_timeout: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Everything the orchestrator needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    pub output_dir: PathBuf,
    pub allowed_formats: AllowedFormats,
    pub remove_duplicates: bool,
    pub fetch_timeout: Duration,
    pub show_progress: bool,
    pub scroll: ScrollConfig,
    pub layout: PageLayout,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            allowed_formats: AllowedFormats::default(),
            remove_duplicates: false,
            fetch_timeout: Duration::from_secs(1),
            show_progress: true,
            scroll: ScrollConfig::default(),
            layout: PageLayout::default(),
        }
    }
}
