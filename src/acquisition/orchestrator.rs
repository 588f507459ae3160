//! Per-keyword acquisition pipeline.
//!
//! For every keyword, in order: navigate, reveal results, extract candidate
//! locators, then fetch candidates one at a time until the quota is met or
//! the candidates run out. Kept files are numbered densely from 1 within the
//! keyword directory; a slot vacated by a write failure or a duplicate is
//! reused by the next kept file.

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::Instrument;

use crate::config::{AcquisitionConfig, ConfigError, KeywordTarget};
use crate::core::{DuplicateIndex, DuplicateStatus, HashError};
use crate::summary::{KeywordSummary, RunSummary};

use super::extract::{CandidateExtractor, ExtractError};
use super::fetch::{Classification, FetchClassifier, FetchedAsset, Fetcher};
use super::scroll::ScrollController;
use super::session::UiSession;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid page layout: {0}")]
    Layout(#[from] ExtractError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Where a keyword currently is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scrolling,
    Extracting,
    /// Working on the candidate at this position.
    Fetching(usize),
    Saving,
    Skipping,
    Summarizing,
    Done,
}

/// A sequence number handed out for one write attempt.
#[derive(Debug)]
#[must_use]
pub struct Reservation(usize);

impl Reservation {
    pub fn number(&self) -> usize {
        self.0
    }
}

/// Dense 1-based numbering. A reservation is either committed, making the
/// number permanent, or released so the next reservation gets it again.
#[derive(Debug, Default)]
pub struct SequenceAllocator {
    committed: usize,
}

impl SequenceAllocator {
    pub fn reserve(&self) -> Reservation {
        Reservation(self.committed + 1)
    }

    pub fn commit(&mut self, reservation: Reservation) {
        self.committed = reservation.0;
    }

    pub fn release(&self, reservation: Reservation) {
        tracing::trace!("Released sequence number {}", reservation.0);
    }

    /// Numbers committed so far.
    pub fn committed(&self) -> usize {
        self.committed
    }
}

/// What happened to one keyword.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordOutcome {
    pub keyword: String,
    pub directory: PathBuf,
    pub found: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub rejected: usize,
    pub duplicates: usize,
    pub undecodable: usize,
}

/// Runs the whole pipeline over one UI session and one fetcher.
pub struct AcquisitionOrchestrator<S, F> {
    session: S,
    classifier: FetchClassifier<F>,
    config: AcquisitionConfig,
}

impl<S: UiSession, F: Fetcher> AcquisitionOrchestrator<S, F> {
    /// Fails early when the page layout cannot be used.
    pub fn new(session: S, fetcher: F, config: AcquisitionConfig) -> Result<Self, AcquisitionError> {
        CandidateExtractor::new(&config.layout, &config.scroll)?;
        Ok(Self {
            session,
            classifier: FetchClassifier::new(fetcher),
            config,
        })
    }

    /// Process `targets` in order, close the session, then count what is on
    /// disk.
    ///
    /// The session is closed exactly once, whether or not a keyword failed.
    pub async fn run(mut self, targets: &[KeywordTarget]) -> Result<RunSummary, AcquisitionError> {
        let started_at = Utc::now();
        let start = Instant::now();

        let overall = self.bar(targets.len() as u64, "keywords");
        let mut outcomes = Vec::with_capacity(targets.len());
        let mut failure = None;

        for target in targets {
            overall.set_message(target.name.clone());
            match self.run_keyword(target).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
            overall.inc(1);
        }
        overall.finish_and_clear();

        if let Err(e) = self.session.close().await {
            tracing::warn!("Failed to close session: {}", e);
        }
        if let Some(e) = failure {
            return Err(e);
        }

        let keywords = outcomes
            .into_iter()
            .map(|outcome| KeywordSummary {
                final_count: count_files(&outcome.directory),
                keyword: outcome.keyword,
                found: outcome.found,
                downloaded: outcome.downloaded,
            })
            .collect();

        Ok(RunSummary::new(started_at, start.elapsed(), keywords))
    }

    /// One keyword end to end. Does not close the session.
    pub async fn run_keyword(&mut self, target: &KeywordTarget) -> Result<KeywordOutcome, AcquisitionError> {
        let span = tracing::info_span!("keyword", keyword = %target.name, quota = target.quota);
        self.acquire(target).instrument(span).await
    }

    async fn acquire(&mut self, target: &KeywordTarget) -> Result<KeywordOutcome, AcquisitionError> {
        let normalized = target.directory_name()?;
        let mut outcome = KeywordOutcome {
            keyword: target.name.clone(),
            directory: self.config.output_dir.join(&normalized),
            ..KeywordOutcome::default()
        };

        enter(Stage::Scrolling);
        let url = self.config.layout.search_url(&target.name)?;
        if let Err(e) = self.session.navigate(url.as_str()).await {
            tracing::warn!("{}", e);
        }
        ScrollController::new(&self.config.scroll, &self.config.layout)
            .reveal(&mut self.session, target.quota)
            .await;

        enter(Stage::Extracting);
        let extractor = CandidateExtractor::new(&self.config.layout, &self.config.scroll)?;
        let progress = self.bar(0, "thumbnails");
        let candidates = extractor.extract(&mut self.session, &progress).await;
        progress.finish_and_clear();
        outcome.found = candidates.len();
        tracing::info!("Found {} candidate images", outcome.found);

        ensure_dir(&outcome.directory)?;

        let mut sequence = SequenceAllocator::default();
        let mut index = self.config.remove_duplicates.then(DuplicateIndex::default);
        let progress = self.bar(target.quota as u64, "downloaded");

        for (position, locator) in candidates.iter().enumerate() {
            if sequence.committed() >= target.quota {
                break;
            }
            enter(Stage::Fetching(position));

            let classification = self
                .classifier
                .fetch_and_classify(locator, &self.config.allowed_formats, self.config.fetch_timeout)
                .await;
            let asset = match classification {
                Ok(Classification::Accepted(asset)) => asset,
                Ok(Classification::Rejected(reason)) => {
                    enter(Stage::Skipping);
                    tracing::debug!("Skipping {}: {:?}", locator, reason);
                    outcome.rejected += 1;
                    continue;
                }
                Err(e) => {
                    enter(Stage::Skipping);
                    tracing::warn!("{}", e);
                    outcome.failed += 1;
                    continue;
                }
            };

            enter(Stage::Saving);
            let reservation = sequence.reserve();
            let path = outcome.directory.join(format!(
                "{}_{}.{}",
                normalized,
                reservation.number(),
                asset.extension()
            ));

            if !self.save(&asset, &path) {
                outcome.failed += 1;
                sequence.release(reservation);
                continue;
            }

            if let Some(index) = index.as_mut() {
                match index.classify(&path) {
                    Ok(DuplicateStatus::Unique) => {}
                    Ok(DuplicateStatus::Duplicate) => {
                        tracing::debug!("{} duplicates a kept image", locator);
                        discard(&path);
                        outcome.duplicates += 1;
                        sequence.release(reservation);
                        continue;
                    }
                    Err(HashError::InvalidImage { reason, .. }) => {
                        tracing::warn!("{} could not be decoded: {}", locator, reason);
                        discard(&path);
                        outcome.undecodable += 1;
                        sequence.release(reservation);
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("{}", e);
                        discard(&path);
                        outcome.failed += 1;
                        sequence.release(reservation);
                        continue;
                    }
                }
            }

            tracing::debug!("Saved {}", path.display());
            sequence.commit(reservation);
            progress.inc(1);
        }
        progress.finish_and_clear();

        enter(Stage::Summarizing);
        outcome.downloaded = sequence.committed();
        if outcome.downloaded < target.quota {
            tracing::info!(
                "Only {} of {} images downloaded for '{}'",
                outcome.downloaded,
                target.quota,
                target.name
            );
        } else {
            tracing::info!("Downloaded {} images for '{}'", outcome.downloaded, target.name);
        }
        tracing::debug!(
            "failed: {}, rejected: {}, duplicates: {}, undecodable: {}",
            outcome.failed,
            outcome.rejected,
            outcome.duplicates,
            outcome.undecodable
        );

        enter(Stage::Done);
        Ok(outcome)
    }

    fn save(&self, asset: &FetchedAsset, path: &Path) -> bool {
        match fs::write(path, &asset.bytes) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to write {}: {}", path.display(), e);
                false
            }
        }
    }

    fn bar(&self, len: u64, unit: &str) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        let template = format!("{{msg}} [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {unit}");
        if let Ok(style) = ProgressStyle::with_template(&template) {
            pb.set_style(style.progress_chars("=> "));
        }
        pb
    }
}

fn enter(stage: Stage) {
    tracing::trace!("stage: {:?}", stage);
}

/// Create the keyword directory. One that already exists is fine.
fn ensure_dir(dir: &Path) -> Result<(), AcquisitionError> {
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(source) => Err(AcquisitionError::CreateDir {
            path: dir.display().to_string(),
            source,
        }),
    }
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!("Failed to remove {}: {}", path.display(), e);
    }
}

/// Regular files directly inside `dir`; 0 when it cannot be read.
pub fn count_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                .count()
        })
        .unwrap_or(0)
}
