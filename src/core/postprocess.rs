use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::duplicate::{DuplicateGroup, find_duplicate_groups};
use crate::core::hash::PerceptualHasher;
use crate::core::image::{self as image_ops, ImageOpError, ImageStats};
use crate::core::scanner::{self, ScanError};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Image operation error: {0}")]
    Image(#[from] ImageOpError),
}

/// Which post-processing steps to run. They always run in the order
/// dedup, resize, grayscale, stats.
#[derive(Debug, Clone, Default)]
pub struct PostProcessOptions {
    pub remove_duplicates: bool,
    pub resize: Option<(u32, u32)>,
    pub grayscale: bool,
    pub stats: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct DedupReport {
    pub scanned: usize,
    pub groups: Vec<DuplicateGroup>,
    pub removed_undecodable: Vec<PathBuf>,
    pub removed_duplicates: Vec<PathBuf>,
    pub dry_run: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: Vec<PathBuf>,
}

#[derive(Debug, Default, Serialize)]
pub struct PostProcessReport {
    pub dedup: Option<DedupReport>,
    pub resize: Option<BatchReport>,
    pub grayscale: Option<BatchReport>,
    pub stats: Option<ImageStats>,
}

/// Batch operations over the flat file list of one directory.
pub struct PostProcessor {
    hasher: PerceptualHasher,
    show_progress: bool,
}

impl PostProcessor {
    pub fn new() -> Self {
        Self {
            hasher: PerceptualHasher::new(),
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Delete undecodable files, then every duplicate after the first of its
    /// fingerprint group. With `dry_run` nothing is deleted.
    pub fn remove_duplicates(&self, dir: &Path, dry_run: bool) -> Result<DedupReport, ProcessError> {
        let files = scanner::list_files(dir, self.show_progress)?;
        let bar = self.bar(
            files.len(),
            format!("Removing duplicate images for \"{}\"", scanner::dir_label(dir)),
        );

        // Phase 1: accumulate. Nothing is deleted until every file is hashed.
        let scan = find_duplicate_groups(&files, &self.hasher);
        bar.set_position(files.len() as u64);

        let mut report = DedupReport {
            scanned: files.len(),
            dry_run,
            ..DedupReport::default()
        };

        // Phase 2: delete.
        for path in scan.undecodable {
            if dry_run || remove_logged(&path) {
                report.removed_undecodable.push(path);
            }
        }
        for group in &scan.groups {
            tracing::info!(
                "Keeping {} ({} duplicate(s), fingerprint {})",
                group.keep().display(),
                group.extras().len(),
                group.fingerprint
            );
            for extra in group.extras() {
                if dry_run || remove_logged(extra) {
                    report.removed_duplicates.push(extra.clone());
                }
            }
        }
        report.groups = scan.groups;

        bar.finish_and_clear();
        Ok(report)
    }

    /// Resize every decodable image in `dir` to exactly `width` x `height`.
    pub fn resize(&self, dir: &Path, width: u32, height: u32) -> Result<BatchReport, ProcessError> {
        if width == 0 || height == 0 {
            return Err(ImageOpError::InvalidSize { width, height }.into());
        }
        let label = format!(
            "Resizing images to {}x{} for \"{}\"",
            width,
            height,
            scanner::dir_label(dir)
        );
        self.for_each_image(dir, label, |path| image_ops::resize_file(path, width, height))
    }

    /// Convert every decodable image in `dir` to grayscale.
    pub fn grayscale(&self, dir: &Path) -> Result<BatchReport, ProcessError> {
        let label = format!("Grayscaling images for \"{}\"", scanner::dir_label(dir));
        self.for_each_image(dir, label, image_ops::grayscale_file)
    }

    /// Count the readable images in `dir` and average their dimensions.
    pub fn average_dimensions(&self, dir: &Path) -> Result<ImageStats, ProcessError> {
        let files = scanner::list_files(dir, self.show_progress)?;
        let bar = self.bar(
            files.len(),
            format!("Calculating average image size for \"{}\"", scanner::dir_label(dir)),
        );

        let dimensions: Vec<(u32, u32)> = files
            .par_iter()
            .filter_map(|path| {
                let result = image_ops::dimensions(path);
                bar.inc(1);
                match result {
                    Ok(dims) => Some(dims),
                    Err(e) => {
                        tracing::warn!("Skipping {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .collect();

        bar.finish_and_clear();
        Ok(ImageStats::from_dimensions(&dimensions))
    }

    /// Run the selected steps in their fixed order.
    pub fn compose(
        &self,
        dir: &Path,
        options: &PostProcessOptions,
    ) -> Result<PostProcessReport, ProcessError> {
        let mut report = PostProcessReport::default();
        if options.remove_duplicates {
            report.dedup = Some(self.remove_duplicates(dir, false)?);
        }
        if let Some((width, height)) = options.resize {
            report.resize = Some(self.resize(dir, width, height)?);
        }
        if options.grayscale {
            report.grayscale = Some(self.grayscale(dir)?);
        }
        if options.stats {
            report.stats = Some(self.average_dimensions(dir)?);
        }
        Ok(report)
    }

    fn for_each_image<F>(&self, dir: &Path, label: String, op: F) -> Result<BatchReport, ProcessError>
    where
        F: Fn(&Path) -> Result<(), ImageOpError> + Sync,
    {
        let files = scanner::list_files(dir, self.show_progress)?;
        let bar = self.bar(files.len(), label);

        let outcomes: Vec<(PathBuf, bool)> = files
            .par_iter()
            .map(|path| {
                let ok = match op(path) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!("Skipping {}: {}", path.display(), e);
                        false
                    }
                };
                bar.inc(1);
                (path.clone(), ok)
            })
            .collect();

        bar.finish_and_clear();

        let mut report = BatchReport::default();
        for (path, ok) in outcomes {
            if ok {
                report.processed += 1;
            } else {
                report.skipped.push(path);
            }
        }
        Ok(report)
    }

    fn bar(&self, len: usize, message: String) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len}") {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(message);
        bar
    }
}

impl Default for PostProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn remove_logged(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("Deleted {}", path.display());
            true
        }
        Err(e) => {
            tracing::error!("Failed to delete {}: {}", path.display(), e);
            false
        }
    }
}
